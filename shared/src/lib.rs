//! Shared types and models for the retail POS platform
//!
//! This crate contains the domain rules shared between the backend server and
//! the browser POS (via WASM): roles and permissions, the stock reconciliation
//! workflow, purchase order lifecycle, cart pricing and receipt rendering.

pub mod models;
pub mod receipt;
pub mod types;
pub mod validation;

pub use models::*;
pub use receipt::*;
pub use types::*;
pub use validation::*;
