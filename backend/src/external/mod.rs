//! External API integrations

pub mod email;

pub use email::{Delivery, EmailClient, EmailMessage};
