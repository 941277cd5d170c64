//! Business logic services for the retail POS platform

pub mod auth;
pub mod catalog;
pub mod finance;
pub mod notification;
pub mod product;
pub mod purchase_order;
pub mod reconciliation;
pub mod reporting;
pub mod sale;
pub mod stock;
pub mod sync;
pub mod user;

pub use auth::AuthService;
pub use catalog::{LookupService, SupplierService};
pub use finance::FinanceService;
pub use notification::NotificationService;
pub use product::ProductService;
pub use purchase_order::PurchaseOrderService;
pub use reconciliation::ReconciliationService;
pub use reporting::ReportingService;
pub use sale::SaleService;
pub use sync::OfflineSyncService;
pub use user::UserService;
