//! Route definitions for the retail POS API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .nest("/users", user_routes())
        .nest("/categories", category_routes())
        .nest("/brands", brand_routes())
        .nest("/suppliers", supplier_routes())
        .nest("/products", product_routes())
        .nest("/reconciliations", reconciliation_routes())
        .nest("/purchase-orders", purchase_order_routes())
        .nest("/pos", pos_routes())
        .nest("/sales", sale_routes())
        .nest("/transactions", transaction_routes())
        .nest("/reports", report_routes())
        .nest("/notifications", notification_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        .merge(protected)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
}

/// User management routes
fn user_routes() -> Router<AppState> {
    use handlers::user::*;
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user))
        .route("/:id/password", put(reset_password))
}

fn category_routes() -> Router<AppState> {
    use handlers::catalog::*;
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

fn brand_routes() -> Router<AppState> {
    use handlers::catalog::*;
    Router::new()
        .route("/", get(list_brands).post(create_brand))
        .route("/:id", get(get_brand).put(update_brand).delete(delete_brand))
}

fn supplier_routes() -> Router<AppState> {
    use handlers::catalog::*;
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    use handlers::product::*;
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/low-stock", get(low_stock_products))
        .route("/barcode/:code", get(get_by_barcode))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/movements", get(product_movements))
}

/// Stock reconciliation workflow routes
fn reconciliation_routes() -> Router<AppState> {
    use handlers::reconciliation::*;
    Router::new()
        .route("/", get(list_reconciliations).post(create_reconciliation))
        .route(
            "/:id",
            get(get_reconciliation)
                .put(update_reconciliation)
                .delete(delete_reconciliation),
        )
        .route("/:id/submit", post(submit_reconciliation))
        .route("/:id/approve", post(approve_reconciliation))
        .route("/:id/reject", post(reject_reconciliation))
}

/// Purchase order routes
fn purchase_order_routes() -> Router<AppState> {
    use handlers::purchase_order::*;
    Router::new()
        .route("/", get(list_purchase_orders).post(create_purchase_order))
        .route(
            "/:id",
            get(get_purchase_order)
                .put(update_purchase_order)
                .delete(delete_purchase_order),
        )
        .route("/:id/order", post(order_purchase_order))
        .route("/:id/receive", post(receive_purchase_order))
        .route("/:id/cancel", post(cancel_purchase_order))
}

/// Point-of-sale routes
fn pos_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::pos::checkout))
        .route("/sync", post(handlers::pos::sync_offline_sales))
}

fn sale_routes() -> Router<AppState> {
    use handlers::sale::*;
    Router::new()
        .route("/", get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/receipt", get(get_receipt))
        .route("/:id/void", post(void_sale))
}

/// Financial transaction routes
fn transaction_routes() -> Router<AppState> {
    use handlers::finance::*;
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/summary", get(transaction_summary))
        .route("/export", get(export_transactions))
}

/// Reporting routes
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(handlers::reporting::get_dashboard))
        .route("/sales", get(handlers::reporting::get_sales_report))
}

fn notification_routes() -> Router<AppState> {
    Router::new().route("/email-log", get(handlers::notification::list_email_log))
}
