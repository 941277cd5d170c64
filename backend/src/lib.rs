//! Retail POS backend
//!
//! Inventory, stock reconciliation, purchasing and point-of-sale API served
//! over axum and PostgreSQL. The `rpos-server` and `rpos-admin` binaries are
//! thin wrappers around this library.

use axum::{routing::get, Router};
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

pub use config::Config;
use external::EmailClient;
use services::{NotificationService, SaleService};

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub email: EmailClient,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let email = EmailClient::new(&config.email);
        Self {
            db,
            config: Arc::new(config),
            email,
        }
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.db.clone(), self.email.clone())
    }

    pub fn sales(&self) -> SaleService {
        SaleService::new(self.db.clone(), self.notifications(), self.config.store.tax_rate)
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "rpos_server=debug,rpos_admin=info,retail_pos_backend=debug,tower_http=debug,sqlx=warn"
            .into()
    });
    let json = log_format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Open the PostgreSQL connection pool
pub async fn connect_database(config: &config::DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Retail POS API v1"
}
