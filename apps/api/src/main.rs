//! gpuaudit API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod dto;
mod error;
mod handlers;
mod state;

use std::sync::Arc;

use gpuaudit_application::{AuditIngestionService, AuditQueryService, AuditStore, Redactor};
use gpuaudit_core::AppError;
use gpuaudit_infrastructure::{
    InMemoryAuditStore, JournaledAuditStore, PostgresAuditStore, SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, StoreBackendConfig, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let audit_store: Arc<dyn AuditStore> = match &config.store {
        StoreBackendConfig::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .map_err(|error| {
                    AppError::store_unavailable(
                        "connect",
                        format!("failed to connect to database: {error}"),
                    )
                })?;

            sqlx::migrate!("../../crates/infrastructure/migrations")
                .run(&pool)
                .await
                .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

            if config.migrate_only {
                info!("database migrations applied successfully");
                return Ok(());
            }

            Arc::new(PostgresAuditStore::new(pool))
        }
        StoreBackendConfig::Journal { path } => Arc::new(JournaledAuditStore::open(path).await?),
        StoreBackendConfig::Memory => {
            warn!("AUDIT_STORE=memory keeps audit records in process memory only");
            Arc::new(InMemoryAuditStore::new())
        }
    };

    let redactor = Arc::new(Redactor::new(config.redaction.clone())?);
    let ingestion_service = AuditIngestionService::new(audit_store.clone(), redactor.clone());
    let query_service =
        AuditQueryService::new(audit_store.clone(), redactor, Arc::new(SystemClock));

    let app_state = AppState {
        ingestion_service,
        query_service,
        audit_store,
        store_backend: config.store.as_str(),
        operation_timeout: config.operation_timeout,
        recent_window: config.recent_window,
    };

    let app = api_router::build_router(app_state);
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind API listener: {error}")))?;

    info!(%address, store = config.store.as_str(), "gpuaudit api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server failed: {error}")))
}
