//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FileKeyValueStore, MemoryKeyValueStore},
    config::{Config, StorageBackend},
    error::ApiError,
    web::{build_router, rest::ApiDoc, spawn_consistency_task, state::AppState},
};
use axum::http::{header::CONTENT_TYPE, Method};
use axum::Router;
use onyx_core::ports::KeyValueStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

async fn open_backend(config: &Config) -> Result<Arc<dyn KeyValueStore>, ApiError> {
    match &config.storage {
        StorageBackend::File { data_dir } => {
            info!("Using file storage in {}", data_dir.display());
            Ok(Arc::new(FileKeyValueStore::open(data_dir).await?))
        }
        StorageBackend::Postgres { database_url } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Ok(Arc::new(db_adapter))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryKeyValueStore::new()))
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open Storage & Build the Shared AppState ---
    let kv = open_backend(&config).await?;
    let app_state = Arc::new(AppState::assemble(config.clone(), kv).await?);
    let stats = app_state.storage.stats().await?;
    info!(
        keys = stats.onyx_keys,
        bytes = stats.estimated_size,
        "Storage ready"
    );

    // --- 3. Start the Consistency Task ---
    let shutdown = CancellationToken::new();
    let consistency_task = match config.consistency_check_interval {
        Some(period) => Some(spawn_consistency_task(
            app_state.links.clone(),
            period,
            shutdown.clone(),
        )),
        None => {
            info!("Periodic consistency check disabled; running once");
            app_state.links.ensure_data_consistency().await?;
            None
        }
    };

    // --- 4. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new()
        .merge(build_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // --- 6. Stop Background Work ---
    shutdown.cancel();
    if let Some(handle) = consistency_task {
        if let Err(e) = handle.await {
            error!("Consistency task ended abnormally: {}", e);
        }
    }
    info!("Server stopped.");
    Ok(())
}
