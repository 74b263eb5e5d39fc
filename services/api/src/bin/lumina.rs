//! services/api/src/bin/lumina.rs

use lumina_api::{
    adapters::{DbAdapter, InMemoryRemotes, OpenAiAssistantAdapter, RemoteFactory},
    config::Config,
    error::ApiError,
    web::{
        build_router,
        state::{run_workspace_eviction, AppState},
        USER_HEADER,
    },
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let remotes: Arc<dyn RemoteFactory> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set; workspaces will only live in memory");
            Arc::new(InMemoryRemotes::default())
        }
    };

    // --- 3. Initialize the Assistant Adapter ---
    let assistant = Arc::new(OpenAiAssistantAdapter::connect(
        &config.ai_api_base,
        config.ai_api_key()?,
        config.ai_model.clone(),
    ));
    info!(model = %config.ai_model, base = %config.ai_api_base, "assistant configured");

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), remotes, assistant));
    let cancel = CancellationToken::new();
    let eviction = tokio::spawn(run_workspace_eviction(app_state.clone(), cancel.clone()));

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static(USER_HEADER)]);

    // --- 5. Create the Web Router ---
    let app = build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = eviction.await {
        warn!(error = %e, "workspace eviction task ended abnormally");
    }
    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
