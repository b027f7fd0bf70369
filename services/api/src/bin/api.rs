//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpMetadataAdapter, LogNotifier, ResendNotifier},
    config::Config,
    error::ApiError,
    web::{router, AppState},
};
use keepstash_core::ports::NotificationSender;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
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
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let metadata_adapter = Arc::new(
        HttpMetadataAdapter::new()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?,
    );

    let notifier: Arc<dyn NotificationSender> = match &config.resend {
        Some(resend) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;
            info!("Sending email through Resend as {}", resend.from_email);
            Arc::new(ResendNotifier::new(client, resend))
        }
        None => {
            info!("RESEND_API_KEY/RESEND_FROM_EMAIL not set; emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        metadata: metadata_adapter,
        notifier,
    });

    // --- 5. Create the Web Router ---
    let app = router(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
