//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        notification_queue, spawn_notification_worker, LogNotifier, PgStore, WebhookNotifier,
    },
    config::Config,
    error::ApiError,
    web::{router, AppState},
};
use booking_core::booking::BookingManager;
use booking_core::ports::{BookingStore, NotificationService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the in-process notification queue.
const NOTIFICATION_QUEUE_CAPACITY: usize = 1024;

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
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let pg_store = PgStore::new(db_pool);
    info!("Running database migrations...");
    pg_store.run_migrations().await?;
    info!("Database migrations complete.");
    let store: Arc<dyn BookingStore> = Arc::new(pg_store);

    // --- 3. Initialize Notification Delivery ---
    let delivery: Arc<dyn NotificationService> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Booking notifications will be POSTed to {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), store.clone())?)
        }
        None => {
            info!("NOTIFY_WEBHOOK_URL not set; booking notifications are logged only");
            Arc::new(LogNotifier)
        }
    };
    let (notifier, queue) = notification_queue(NOTIFICATION_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();
    let worker = spawn_notification_worker(queue, delivery, shutdown.clone());

    // --- 4. Build the Shared AppState ---
    let manager = Arc::new(BookingManager::new(store, Arc::new(notifier)));
    let app_state = Arc::new(AppState {
        manager,
        config: config.clone(),
    });
    let app = router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 6. Drain Pending Notifications ---
    info!("Server stopped. Flushing notifications...");
    shutdown.cancel();
    worker
        .await
        .map_err(|e| ApiError::Internal(format!("Notification worker panicked: {}", e)))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        // Keep serving; the process can still be stopped externally.
        std::future::pending::<()>().await;
    }
}
