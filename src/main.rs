//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database
//! - Starts the HTTP server with graceful shutdown support

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nestmate::config::Config;
use nestmate::database::{init_db, AppState};
use nestmate::route::create_app;

/// Application entry point
///
/// 1. Reads configuration from the environment (and `.env`)
/// 2. Initializes the embedded database
/// 3. Creates the application state and router
/// 4. Serves until SIGINT or SIGTERM
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nestmate=debug,tower_http=debug")),
        )
        .init();

    let config = Config::load().expect("Environment misconfigured");

    if let Err(err) = std::fs::create_dir_all(&config.upload_dir) {
        warn!(dir = %config.upload_dir.display(), error = %err, "cannot create upload directory");
    }

    let db = init_db(&config.database_url).expect("Failed to initialize database");
    let state = AppState::new(db, &config);

    let app = create_app(state).layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the configured port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind address");

    info!(port = config.port, database = %config.database_url, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolves when SIGINT (Ctrl+C) or, on Unix, SIGTERM is received.
///
/// In-flight requests are allowed to finish, so no write transaction is cut
/// off halfway.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
