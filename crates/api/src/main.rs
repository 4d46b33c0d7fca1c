//! Coordinator entry point.

use std::sync::Arc;

use communicator::HttpCommunicator;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use api::config::CoordinatorConfig;
use api::AppState;

/// Resolves once SIGINT or SIGTERM arrives.
///
/// Graceful shutdown drains the HTTP surface only. Sagas still executing
/// in handler tasks die with the process, and the registry is not durable,
/// so their participants are left to reconcile through idempotent
/// compensation when the order is retried.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::warn!("SIGINT received, stopping coordinator; in-flight sagas will not survive the process");
        }
        () = terminate => {
            tracing::warn!("SIGTERM received, stopping coordinator; in-flight sagas will not survive the process");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Resolve configuration; a malformed environment aborts startup.
    let config = match CoordinatorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    // 2. Initialize tracing
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Discover participants and build application state
    let channel = Arc::new(HttpCommunicator::new(config.communicator_config()));
    let state = Arc::new(AppState::new(channel, config.port));

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting saga coordinator");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("saga coordinator shut down");
}
