//! Coordinator HTTP surface.
//!
//! Exposes the operator-facing endpoints for accepting orders and
//! supervising sagas, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use communicator::ParticipantChannel;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::orders::AppState;

/// GET /metrics — renders the coordinator's Prometheus registry: the saga
/// outcome counters and duration histogram recorded by the engine
/// (`saga_executions_total`, `saga_completed`, `saga_failed`,
/// `saga_aborted`, `saga_duration_seconds`) and the per-participant
/// delivery counter recorded by the communicator
/// (`participant_request_attempts_total`).
async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<T: ParticipantChannel + 'static>(
    state: Arc<AppState<T>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/", get(routes::health::root::<T>))
        .route("/health", get(routes::health::check))
        .route(
            "/api/coordinator/health",
            get(routes::health::coordinator::<T>),
        )
        .route("/api/coordinator/orders", post(routes::orders::create::<T>))
        .route("/api/coordinator/sagas", get(routes::sagas::list::<T>))
        .route("/api/coordinator/sagas/{id}", get(routes::sagas::get::<T>))
        .route(
            "/api/coordinator/sagas/{id}",
            delete(routes::sagas::abort::<T>),
        )
        .route(
            "/api/coordinator/statistics",
            get(routes::sagas::statistics::<T>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
