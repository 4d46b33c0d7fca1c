//! Liveness and participant health endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use communicator::ParticipantChannel;
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct BannerResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub port: u16,
}

#[derive(Serialize)]
pub struct CoordinatorHealthResponse {
    pub status: &'static str,
    /// Reachability per participant, from a live probe.
    pub participants: BTreeMap<String, bool>,
}

/// GET / — service banner.
pub async fn root<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
) -> Json<BannerResponse> {
    Json(BannerResponse {
        service: "saga-coordinator",
        status: "running",
        port: state.port,
    })
}

/// GET /health — process liveness.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/coordinator/health — overall status plus per-participant
/// reachability.
pub async fn coordinator<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
) -> Json<CoordinatorHealthResponse> {
    let probes = state.channel.probe_all().await;
    let status = if probes.values().all(|&up| up) {
        "ok"
    } else {
        "degraded"
    };
    let participants = probes
        .into_iter()
        .map(|(p, up)| (p.as_str().to_string(), up))
        .collect();
    Json(CoordinatorHealthResponse {
        status,
        participants,
    })
}
