//! Saga supervision: snapshots, abort, and statistics.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use common::SagaId;
use communicator::ParticipantChannel;
use saga::{RegistryStatistics, SagaSnapshot};
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// GET /api/coordinator/sagas — snapshots of every registered saga.
pub async fn list<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
) -> Json<Vec<SagaSnapshot>> {
    Json(state.registry.list())
}

/// GET /api/coordinator/sagas/:id — one saga snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaSnapshot>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    state
        .registry
        .snapshot(saga_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))
}

#[derive(Serialize)]
pub struct AbortResponse {
    pub saga_id: SagaId,
    pub status: &'static str,
}

/// DELETE /api/coordinator/sagas/:id — request abort of a running saga.
///
/// The signal is honored between steps; a step already dispatched finishes
/// first.
#[tracing::instrument(skip(state))]
pub async fn abort<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AbortResponse>), ApiError> {
    let saga_id = parse_saga_id(&id)?;
    if !state.registry.abort(saga_id) {
        return Err(ApiError::NotFound(format!("Saga {id} not found")));
    }
    tracing::info!(%saga_id, "abort requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(AbortResponse {
            saga_id,
            status: "abort_requested",
        }),
    ))
}

/// GET /api/coordinator/statistics — registry aggregates.
pub async fn statistics<T: ParticipantChannel>(
    State(state): State<Arc<AppState<T>>>,
) -> Json<RegistryStatistics> {
    Json(state.registry.statistics())
}

fn parse_saga_id(id: &str) -> Result<SagaId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid saga ID: {id}")))
}
