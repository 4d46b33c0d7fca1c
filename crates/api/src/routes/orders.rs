//! Order intake: creates and executes an order saga.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use common::SagaId;
use communicator::ParticipantChannel;
use saga::{
    order_saga, ExecutionLogEntry, OrderContext, OrderRequest, SagaEngine, SagaRegistry,
    SagaStatus,
};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<T: ParticipantChannel> {
    pub registry: SagaRegistry<OrderContext>,
    pub engine: SagaEngine<T>,
    pub channel: Arc<T>,
    pub port: u16,
}

impl<T: ParticipantChannel> AppState<T> {
    pub fn new(channel: Arc<T>, port: u16) -> Self {
        Self {
            registry: SagaRegistry::new(),
            engine: SagaEngine::new(Arc::clone(&channel)),
            channel,
            port,
        }
    }
}

/// Outcome of an order saga, returned to the upstream caller.
///
/// Partial state such as the `order_id` created by step 0 is included even
/// for failed sagas so callers can reconcile externally.
#[derive(Serialize)]
pub struct SagaResponse {
    pub saga_id: SagaId,
    pub order_id: Option<String>,
    pub status: SagaStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub execution_log: Vec<ExecutionLogEntry>,
}

/// POST /api/coordinator/orders — create a saga for the order and drive it
/// to a terminal state.
#[tracing::instrument(skip(state, request))]
pub async fn create<T: ParticipantChannel + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<SagaResponse>, ApiError> {
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("order has no items".to_string()));
    }

    let cell = state.registry.register(order_saga(request));
    let result = state.engine.execute(&cell).await?;

    let (order_id, error, total_steps) = {
        let guard = cell.read().unwrap();
        let error = result
            .failed_step_index
            .and_then(|i| guard.steps()[i].error().map(String::from));
        (guard.context().order_id.clone(), error, guard.steps().len())
    };

    Ok(Json(SagaResponse {
        saga_id: result.saga_id,
        order_id,
        status: result.status,
        message: status_message(result.status).to_string(),
        failed_step_index: result.failed_step_index,
        error,
        steps_completed: result.succeeded_steps,
        total_steps,
        execution_log: result.execution_log,
    }))
}

fn status_message(status: SagaStatus) -> &'static str {
    match status {
        SagaStatus::Completed => "Order processing completed successfully",
        SagaStatus::Failed => "Order processing failed and compensated",
        SagaStatus::Aborted => "Order processing was aborted and compensated",
        SagaStatus::Started => "Order processing in progress",
    }
}
