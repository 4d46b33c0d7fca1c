//! Saga error types.

use common::SagaId;
use thiserror::Error;

use crate::status::SagaStatus;

/// Errors that can occur when driving a saga.
///
/// Step and compensation failures are not errors at this level: the engine
/// recovers from them internally and reports them through the execution
/// result. The only failure surfaced to callers is misuse of the engine.
#[derive(Debug, Error)]
pub enum SagaError {
    /// `execute` was called on a saga that has already begun.
    #[error("saga {saga_id} has already been started (status {status})")]
    AlreadyStarted { saga_id: SagaId, status: SagaStatus },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
