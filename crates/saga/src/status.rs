//! Saga and step state machines.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// STARTED ──┬──► COMPLETED   (every step succeeded)
///           ├──► FAILED      (a forward step failed, compensation swept)
///           └──► ABORTED     (external abort, compensation swept)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Saga created, forward execution not yet finished.
    #[default]
    Started,

    /// Every step succeeded (terminal state).
    Completed,

    /// A forward step failed and compensation was attempted (terminal state).
    Failed,

    /// Externally aborted between steps, compensation swept (terminal state).
    Aborted,
}

impl SagaStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SagaStatus::Started)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of one step within a saga run.
///
/// Transitions are monotonic within a run:
/// `PENDING → IN_FLIGHT → SUCCEEDED | FAILED`, and for compensated steps
/// `SUCCEEDED → COMPENSATED | COMPENSATION_FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Not yet dispatched.
    #[default]
    Pending,

    /// Dispatched, awaiting the participant's response.
    InFlight,

    /// Forward call succeeded.
    Succeeded,

    /// Forward call failed.
    Failed,

    /// Forward call succeeded and the compensation call succeeded.
    Compensated,

    /// The compensation call failed; the sweep continued past it.
    CompensationFailed,
}

impl StepStatus {
    /// Returns true if the forward call for this step succeeded,
    /// regardless of any later compensation outcome.
    pub fn forward_succeeded(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Compensated | StepStatus::CompensationFailed
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InFlight => "IN_FLIGHT",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
            StepStatus::CompensationFailed => "COMPENSATION_FAILED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
