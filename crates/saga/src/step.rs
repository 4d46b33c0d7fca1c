//! Saga step definition.

use std::time::Duration;

use communicator::{CommError, Participant};
use serde_json::Value;

use crate::status::StepStatus;

/// Builds a step's request body from the shared context.
///
/// Must be pure: it may read the context but never mutate it.
pub type PayloadBuilder<C> = Box<dyn Fn(&C) -> Value + Send + Sync>;

/// Merges selected fields of a step's response into the shared context.
///
/// This is the only sanctioned way the context gains data.
pub type ResponseMerger<C> = Box<dyn Fn(&Value, &mut C) + Send + Sync>;

/// One interaction with one participant: an action and its compensation.
///
/// The step is identified by its index within the owning saga. The
/// compensation endpoint may carry `{key}` placeholders resolved from the
/// serialized context at compensation time (e.g.
/// `/api/orders/{order_id}/cancel`).
pub struct SagaStep<C> {
    pub(crate) participant: Participant,
    pub(crate) action_endpoint: String,
    pub(crate) compensation_endpoint: String,
    pub(crate) payload_builder: PayloadBuilder<C>,
    pub(crate) response_merger: ResponseMerger<C>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) compensate_on_refusal: bool,
    pub(crate) status: StepStatus,
    pub(crate) request_data: Option<Value>,
    pub(crate) response_data: Option<Value>,
    pub(crate) error: Option<String>,
}

impl<C> SagaStep<C> {
    /// Creates a pending step.
    pub fn new(
        participant: Participant,
        action_endpoint: impl Into<String>,
        compensation_endpoint: impl Into<String>,
        payload_builder: impl Fn(&C) -> Value + Send + Sync + 'static,
        response_merger: impl Fn(&Value, &mut C) + Send + Sync + 'static,
    ) -> Self {
        Self {
            participant,
            action_endpoint: action_endpoint.into(),
            compensation_endpoint: compensation_endpoint.into(),
            payload_builder: Box::new(payload_builder),
            response_merger: Box::new(response_merger),
            timeout: None,
            compensate_on_refusal: false,
            status: StepStatus::Pending,
            request_data: None,
            response_data: None,
            error: None,
        }
    }

    /// Overrides the communicator's default timeout for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Compensate this step even when it fails with a business refusal,
    /// provided the refusal carried a response body. Used by steps whose
    /// refusals can leave partial effects behind (e.g. a partial inventory
    /// reservation that must still be released).
    pub fn compensate_on_refusal(mut self) -> Self {
        self.compensate_on_refusal = true;
        self
    }

    pub fn participant(&self) -> Participant {
        self.participant
    }

    pub fn action_endpoint(&self) -> &str {
        &self.action_endpoint
    }

    pub fn compensation_endpoint(&self) -> &str {
        &self.compensation_endpoint
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// The request body sent by the forward call, if dispatched.
    pub fn request_data(&self) -> Option<&Value> {
        self.request_data.as_ref()
    }

    /// The response body from the forward call, if one was received.
    pub fn response_data(&self) -> Option<&Value> {
        self.response_data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl<C> std::fmt::Debug for SagaStep<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("participant", &self.participant)
            .field("action_endpoint", &self.action_endpoint)
            .field("compensation_endpoint", &self.compensation_endpoint)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Why a forward step failed.
#[derive(Debug, Clone)]
pub enum StepFailure {
    /// The communicator could not complete the exchange.
    Comm(CommError),
    /// The participant answered 2xx with `ok=false`; never retried.
    Refused { reason: String, response: Value },
}

impl StepFailure {
    /// Short machine-readable kind for log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            StepFailure::Comm(e) => e.kind(),
            StepFailure::Refused { .. } => "business_refusal",
        }
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepFailure::Comm(e) => write!(f, "{e}"),
            StepFailure::Refused { reason, .. } => write!(f, "participant refused: {reason}"),
        }
    }
}
