//! Communication error taxonomy.

use thiserror::Error;

use crate::participant::Participant;

/// Errors produced by a participant exchange.
///
/// Every variant is returned as a value; the communicator never unwinds
/// into the engine. Only connect failures, timeouts, and 5xx statuses are
/// retryable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    /// No descriptor is registered for the participant.
    #[error("unknown participant: {0}")]
    UnknownParticipant(Participant),

    /// The connection could not be established.
    #[error("failed to connect to {participant}: {detail}")]
    ConnectFailed {
        participant: Participant,
        detail: String,
    },

    /// The request did not complete within the timeout.
    #[error("request to {participant} timed out after {timeout_ms}ms")]
    Timeout {
        participant: Participant,
        timeout_ms: u64,
    },

    /// The participant responded with a non-2xx status.
    #[error("{participant} returned status {status}")]
    BadStatus {
        participant: Participant,
        status: u16,
    },

    /// The response body was empty or not valid JSON.
    #[error("failed to decode response from {participant}: {detail}")]
    Decode {
        participant: Participant,
        detail: String,
    },

    /// All delivery attempts failed with retryable errors.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<CommError> },
}

impl CommError {
    /// Returns true if another delivery attempt may succeed.
    ///
    /// 4xx statuses, decode failures, and unknown participants are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommError::ConnectFailed { .. } | CommError::Timeout { .. } => true,
            CommError::BadStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Short machine-readable kind, used in execution log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            CommError::UnknownParticipant(_) => "unknown_participant",
            CommError::ConnectFailed { .. } => "connect_failed",
            CommError::Timeout { .. } => "timeout",
            CommError::BadStatus { .. } => "bad_status",
            CommError::Decode { .. } => "decode_error",
            CommError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
