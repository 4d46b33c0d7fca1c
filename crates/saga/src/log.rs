//! Append-only execution log.

use chrono::{DateTime, Utc};
use communicator::Participant;
use serde::{Deserialize, Serialize};

/// Which direction a log entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Forward,
    Compensation,
}

/// How the recorded call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
}

/// One completed forward or compensation call.
///
/// Entries are appended as steps finish and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub step_index: usize,
    pub participant: Participant,
    pub phase: Phase,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionLogEntry {
    /// Records a successful call that started at `started_at` and finished now.
    pub fn success(
        step_index: usize,
        participant: Participant,
        phase: Phase,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            step_index,
            participant,
            phase,
            outcome: Outcome::Success,
            elapsed_ms: elapsed_ms(started_at, finished_at),
            error_kind: None,
            error_detail: None,
            started_at,
            finished_at,
        }
    }

    /// Records a failed call with its error kind and detail.
    pub fn failure(
        step_index: usize,
        participant: Participant,
        phase: Phase,
        started_at: DateTime<Utc>,
        error_kind: impl Into<String>,
        error_detail: impl Into<String>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            step_index,
            participant,
            phase,
            outcome: Outcome::Failure,
            elapsed_ms: elapsed_ms(started_at, finished_at),
            error_kind: Some(error_kind.into()),
            error_detail: Some(error_detail.into()),
            started_at,
            finished_at,
        }
    }
}

fn elapsed_ms(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> u64 {
    (finished_at - started_at).num_milliseconds().max(0) as u64
}
