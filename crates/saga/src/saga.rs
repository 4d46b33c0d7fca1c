//! Saga instance: shared context, steps, and the append-only log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::SagaId;
use communicator::Participant;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::log::{ExecutionLogEntry, Phase};
use crate::status::{SagaStatus, StepStatus};
use crate::step::{SagaStep, StepFailure};

/// Cooperative abort flag for a running saga.
///
/// The engine samples it only between steps; an in-flight step always
/// finishes before the abort takes effect.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests abort. Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A saga instance: an ordered step list plus the shared context.
///
/// Mutated only by the engine task that owns the run; other tasks observe
/// it through read-only [`SagaSnapshot`]s.
pub struct Saga<C> {
    pub(crate) id: SagaId,
    pub(crate) status: SagaStatus,
    pub(crate) steps: Vec<SagaStep<C>>,
    pub(crate) context: C,
    pub(crate) execution_log: Vec<ExecutionLogEntry>,
    pub(crate) failed_step_index: Option<usize>,
    pub(crate) abort: AbortSignal,
}

impl<C> Saga<C> {
    /// Creates an empty saga in the STARTED state.
    pub fn new(id: SagaId, context: C) -> Self {
        Self {
            id,
            status: SagaStatus::Started,
            steps: Vec::new(),
            context,
            execution_log: Vec::new(),
            failed_step_index: None,
            abort: AbortSignal::new(),
        }
    }

    /// Appends a step to the saga.
    pub fn add_step(mut self, step: SagaStep<C>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn steps(&self) -> &[SagaStep<C>] {
        &self.steps
    }

    pub fn execution_log(&self) -> &[ExecutionLogEntry] {
        &self.execution_log
    }

    pub fn failed_step_index(&self) -> Option<usize> {
        self.failed_step_index
    }

    /// Returns a handle that can abort this saga from another task.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Returns true once any step has been dispatched.
    pub fn has_begun(&self) -> bool {
        self.steps.iter().any(|s| s.status != StepStatus::Pending)
    }

    /// Count of steps whose forward call succeeded.
    pub fn succeeded_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status.forward_succeeded())
            .count()
    }

    /// Count of steps whose compensation succeeded.
    pub fn compensated_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Compensated)
            .count()
    }

    // -- Engine-side mutations --

    /// Marks step `i` in-flight and builds its request body.
    pub(crate) fn begin_step(&mut self, i: usize) -> StepDispatch {
        let Saga {
            steps, context, ..
        } = self;
        let step = &mut steps[i];
        step.status = StepStatus::InFlight;
        let body = (step.payload_builder)(context);
        step.request_data = Some(body.clone());
        StepDispatch {
            participant: step.participant,
            endpoint: step.action_endpoint.clone(),
            body,
            timeout: step.timeout,
        }
    }

    /// Marks step `i` succeeded, merges the response, appends the log entry.
    pub(crate) fn complete_step(&mut self, i: usize, response: Value, started_at: DateTime<Utc>) {
        let Saga {
            steps,
            context,
            execution_log,
            ..
        } = self;
        let step = &mut steps[i];
        step.status = StepStatus::Succeeded;
        (step.response_merger)(&response, context);
        step.response_data = Some(response);
        execution_log.push(ExecutionLogEntry::success(
            i,
            step.participant,
            Phase::Forward,
            started_at,
        ));
    }

    /// Marks step `i` failed and records the error.
    pub(crate) fn fail_step(&mut self, i: usize, failure: &StepFailure, started_at: DateTime<Utc>) {
        let step = &mut self.steps[i];
        step.status = StepStatus::Failed;
        step.error = Some(failure.to_string());
        if let StepFailure::Refused { response, .. } = failure {
            // Keep the refusal body: compensation payloads may need the
            // partial effects it reports.
            step.response_data = Some(response.clone());
        }
        self.failed_step_index = Some(i);
        self.execution_log.push(ExecutionLogEntry::failure(
            i,
            step.participant,
            Phase::Forward,
            started_at,
            failure.kind(),
            failure.to_string(),
        ));
    }

    /// Records a successful compensation call for step `i`.
    ///
    /// Only a step whose forward call succeeded moves to COMPENSATED; a
    /// refused step that was compensated for partial effects keeps FAILED
    /// as its terminal status, with the compensation visible in the log.
    pub(crate) fn record_compensation_success(&mut self, i: usize, started_at: DateTime<Utc>) {
        let step = &mut self.steps[i];
        if step.status == StepStatus::Succeeded {
            step.status = StepStatus::Compensated;
        }
        self.execution_log.push(ExecutionLogEntry::success(
            i,
            step.participant,
            Phase::Compensation,
            started_at,
        ));
    }

    /// Records a failed compensation call; the sweep continues past it.
    pub(crate) fn record_compensation_failure(
        &mut self,
        i: usize,
        error: &communicator::CommError,
        started_at: DateTime<Utc>,
    ) {
        let step = &mut self.steps[i];
        if step.status == StepStatus::Succeeded {
            step.status = StepStatus::CompensationFailed;
        }
        self.execution_log.push(ExecutionLogEntry::failure(
            i,
            step.participant,
            Phase::Compensation,
            started_at,
            error.kind(),
            error.to_string(),
        ));
    }
}

impl<C: Serialize> Saga<C> {
    /// Builds the compensation dispatch for step `i`.
    ///
    /// The request body is the serialized shared context augmented with
    /// `saga_id`, `original_request`, and `original_response`, so the
    /// participant can correlate by any identifier it issued. The
    /// compensation endpoint has `{key}` placeholders resolved from the
    /// context.
    pub(crate) fn begin_compensation(&self, i: usize) -> StepDispatch {
        let context_value = serde_json::to_value(&self.context).unwrap_or(Value::Null);
        let step = &self.steps[i];

        let mut body = match &context_value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.insert("saga_id".to_string(), serde_json::json!(self.id));
        if let Some(request) = &step.request_data {
            body.insert("original_request".to_string(), request.clone());
        }
        if let Some(response) = &step.response_data {
            body.insert("original_response".to_string(), response.clone());
        }

        StepDispatch {
            participant: step.participant,
            endpoint: resolve_endpoint(&step.compensation_endpoint, &context_value),
            body: Value::Object(body),
            timeout: step.timeout,
        }
    }

    /// Returns a read-only serializable copy of the saga's state.
    pub fn snapshot(&self) -> SagaSnapshot {
        SagaSnapshot {
            saga_id: self.id,
            status: self.status,
            context: serde_json::to_value(&self.context).unwrap_or(Value::Null),
            steps: self
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepSnapshot {
                    index,
                    participant: step.participant,
                    status: step.status,
                    error: step.error.clone(),
                })
                .collect(),
            failed_step_index: self.failed_step_index,
            execution_log: self.execution_log.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Saga<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("steps", &self.steps)
            .field("failed_step_index", &self.failed_step_index)
            .finish_non_exhaustive()
    }
}

/// Everything the engine needs to dispatch one call.
#[derive(Debug, Clone)]
pub(crate) struct StepDispatch {
    pub participant: Participant,
    pub endpoint: String,
    pub body: Value,
    pub timeout: Option<Duration>,
}

/// Read-only copy of a step's observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub index: usize,
    pub participant: Participant,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only serializable copy of a saga.
///
/// Snapshots carry the execution log and serialized context, so persisting
/// one at each transition is the extension point for a durable saga
/// journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaSnapshot {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    pub context: Value,
    pub steps: Vec<StepSnapshot>,
    pub failed_step_index: Option<usize>,
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl SagaSnapshot {
    /// Count of steps whose forward call succeeded.
    pub fn completed_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status.forward_succeeded())
            .count()
    }
}

/// Substitutes `{key}` placeholders in an endpoint template with string or
/// numeric values from the serialized context. Unknown keys are left as-is.
pub(crate) fn resolve_endpoint(template: &str, context: &Value) -> String {
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match context.get(key) {
                    Some(Value::String(s)) => resolved.push_str(s),
                    Some(Value::Number(n)) => resolved.push_str(&n.to_string()),
                    _ => {
                        resolved.push('{');
                        resolved.push_str(key);
                        resolved.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                resolved.push('{');
                rest = after;
            }
        }
    }
    resolved.push_str(rest);
    resolved
}
