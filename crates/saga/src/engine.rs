//! Saga engine: forward execution and reverse compensation.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use common::SagaId;
use communicator::{Method, ParticipantChannel};
use serde::Serialize;
use serde_json::Value;

use crate::error::SagaError;
use crate::log::ExecutionLogEntry;
use crate::saga::Saga;
use crate::status::{SagaStatus, StepStatus};
use crate::step::StepFailure;

/// Outcome of a full saga run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub saga_id: SagaId,
    pub status: SagaStatus,
    /// Steps whose forward call succeeded, including later-compensated ones.
    pub succeeded_steps: usize,
    pub failed_step_index: Option<usize>,
    pub compensated_steps: usize,
    pub execution_log: Vec<ExecutionLogEntry>,
}

/// Outcome of a compensation sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CompensationResult {
    pub compensated: usize,
    pub failed: usize,
}

/// Drives sagas from STARTED to a terminal state.
///
/// The engine owns "what to do next"; the channel owns "how to reach the
/// next participant", including retries. Within one saga, steps run
/// strictly sequentially; many sagas may run concurrently, each on its own
/// task, sharing one engine.
pub struct SagaEngine<T> {
    channel: Arc<T>,
}

impl<T> Clone for SagaEngine<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T: ParticipantChannel> SagaEngine<T> {
    pub fn new(channel: Arc<T>) -> Self {
        Self { channel }
    }

    /// Executes every step in order, compensating on failure.
    ///
    /// The saga must be freshly created: STARTED with no step dispatched.
    /// On return the saga is in a terminal state and the execution log
    /// covers every step touched. Step and compensation failures are
    /// reported through the result, not as errors.
    #[tracing::instrument(skip(self, saga))]
    pub async fn execute<C: Serialize + Send + Sync>(
        &self,
        saga: &RwLock<Saga<C>>,
    ) -> Result<ExecutionResult, SagaError> {
        let (saga_id, total_steps) = {
            let guard = saga.read().unwrap();
            if guard.status != SagaStatus::Started || guard.has_begun() {
                return Err(SagaError::AlreadyStarted {
                    saga_id: guard.id,
                    status: guard.status,
                });
            }
            (guard.id, guard.steps.len())
        };

        metrics::counter!("saga_executions_total").increment(1);
        let run_timer = Instant::now();
        tracing::info!(%saga_id, total_steps, "saga execution started");

        for i in 0..total_steps {
            // Abort is sampled only between steps; an in-flight step always
            // finishes before the signal takes effect.
            let abort_requested = { saga.read().unwrap().abort.is_triggered() };
            if abort_requested {
                tracing::warn!(%saga_id, next_step = i, "abort requested, compensating");
                let targets = succeeded_targets(saga, i);
                self.sweep(saga, saga_id, targets).await;
                return Ok(finish(saga, SagaStatus::Aborted, run_timer));
            }

            let dispatch = { saga.write().unwrap().begin_step(i) };
            let started_at = Utc::now();
            tracing::info!(
                %saga_id,
                step = i,
                participant = %dispatch.participant,
                endpoint = %dispatch.endpoint,
                "saga step started"
            );

            let outcome = self
                .channel
                .send(
                    dispatch.participant,
                    &dispatch.endpoint,
                    Method::Post,
                    Some(&dispatch.body),
                    dispatch.timeout,
                )
                .await;

            let failure = match outcome {
                Ok(body) => match refusal_reason(&body) {
                    Some(reason) => Some(StepFailure::Refused {
                        reason,
                        response: body,
                    }),
                    None => {
                        let mut guard = saga.write().unwrap();
                        guard.complete_step(i, body, started_at);
                        tracing::info!(%saga_id, step = i, "saga step succeeded");
                        None
                    }
                },
                Err(e) => Some(StepFailure::Comm(e)),
            };

            if let Some(failure) = failure {
                tracing::error!(%saga_id, step = i, error = %failure, "saga step failed");
                {
                    let mut guard = saga.write().unwrap();
                    guard.fail_step(i, &failure, started_at);
                }
                let targets = failure_targets(saga, i, &failure);
                self.sweep(saga, saga_id, targets).await;
                return Ok(finish(saga, SagaStatus::Failed, run_timer));
            }
        }

        Ok(finish(saga, SagaStatus::Completed, run_timer))
    }

    /// Compensates, in reverse order, every step below `from_index` whose
    /// forward call succeeded.
    ///
    /// Individual failures mark the step COMPENSATION_FAILED and the sweep
    /// continues. The saga never moves to COMPLETED from here; unless it
    /// was externally aborted, its final status is FAILED.
    #[tracing::instrument(skip(self, saga))]
    pub async fn compensate<C: Serialize + Send + Sync>(
        &self,
        saga: &RwLock<Saga<C>>,
        from_index: usize,
    ) -> CompensationResult {
        let saga_id = { saga.read().unwrap().id };
        let targets = succeeded_targets(saga, from_index);
        let result = self.sweep(saga, saga_id, targets).await;
        {
            let mut guard = saga.write().unwrap();
            if !guard.status.is_terminal() {
                guard.status = SagaStatus::Failed;
            }
        }
        result
    }

    /// Runs compensation calls for the given step indices, in order.
    async fn sweep<C: Serialize + Send + Sync>(
        &self,
        saga: &RwLock<Saga<C>>,
        saga_id: SagaId,
        targets: Vec<usize>,
    ) -> CompensationResult {
        let mut result = CompensationResult::default();
        for j in targets {
            let dispatch = { saga.read().unwrap().begin_compensation(j) };
            let started_at = Utc::now();
            tracing::info!(
                %saga_id,
                step = j,
                participant = %dispatch.participant,
                endpoint = %dispatch.endpoint,
                "compensating step"
            );

            let outcome = self
                .channel
                .send(
                    dispatch.participant,
                    &dispatch.endpoint,
                    Method::Post,
                    Some(&dispatch.body),
                    dispatch.timeout,
                )
                .await;

            let mut guard = saga.write().unwrap();
            match outcome {
                Ok(_) => {
                    guard.record_compensation_success(j, started_at);
                    result.compensated += 1;
                }
                Err(e) => {
                    // Best effort: record and keep sweeping.
                    tracing::error!(%saga_id, step = j, error = %e, "compensation failed");
                    guard.record_compensation_failure(j, &e, started_at);
                    result.failed += 1;
                }
            }
        }
        result
    }
}

/// Steps below `from_index` with a successful forward call, newest first.
fn succeeded_targets<C>(saga: &RwLock<Saga<C>>, from_index: usize) -> Vec<usize> {
    let guard = saga.read().unwrap();
    let upper = from_index.min(guard.steps.len());
    (0..upper)
        .rev()
        .filter(|&j| guard.steps[j].status == StepStatus::Succeeded)
        .collect()
}

/// Compensation targets after a forward failure at `failed`.
///
/// A refused step flagged `compensate_on_refusal` is included first, so
/// partial effects reported in its refusal body are undone before the
/// regular reverse sweep.
fn failure_targets<C>(
    saga: &RwLock<Saga<C>>,
    failed: usize,
    failure: &StepFailure,
) -> Vec<usize> {
    let guard = saga.read().unwrap();
    let mut targets = Vec::new();
    if matches!(failure, StepFailure::Refused { .. })
        && guard.steps[failed].compensate_on_refusal
        && guard.steps[failed].response_data.is_some()
    {
        targets.push(failed);
    }
    targets.extend((0..failed).rev().filter(|&j| guard.steps[j].status == StepStatus::Succeeded));
    targets
}

/// Moves the saga to its terminal status and builds the result.
fn finish<C>(saga: &RwLock<Saga<C>>, status: SagaStatus, run_timer: Instant) -> ExecutionResult {
    let result = {
        let mut guard = saga.write().unwrap();
        guard.status = status;
        ExecutionResult {
            saga_id: guard.id,
            status,
            succeeded_steps: guard.succeeded_step_count(),
            failed_step_index: guard.failed_step_index,
            compensated_steps: guard.compensated_step_count(),
            execution_log: guard.execution_log.clone(),
        }
    };

    let duration = run_timer.elapsed().as_secs_f64();
    metrics::histogram!("saga_duration_seconds").record(duration);
    match status {
        SagaStatus::Completed => metrics::counter!("saga_completed").increment(1),
        SagaStatus::Failed => metrics::counter!("saga_failed").increment(1),
        SagaStatus::Aborted => metrics::counter!("saga_aborted").increment(1),
        SagaStatus::Started => {}
    }
    tracing::info!(saga_id = %result.saga_id, %status, duration, "saga finished");
    result
}

/// Extracts the refusal reason from a 2xx body carrying `ok=false`.
fn refusal_reason(body: &Value) -> Option<String> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        Some(
            body.get("error")
                .and_then(Value::as_str)
                .unwrap_or("request refused")
                .to_string(),
        )
    } else {
        None
    }
}
