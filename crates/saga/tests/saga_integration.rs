//! Integration tests for the saga engine over the order workflow.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::json;

use common::SagaId;
use communicator::{CommError, InMemoryCommunicator, Participant, RetryPolicy};
use saga::{
    order_saga, ExecutionResult, Outcome, OrderContext, OrderItem, OrderRequest, Phase, Saga,
    SagaEngine, SagaError, SagaRegistry, SagaStatus, StepStatus,
};

struct TestHarness {
    channel: InMemoryCommunicator,
    engine: SagaEngine<InMemoryCommunicator>,
    registry: SagaRegistry<OrderContext>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_channel(InMemoryCommunicator::new())
    }

    /// Harness whose channel retries with a fast schedule, like the HTTP
    /// communicator does in production.
    fn with_retry(max_attempts: u32) -> Self {
        Self::with_channel(InMemoryCommunicator::new().with_retry(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(4),
        }))
    }

    fn with_channel(channel: InMemoryCommunicator) -> Self {
        let engine = SagaEngine::new(Arc::new(channel.clone()));
        Self {
            channel,
            engine,
            registry: SagaRegistry::new(),
        }
    }

    /// Scripts the happy-path response for every action endpoint.
    fn happy_responses(&self) {
        self.channel.respond(
            Participant::Order,
            "/api/orders",
            Ok(json!({ "ok": true, "order_id": "o-1" })),
        );
        self.channel.respond(
            Participant::Inventory,
            "/api/inventory/reserve",
            Ok(json!({
                "ok": true,
                "reservations": [{ "product_id": "p-1", "quantity": 2 }],
            })),
        );
        self.channel.respond(
            Participant::Payment,
            "/api/payments/process",
            Ok(json!({ "ok": true, "payment_id": "pay-1" })),
        );
        self.channel.respond(
            Participant::Shipping,
            "/api/shipping/schedule",
            Ok(json!({ "ok": true, "shipping_id": "s-1", "tracking_number": "t-1" })),
        );
        self.channel.respond(
            Participant::Notification,
            "/api/notifications/send",
            Ok(json!({ "ok": true, "notification_id": "n-1" })),
        );
    }

    async fn run(&self) -> (ExecutionResult, Arc<RwLock<Saga<OrderContext>>>) {
        let cell = self.registry.register(order_saga(order_request()));
        let result = self.engine.execute(&cell).await.unwrap();
        (result, cell)
    }
}

fn order_request() -> OrderRequest {
    OrderRequest {
        customer_id: "c-1".to_string(),
        items: vec![OrderItem {
            product_id: "p-1".to_string(),
            quantity: 2,
            unit_price: 99.99,
        }],
        total_amount: 199.98,
        shipping_address: json!({ "street": "1 Main St", "city": "Springfield" }),
        payment_method: "CREDIT_CARD".to_string(),
        shipping_method: "STANDARD".to_string(),
        channels: vec!["email".to_string()],
    }
}

fn log_shape(result: &ExecutionResult) -> Vec<(usize, Phase, Outcome)> {
    result
        .execution_log
        .iter()
        .map(|e| (e.step_index, e.phase, e.outcome))
        .collect()
}

#[tokio::test]
async fn test_happy_path() {
    let h = TestHarness::new();
    h.happy_responses();

    let (result, cell) = h.run().await;

    assert_eq!(result.status, SagaStatus::Completed);
    assert_eq!(result.succeeded_steps, 5);
    assert_eq!(result.compensated_steps, 0);
    assert!(result.failed_step_index.is_none());

    // Five forward successes, no compensation entries.
    assert_eq!(
        log_shape(&result),
        vec![
            (0, Phase::Forward, Outcome::Success),
            (1, Phase::Forward, Outcome::Success),
            (2, Phase::Forward, Outcome::Success),
            (3, Phase::Forward, Outcome::Success),
            (4, Phase::Forward, Outcome::Success),
        ]
    );

    // Every identifier was merged into the context.
    let saga = cell.read().unwrap();
    let ctx = saga.context();
    assert_eq!(ctx.order_id.as_deref(), Some("o-1"));
    assert_eq!(ctx.inventory_reservations.as_ref().unwrap().len(), 1);
    assert_eq!(ctx.payment_id.as_deref(), Some("pay-1"));
    assert_eq!(ctx.shipping_id.as_deref(), Some("s-1"));
    assert_eq!(ctx.tracking_number.as_deref(), Some("t-1"));
    assert_eq!(ctx.notification_id.as_deref(), Some("n-1"));
    assert!(saga.steps().iter().all(|s| s.status() == StepStatus::Succeeded));
}

#[tokio::test]
async fn test_payment_declined_compensates_in_reverse() {
    let h = TestHarness::new();
    h.happy_responses();
    h.channel.respond(
        Participant::Payment,
        "/api/payments/process",
        Ok(json!({ "ok": false, "error": "card_declined" })),
    );

    let (result, cell) = h.run().await;

    assert_eq!(result.status, SagaStatus::Failed);
    assert_eq!(result.failed_step_index, Some(2));
    assert_eq!(result.succeeded_steps, 2);
    assert_eq!(result.compensated_steps, 2);

    assert_eq!(
        log_shape(&result),
        vec![
            (0, Phase::Forward, Outcome::Success),
            (1, Phase::Forward, Outcome::Success),
            (2, Phase::Forward, Outcome::Failure),
            (1, Phase::Compensation, Outcome::Success),
            (0, Phase::Compensation, Outcome::Success),
        ]
    );

    let saga = cell.read().unwrap();
    let statuses: Vec<_> = saga.steps().iter().map(|s| s.status()).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Compensated,
            StepStatus::Compensated,
            StepStatus::Failed,
            StepStatus::Pending,
            StepStatus::Pending,
        ]
    );
    assert_eq!(saga.steps()[2].error().unwrap(), "participant refused: card_declined");
    drop(saga);

    // The refusal was never retried and no refund was issued.
    assert_eq!(h.channel.calls_for(Participant::Payment, "/api/payments/process").len(), 1);
    assert!(h.channel.calls_for(Participant::Payment, "/api/payments/refund").is_empty());

    // The order compensation endpoint was resolved from the context.
    let cancels = h.channel.calls_for(Participant::Order, "/api/orders/o-1/cancel");
    assert_eq!(cancels.len(), 1);
    let body = cancels[0].body.as_ref().unwrap();
    assert_eq!(body["order_id"], "o-1");
    assert_eq!(body["original_response"]["order_id"], "o-1");
    assert!(body.get("saga_id").is_some());
}

#[tokio::test]
async fn test_inventory_partial_refusal_releases_partial_reservation() {
    let h = TestHarness::new();
    h.happy_responses();
    h.channel.respond(
        Participant::Inventory,
        "/api/inventory/reserve",
        Ok(json!({
            "ok": false,
            "error": "insufficient_stock",
            "reservations": [{ "product_id": "p-1", "quantity": 1 }],
        })),
    );

    let (result, cell) = h.run().await;

    assert_eq!(result.status, SagaStatus::Failed);
    assert_eq!(result.failed_step_index, Some(1));

    // The release payload carries the partial reservation list so the
    // participant can free whatever was actually held.
    let releases = h.channel.calls_for(Participant::Inventory, "/api/inventory/release");
    assert_eq!(releases.len(), 1);
    let body = releases[0].body.as_ref().unwrap();
    assert_eq!(
        body["original_response"]["reservations"],
        json!([{ "product_id": "p-1", "quantity": 1 }])
    );
    assert_eq!(body["original_request"]["order_id"], "o-1");

    assert_eq!(
        log_shape(&result),
        vec![
            (0, Phase::Forward, Outcome::Success),
            (1, Phase::Forward, Outcome::Failure),
            (1, Phase::Compensation, Outcome::Success),
            (0, Phase::Compensation, Outcome::Success),
        ]
    );

    let saga = cell.read().unwrap();
    // The refused step keeps FAILED as its terminal status; the release is
    // visible in the log. The order step was compensated normally.
    assert_eq!(saga.steps()[1].status(), StepStatus::Failed);
    assert_eq!(saga.steps()[0].status(), StepStatus::Compensated);
}

#[tokio::test]
async fn test_shipping_timeout_recovers_on_third_attempt() {
    let h = TestHarness::with_retry(3);
    h.happy_responses();
    for _ in 0..2 {
        h.channel.script(
            Participant::Shipping,
            "/api/shipping/schedule",
            Err(CommError::Timeout {
                participant: Participant::Shipping,
                timeout_ms: 10,
            }),
        );
    }

    let (result, cell) = h.run().await;

    assert_eq!(result.status, SagaStatus::Completed);
    // Three attempts all went to shipping; the step itself succeeded once.
    assert_eq!(h.channel.calls_for(Participant::Shipping, "/api/shipping/schedule").len(), 3);
    let saga = cell.read().unwrap();
    assert_eq!(saga.steps()[3].status(), StepStatus::Succeeded);
    assert_eq!(saga.context().notification_id.as_deref(), Some("n-1"));
}

#[tokio::test]
async fn test_compensation_failure_does_not_stop_the_sweep() {
    let h = TestHarness::with_retry(3);
    h.happy_responses();
    h.channel.respond(
        Participant::Shipping,
        "/api/shipping/schedule",
        Err(CommError::BadStatus {
            participant: Participant::Shipping,
            status: 500,
        }),
    );
    h.channel.respond(
        Participant::Inventory,
        "/api/inventory/release",
        Err(CommError::BadStatus {
            participant: Participant::Inventory,
            status: 500,
        }),
    );

    let (result, cell) = h.run().await;

    assert_eq!(result.status, SagaStatus::Failed);
    assert_eq!(result.failed_step_index, Some(3));
    assert_eq!(result.compensated_steps, 2);

    let saga = cell.read().unwrap();
    let statuses: Vec<_> = saga.steps().iter().map(|s| s.status()).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Compensated,
            StepStatus::CompensationFailed,
            StepStatus::Compensated,
            StepStatus::Failed,
            StepStatus::Pending,
        ]
    );
    drop(saga);

    // The forward failure and the release failure both exhausted retries.
    assert_eq!(h.channel.calls_for(Participant::Shipping, "/api/shipping/schedule").len(), 3);
    assert_eq!(h.channel.calls_for(Participant::Inventory, "/api/inventory/release").len(), 3);
    // The sweep still reached the order compensation after the failure.
    assert_eq!(h.channel.calls_for(Participant::Order, "/api/orders/o-1/cancel").len(), 1);

    let comp_entries: Vec<_> = result
        .execution_log
        .iter()
        .filter(|e| e.phase == Phase::Compensation)
        .map(|e| (e.step_index, e.outcome))
        .collect();
    assert_eq!(
        comp_entries,
        vec![
            (2, Outcome::Success),
            (1, Outcome::Failure),
            (0, Outcome::Success),
        ]
    );
    let failed_entry = result
        .execution_log
        .iter()
        .find(|e| e.phase == Phase::Compensation && e.outcome == Outcome::Failure)
        .unwrap();
    assert_eq!(failed_entry.error_kind.as_deref(), Some("retries_exhausted"));
}

#[tokio::test]
async fn test_abort_mid_flight_lets_step_finish_then_compensates() {
    let h = TestHarness::new();
    h.happy_responses();
    // Payment is slow enough for the abort to land while it is in flight.
    h.channel.delay(
        Participant::Payment,
        "/api/payments/process",
        Duration::from_millis(100),
    );

    let cell = h.registry.register(order_saga(order_request()));
    let saga_id = cell.read().unwrap().id();

    let registry_abort = {
        let signal = cell.read().unwrap().abort_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.trigger();
        })
    };

    let result = h.engine.execute(&cell).await.unwrap();
    registry_abort.await.unwrap();

    assert_eq!(result.status, SagaStatus::Aborted);
    assert!(result.failed_step_index.is_none());

    // The in-flight payment step finished successfully before the abort
    // took effect, so the sweep covers steps 2, 1, 0.
    let saga = cell.read().unwrap();
    let statuses: Vec<_> = saga.steps().iter().map(|s| s.status()).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Compensated,
            StepStatus::Compensated,
            StepStatus::Compensated,
            StepStatus::Pending,
            StepStatus::Pending,
        ]
    );
    drop(saga);

    let comp_order: Vec<_> = result
        .execution_log
        .iter()
        .filter(|e| e.phase == Phase::Compensation)
        .map(|e| e.step_index)
        .collect();
    assert_eq!(comp_order, vec![2, 1, 0]);
    assert!(h.channel.calls_for(Participant::Shipping, "/api/shipping/schedule").is_empty());

    assert_eq!(h.registry.snapshot(saga_id).unwrap().status, SagaStatus::Aborted);
}

#[tokio::test]
async fn test_abort_before_first_step_yields_empty_log() {
    let h = TestHarness::new();
    h.happy_responses();

    let cell = h.registry.register(order_saga(order_request()));
    let saga_id = cell.read().unwrap().id();
    assert!(h.registry.abort(saga_id));

    let result = h.engine.execute(&cell).await.unwrap();

    assert_eq!(result.status, SagaStatus::Aborted);
    assert!(result.execution_log.is_empty());
    assert!(h.channel.calls().is_empty());
}

#[tokio::test]
async fn test_first_step_failure_has_nothing_to_undo() {
    let h = TestHarness::new();
    h.channel.respond(
        Participant::Order,
        "/api/orders",
        Err(CommError::ConnectFailed {
            participant: Participant::Order,
            detail: "connection refused".to_string(),
        }),
    );

    let (result, _) = h.run().await;

    assert_eq!(result.status, SagaStatus::Failed);
    assert_eq!(result.failed_step_index, Some(0));
    assert_eq!(result.compensated_steps, 0);
    assert_eq!(log_shape(&result), vec![(0, Phase::Forward, Outcome::Failure)]);
    assert_eq!(h.channel.calls().len(), 1);
}

#[tokio::test]
async fn test_last_step_failure_compensates_all_prior_steps() {
    let h = TestHarness::new();
    h.happy_responses();
    h.channel.respond(
        Participant::Notification,
        "/api/notifications/send",
        Ok(json!({ "ok": false, "error": "smtp_down" })),
    );

    let (result, _) = h.run().await;

    assert_eq!(result.status, SagaStatus::Failed);
    assert_eq!(result.failed_step_index, Some(4));
    assert_eq!(result.compensated_steps, 4);

    let comp_order: Vec<_> = result
        .execution_log
        .iter()
        .filter(|e| e.phase == Phase::Compensation)
        .map(|e| e.step_index)
        .collect();
    assert_eq!(comp_order, vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn test_zero_step_saga_completes_without_calls() {
    let h = TestHarness::new();
    let cell = RwLock::new(Saga::new(SagaId::new(), json!({})));

    let result = h.engine.execute(&cell).await.unwrap();

    assert_eq!(result.status, SagaStatus::Completed);
    assert!(result.execution_log.is_empty());
    assert!(h.channel.calls().is_empty());
}

#[tokio::test]
async fn test_execute_rejects_a_finished_saga() {
    let h = TestHarness::new();
    h.happy_responses();

    let (_, cell) = h.run().await;
    let second = h.engine.execute(&cell).await;

    assert!(matches!(second, Err(SagaError::AlreadyStarted { .. })));
}

#[tokio::test]
async fn test_external_compensate_walks_succeeded_steps() {
    let h = TestHarness::new();
    h.happy_responses();

    let (result, cell) = h.run().await;
    assert_eq!(result.status, SagaStatus::Completed);

    // An external sweep over a completed saga undoes every step and the
    // saga can never return to COMPLETED.
    let comp = h.engine.compensate(&cell, 5).await;
    assert_eq!(comp.compensated, 5);
    assert_eq!(comp.failed, 0);
    let saga = cell.read().unwrap();
    assert!(saga.steps().iter().all(|s| s.status() == StepStatus::Compensated));
    // Status was already terminal (COMPLETED) before the external sweep.
    assert_eq!(saga.status(), SagaStatus::Completed);
}

#[tokio::test]
async fn test_second_sweep_does_not_touch_compensated_steps() {
    let h = TestHarness::new();
    h.happy_responses();
    h.channel.respond(
        Participant::Payment,
        "/api/payments/process",
        Ok(json!({ "ok": false, "error": "card_declined" })),
    );

    let (result, cell) = h.run().await;
    assert_eq!(result.status, SagaStatus::Failed);
    let calls_after_run = h.channel.calls().len();

    // A repeated sweep finds no steps left in SUCCEEDED and issues no
    // calls; terminal step statuses are unchanged.
    let comp = h.engine.compensate(&cell, 2).await;
    assert_eq!(comp.compensated, 0);
    assert_eq!(comp.failed, 0);
    assert_eq!(h.channel.calls().len(), calls_after_run);

    let saga = cell.read().unwrap();
    assert_eq!(saga.steps()[0].status(), StepStatus::Compensated);
    assert_eq!(saga.steps()[1].status(), StepStatus::Compensated);
    assert_eq!(saga.steps()[2].status(), StepStatus::Failed);
}

#[tokio::test]
async fn test_registry_statistics_after_mixed_runs() {
    let h = TestHarness::new();
    h.happy_responses();
    let (first, _) = h.run().await;
    assert_eq!(first.status, SagaStatus::Completed);

    h.channel.respond(
        Participant::Payment,
        "/api/payments/process",
        Ok(json!({ "ok": false, "error": "card_declined" })),
    );
    let (second, _) = h.run().await;
    assert_eq!(second.status, SagaStatus::Failed);

    let stats = h.registry.statistics();
    assert_eq!(stats.total_active, 2);
    assert_eq!(stats.status_breakdown["COMPLETED"], 1);
    assert_eq!(stats.status_breakdown["FAILED"], 1);
    let breakdown_total: usize = stats.status_breakdown.values().sum();
    assert_eq!(breakdown_total, stats.total_active);
    assert_eq!(stats.total_steps, 10);
    // 5 from the completed saga, 2 from the failed one (steps 0 and 1).
    assert_eq!(stats.completed_steps, 7);
    assert!((stats.step_completion_rate - 0.7).abs() < f64::EPSILON);
    assert!((stats.average_steps_per_saga - 5.0).abs() < f64::EPSILON);
}
