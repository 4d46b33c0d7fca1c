//! Order fulfillment saga definition.
//!
//! Declares the five-step workflow, its endpoints, and how identifiers
//! issued by each participant flow through the shared context into the
//! payloads of later steps.

use common::SagaId;
use communicator::Participant;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::saga::Saga;
use crate::step::SagaStep;

/// One line item of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// One reserved line item, as reported by the inventory participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedItem {
    pub product_id: String,
    pub quantity: u32,
}

/// An incoming order, as accepted by the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    #[serde(default)]
    pub shipping_address: Value,
    pub payment_method: String,
    pub shipping_method: String,
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

fn default_channels() -> Vec<String> {
    vec!["email".to_string()]
}

/// The shared context of an order saga.
///
/// Identifier fields start empty and are filled exclusively by response
/// mergers as steps succeed; each field is written by exactly one step.
#[derive(Debug, Clone, Serialize)]
pub struct OrderContext {
    pub saga_id: SagaId,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub shipping_address: Value,
    pub payment_method: String,
    pub shipping_method: String,
    pub channels: Vec<String>,
    /// Issued by the order participant at step 0.
    pub order_id: Option<String>,
    /// Issued by the inventory participant at step 1.
    pub inventory_reservations: Option<Vec<ReservedItem>>,
    /// Issued by the payment participant at step 2.
    pub payment_id: Option<String>,
    /// Issued by the shipping participant at step 3.
    pub shipping_id: Option<String>,
    /// Issued by the shipping participant at step 3; may be empty for
    /// non-shipped items.
    pub tracking_number: Option<String>,
    /// Issued by the notification participant at step 4.
    pub notification_id: Option<String>,
}

impl OrderContext {
    fn new(saga_id: SagaId, request: OrderRequest) -> Self {
        Self {
            saga_id,
            customer_id: request.customer_id,
            items: request.items,
            total_amount: request.total_amount,
            shipping_address: request.shipping_address,
            payment_method: request.payment_method,
            shipping_method: request.shipping_method,
            channels: request.channels,
            order_id: None,
            inventory_reservations: None,
            payment_id: None,
            shipping_id: None,
            tracking_number: None,
            notification_id: None,
        }
    }
}

/// Builds the five-step order fulfillment saga for an incoming request.
///
/// The inventory step is compensated even on a business refusal: a refused
/// reservation can still hold partial stock, and the release payload
/// carries the participant's refusal body as `original_response` so it can
/// free whatever was reserved.
pub fn order_saga(request: OrderRequest) -> Saga<OrderContext> {
    let saga_id = SagaId::new();
    let context = OrderContext::new(saga_id, request);

    Saga::new(saga_id, context)
        .add_step(SagaStep::new(
            Participant::Order,
            "/api/orders",
            "/api/orders/{order_id}/cancel",
            create_order_payload,
            merge_order_response,
        ))
        .add_step(
            SagaStep::new(
                Participant::Inventory,
                "/api/inventory/reserve",
                "/api/inventory/release",
                reserve_inventory_payload,
                merge_inventory_response,
            )
            .compensate_on_refusal(),
        )
        .add_step(SagaStep::new(
            Participant::Payment,
            "/api/payments/process",
            "/api/payments/refund",
            process_payment_payload,
            merge_payment_response,
        ))
        .add_step(SagaStep::new(
            Participant::Shipping,
            "/api/shipping/schedule",
            "/api/shipping/cancel",
            schedule_shipping_payload,
            merge_shipping_response,
        ))
        .add_step(SagaStep::new(
            Participant::Notification,
            "/api/notifications/send",
            "/api/notifications/cancel",
            send_notification_payload,
            merge_notification_response,
        ))
}

fn create_order_payload(ctx: &OrderContext) -> Value {
    json!({
        "saga_id": ctx.saga_id,
        "order_id": &ctx.order_id,
        "customer_id": &ctx.customer_id,
        "items": &ctx.items,
        "total_amount": ctx.total_amount,
        "shipping_address": &ctx.shipping_address,
        "payment_method": &ctx.payment_method,
        "shipping_method": &ctx.shipping_method,
    })
}

fn merge_order_response(response: &Value, ctx: &mut OrderContext) {
    if let Some(order_id) = response.get("order_id").and_then(Value::as_str) {
        ctx.order_id = Some(order_id.to_string());
    }
}

fn reserve_inventory_payload(ctx: &OrderContext) -> Value {
    json!({
        "saga_id": ctx.saga_id,
        "order_id": &ctx.order_id,
        "items": &ctx.items,
    })
}

fn merge_inventory_response(response: &Value, ctx: &mut OrderContext) {
    if let Some(reservations) = response.get("reservations") {
        if let Ok(reservations) = serde_json::from_value(reservations.clone()) {
            ctx.inventory_reservations = Some(reservations);
        }
    }
}

fn process_payment_payload(ctx: &OrderContext) -> Value {
    json!({
        "saga_id": ctx.saga_id,
        "order_id": &ctx.order_id,
        "customer_id": &ctx.customer_id,
        "total_amount": ctx.total_amount,
        "payment_method": &ctx.payment_method,
    })
}

fn merge_payment_response(response: &Value, ctx: &mut OrderContext) {
    if let Some(payment_id) = response.get("payment_id").and_then(Value::as_str) {
        ctx.payment_id = Some(payment_id.to_string());
    }
}

fn schedule_shipping_payload(ctx: &OrderContext) -> Value {
    json!({
        "saga_id": ctx.saga_id,
        "order_id": &ctx.order_id,
        "shipping_address": &ctx.shipping_address,
        "shipping_method": &ctx.shipping_method,
        "items": &ctx.items,
    })
}

fn merge_shipping_response(response: &Value, ctx: &mut OrderContext) {
    if let Some(shipping_id) = response.get("shipping_id").and_then(Value::as_str) {
        ctx.shipping_id = Some(shipping_id.to_string());
    }
    // Tracking content is not validated; an empty string is acceptable.
    if let Some(tracking) = response.get("tracking_number").and_then(Value::as_str) {
        ctx.tracking_number = Some(tracking.to_string());
    }
}

fn send_notification_payload(ctx: &OrderContext) -> Value {
    json!({
        "saga_id": ctx.saga_id,
        "order_id": &ctx.order_id,
        "customer_id": &ctx.customer_id,
        "notification_type": "order_confirmation",
        "channels": &ctx.channels,
    })
}

fn merge_notification_response(response: &Value, ctx: &mut OrderContext) {
    if let Some(notification_id) = response.get("notification_id").and_then(Value::as_str) {
        ctx.notification_id = Some(notification_id.to_string());
    }
}
