//! Saga orchestration for order fulfillment.
//!
//! This crate provides a generic saga engine for multi-step distributed
//! transactions with compensating actions on failure, plus the concrete
//! order fulfillment workflow:
//! 1. Create order
//! 2. Reserve inventory
//! 3. Process payment
//! 4. Schedule shipping
//! 5. Send notification
//!
//! Steps run strictly sequentially within a saga, each payload built from
//! the shared context that earlier responses were merged into. If any step
//! fails, previously completed steps are compensated in reverse order.

pub mod engine;
pub mod error;
pub mod log;
pub mod order;
pub mod registry;
pub mod saga;
pub mod status;
pub mod step;

pub use engine::{CompensationResult, ExecutionResult, SagaEngine};
pub use error::SagaError;
pub use log::{ExecutionLogEntry, Outcome, Phase};
pub use order::{order_saga, OrderContext, OrderItem, OrderRequest, ReservedItem};
pub use registry::{RegistryStatistics, SagaRegistry};
pub use saga::{AbortSignal, Saga, SagaSnapshot, StepSnapshot};
pub use status::{SagaStatus, StepStatus};
pub use step::{SagaStep, StepFailure};
