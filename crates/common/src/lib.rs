//! Shared types for the saga coordinator.

mod types;

pub use types::{InvalidSagaId, SagaId};
