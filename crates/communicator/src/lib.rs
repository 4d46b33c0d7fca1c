//! Resilient request/response channel to saga participants.
//!
//! This crate owns "how to reach the next participant": service discovery,
//! JSON-over-HTTP transport with retries and timeouts, and bulk health
//! probes. The saga engine owns "what to do next" and treats every error
//! returned from here as a value, never a panic.

pub mod client;
pub mod error;
pub mod memory;
pub mod participant;
pub mod retry;

pub use client::{CommunicatorConfig, HttpCommunicator, Method, ParticipantChannel};
pub use error::CommError;
pub use memory::{InMemoryCommunicator, RecordedCall};
pub use participant::{DiscoveryConfig, Participant, ParticipantDescriptor};
pub use retry::RetryPolicy;
