use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Prefix every saga identifier carries on the wire.
const SAGA_ID_PREFIX: &str = "saga-";

/// Unique identifier for a saga instance.
///
/// Rendered as `saga-<uuid>` in logs, API paths, and participant payloads,
/// so a saga id stays recognizable in a participant's records next to the
/// order, payment, and shipping ids it correlates with. Parsing also
/// accepts the bare UUID form, since participants and operators may echo
/// ids back without the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Mints the identifier for a new saga.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SAGA_ID_PREFIX}{}", self.0)
    }
}

/// A string that is neither a `saga-<uuid>` identifier nor a bare UUID.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid saga id: {0:?}")]
pub struct InvalidSagaId(String);

impl FromStr for SagaId {
    type Err = InvalidSagaId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(SAGA_ID_PREFIX).unwrap_or(s);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| InvalidSagaId(s.to_string()))
    }
}

impl Serialize for SagaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SagaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
