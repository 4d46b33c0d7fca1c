//! Participant identities and service discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named saga participant reachable over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    Order,
    Inventory,
    Payment,
    Shipping,
    Notification,
}

impl Participant {
    /// All participants, in saga step order.
    pub const ALL: [Participant; 5] = [
        Participant::Order,
        Participant::Inventory,
        Participant::Payment,
        Participant::Shipping,
        Participant::Notification,
    ];

    /// Returns the participant name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Participant::Order => "order",
            Participant::Inventory => "inventory",
            Participant::Payment => "payment",
            Participant::Shipping => "shipping",
            Participant::Notification => "notification",
        }
    }

    /// Default port under the `http://<participant>-service:<port>` convention.
    pub fn default_port(&self) -> u16 {
        match self {
            Participant::Order => 8000,
            Participant::Inventory => 8001,
            Participant::Payment => 8002,
            Participant::Shipping => 8003,
            Participant::Notification => 8004,
        }
    }

    /// Name of the environment variable overriding this participant's base URL.
    pub fn env_var(&self) -> String {
        format!("{}_SERVICE_URL", self.as_str().to_uppercase())
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved address of a participant.
///
/// Constructed once at communicator startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantDescriptor {
    pub participant: Participant,
    pub base_url: String,
    pub health_endpoint: String,
}

/// How participant base addresses are located at startup.
///
/// Precedence per participant: an explicit override, then the
/// `<PARTICIPANT>_SERVICE_URL` environment variable, then the
/// `http://<participant>-service:<port>` convention. `local_mode`
/// points the convention at `localhost` for local development.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    pub overrides: HashMap<Participant, String>,
    pub local_mode: bool,
}

impl DiscoveryConfig {
    /// Resolves the base URL for one participant.
    pub fn resolve(&self, participant: Participant) -> String {
        self.resolve_with(participant, |var| std::env::var(var).ok())
    }

    /// Resolves every participant into a descriptor map.
    pub fn discover(&self) -> HashMap<Participant, ParticipantDescriptor> {
        Participant::ALL
            .iter()
            .map(|&p| {
                (
                    p,
                    ParticipantDescriptor {
                        participant: p,
                        base_url: self.resolve(p),
                        health_endpoint: "/health".to_string(),
                    },
                )
            })
            .collect()
    }

    fn resolve_with(
        &self,
        participant: Participant,
        env: impl Fn(&str) -> Option<String>,
    ) -> String {
        let url = if let Some(url) = self.overrides.get(&participant) {
            url.clone()
        } else if let Some(url) = env(&participant.env_var()) {
            url
        } else {
            let host = if self.local_mode {
                "localhost".to_string()
            } else {
                format!("{}-service", participant.as_str())
            };
            format!("http://{}:{}", host, participant.default_port())
        };
        url.trim_end_matches('/').to_string()
    }
}
