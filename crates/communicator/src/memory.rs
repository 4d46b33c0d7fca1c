//! In-memory participant channel for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{Method, ParticipantChannel};
use crate::error::CommError;
use crate::participant::Participant;
use crate::retry::{execute_with_retry, RetryPolicy};

/// One request observed by the in-memory channel.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub participant: Participant,
    pub endpoint: String,
    pub method: Method,
    pub body: Option<Value>,
}

#[derive(Default)]
struct ChannelState {
    /// Per-(participant, endpoint) outcome queues, consumed before `fixed`.
    scripted: HashMap<(Participant, String), VecDeque<Result<Value, CommError>>>,
    fixed: HashMap<(Participant, String), Result<Value, CommError>>,
    delays: HashMap<(Participant, String), Duration>,
    healthy: HashMap<Participant, bool>,
    calls: Vec<RecordedCall>,
}

/// In-memory channel with scripted responses.
///
/// Unscripted endpoints answer `{"ok": true}`. An optional retry policy
/// applies the same schedule as the HTTP communicator so retry behavior can
/// be exercised end to end.
#[derive(Clone, Default)]
pub struct InMemoryCommunicator {
    state: Arc<RwLock<ChannelState>>,
    retry: Option<RetryPolicy>,
}

impl InMemoryCommunicator {
    /// Creates a channel that answers `{"ok": true}` everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a retry policy to every send, like the HTTP communicator.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the fixed outcome for an endpoint.
    pub fn respond(
        &self,
        participant: Participant,
        endpoint: &str,
        outcome: Result<Value, CommError>,
    ) {
        self.state
            .write()
            .unwrap()
            .fixed
            .insert((participant, endpoint.to_string()), outcome);
    }

    /// Queues a one-shot outcome, consumed before the fixed outcome.
    pub fn script(
        &self,
        participant: Participant,
        endpoint: &str,
        outcome: Result<Value, CommError>,
    ) {
        self.state
            .write()
            .unwrap()
            .scripted
            .entry((participant, endpoint.to_string()))
            .or_default()
            .push_back(outcome);
    }

    /// Delays every response from an endpoint.
    pub fn delay(&self, participant: Participant, endpoint: &str, delay: Duration) {
        self.state
            .write()
            .unwrap()
            .delays
            .insert((participant, endpoint.to_string()), delay);
    }

    /// Sets the health probe answer for a participant (default healthy).
    pub fn set_healthy(&self, participant: Participant, healthy: bool) {
        self.state
            .write()
            .unwrap()
            .healthy
            .insert(participant, healthy);
    }

    /// Returns every call observed so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.read().unwrap().calls.clone()
    }

    /// Returns the calls observed for one participant.
    pub fn calls_to(&self, participant: Participant) -> Vec<RecordedCall> {
        self.state
            .read()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.participant == participant)
            .cloned()
            .collect()
    }

    /// Returns the calls observed for one endpoint.
    pub fn calls_for(&self, participant: Participant, endpoint: &str) -> Vec<RecordedCall> {
        self.state
            .read()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.participant == participant && c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    async fn dispatch(
        &self,
        participant: Participant,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, CommError> {
        let (outcome, delay) = {
            let mut state = self.state.write().unwrap();
            state.calls.push(RecordedCall {
                participant,
                endpoint: endpoint.to_string(),
                method,
                body: body.cloned(),
            });
            let key = (participant, endpoint.to_string());
            let outcome = state
                .scripted
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.fixed.get(&key).cloned())
                .unwrap_or_else(|| Ok(json!({ "ok": true })));
            (outcome, state.delays.get(&key).copied())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[async_trait]
impl ParticipantChannel for InMemoryCommunicator {
    async fn send(
        &self,
        participant: Participant,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        _timeout: Option<Duration>,
    ) -> Result<Value, CommError> {
        match &self.retry {
            Some(policy) => {
                execute_with_retry(policy, |_| self.dispatch(participant, endpoint, method, body))
                    .await
            }
            None => self.dispatch(participant, endpoint, method, body).await,
        }
    }

    async fn probe_health(&self, participant: Participant) -> bool {
        self.state
            .read()
            .unwrap()
            .healthy
            .get(&participant)
            .copied()
            .unwrap_or(true)
    }

    async fn probe_all(&self) -> HashMap<Participant, bool> {
        let mut results = HashMap::new();
        for p in Participant::ALL {
            results.insert(p, self.probe_health(p).await);
        }
        results
    }
}
