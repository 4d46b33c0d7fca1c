//! Participant channel trait and HTTP implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CommError;
use crate::participant::{DiscoveryConfig, Participant, ParticipantDescriptor};
use crate::retry::{execute_with_retry, RetryPolicy};

/// HTTP method for a participant exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request/response channel to saga participants.
///
/// Implementations must return errors as values; a send failure must never
/// panic into the caller.
#[async_trait]
pub trait ParticipantChannel: Send + Sync {
    /// Sends one JSON exchange to a participant and decodes the response.
    ///
    /// `endpoint` is a path relative to the participant's base address.
    /// `timeout` overrides the channel default for this exchange only.
    async fn send(
        &self,
        participant: Participant,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, CommError>;

    /// Returns true iff the participant's health endpoint answers 2xx.
    async fn probe_health(&self, participant: Participant) -> bool;

    /// Probes every participant concurrently.
    async fn probe_all(&self) -> HashMap<Participant, bool>;
}

/// Configuration resolved once at communicator construction.
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    pub discovery: DiscoveryConfig,
    pub retry: RetryPolicy,
    /// Default per-exchange timeout.
    pub request_timeout: Duration,
    /// Short timeout for health probes.
    pub health_timeout: Duration,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(2),
        }
    }
}

/// JSON-over-HTTP channel with retries, timeouts, and health probes.
///
/// Holds one shared `reqwest::Client`, so connections are pooled per
/// participant host and reusable across saga tasks. Descriptors are
/// discovered at construction and never re-resolved.
pub struct HttpCommunicator {
    descriptors: HashMap<Participant, ParticipantDescriptor>,
    client: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    health_timeout: Duration,
}

impl HttpCommunicator {
    /// Creates a communicator, resolving participant addresses once.
    pub fn new(config: CommunicatorConfig) -> Self {
        let descriptors = config.discovery.discover();
        for descriptor in descriptors.values() {
            tracing::info!(
                participant = %descriptor.participant,
                base_url = %descriptor.base_url,
                "participant discovered"
            );
        }
        Self {
            descriptors,
            client: reqwest::Client::new(),
            retry: config.retry,
            request_timeout: config.request_timeout,
            health_timeout: config.health_timeout,
        }
    }

    fn descriptor(&self, participant: Participant) -> Result<&ParticipantDescriptor, CommError> {
        self.descriptors
            .get(&participant)
            .ok_or(CommError::UnknownParticipant(participant))
    }

    async fn send_once(
        &self,
        participant: Participant,
        url: &str,
        method: Method,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value, CommError> {
        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        }
        .timeout(timeout);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CommError::Timeout {
                    participant,
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                CommError::ConnectFailed {
                    participant,
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommError::BadStatus {
                participant,
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| CommError::Decode {
            participant,
            detail: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Err(CommError::Decode {
                participant,
                detail: "empty response body".to_string(),
            });
        }
        serde_json::from_str(&text).map_err(|e| CommError::Decode {
            participant,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl ParticipantChannel for HttpCommunicator {
    async fn send(
        &self,
        participant: Participant,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, CommError> {
        let descriptor = self.descriptor(participant)?;
        let url = format!("{}{}", descriptor.base_url, endpoint);
        let timeout = timeout.unwrap_or(self.request_timeout);

        execute_with_retry(&self.retry, |attempt| {
            let url = url.clone();
            async move {
                metrics::counter!(
                    "participant_request_attempts_total",
                    "participant" => participant.as_str()
                )
                .increment(1);
                tracing::debug!(
                    %participant,
                    %method,
                    endpoint,
                    attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "sending participant request"
                );
                self.send_once(participant, &url, method, body, timeout)
                    .await
            }
        })
        .await
    }

    async fn probe_health(&self, participant: Participant) -> bool {
        let Ok(descriptor) = self.descriptor(participant) else {
            return false;
        };
        let url = format!("{}{}", descriptor.base_url, descriptor.health_endpoint);
        match self
            .client
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(%participant, error = %e, "health probe failed");
                false
            }
        }
    }

    async fn probe_all(&self) -> HashMap<Participant, bool> {
        let probes = Participant::ALL
            .iter()
            .map(|&p| async move { (p, self.probe_health(p).await) });
        futures::future::join_all(probes).await.into_iter().collect()
    }
}
