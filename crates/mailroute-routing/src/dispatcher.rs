//! Resilient dispatcher
//!
//! The dispatcher coordinates the backends of one process:
//! - snapshots the active routing policy for the flow
//! - picks a primary backend with the weighted selector
//! - falls back across the remaining backends in registry order
//! - switches to broadcast mode when there is no policy or on a retry
//!
//! Backends are tried one at a time. A slow backend that may already have
//! accepted a message must not race a fallback that sends it a second time.

use crate::{registry::BackendRegistry, selector};
use mailroute_core::{DeliveryRequest, Error, PolicyStore, Result, RoutingPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound for one backend attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the primary backend was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Primary picked from the active policy, then registry-order fallback
    Weighted,
    /// Every backend in registry order, first success wins
    Broadcast,
}

/// Outcome of a successful dispatch
///
/// Exhaustion is reported as `Error::AllBackendsFailed` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAttemptResult {
    /// Flow the request was routed on
    pub flow: String,
    /// Selection mode used
    pub mode: DispatchMode,
    /// Backend picked by the weighted selector (weighted mode only)
    pub selected: Option<String>,
    /// Backend that accepted the message
    pub delivered_by: String,
    /// Backends tried, in order, ending with `delivered_by`
    pub attempted: Vec<String>,
}

impl DeliveryAttemptResult {
    /// Whether any backend failed before one succeeded
    pub fn fell_back(&self) -> bool {
        self.attempted.len() > 1
    }
}

/// Routes delivery requests across registered backends
pub struct Dispatcher {
    /// Immutable backend registry
    registry: Arc<BackendRegistry>,

    /// Externally owned policy store
    policies: Arc<dyn PolicyStore>,

    /// Upper bound for each backend attempt
    attempt_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the default attempt timeout
    pub fn new(registry: Arc<BackendRegistry>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            registry,
            policies,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Bound each backend attempt by `timeout`
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn policies(&self) -> &Arc<dyn PolicyStore> {
        &self.policies
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Dispatch one request on `flow`
    ///
    /// `attempt` is 1 for the first call of a request and increases with each
    /// retry. Any attempt after the first skips weighted selection and goes
    /// straight to broadcast mode.
    ///
    /// # Errors
    /// - `Error::EmptyPolicy` if the active policy has no options, or there
    ///   is no backend to broadcast to
    /// - `Error::BackendNotFound` if the active policy names an unknown backend
    /// - `Error::AllBackendsFailed` if every backend failed
    pub async fn dispatch(
        &self,
        flow: &str,
        request: &DeliveryRequest,
        attempt: u32,
    ) -> Result<DeliveryAttemptResult> {
        if attempt > 1 {
            tracing::info!(
                flow,
                attempt,
                "Retry attempt, skipping weighted selection"
            );
            return self.broadcast(flow, request).await;
        }

        // One read per dispatch; later policy changes are not observed
        let snapshot = self.policies.active_policy(flow).await?;

        match snapshot {
            Some(policy) => self.weighted(flow, &policy, request).await,
            None => {
                tracing::info!(flow, "No active policy, broadcasting");
                self.broadcast(flow, request).await
            }
        }
    }

    /// Primary from the policy, then the other backends in registry order
    async fn weighted(
        &self,
        flow: &str,
        policy: &RoutingPolicy,
        request: &DeliveryRequest,
    ) -> Result<DeliveryAttemptResult> {
        if policy.options.is_empty() {
            return Err(Error::EmptyPolicy(flow.to_string()));
        }
        self.registry.check_options(&policy.options)?;

        let primary = selector::select(&policy.options, request.selection_key)?.to_string();

        tracing::info!(
            flow,
            policy = policy.id,
            selection_key = request.selection_key,
            selected_backend = %primary,
            "Route decision made (weighted)"
        );

        let mut attempted = Vec::with_capacity(self.registry.len());
        let order = std::iter::once(primary.as_str())
            .chain(self.registry.ids().filter(|id| *id != primary));

        match self.traverse(request, order, &mut attempted).await {
            Some(winner) => {
                if winner != primary {
                    tracing::info!(
                        flow,
                        selected_backend = %primary,
                        fallback = %winner,
                        "Fallback backend succeeded"
                    );
                }
                Ok(DeliveryAttemptResult {
                    flow: flow.to_string(),
                    mode: DispatchMode::Weighted,
                    selected: Some(primary),
                    delivered_by: winner,
                    attempted,
                })
            }
            None => Err(exhausted(flow, attempted)),
        }
    }

    /// Every backend in registry order
    async fn broadcast(
        &self,
        flow: &str,
        request: &DeliveryRequest,
    ) -> Result<DeliveryAttemptResult> {
        if self.registry.is_empty() {
            return Err(Error::EmptyPolicy(flow.to_string()));
        }

        let mut attempted = Vec::with_capacity(self.registry.len());
        match self.traverse(request, self.registry.ids(), &mut attempted).await {
            Some(winner) => Ok(DeliveryAttemptResult {
                flow: flow.to_string(),
                mode: DispatchMode::Broadcast,
                selected: None,
                delivered_by: winner,
                attempted,
            }),
            None => Err(exhausted(flow, attempted)),
        }
    }

    /// Try backends in `order` until one succeeds, recording each attempt
    async fn traverse<'a>(
        &self,
        request: &DeliveryRequest,
        order: impl Iterator<Item = &'a str>,
        attempted: &mut Vec<String>,
    ) -> Option<String> {
        for backend_id in order {
            attempted.push(backend_id.to_string());
            if self.try_backend(backend_id, request).await.is_ok() {
                return Some(backend_id.to_string());
            }
        }
        None
    }

    /// Attempt delivery on a single backend, bounded by the attempt timeout
    async fn try_backend(&self, backend_id: &str, request: &DeliveryRequest) -> Result<()> {
        let backend = self.registry.resolve(backend_id)?;

        tracing::debug!(
            backend = backend_id,
            to = %request.to,
            "Attempting delivery"
        );

        let outcome = match tokio::time::timeout(self.attempt_timeout, backend.attempt(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(
                u64::try_from(self.attempt_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match &outcome {
            Ok(()) => tracing::info!(backend = backend_id, to = %request.to, "Delivery succeeded"),
            Err(err) => tracing::warn!(
                backend = backend_id,
                to = %request.to,
                error = %err,
                "Delivery failed"
            ),
        }

        outcome
    }
}

fn exhausted(flow: &str, attempted: Vec<String>) -> Error {
    tracing::error!(flow, attempted = ?attempted, "All backends failed");
    Error::AllBackendsFailed {
        flow: flow.to_string(),
        attempted,
    }
}
