//! # Service client
//!
//! The concrete proxy instance handed to callers. Every client embeds the same
//! lifecycle manager; behavior differences between policies come from the
//! [`ProxyBlueprint`] captured at synthesis time, not from distinct client types.
//!
//! ## Lifecycle
//!
//! A client owns at most one channel. Acquisition creates the channel lazily,
//! replaces it when it has become defunct (closed, aborted, faulted), and
//! re-applies the client configuration on every call so credential or limit
//! changes made after construction take effect. Close attempts a graceful
//! shutdown and falls back to abort; teardown failures are logged and never
//! surface to the caller.
//!
//! ## Concurrency
//!
//! Interior state sits behind an async mutex held for the duration of a call, so
//! a client can be shared across tasks while only one call proceeds against the
//! channel at a time. Per-call policy instances dispose themselves after exactly
//! one operation regardless of outcome.
use crate::binding::ClientConfig;
use crate::channel::{Channel, ChannelState, Fault, TransportError};
use crate::contract::Envelope;
use crate::forge::{ChannelFactory, ProxyBlueprint};
use crate::interception::{EndpointIdentity, InterceptionPipeline};
use crate::policy::LifecyclePolicy;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The remote side returned a structured fault and the lifecycle policy
    /// rethrows it. [`CallError::fault_detail`] exposes the unwrapped payload.
    #[error("Remote fault '{}': {}", .0.code, .0.message)]
    RemoteFault(#[source] Fault),
    #[error("Operation '{operation}' is not part of contract '{contract}'")]
    UnknownOperation { operation: String, contract: String },
    /// The client was disposed; no further operations are possible.
    #[error("The client has been disposed")]
    Disposed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Timed out opening the channel after {0:?}")]
    OpenTimeout(Duration),
}

impl CallError {
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::RemoteFault(fault) => Some(fault),
            _ => None,
        }
    }

    /// The structured detail payload of a remote fault, when present.
    pub fn fault_detail(&self) -> Option<&serde_json::Value> {
        self.fault().and_then(|fault| fault.detail.as_ref())
    }
}

struct ClientCore {
    channel: Option<Box<dyn Channel>>,
    disposed: bool,
    calls_completed: u64,
    last_fault: Option<Fault>,
}

/// A proxy instance bound to one contract, one lifecycle policy, and one
/// endpoint.
///
/// Clients under `SharedReusable` and `PerSession*` policies may be reused across
/// sequential calls from different tasks; the internal mutex serializes channel
/// access. `PerCall*` clients accept exactly one call.
pub struct ServiceClient {
    blueprint: Arc<ProxyBlueprint>,
    factory: Arc<ChannelFactory>,
    pipeline: Arc<InterceptionPipeline>,
    endpoint: EndpointIdentity,
    config: RwLock<ClientConfig>,
    core: Mutex<ClientCore>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub(crate) fn new(
        blueprint: Arc<ProxyBlueprint>,
        factory: Arc<ChannelFactory>,
        pipeline: Arc<InterceptionPipeline>,
        endpoint: EndpointIdentity,
        config: ClientConfig,
    ) -> Self {
        Self {
            blueprint,
            factory,
            pipeline,
            endpoint,
            config: RwLock::new(config),
            core: Mutex::new(ClientCore {
                channel: None,
                disposed: false,
                calls_completed: 0,
                last_fault: None,
            }),
        }
    }

    pub fn blueprint(&self) -> &Arc<ProxyBlueprint> {
        &self.blueprint
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.blueprint.policy()
    }

    pub fn endpoint(&self) -> &EndpointIdentity {
        &self.endpoint
    }

    pub fn config(&self) -> ClientConfig {
        self.config.read().clone()
    }

    /// Replaces the client configuration. Applied to the channel on the next
    /// acquisition.
    pub fn set_config(&self, config: ClientConfig) {
        *self.config.write() = config;
    }

    pub fn update_config(&self, update: impl FnOnce(&mut ClientConfig)) {
        update(&mut self.config.write());
    }

    /// Invokes `operation` with a JSON `body` and returns the reply body.
    pub async fn invoke(
        &self,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        self.invoke_with_headers(operation, body, Vec::new()).await
    }

    /// Invokes `operation` with additional per-call headers appended after the
    /// configured default headers.
    pub async fn invoke_with_headers(
        &self,
        operation: &str,
        body: serde_json::Value,
        headers: Vec<(String, String)>,
    ) -> Result<serde_json::Value, CallError> {
        let mut core = self.core.lock().await;
        if core.disposed {
            return Err(CallError::Disposed);
        }

        let outcome = if self.blueprint.operation(operation).is_none() {
            Err(CallError::UnknownOperation {
                operation: operation.to_string(),
                contract: self.blueprint.contract().full_name().to_string(),
            })
        } else {
            let config = self.config.read().clone();
            self.dispatch(&mut core, &config, operation, body, headers)
                .await
        };

        // Per-call instances are discarded after exactly one logical operation,
        // whatever its outcome. A rejected operation name counts: the attempt
        // consumed the instance.
        if self.blueprint.policy().per_call() {
            self.finish_per_call(&mut core).await;
        }

        outcome
    }

    async fn dispatch(
        &self,
        core: &mut ClientCore,
        config: &ClientConfig,
        operation: &str,
        body: serde_json::Value,
        headers: Vec<(String, String)>,
    ) -> Result<serde_json::Value, CallError> {
        self.acquire(core, config).await?;

        let mut all_headers = config.default_headers.clone();
        all_headers.extend(headers);
        let request = Arc::new(Envelope {
            contract: self.blueprint.contract().full_name().to_string(),
            operation: operation.to_string(),
            body,
            headers: all_headers,
        });

        let correlation = self.pipeline.before_send(&request, &self.endpoint);

        let Some(channel) = core.channel.as_deref_mut() else {
            return Err(CallError::Transport(TransportError::NotOpen(
                ChannelState::Absent,
            )));
        };

        match channel.call((*request).clone()).await {
            Ok(reply) => {
                let reply = Arc::new(reply);
                self.pipeline
                    .after_receive(&reply, &self.endpoint, Some(correlation));
                core.calls_completed += 1;
                Ok(reply.body.clone())
            }
            Err(TransportError::Fault(fault)) => {
                // The channel is considered poisoned after a fault; discard it so
                // the next acquisition starts fresh.
                channel.abort();
                core.last_fault = Some(fault.clone());
                if self.blueprint.policy().rethrows_faults() {
                    Err(CallError::RemoteFault(fault))
                } else {
                    tracing::debug!(code = %fault.code, "remote fault absorbed by policy");
                    Ok(serde_json::Value::Null)
                }
            }
            Err(err) => {
                channel.abort();
                Err(CallError::Transport(err))
            }
        }
    }

    /// Ensures an opened, freshly configured channel.
    async fn acquire(&self, core: &mut ClientCore, config: &ClientConfig) -> Result<(), CallError> {
        if core
            .channel
            .as_deref()
            .is_some_and(|channel| channel.state().is_defunct())
        {
            core.channel = None;
        }
        if core.channel.is_none() {
            tracing::debug!(address = %self.factory.address(), "creating channel");
            core.channel = Some(self.factory.create()?);
        }

        let limits = self.factory.limits();
        let Some(channel) = core.channel.as_deref_mut() else {
            return Err(CallError::Transport(TransportError::NotOpen(
                ChannelState::Absent,
            )));
        };

        // Configuration is refreshed on every acquisition so changes made after
        // construction are picked up.
        channel.configure(config);

        if channel.state() == ChannelState::Created {
            match tokio::time::timeout(limits.open_timeout, channel.open()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    Self::teardown(channel, limits.close_timeout).await;
                    core.channel = None;
                    return Err(CallError::Transport(err));
                }
                Err(_) => {
                    channel.abort();
                    core.channel = None;
                    return Err(CallError::OpenTimeout(limits.open_timeout));
                }
            }
        }
        Ok(())
    }

    /// Graceful close with abort fallback. Failures are recovered locally and
    /// never surfaced.
    async fn teardown(channel: &mut dyn Channel, close_timeout: Duration) {
        match tokio::time::timeout(close_timeout, channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "graceful close failed; aborting channel");
                channel.abort();
            }
            Err(_) => {
                tracing::warn!("graceful close timed out; aborting channel");
                channel.abort();
            }
        }
    }

    async fn finish_per_call(&self, core: &mut ClientCore) {
        if let Some(channel) = core.channel.as_deref_mut() {
            if channel.state() == ChannelState::Opened {
                Self::teardown(channel, self.factory.limits().close_timeout).await;
            } else {
                channel.abort();
            }
        }
        core.channel = None;
        core.disposed = true;
        tracing::debug!("per-call client disposed after one operation");
    }

    /// Gracefully closes the channel, falling back to abort on failure. Safe to
    /// call repeatedly and after disposal.
    ///
    /// The channel reference is cleared except under `SharedReusable`, whose
    /// clients are designed to be brought back into service by a later call.
    pub async fn close(&self) {
        let mut core = self.core.lock().await;
        if core.disposed {
            return;
        }
        if let Some(channel) = core.channel.as_deref_mut() {
            Self::teardown(channel, self.factory.limits().close_timeout).await;
        }
        if !self.blueprint.policy().retains_channel_after_close() {
            core.channel = None;
        }
    }

    /// Unconditionally terminates the channel, swallowing secondary failures.
    pub async fn abort(&self) {
        let mut core = self.core.lock().await;
        if let Some(channel) = core.channel.as_deref_mut() {
            channel.abort();
        }
        core.channel = None;
    }

    /// Explicit disposal: closes the channel (with abort fallback) and marks the
    /// client disposed. Idempotent; any later operation fails with
    /// [`CallError::Disposed`].
    pub async fn dispose(&self) {
        let mut core = self.core.lock().await;
        if core.disposed {
            return;
        }
        if let Some(channel) = core.channel.as_deref_mut() {
            Self::teardown(channel, self.factory.limits().close_timeout).await;
        }
        core.channel = None;
        core.disposed = true;
    }

    /// The current channel state; [`ChannelState::Absent`] when no channel exists.
    pub async fn state(&self) -> ChannelState {
        let core = self.core.lock().await;
        core.channel
            .as_deref()
            .map(Channel::state)
            .unwrap_or(ChannelState::Absent)
    }

    /// The most recent remote fault observed on this client. Unthrowable-policy
    /// callers poll this instead of receiving an error.
    pub async fn last_fault(&self) -> Option<Fault> {
        self.core.lock().await.last_fault.clone()
    }

    pub async fn is_disposed(&self) -> bool {
        self.core.lock().await.disposed
    }

    pub async fn calls_completed(&self) -> u64 {
        self.core.lock().await.calls_completed
    }
}

/// The implicit teardown path: no graceful close is possible here, so the
/// channel is aborted.
impl Drop for ServiceClient {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(channel) = core.channel.as_deref_mut() {
            channel.abort();
        }
        core.channel = None;
        core.disposed = true;
    }
}
