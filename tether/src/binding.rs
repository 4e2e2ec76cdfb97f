//! # Bindings and resolution
//!
//! A binding is a named transport/encoding configuration: timeouts, buffer limits,
//! and the recipe for building channels toward an address. Bindings are supplied
//! by the embedding application (or a test harness); the framework treats the
//! [`BindingResolver`] as a pure lookup table.
//!
//! Building a channel performs no I/O. Connection establishment happens when the
//! lifecycle manager opens the channel, which keeps binding resolution and cache
//! population cheap and lock-friendly.
use crate::address::EndpointAddress;
use crate::channel::{Channel, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Transport limits carried by a binding and threaded through channel
/// construction.
///
/// `max_outbound_connections` is an explicit per-binding value; it is never
/// mutated as a process-wide side effect of constructing a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLimits {
    /// Budget for a graceful open before the lifecycle manager aborts it.
    pub open_timeout: Duration,
    /// Budget for a graceful close before falling back to abort.
    pub close_timeout: Duration,
    /// Upper bound on a serialized message, in bytes.
    pub max_message_size: usize,
    /// Upper bound on concurrently open channels built from this binding.
    pub max_outbound_connections: usize,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            max_message_size: 4 * 1024 * 1024,
            max_outbound_connections: 64,
        }
    }
}

/// Caller credentials attached to a channel at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

/// Per-client configuration re-applied to the channel on every acquisition, so
/// changes made after construction take effect on the next call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub credentials: Option<Credentials>,
    /// Overrides the binding's `max_message_size` when set.
    pub max_message_size: Option<usize>,
    /// Headers attached to every outbound envelope.
    pub default_headers: Vec<(String, String)>,
}

/// A fully configured transport binding.
///
/// `fingerprint` must be stable for a given configuration and distinct between
/// configurations that must not share channel factories; it is the binding's
/// contribution to instance cache keys.
pub trait Binding: Send + Sync {
    fn name(&self) -> &str;

    fn fingerprint(&self) -> String;

    fn limits(&self) -> ChannelLimits;

    /// Builds a channel toward `address`. Object construction only; no I/O.
    fn build(&self, address: &EndpointAddress) -> Result<Box<dyn Channel>, TransportError>;
}

/// A named endpoint configuration: a binding reference plus a default address.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub binding: String,
    pub address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No binding registered under '{0}'")]
    UnknownBinding(String),
    #[error("No endpoint configuration named '{0}'")]
    UnknownEndpoint(String),
}

/// Lookup table from binding and endpoint-configuration names to configured
/// binding objects. Populated once at startup; read-only afterwards.
#[derive(Default)]
pub struct BindingResolver {
    bindings: HashMap<String, Arc<dyn Binding>>,
    endpoints: HashMap<String, EndpointConfig>,
}

impl BindingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binding under its own name, replacing any previous
    /// registration of that name.
    pub fn register_binding(&mut self, binding: Arc<dyn Binding>) -> &mut Self {
        self.bindings.insert(binding.name().to_string(), binding);
        self
    }

    pub fn register_endpoint(&mut self, endpoint: EndpointConfig) -> &mut Self {
        self.endpoints.insert(endpoint.name.clone(), endpoint);
        self
    }

    pub fn binding(&self, name: &str) -> Result<Arc<dyn Binding>, ResolveError> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownBinding(name.to_string()))
    }

    pub fn endpoint(&self, name: &str) -> Result<&EndpointConfig, ResolveError> {
        self.endpoints
            .get(name)
            .ok_or_else(|| ResolveError::UnknownEndpoint(name.to_string()))
    }
}
