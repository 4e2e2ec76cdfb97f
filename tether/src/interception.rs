//! # Interception pipeline
//!
//! Two hook points observe every call: one fired immediately before a request
//! leaves the client, one immediately after a reply is received. Each outbound
//! message is stamped with a fresh correlation id; the reply event carries the
//! same id back, linking the pair for diagnostics.
//!
//! Event dispatch never throws into the transport path: a panicking subscriber is
//! logged and isolated, and a missing correlation id degrades to the nil id
//! rather than failing the call.
use crate::contract::Envelope;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque token linking an outbound request to its inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// A fresh, unique id for a new outbound message.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    /// The degraded "no correlation" id used when the reply side has nothing to
    /// match against.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an event happened, from the client's point of view.
#[derive(Debug, Clone)]
pub struct EndpointIdentity {
    /// The binding or endpoint-configuration name.
    pub name: String,
    /// The remote address being called.
    pub address: String,
    /// The local listen URI; for client-side events this mirrors the address.
    pub listen_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SendingRequest,
    ReceivingReply,
}

/// One observation raised by the pipeline. Created at send time, consumed at
/// receive time; never persisted beyond the call.
#[derive(Clone)]
pub struct InterceptionEvent {
    pub kind: EventKind,
    pub endpoint: EndpointIdentity,
    /// The raw message object.
    pub message: Arc<Envelope>,
    /// A human-readable rendering of the message.
    pub rendered: String,
    pub correlation_id: CorrelationId,
    /// For replies, the originating request's correlation id.
    pub request_id: Option<CorrelationId>,
}

type Subscriber = Arc<dyn Fn(&InterceptionEvent) + Send + Sync>;

/// The pair of hook points plus the subscriber registry.
///
/// Subscribers are held in a lock-protected copy-on-write list: dispatch clones a
/// snapshot under the shared lock and invokes callbacks outside it, so a slow
/// subscriber never blocks subscription changes. Re-subscribing an id that is
/// already registered replaces the previous subscription instead of duplicating
/// it.
#[derive(Default)]
pub struct InterceptionPipeline {
    subscribers: RwLock<Vec<(String, Subscriber)>>,
}

impl InterceptionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `id`. Idempotent: an existing subscription with
    /// the same id is removed first.
    pub fn subscribe<F>(&self, id: impl Into<String>, callback: F)
    where
        F: Fn(&InterceptionEvent) + Send + Sync + 'static,
    {
        let id = id.into();
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.push((id, Arc::new(callback)));
    }

    /// Removes the subscription registered under `id`. Returns whether it existed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Fired immediately before a request leaves the client. Assigns and returns
    /// the correlation id for this call.
    pub fn before_send(
        &self,
        message: &Arc<Envelope>,
        endpoint: &EndpointIdentity,
    ) -> CorrelationId {
        let correlation_id = CorrelationId::fresh();
        self.dispatch(InterceptionEvent {
            kind: EventKind::SendingRequest,
            endpoint: endpoint.clone(),
            message: Arc::clone(message),
            rendered: message.to_string(),
            correlation_id,
            request_id: None,
        });
        correlation_id
    }

    /// Fired immediately after a reply is received. `request_id` is the opaque
    /// state handed out by [`Self::before_send`]; when it is missing the event id
    /// degrades to [`CorrelationId::nil`] instead of failing the call.
    pub fn after_receive(
        &self,
        message: &Arc<Envelope>,
        endpoint: &EndpointIdentity,
        request_id: Option<CorrelationId>,
    ) {
        let correlation_id = request_id.unwrap_or_else(CorrelationId::nil);
        self.dispatch(InterceptionEvent {
            kind: EventKind::ReceivingReply,
            endpoint: endpoint.clone(),
            message: Arc::clone(message),
            rendered: message.to_string(),
            correlation_id,
            request_id: Some(correlation_id),
        });
    }

    fn dispatch(&self, event: InterceptionEvent) {
        let snapshot: Vec<(String, Subscriber)> = self.subscribers.read().clone();
        for (id, subscriber) in &snapshot {
            // Subscriber exceptions are the subscriber's problem; they must never
            // reach the transport path.
            if catch_unwind(AssertUnwindSafe(|| subscriber(&event))).is_err() {
                tracing::warn!(subscriber = %id, "interception subscriber panicked");
            }
        }
    }
}
