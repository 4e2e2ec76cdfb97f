//! # Channel seam
//!
//! The framework owns no wire format; it orchestrates a channel supplied by an
//! external [`Binding`](crate::binding::Binding). This module defines the trait
//! every channel implementation must satisfy, the state machine the lifecycle
//! manager drives it through, and the transport error taxonomy.
//!
//! ## Error layering
//!
//! A call can fail in two distinct ways, kept apart in the types:
//!
//! - [`TransportError::Fault`] — the remote side executed the request and returned
//!   a structured fault (code, message, optional detail payload).
//! - Every other [`TransportError`] variant — the request never completed
//!   (connection lost, channel not open, rejected by the transport).
//!
//! The lifecycle manager maps both onto the caller-facing error according to the
//! instance's lifecycle policy.
use crate::BoxError;
use crate::binding::ClientConfig;
use crate::contract::Envelope;
use async_trait::async_trait;
use std::fmt;

/// The states a channel moves through.
///
/// `Absent` is reported by the owning client when no channel exists yet (or the
/// reference was cleared); channel implementations themselves start in `Created`.
/// `Aborted` is terminal and reachable from any non-absent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Absent,
    Created,
    Opening,
    Opened,
    Closing,
    Closed,
    Aborted,
}

impl ChannelState {
    /// Whether the lifecycle manager can still bring this channel into service.
    /// Defunct channels are replaced by a freshly created one on the next
    /// acquisition.
    pub fn is_defunct(self) -> bool {
        matches!(self, Self::Closing | Self::Closed | Self::Aborted)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A structured fault returned by the remote side.
///
/// The optional `detail` payload is what throwable policies surface to the caller
/// as the principal error content.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Fault {
    pub code: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote side returned a structured fault.
    #[error("Remote fault '{0}'")]
    Fault(#[from] Fault),
    /// The connection dropped before a reply arrived.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// An operation was attempted against a channel that is not open.
    #[error("Channel is not open (state: {0})")]
    NotOpen(ChannelState),
    /// The transport refused the operation (handshake failure, limit exceeded).
    #[error("Rejected by transport: {0}")]
    Rejected(String),
    /// Any other transport-specific failure.
    #[error("{0}")]
    Other(#[source] BoxError),
}

/// The live communication object wrapped by a proxy instance.
///
/// A channel is owned exclusively by the client that created it and is never
/// shared across instances; only the factory that creates channels is shared.
/// Implementations therefore never need internal synchronization for the
/// `&mut self` methods.
#[async_trait]
pub trait Channel: Send {
    /// Transitions `Created → Opening → Opened`. Implementations must leave the
    /// channel in a defunct state when opening fails.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Sends one request and waits for its reply.
    async fn call(&mut self, request: Envelope) -> Result<Envelope, TransportError>;

    /// Graceful close (`Opened → Closing → Closed`). May fail; the lifecycle
    /// manager falls back to [`Channel::abort`] when it does.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Unconditional termination. Must not fail and must be safe to call in any
    /// state, including repeatedly.
    fn abort(&mut self);

    /// Applies client configuration (credentials, serialization limits, default
    /// headers). Called before every acquisition so post-construction changes are
    /// picked up.
    fn configure(&mut self, config: &ClientConfig);

    fn state(&self) -> ChannelState;
}
