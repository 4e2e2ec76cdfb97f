//! # Loopback Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide an in-process
//! `Binding`/`Channel` implementation with scriptable behavior for integration
//! testing `tether`. It is not intended for production use.
//!
//! The binding records lifecycle counters (channels built, opened, closed,
//! aborted, calls served, configurations applied) so tests can assert channel
//! lifecycles without a network.
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether::{
    Binding, Channel, ChannelLimits, ChannelState, ClientConfig, EndpointAddress, Envelope, Fault,
    TransportError,
};

/// Shared lifecycle counters for every channel built from one binding.
#[derive(Clone, Default)]
pub struct Counters {
    inner: Arc<CounterInner>,
}

#[derive(Default)]
struct CounterInner {
    built: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    aborted: AtomicUsize,
    calls: AtomicUsize,
    configured: AtomicUsize,
}

impl Counters {
    pub fn built(&self) -> usize {
        self.inner.built.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> usize {
        self.inner.configured.load(Ordering::SeqCst)
    }
}

/// What a loopback channel does with the traffic it sees.
#[derive(Clone)]
pub enum Behavior {
    /// Replies to every call with the request body.
    Echo,
    /// Every call returns this structured fault.
    Fault(Fault),
    /// Opening the channel fails.
    FailOpen,
    /// Opening the channel hangs until cancelled (for timeout tests).
    HangOpen,
    /// Calls echo, but graceful close fails; abort always succeeds.
    FailClose,
    /// Every call drops the connection.
    Disconnect,
}

impl Behavior {
    fn tag(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Fault(_) => "fault",
            Self::FailOpen => "fail-open",
            Self::HangOpen => "hang-open",
            Self::FailClose => "fail-close",
            Self::Disconnect => "disconnect",
        }
    }
}

/// An in-process binding whose channels behave according to a script.
pub struct LoopbackBinding {
    name: String,
    behavior: Behavior,
    limits: ChannelLimits,
    counters: Counters,
}

impl LoopbackBinding {
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            name: "loopback".to_string(),
            behavior,
            limits: ChannelLimits::default(),
            counters: Counters::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_limits(mut self, limits: ChannelLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

impl Binding for LoopbackBinding {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> String {
        format!("loopback/{}/{}", self.name, self.behavior.tag())
    }

    fn limits(&self) -> ChannelLimits {
        self.limits.clone()
    }

    fn build(&self, _address: &EndpointAddress) -> Result<Box<dyn Channel>, TransportError> {
        self.counters.inner.built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackChannel {
            state: ChannelState::Created,
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct LoopbackChannel {
    state: ChannelState,
    behavior: Behavior,
    counters: Counters,
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.state = ChannelState::Opening;
        match self.behavior {
            Behavior::FailOpen => {
                self.state = ChannelState::Aborted;
                Err(TransportError::Rejected("open refused".to_string()))
            }
            Behavior::HangOpen => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.state = ChannelState::Aborted;
                Err(TransportError::Rejected("open refused".to_string()))
            }
            _ => {
                self.state = ChannelState::Opened;
                self.counters.inner.opened.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn call(&mut self, request: Envelope) -> Result<Envelope, TransportError> {
        if self.state != ChannelState::Opened {
            return Err(TransportError::NotOpen(self.state));
        }
        self.counters.inner.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Fault(fault) => Err(TransportError::Fault(fault.clone())),
            Behavior::Disconnect => {
                self.state = ChannelState::Aborted;
                Err(TransportError::ConnectionLost("peer went away".to_string()))
            }
            _ => Ok(Envelope {
                contract: request.contract,
                operation: request.operation,
                body: request.body,
                headers: Vec::new(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if matches!(self.behavior, Behavior::FailClose) {
            return Err(TransportError::Rejected("close refused".to_string()));
        }
        self.state = ChannelState::Closed;
        self.counters.inner.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&mut self) {
        if self.state != ChannelState::Aborted {
            self.counters.inner.aborted.fetch_add(1, Ordering::SeqCst);
        }
        self.state = ChannelState::Aborted;
    }

    fn configure(&mut self, _config: &ClientConfig) {
        self.counters.inner.configured.fetch_add(1, Ordering::SeqCst);
    }

    fn state(&self) -> ChannelState {
        self.state
    }
}
