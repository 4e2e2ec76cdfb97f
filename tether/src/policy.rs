//! # Lifecycle policies
//!
//! A lifecycle policy is the strategy a proxy is synthesized with. It is fixed when
//! the proxy blueprint is forged and decides two things for the lifetime of every
//! instance built from that blueprint:
//!
//! 1. **Reuse**: whether instances are cached and shared across calls
//!    (`SharedReusable`, `PerSession*`) or created fresh and disposed after exactly
//!    one call (`PerCall*`).
//! 2. **Fault propagation**: whether remote faults are rethrown to the caller
//!    (`SharedReusable`, `*Throwable`) or absorbed after the channel is discarded
//!    (`*Unthrowable`).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePolicy {
    /// Cached indefinitely, reusable across sessions; faults propagate as-is.
    SharedReusable,
    /// Reused across calls within a session; faults are rethrown.
    PerSessionThrowable,
    /// Reused across calls within a session; faults are absorbed.
    PerSessionUnthrowable,
    /// A fresh instance per call, disposed immediately after; faults are rethrown.
    PerCallThrowable,
    /// A fresh instance per call, disposed immediately after; faults are absorbed.
    PerCallUnthrowable,
}

impl LifecyclePolicy {
    /// Whether a remote fault is rethrown to the caller.
    ///
    /// Unthrowable variants absorb the fault after discarding the channel; the
    /// caller observes the aborted channel state on subsequent inspection instead.
    pub fn rethrows_faults(self) -> bool {
        matches!(
            self,
            Self::SharedReusable | Self::PerSessionThrowable | Self::PerCallThrowable
        )
    }

    /// Whether the instance must be discarded after exactly one logical call.
    pub fn per_call(self) -> bool {
        matches!(self, Self::PerCallThrowable | Self::PerCallUnthrowable)
    }

    /// Whether instances built under this policy may be served from the instance
    /// cache. Per-call instances must never share mutable channel state.
    pub fn cache_instances(self) -> bool {
        !self.per_call()
    }

    /// Whether a graceful close keeps the channel reference around so the client
    /// can be brought back into service by a later acquisition.
    pub fn retains_channel_after_close(self) -> bool {
        matches!(self, Self::SharedReusable)
    }
}
