//! # Keyed caches
//!
//! Process-wide caches for proxy blueprints, channel factories and live client
//! instances all share one discipline, implemented here once:
//!
//! - Readers check for an existing entry under the shared lock and never block
//!   each other.
//! - A miss takes the exclusive lock, re-checks (double-check), and runs the
//!   construction function at most once per key; concurrent losers observe the
//!   winner's entry.
//! - The exclusive lock is held across construction, which guarantees single
//!   execution but means a construction function must not re-enter the same
//!   cache for the same key.
//! - A failed construction inserts nothing; every later attempt retries from
//!   scratch.
//!
//! Caches are unbounded by default. [`KeyedCache::with_capacity`] bounds a cache
//! with insertion-order eviction; `evict` and `clear` give callers explicit
//! control either way.
use crate::address::EndpointAddress;
use crate::policy::LifecyclePolicy;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache key for channel factories and live instances: the lifecycle policy plus
/// the configuration fingerprint and the normalized target address.
///
/// The fingerprint side is namespaced so a binding fingerprint can never collide
/// with an endpoint-configuration name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    policy: LifecyclePolicy,
    source: String,
    address: String,
}

impl InstanceKey {
    pub fn from_binding(
        policy: LifecyclePolicy,
        fingerprint: &str,
        address: &EndpointAddress,
    ) -> Self {
        Self {
            policy,
            source: format!("binding:{fingerprint}"),
            address: address.normalized().to_string(),
        }
    }

    pub fn from_endpoint(
        policy: LifecyclePolicy,
        endpoint_name: &str,
        address: &EndpointAddress,
    ) -> Self {
        Self {
            policy,
            source: format!("endpoint:{endpoint_name}"),
            address: address.normalized().to_string(),
        }
    }
}

struct Inner<K, V> {
    map: HashMap<K, Arc<V>>,
    order: VecDeque<K>,
    capacity: Option<NonZeroUsize>,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn insert(&mut self, key: K, value: Arc<V>) {
        if let Some(capacity) = self.capacity {
            while self.map.len() >= capacity.get() {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.map.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(key.clone());
        }
        self.map.insert(key, value);
    }
}

/// A shared/exclusive-locked map guaranteeing at-most-once construction per key.
pub struct KeyedCache<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone + Debug, V> KeyedCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: None,
            }),
        }
    }

    /// A bounded cache that evicts the oldest entry (insertion order) when full.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: Some(capacity),
            }),
        }
    }

    /// Returns the cached entry for `key`, or constructs it with `factory`.
    ///
    /// For a fixed key, `factory` runs at most once for the lifetime of the entry;
    /// concurrent callers for the same key observe the same `Arc`. Construction
    /// errors propagate to the caller and are never cached.
    pub fn get_or_create<E>(
        &self,
        key: K,
        factory: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(value) = self.inner.read().map.get(&key) {
            tracing::trace!(?key, "cache hit");
            return Ok(Arc::clone(value));
        }

        let mut inner = self.inner.write();
        // Double-check: another writer may have populated the entry while we
        // waited for the exclusive lock.
        if let Some(value) = inner.map.get(&key) {
            return Ok(Arc::clone(value));
        }

        tracing::debug!(?key, "cache miss, constructing entry");
        let value = Arc::new(factory()?);
        inner.insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// Returns the cached entry without constructing anything.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.read().map.get(key).cloned()
    }

    /// Removes one entry. Returns whether it existed.
    pub fn evict(&self, key: &K) -> bool {
        let mut inner = self.inner.write();
        inner.order.retain(|k| k != key);
        inner.map.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone + Debug, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
