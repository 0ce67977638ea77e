//! Keyed mutual exclusion and per-thread scratch storage.
//!
//! Concurrent test flows use a [`ResourceCoordinator`] to serialize access
//! to externally shared resources (a card, an account) identified by
//! caller-chosen string keys, and to stash request-scoped state in a slot
//! private to the calling thread.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-key binary permits plus per-thread context slots.
///
/// Permits for distinct keys never contend; a permit registry entry is
/// created lazily, exactly once per key, and lives for the coordinator's
/// lifetime. Waiters on one key are admitted first-in first-out.
pub struct ResourceCoordinator {
    permits: DashMap<String, Arc<Semaphore>>,
    contexts: RwLock<HashMap<ThreadId, serde_json::Value>>,
}

impl ResourceCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: DashMap::new(),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Waits until the caller is the sole holder of `key`.
    ///
    /// There is no timeout and no cancellation; the wait ends only when the
    /// current holder lets go. The returned guard releases the key when
    /// dropped.
    pub async fn acquire(&self, key: &str) -> KeyPermit {
        let semaphore = Arc::clone(
            self.permits
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .value(),
        );

        tracing::debug!(key, "waiting for key permit");
        match semaphore.acquire_owned().await {
            Ok(permit) => {
                tracing::debug!(key, "key permit acquired");
                KeyPermit {
                    key: key.to_owned(),
                    _permit: permit,
                }
            }
            // Key semaphores are created here and never closed.
            Err(_) => unreachable!("key semaphore closed"),
        }
    }

    /// The number of keys ever locked through this coordinator.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.permits.len()
    }

    /// Stores a context value in the calling thread's slot.
    ///
    /// Slots are private to their thread; nothing set here is ever visible
    /// to another thread, and the slot is independent of key permits.
    pub fn set_context(&self, value: serde_json::Value) {
        self.contexts
            .write()
            .insert(std::thread::current().id(), value);
    }

    /// Reads the calling thread's context slot.
    #[must_use]
    pub fn get_context(&self) -> Option<serde_json::Value> {
        self.contexts
            .read()
            .get(&std::thread::current().id())
            .cloned()
    }

    /// Removes and returns the calling thread's context slot.
    pub fn take_context(&self) -> Option<serde_json::Value> {
        self.contexts.write().remove(&std::thread::current().id())
    }

    /// Drops every thread's context slot.
    pub(crate) fn clear_contexts(&self) {
        self.contexts.write().clear();
    }
}

impl Default for ResourceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCoordinator")
            .field("keys", &self.permits.len())
            .finish()
    }
}

/// Exclusive hold on one key, released on drop.
///
/// The guard makes an unbalanced release unrepresentable: a key can only be
/// released by the holder giving up its permit.
#[derive(Debug)]
pub struct KeyPermit {
    key: String,
    _permit: OwnedSemaphorePermit,
}

impl KeyPermit {
    /// The key this permit holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the key explicitly.
    pub fn release(self) {
        tracing::debug!(key = %self.key, "key permit released");
    }
}
