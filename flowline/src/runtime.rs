//! The injectable process-wide runtime owning shared registries.
//!
//! Rather than hiding the lock registry and the singleton cache behind
//! static state, callers construct one [`CoreRuntime`] (typically at suite
//! start), share it, and tear it down explicitly. Concurrent test runs stay
//! decoupled, and tests can build isolated runtimes of their own.

use crate::coordination::ResourceCoordinator;
use crate::singleton::SingletonCache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the shared registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Maximum number of cached singleton types.
    pub singleton_capacity: usize,
    /// Idle window, in seconds, after which a singleton entry is evicted.
    pub singleton_idle_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            singleton_capacity: SingletonCache::DEFAULT_CAPACITY,
            singleton_idle_secs: SingletonCache::DEFAULT_IDLE_TTL.as_secs(),
        }
    }
}

impl CoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the singleton registry capacity.
    #[must_use]
    pub fn with_singleton_capacity(mut self, capacity: usize) -> Self {
        self.singleton_capacity = capacity;
        self
    }

    /// Sets the singleton idle TTL in seconds.
    #[must_use]
    pub fn with_singleton_idle_secs(mut self, secs: u64) -> Self {
        self.singleton_idle_secs = secs;
        self
    }

    /// The singleton idle TTL as a duration.
    #[must_use]
    pub fn singleton_idle(&self) -> Duration {
        Duration::from_secs(self.singleton_idle_secs)
    }
}

/// The process-wide context object for the orchestration core.
#[derive(Debug)]
pub struct CoreRuntime {
    config: CoreConfig,
    coordinator: ResourceCoordinator,
    singletons: SingletonCache,
}

impl CoreRuntime {
    /// Creates a runtime from the given configuration.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        let singletons = SingletonCache::new(config.singleton_capacity, config.singleton_idle());
        tracing::info!(
            singleton_capacity = config.singleton_capacity,
            singleton_idle_secs = config.singleton_idle_secs,
            "core runtime initialized"
        );
        Self {
            config,
            coordinator: ResourceCoordinator::new(),
            singletons,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The keyed mutual-exclusion coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &ResourceCoordinator {
        &self.coordinator
    }

    /// The singleton cache.
    #[must_use]
    pub fn singletons(&self) -> &SingletonCache {
        &self.singletons
    }

    /// Tears down the shared registries.
    ///
    /// Cached singletons and thread context slots are dropped; key permits
    /// already handed out stay valid until their holders release them.
    pub fn shutdown(&self) {
        self.singletons.clear();
        self.coordinator.clear_contexts();
        tracing::info!("core runtime shut down");
    }
}

impl Default for CoreRuntime {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}
