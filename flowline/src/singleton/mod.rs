//! Race-free lazy memoization of process-wide singletons.
//!
//! Types opt in by implementing [`Singleton`]; the cache guarantees at most
//! one live instance per type, shares in-flight construction between
//! concurrent requesters, and evicts entries that fail to build, sit idle
//! past their TTL, or fall off the least-recently-used end of a bounded
//! registry.

use crate::errors::{ConstructError, FlowlineError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// A type managed by the [`SingletonCache`].
///
/// Implementors keep their fields and constructors private so the cache is
/// the only path to an instance; `construct` stands in for the inaccessible
/// constructor and runs at most once per cache generation.
#[async_trait]
pub trait Singleton: Sized + Send + Sync + 'static {
    /// Builds the process-wide instance.
    ///
    /// # Errors
    ///
    /// Returns a [`ConstructError`] when the instance cannot be built; the
    /// cache evicts the entry so the next request starts from scratch.
    async fn construct() -> Result<Self, ConstructError>;
}

type StoredInstance = Arc<dyn Any + Send + Sync>;
type BuildOutcome = Result<StoredInstance, ConstructError>;

struct CacheEntry {
    cell: OnceCell<BuildOutcome>,
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(tick: u64) -> Self {
        Self {
            cell: OnceCell::new(),
            last_access: AtomicU64::new(tick),
        }
    }
}

/// The process-wide memoization table for [`Singleton`] types.
///
/// Registration is per-type atomic; requests for unrelated types never
/// serialize against each other.
pub struct SingletonCache {
    entries: DashMap<TypeId, Arc<CacheEntry>>,
    epoch: Instant,
    capacity: usize,
    idle_ttl: Duration,
}

impl SingletonCache {
    /// Default maximum number of cached types.
    pub const DEFAULT_CAPACITY: usize = 100;
    /// Default idle window after which an entry is evicted.
    pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(15 * 60);

    /// Creates a cache with the given capacity bound and idle TTL.
    #[must_use]
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            epoch: Instant::now(),
            capacity: capacity.max(1),
            idle_ttl,
        }
    }

    /// Returns the unique instance of `T`, building it on first request.
    ///
    /// Concurrent requesters for the same type all observe the same
    /// in-flight-or-completed construction: exactly one `construct` runs per
    /// cache generation and every caller receives the identical `Arc` (or
    /// the one failure that construction produced).
    ///
    /// # Errors
    ///
    /// Returns [`FlowlineError::SingletonConstruct`] when `T::construct`
    /// fails; the entry is evicted immediately so a later request retries.
    pub async fn instance<T: Singleton>(&self) -> Result<Arc<T>, FlowlineError> {
        self.evict_idle();

        let type_id = TypeId::of::<T>();
        let tick = self.tick();

        // Registration happens before any construction work so racers find
        // the pending entry instead of starting their own build.
        let entry = Arc::clone(
            self.entries
                .entry(type_id)
                .or_insert_with(|| Arc::new(CacheEntry::new(tick)))
                .value(),
        );
        entry.last_access.store(tick, Ordering::Relaxed);

        let outcome = entry
            .cell
            .get_or_init(|| async {
                tracing::info!(target_type = type_name::<T>(), "constructing singleton");
                match T::construct().await {
                    Ok(instance) => Ok(Arc::new(instance) as StoredInstance),
                    Err(err) => Err(err),
                }
            })
            .await
            .clone();

        match outcome {
            Ok(stored) => {
                self.enforce_capacity();
                stored.downcast::<T>().map_err(|_| {
                    FlowlineError::Internal(format!(
                        "registry held a foreign instance for {}",
                        type_name::<T>()
                    ))
                })
            }
            Err(err) => {
                // Evict this generation so the next request rebuilds; a
                // newer entry registered meanwhile is left alone.
                self.entries
                    .remove_if(&type_id, |_, existing| Arc::ptr_eq(existing, &entry));
                tracing::error!(
                    target_type = type_name::<T>(),
                    error = %err,
                    "singleton construction failed"
                );
                Err(FlowlineError::SingletonConstruct {
                    type_name: type_name::<T>(),
                    source: err,
                })
            }
        }
    }

    /// True when a completed or in-flight entry exists for `T`.
    #[must_use]
    pub fn contains<T: Singleton>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// The number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Nanoseconds since the cache was created; doubles as the LRU clock.
    fn tick(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Drops entries unaccessed for longer than the idle TTL.
    fn evict_idle(&self) {
        let now = self.tick();
        let ttl = u64::try_from(self.idle_ttl.as_nanos()).unwrap_or(u64::MAX);
        self.entries.retain(|_, entry| {
            let idle = now.saturating_sub(entry.last_access.load(Ordering::Relaxed));
            if idle < ttl {
                true
            } else {
                tracing::debug!(idle_ns = idle, "evicting idle singleton entry");
                false
            }
        });
    }

    /// Drops least-recently-used entries beyond the capacity bound.
    fn enforce_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
                .map(|entry| *entry.key());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    tracing::debug!("evicted least-recently-used singleton entry");
                }
                None => break,
            }
        }
    }
}

impl Default for SingletonCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_IDLE_TTL)
    }
}

impl std::fmt::Debug for SingletonCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("idle_ttl", &self.idle_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static SHARED_CLIENT_BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct SharedClient {
        endpoint: String,
    }

    #[async_trait]
    impl Singleton for SharedClient {
        async fn construct() -> Result<Self, ConstructError> {
            SHARED_CLIENT_BUILDS.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Self {
                endpoint: "https://api.internal".to_string(),
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_requests_share_one_construction() {
        let cache = Arc::new(SingletonCache::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.instance::<SharedClient>().await },
            ));
        }

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(SHARED_CLIENT_BUILDS.load(Ordering::SeqCst), 1);
        for pair in instances.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
        assert_eq!(instances[0].endpoint, "https://api.internal");
    }

    static FLAKY_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    struct FlakyResource;

    #[async_trait]
    impl Singleton for FlakyResource {
        async fn construct() -> Result<Self, ConstructError> {
            let attempt = FLAKY_ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(ConstructError::new("backend not ready"))
            } else {
                Ok(Self)
            }
        }
    }

    #[tokio::test]
    async fn test_failed_construction_is_evicted_and_retried() {
        let cache = SingletonCache::default();

        let first = cache.instance::<FlakyResource>().await;
        assert!(matches!(
            first,
            Err(FlowlineError::SingletonConstruct { .. })
        ));
        assert!(!cache.contains::<FlakyResource>());

        let second = cache.instance::<FlakyResource>().await;
        assert!(second.is_ok());
        assert_eq!(FLAKY_ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    static COUNTER_A_BUILDS: AtomicUsize = AtomicUsize::new(0);
    static COUNTER_B_BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct ResourceA;
    struct ResourceB;

    #[async_trait]
    impl Singleton for ResourceA {
        async fn construct() -> Result<Self, ConstructError> {
            COUNTER_A_BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Self)
        }
    }

    #[async_trait]
    impl Singleton for ResourceB {
        async fn construct() -> Result<Self, ConstructError> {
            COUNTER_B_BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn test_capacity_bound_evicts_least_recently_used() {
        let cache = SingletonCache::new(1, Duration::from_secs(3600));

        cache.instance::<ResourceA>().await.unwrap();
        cache.instance::<ResourceB>().await.unwrap();
        assert!(cache.len() <= 1);

        // A fell off the LRU end; requesting it again reconstructs.
        cache.instance::<ResourceA>().await.unwrap();
        assert_eq!(COUNTER_A_BUILDS.load(Ordering::SeqCst), 2);
    }

    static IDLE_BUILDS: AtomicUsize = AtomicUsize::new(0);

    struct IdleResource;

    #[async_trait]
    impl Singleton for IdleResource {
        async fn construct() -> Result<Self, ConstructError> {
            IDLE_BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn test_idle_entries_are_evicted() {
        let cache = SingletonCache::new(10, Duration::ZERO);

        cache.instance::<IdleResource>().await.unwrap();
        cache.instance::<IdleResource>().await.unwrap();

        assert_eq!(IDLE_BUILDS.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug)]
    struct NeverBuilt;

    #[async_trait]
    impl Singleton for NeverBuilt {
        async fn construct() -> Result<Self, ConstructError> {
            Err(ConstructError::with_source(
                "no qualifying constructor",
                crate::errors::TransportError::NoResponse,
            ))
        }
    }

    #[tokio::test]
    async fn test_construct_failure_carries_cause() {
        let cache = SingletonCache::default();

        let err = cache.instance::<NeverBuilt>().await.unwrap_err();
        match err {
            FlowlineError::SingletonConstruct { type_name, source } => {
                assert!(type_name.contains("NeverBuilt"));
                assert_eq!(source.message, "no qualifying constructor");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clear_empties_registry() {
        let cache = SingletonCache::default();
        cache.instance::<ResourceB>().await.unwrap();
        assert!(!cache.is_empty());

        cache.clear();
        assert!(cache.is_empty());
    }
}
