//! Registry cache with TTL, single-flight loads and synchronous invalidation
//!
//! Values are stored type-erased so one cache can hold the permission, role and
//! capability listings of every guard plus the definition graph.

use dashmap::DashMap;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Cache entry with TTL
#[derive(Clone)]
struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: CachedValue, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Statistics about cache performance
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    /// Number of times a loader actually ran
    pub loads: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache for enumerated definitions
///
/// - TTL of zero disables caching: every call runs the loader
/// - concurrent misses on one key run the loader once (single flight)
/// - `invalidate` returns only after the entry is gone; a load that started
///   before the invalidation never publishes its result
pub struct RegistryCache {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    generation: AtomicU64,
    ttl: Duration,
    stats: DashMap<&'static str, usize>,
}

impl RegistryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl,
            stats: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Returns the cached value for `key` or runs `loader` to produce it
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, loader: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_enabled() {
            self.increment_stat("loads");
            return loader().await;
        }

        if let Some(value) = self.lookup::<T>(key) {
            self.increment_stat("hits");
            return Ok(value);
        }
        self.increment_stat("misses");

        let lock = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;

            // Another task may have finished the load while we waited
            if let Some(value) = self.lookup::<T>(key) {
                Ok(value)
            } else {
                self.load_and_publish(key, loader).await
            }
        };

        self.in_flight
            .remove_if(key, |_, slot| Arc::strong_count(slot) <= 2);

        result
    }

    async fn load_and_publish<T, F, Fut>(&self, key: &str, loader: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let generation = self.generation.load(Ordering::SeqCst);
        self.increment_stat("loads");
        let value = loader().await?;

        // Holding the shard lock while comparing generations orders us against
        // `invalidate`, which bumps the generation before removing.
        let slot = self.entries.entry(key.to_string());
        if self.generation.load(Ordering::SeqCst) == generation {
            slot.insert(CacheEntry::new(Arc::new(value.clone()), self.ttl));
        } else {
            drop(slot);
            debug!(key, "Discarding registry load raced by an invalidation");
        }

        Ok(value)
    }

    fn lookup<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            self.increment_stat("expirations");
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Removes a single key
    pub fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key);
    }

    /// Removes every key starting with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// Removes everything
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    /// Removes expired entries
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            loads: self.get_stat("loads"),
            entries: self.entries.len(),
        }
    }

    pub fn reset_stats(&self) {
        self.stats.clear();
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

impl Default for RegistryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400))
    }
}
