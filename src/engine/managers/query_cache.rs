use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::trace;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct Loaded<V> {
    value: Arc<V>,
    at: Instant,
}

type Slot<V> = Arc<OnceCell<Loaded<V>>>;

/// Keyed cache of asynchronously loaded values with a fixed time to live.
///
/// Concurrent requests for the same key share one load. Failed loads are not
/// remembered, so the next request tries again.
pub struct QueryCache<K, V> {
    slots: DashMap<K, Slot<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V> QueryCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, running `load` when there is none or it expired.
    pub async fn get_or_try_load<E, Fut>(&self, key: K, load: impl FnOnce() -> Fut) -> Result<Arc<V>, E>
        where Fut: Future<Output = Result<V, E>>
    {
        // The map guard is released here, before anything is awaited
        let slot = self.slot(key);
        let loaded = slot.get_or_try_init(|| async move {
            let value = load().await?;
            Ok::<_, E>(Loaded {
                value: Arc::new(value),
                at: Instant::now(),
            })
        }).await?;
        Ok(Arc::clone(&loaded.value))
    }

    /// Cached value for `key` if it is loaded and fresh. Never loads.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slot = self.slots.get(key)?;
        slot.get()
            .filter(|loaded| !self.is_expired(loaded))
            .map(|loaded| Arc::clone(&loaded.value))
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: K) -> Slot<V> {
        let mut slot = self.slots.entry(key).or_default();
        let expired = slot.get().is_some_and(|loaded| self.is_expired(loaded));
        if expired {
            trace!("cache entry expired");
            *slot = Slot::default();
        }
        Arc::clone(&slot)
    }

    fn is_expired(&self, loaded: &Loaded<V>) -> bool {
        loaded.at.elapsed() >= self.ttl
    }
}

impl<K: Eq + Hash + Clone, V> Default for QueryCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.slots.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
