use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// TtlCache
///
/// A plain map where every entry expires `ttl` after insertion. Expired entries
/// are dropped lazily on read and in bulk by [`TtlCache::purge_expired`].
///
/// Every [`TtlCache::clear`] bumps a generation counter. Callers that compute
/// a value slowly read [`TtlCache::generation`] first and store through
/// [`TtlCache::insert_if_current`], so a result computed before a clear is
/// never written back after it.
///
/// The lock is a std `Mutex`; it is never held across an `.await`.
pub struct TtlCache<V> {
    ttl: Duration,
    generation: AtomicU64,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((expires_at, value)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.lock().insert(key.into(), (expires_at, value));
    }

    /// Inserts only if no clear happened since `generation` was read.
    /// Returns whether the value was stored.
    pub fn insert_if_current(&self, key: impl Into<String>, value: V, generation: u64) -> bool {
        let mut entries = self.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert(key.into(), (Instant::now() + self.ttl, value));
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (expires_at, _)| now < *expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, V)>> {
        // A poisoned map only holds cached copies; keep serving it.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
