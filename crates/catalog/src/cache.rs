use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

pub(crate) const CACHE_CAPACITY: usize = 10_000;
pub(crate) const CACHE_TTL: Duration = Duration::from_secs(300);

/// LRU cache with per-entry TTL, sitting in front of the SQL store.
///
/// Reads go cache-then-store; writes are installed write-through only after
/// the SQL side has committed, so the cache can never get ahead of the
/// durable state.
pub(crate) struct TtlCache {
    entries: LruCache<String, TimedEntry>,
    ttl: Duration,
}

struct TimedEntry {
    hash: String,
    inserted_at: Instant,
}

impl TtlCache {
    pub(crate) fn new() -> Self {
        Self::with_shape(CACHE_CAPACITY, CACHE_TTL)
    }

    pub(crate) fn with_shape(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    pub(crate) fn key(project_id: &str, rel_path: &str) -> String {
        format!("{project_id}:{rel_path}")
    }

    pub(crate) fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|e| e.hash.clone())
    }

    pub(crate) fn put(&mut self, key: String, hash: String) {
        self.entries.put(
            key,
            TimedEntry {
                hash,
                inserted_at: Instant::now(),
            },
        );
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.entries.pop(key);
    }

    /// Drop every entry belonging to a project.
    pub(crate) fn remove_project(&mut self, project_id: &str) {
        let prefix = format!("{project_id}:");
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.entries.pop(&key);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
