use dashmap::DashMap;

use crate::operation::CacheKey;
use crate::response::Payload;

/// Key-addressable store of previously seen payloads.
///
/// Implementations must be safe to share across tasks; the gateway calls them
/// from concurrent operations without external locking.
pub trait CacheStore: Send + Sync {
    /// Look up a cached payload.
    fn get(&self, key: &CacheKey) -> Option<Payload>;

    /// Record a payload, replacing any previous entry.
    fn put(&self, key: CacheKey, payload: Payload);

    /// Remove every entry.
    fn clear_all(&self);

    /// Number of cached entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`CacheStore`] backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<CacheKey, Payload>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Option<Payload> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: CacheKey, payload: Payload) {
        self.entries.insert(key, payload);
    }

    fn clear_all(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
