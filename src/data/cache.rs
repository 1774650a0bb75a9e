use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const ITEM_NAMEID_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Market hash name -> Steam `item_nameid`.
///
/// The whole snapshot is replaced on refresh. A stale snapshot stays readable so
/// lookups can degrade to it when a refresh fails.
pub struct ItemNameIdCache {
    ids: HashMap<String, u64>,
    last_update: Option<Instant>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub item_count: usize,
    pub last_update: Option<Instant>,
    pub is_valid: bool,
}

impl ItemNameIdCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ids: HashMap::new(),
            last_update: None,
            ttl,
        }
    }

    /// Has a snapshot ever been loaded
    pub fn is_populated(&self) -> bool {
        self.last_update.is_some()
    }

    /// Loaded and younger than the TTL at `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.last_update
            .is_some_and(|at| now.saturating_duration_since(at) < self.ttl)
    }

    pub fn replace(&mut self, snapshot: HashMap<String, u64>, now: Instant) {
        self.ids = snapshot;
        self.last_update = Some(now);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn stats(&self, now: Instant) -> CacheStats {
        CacheStats {
            item_count: self.len(),
            last_update: self.last_update,
            is_valid: self.is_fresh(now),
        }
    }
}

impl Default for ItemNameIdCache {
    fn default() -> Self {
        Self::new(ITEM_NAMEID_TTL)
    }
}
