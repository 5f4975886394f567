//! In-memory cache for completion results.
//!
//! Keys are `cwd + "\0" + buffer` fingerprints. Entries expire logically: a
//! read past the TTL behaves like a miss and the entry is dropped on the next
//! insert sweep. Capacity is bounded by evicting the oldest entry when a new
//! key would exceed the limit.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct CacheEntry {
    suggestion: String,
    created_at: Instant,
}

pub struct SuggestionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
}

impl SuggestionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// Look up a fresh entry. Stale entries count as misses.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.created_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.suggestion.clone())
    }

    pub fn put(&self, key: &str, suggestion: &str) {
        self.put_at(key, suggestion, Instant::now());
    }

    fn put_at(&self, key: &str, suggestion: &str, created_at: Instant) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        entries.retain(|_, e| e.created_at.elapsed() <= self.ttl);
        // Refreshing an existing key never needs an eviction.
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                suggestion: suggestion.to_string(),
                created_at,
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

/// Cache fingerprint for a completion request. The working directory changes
/// which files and git state a suggestion can refer to, so it is part of the
/// key; the shell is not.
pub fn cache_key(cwd: &str, buffer: &str) -> String {
    format!("{cwd}\0{buffer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_stored_value() {
        let cache = SuggestionCache::new(8, Duration::from_secs(60));
        cache.put("k1", "git status");
        assert_eq!(cache.get("k1").as_deref(), Some("git status"));
        assert_eq!(cache.get("k2"), None);
    }

    #[test]
    fn stale_entries_miss() {
        let ttl = Duration::from_secs(60);
        let cache = SuggestionCache::new(8, ttl);
        let old = Instant::now()
            .checked_sub(ttl + Duration::from_secs(1))
            .unwrap();
        cache.put_at("k1", "git status", old);
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn entries_at_ttl_boundary_still_hit() {
        let ttl = Duration::from_secs(60);
        let cache = SuggestionCache::new(8, ttl);
        let recent = Instant::now().checked_sub(Duration::from_secs(30)).unwrap();
        cache.put_at("k1", "git status", recent);
        assert_eq!(cache.get("k1").as_deref(), Some("git status"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = SuggestionCache::new(2, Duration::from_secs(600));
        let t0 = Instant::now().checked_sub(Duration::from_secs(30)).unwrap();
        let t1 = Instant::now().checked_sub(Duration::from_secs(20)).unwrap();
        cache.put_at("oldest", "a", t0);
        cache.put_at("newer", "b", t1);
        cache.put("newest", "c");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("oldest"), None);
        assert_eq!(cache.get("newer").as_deref(), Some("b"));
        assert_eq!(cache.get("newest").as_deref(), Some("c"));
    }

    #[test]
    fn refresh_of_existing_key_does_not_evict() {
        let cache = SuggestionCache::new(2, Duration::from_secs(600));
        let t0 = Instant::now().checked_sub(Duration::from_secs(30)).unwrap();
        cache.put_at("a", "1", t0);
        cache.put("b", "2");
        cache.put("a", "updated");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert_eq!(cache.get("b").as_deref(), Some("2"));
    }

    #[test]
    fn stale_entries_swept_on_insert() {
        let ttl = Duration::from_secs(60);
        let cache = SuggestionCache::new(8, ttl);
        let old = Instant::now()
            .checked_sub(ttl + Duration::from_secs(1))
            .unwrap();
        cache.put_at("stale", "x", old);
        cache.put("fresh", "y");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn key_separates_cwd_and_buffer() {
        assert_ne!(cache_key("/a/b", "c"), cache_key("/a", "b/c"));
        assert_eq!(cache_key("/home", "git "), "/home\0git ");
    }
}
