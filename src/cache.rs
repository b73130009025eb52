use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Keyed cache where every entry expires `ttl` after it was inserted.
///
/// Expired entries are never returned; they are evicted on access. Callers
/// force a reload with `invalidate` / `invalidate_all`.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        match self.entries.get(key) {
            Some(e) if e.expires_at > now => Some(e.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Cached value, or the loader's result. Failed loads are not cached.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        let value = load()?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache.insert_at("opps", 1, t0);

        assert_eq!(cache.get_at(&"opps", t0 + Duration::from_secs(299)), Some(1));
        assert_eq!(cache.get_at(&"opps", t0 + Duration::from_secs(300)), None);
        // evicted, stays gone even if asked about an earlier instant
        assert_eq!(cache.get_at(&"opps", t0), None);
    }

    #[test]
    fn invalidate_drops_entries() {
        let mut cache = TtlCache::new(Duration::from_secs(600));
        cache.insert(1, "a".to_string());
        cache.insert(2, "b".to_string());

        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2).as_deref(), Some("b"));

        cache.invalidate_all();
        assert_eq!(cache.get(&2), None);
    }

    #[test]
    fn loader_runs_once_while_fresh() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let mut calls = 0;

        for _ in 0..3 {
            let v: Result<i32, ()> = cache.get_or_try_insert_with("k", || {
                calls += 1;
                Ok(42)
            });
            assert_eq!(v, Ok(42));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let mut cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60));
        let first: Result<i32, &str> = cache.get_or_try_insert_with("k", || Err("db down"));
        assert_eq!(first, Err("db down"));

        let second: Result<i32, &str> = cache.get_or_try_insert_with("k", || Ok(7));
        assert_eq!(second, Ok(7));
    }
}
