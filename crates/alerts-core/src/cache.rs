//! A small TTL cache keyed by an arbitrary hashable key, used to avoid
//! recomputing route changes and distance calculations on every request
//! (§4.10). Plain `std::sync` rather than a cache crate: eviction here is
//! just "drop the oldest entry past capacity", which doesn't need LRU
//! bookkeeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    order: u64,
}

pub struct CacheLayer<K, V> {
    ttl: Duration,
    max_size: usize,
    entries: Mutex<HashMap<K, Entry<V>>>,
    next_order: Mutex<u64>,
}

impl<K, V> CacheLayer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            max_size,
            entries: Mutex::new(HashMap::new()),
            next_order: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap();
        let order = {
            let mut next = self.next_order.lock().unwrap();
            let o = *next;
            *next += 1;
            o
        };

        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.order)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                order,
            },
        );
    }

    /// Returns a cached value if present and fresh, otherwise computes it via
    /// `compute`, stores it, and returns it.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_once_ttl_elapses() {
        let cache: CacheLayer<String, i32> = CacheLayer::new(10, Duration::from_millis(1));
        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn evicts_oldest_entry_past_capacity() {
        let cache: CacheLayer<String, i32> = CacheLayer::new(2, Duration::from_secs(600));
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("c".to_string(), 3);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[tokio::test]
    async fn get_or_compute_only_computes_once() {
        let cache: CacheLayer<String, i32> = CacheLayer::new(10, Duration::from_secs(600));
        let calls = std::sync::atomic::AtomicU32::new(0);

        for _ in 0..3 {
            let result: Result<i32, std::convert::Infallible> = cache
                .get_or_compute("k".to_string(), || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(result.unwrap(), 42);
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
