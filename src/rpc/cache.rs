use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;

const LRU_SWEEP_THRESHOLD: usize = 1000;

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// TTL + insertion-order LRU cache keyed by MD5(canonicalized request), per spec §4.1.
pub struct RpcCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl RpcCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&mut self, key: String, value: Value) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        if self.entries.len() > LRU_SWEEP_THRESHOLD {
            self.sweep();
        }
    }

    fn sweep(&mut self) {
        while self.entries.len() > LRU_SWEEP_THRESHOLD {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

/// Cache key = MD5(canonicalized JSON payload) (spec §4.1).
pub fn cache_key(method: &str, params: &Value) -> String {
    let canonical = serde_json::json!({ "method": method, "params": params });
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("{:x}", md5::compute(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_expiry() {
        let mut cache = RpcCache::new(Duration::from_millis(10));
        cache.put("k".into(), serde_json::json!(1));
        assert!(cache.get("k").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn lru_sweep_bounds_size() {
        let mut cache = RpcCache::new(Duration::from_secs(60));
        for i in 0..1100 {
            cache.put(format!("k{i}"), serde_json::json!(i));
        }
        assert!(cache.entries.len() <= LRU_SWEEP_THRESHOLD);
    }

    #[test]
    fn cache_key_is_stable_for_same_payload() {
        let a = cache_key("getAccountInfo", &serde_json::json!(["abc", {"x": 1}]));
        let b = cache_key("getAccountInfo", &serde_json::json!(["abc", {"x": 1}]));
        assert_eq!(a, b);
    }
}
