//! 带过期时间的缓存
//!
//! 读时检查过期（lazy expiry），不依赖后台定时器；`*_at` 方法接受显式时间点，便于确定性测试。

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// TTL 缓存：条目在插入 ttl 之后读取时视为过期并被移除
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// 命中且未过期时返回克隆；过期条目在此处被移除
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.inserted_at) >= self.ttl,
        };
        if expired {
            self.entries.remove(key);
            None
        } else {
            self.entries.get(key).map(|e| e.value.clone())
        }
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 移除所有已过期条目，返回移除数量
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
