//! In-process [`KvStore`] used by tests and as a dependency-free embedding.
//!
//! Not gated behind `#[cfg(test)]`: a single-process deployment with no
//! external Valkey instance is a legitimate (if non-default) way to run this
//! service, and the property tests in §8 of the spec rely on it directly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::KvStore;

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, StringEntry>,
    zsets: HashMap<String, HashMap<String, f64>>,
    sets: HashMap<String, std::collections::HashSet<String>>,
}

impl Inner {
    fn is_live(entry: &StringEntry) -> bool {
        entry.expires_at.map(|t| t > Instant::now()).unwrap_or(true)
    }
}

/// Thread-safe in-memory store. Sorted sets are plain maps re-sorted on read;
/// fine at the sizes this job queue ever holds (a single worker drains it).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.strings.get(key) {
            Some(entry) if Inner::is_live(entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs.max(0) as u64)),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.strings.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs.max(0) as u64));
        }
        Ok(())
    }

    async fn persist(&self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.strings.get_mut(key) {
            entry.expires_at = None;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(set) = inner.zsets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zpopmin(&self, key: &str) -> anyhow::Result<Option<(String, f64)>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(set) = inner.zsets.get_mut(key) else {
            return Ok(None);
        };
        let winner = set
            .iter()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(m, s)| (m.clone(), *s));
        if let Some((member, _)) = &winner {
            set.remove(member);
        }
        Ok(winner)
    }

    async fn zcard(&self, key: &str) -> anyhow::Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.zsets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let Some(set) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(&String, &f64)> = set.iter().collect();
        entries.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap());
        Ok(slice_range(&entries, start, stop))
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let Some(set) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<(&String, &f64)> = set.iter().collect();
        entries.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
        Ok(slice_range(&entries, start, stop))
    }

    async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(set) = inner.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> anyhow::Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

fn slice_range(entries: &[(&String, &f64)], start: isize, stop: isize) -> Vec<String> {
    let len = entries.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len)
        }
    };
    let start = norm(start).min(len);
    let stop = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };
    if start > stop || start >= len {
        return Vec::new();
    }
    entries[start as usize..=(stop as usize)]
        .iter()
        .map(|(m, _)| (*m).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zpopmin_returns_lowest_score() {
        let store = MemoryStore::new();
        store.zadd("q", "b", 50.0).await.unwrap();
        store.zadd("q", "a", 10.0).await.unwrap();
        store.zadd("q", "c", 100.0).await.unwrap();

        let (member, score) = store.zpopmin("q").await.unwrap().unwrap();
        assert_eq!(member, "a");
        assert_eq!(score, 10.0);
        assert_eq!(store.zcard("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn zrange_is_ascending_by_score() {
        let store = MemoryStore::new();
        store.zadd("q", "b", 50.0).await.unwrap();
        store.zadd("q", "a", 10.0).await.unwrap();
        store.zadd("q", "c", 100.0).await.unwrap();

        let all = store.zrange("q", 0, -1).await.unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn set_ex_expires() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn persist_clears_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.expire("k", 0).await.unwrap();
        store.persist("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }
}
