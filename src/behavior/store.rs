//! Sharded profile store with LRU and TTL eviction
//!
//! Users hash onto a fixed number of shards, each guarded by its own mutex,
//! so different users update concurrently while updates to one user are
//! serialized. Each shard holds at most `capacity / shards` profiles; the
//! least recently seen profile is evicted when a shard is full, and profiles
//! idle for longer than the TTL are dropped.

use super::profile::BehaviorProfile;
use crate::error::{FraudError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Profile store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileStoreConfig {
    /// Number of independently locked shards
    pub shards: usize,
    /// Maximum number of profiles across all shards
    pub capacity: usize,
    /// Idle time after which a profile is dropped, in seconds
    pub ttl_secs: u64,
}

impl Default for ProfileStoreConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            capacity: 100_000,
            ttl_secs: 30 * 24 * 3600,
        }
    }
}

impl ProfileStoreConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(FraudError::invalid_parameter("shards", self.shards, "must be at least 1"));
        }
        if self.capacity < self.shards {
            return Err(FraudError::invalid_parameter(
                "capacity",
                self.capacity,
                "must be at least the number of shards",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Entry {
    profile: BehaviorProfile,
    last_seen: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() > ttl
    }
}

/// Store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStoreStats {
    pub profiles: usize,
    pub evicted: u64,
    pub expired: u64,
}

/// Concurrent map from user id to [`BehaviorProfile`]
#[derive(Debug)]
pub struct ProfileStore {
    shards: Vec<Mutex<HashMap<String, Entry>>>,
    shard_capacity: usize,
    ttl: Duration,
    evicted: AtomicU64,
    expired: AtomicU64,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::build(&ProfileStoreConfig::default())
    }
}

impl ProfileStore {
    /// Create a store after validating `config`
    pub fn new(config: &ProfileStoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &ProfileStoreConfig) -> Self {
        let shards = config.shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            shard_capacity: (config.capacity / shards).max(1),
            ttl: config.ttl(),
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    fn shard(&self, user_id: &str) -> &Mutex<HashMap<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Run `f` on the user's profile, creating it on first sight.
    ///
    /// The shard stays locked for the duration of `f`, so concurrent calls
    /// for the same user are applied one after another.
    pub fn with_profile<T>(&self, user_id: &str, f: impl FnOnce(&mut BehaviorProfile) -> T) -> T {
        let mut shard = self.shard(user_id).lock();

        if shard.get(user_id).is_some_and(|e| e.is_expired(self.ttl)) {
            shard.remove(user_id);
            self.expired.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id, "Expired behaviour profile dropped");
        }

        if !shard.contains_key(user_id) && shard.len() >= self.shard_capacity {
            self.make_room(&mut shard);
        }

        let entry = shard.entry(user_id.to_string()).or_insert_with(|| Entry {
            profile: BehaviorProfile::new(user_id),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        f(&mut entry.profile)
    }

    /// Drop expired entries, then the least recently seen one if still full
    fn make_room(&self, shard: &mut HashMap<String, Entry>) {
        let before = shard.len();
        shard.retain(|_, e| !e.is_expired(self.ttl));
        let dropped = before - shard.len();
        if dropped > 0 {
            self.expired.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        if shard.len() < self.shard_capacity {
            return;
        }

        let lru = shard
            .iter()
            .min_by_key(|(_, e)| e.last_seen)
            .map(|(k, _)| k.clone());
        if let Some(user_id) = lru {
            shard.remove(&user_id);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(user_id = %user_id, "Least recently seen profile evicted");
        }
    }

    /// Snapshot of a user's profile, if present and not expired
    pub fn get(&self, user_id: &str) -> Option<BehaviorProfile> {
        self.shard(user_id)
            .lock()
            .get(user_id)
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.profile.clone())
    }

    pub fn remove(&self, user_id: &str) -> Option<BehaviorProfile> {
        self.shard(user_id).lock().remove(user_id).map(|e| e.profile)
    }

    /// Drop every expired profile, returning how many were removed
    pub fn prune_expired(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, e| !e.is_expired(self.ttl));
            removed += before - shard.len();
        }
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ProfileStoreStats {
        ProfileStoreStats {
            profiles: self.len(),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_profile_created_on_first_sight() {
        let store = ProfileStore::default();
        assert!(store.get("alice").is_none());
        store.with_profile("alice", |p| p.record(Some(5.0), None, None, None, 0.1));
        assert_eq!(store.get("alice").unwrap().transaction_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let config = ProfileStoreConfig::default().with_shards(1).with_capacity(2);
        let store = ProfileStore::new(&config).unwrap();

        store.with_profile("a", |_| ());
        thread::sleep(Duration::from_millis(2));
        store.with_profile("b", |_| ());
        thread::sleep(Duration::from_millis(2));
        store.with_profile("a", |_| ());
        thread::sleep(Duration::from_millis(2));
        store.with_profile("c", |_| ());

        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
        assert_eq!(store.stats().evicted, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let config = ProfileStoreConfig::default().with_ttl_secs(0);
        let store = ProfileStore::new(&config).unwrap();
        store.with_profile("a", |p| p.record(Some(1.0), None, None, None, 0.0));
        thread::sleep(Duration::from_millis(5));

        assert!(store.get("a").is_none());
        assert_eq!(store.prune_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_updates_serialized_per_user() {
        let store = Arc::new(ProfileStore::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..250 {
                        store.with_profile("shared", |p| p.record(Some(10.0), None, None, None, 0.0));
                        store.with_profile(&format!("user-{}", t), |p| p.record(None, None, None, None, 0.0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let shared = store.get("shared").unwrap();
        assert_eq!(shared.transaction_count, 2000);
        assert!((shared.average_amount - 10.0).abs() < 1e-9);
        assert_eq!(store.len(), 9);
    }

    #[test]
    fn test_invalid_config() {
        let config = ProfileStoreConfig::default().with_shards(0);
        assert!(matches!(
            ProfileStore::new(&config),
            Err(FraudError::InvalidParameter { .. })
        ));
    }
}
