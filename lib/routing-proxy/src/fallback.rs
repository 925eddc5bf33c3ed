//! Last-known-good instance lists, consulted when discovery is unavailable

use lru::LruCache;
use routing_api::ServiceInstance;
use routing_core::normalize_hostname;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Fallback cache configuration
#[derive(Clone, Debug)]
pub struct FallbackConfig {
    /// Age after which an entry is discarded
    pub ttl: Duration,
    /// Hostnames kept before the least recently used one is evicted
    pub max_entries: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1024,
        }
    }
}

#[derive(Debug)]
struct FallbackEntry {
    instances: Vec<ServiceInstance>,
    stored_at: Instant,
}

/// One live entry as reported by [`FallbackCache::status`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FallbackEntryStatus {
    pub hostname: String,
    pub instances: usize,
    pub age_secs: u64,
}

/// Hostname-keyed, TTL-bounded, last-write-wins cache of instance lists.
///
/// Every operation takes the lock: reads mutate too, through lazy expiry and
/// recency tracking.
pub struct FallbackCache {
    entries: Mutex<LruCache<String, FallbackEntry>>,
    ttl: Duration,
}

impl FallbackCache {
    pub fn new(config: FallbackConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, FallbackEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `instances` for `hostname`, replacing any previous entry.
    ///
    /// Returns false when the hostname normalizes to nothing.
    pub fn update(&self, hostname: &str, instances: Vec<ServiceInstance>) -> bool {
        let Some(key) = normalize_hostname(hostname) else {
            return false;
        };
        let count = instances.len();
        self.lock().put(
            key.clone(),
            FallbackEntry {
                instances,
                stored_at: Instant::now(),
            },
        );
        debug!(hostname = %key, instances = count, "Fallback entry stored");
        true
    }

    /// Instances stored for `hostname`, unless missing or older than the TTL.
    /// An expired entry is removed.
    pub fn get(&self, hostname: &str) -> Option<Vec<ServiceInstance>> {
        let key = normalize_hostname(hostname)?;
        let mut entries = self.lock();

        match entries.get(&key) {
            None => return None,
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => return Some(entry.instances.clone()),
            Some(_) => {}
        }

        entries.pop(&key);
        debug!(hostname = %key, "Fallback entry expired");
        None
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included until they are touched
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge expired entries and describe the rest, most recently used first
    pub fn status(&self) -> Vec<FallbackEntryStatus> {
        let mut entries = self.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        entries
            .iter()
            .map(|(hostname, entry)| FallbackEntryStatus {
                hostname: hostname.clone(),
                instances: entry.instances.len(),
                age_secs: entry.stored_at.elapsed().as_secs(),
            })
            .collect()
    }
}
