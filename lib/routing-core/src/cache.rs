//! Service cache: the in-process read model of healthy instances
//!
//! The cache is replaced wholesale on every watch cycle. Readers load the
//! current snapshot without locking; the writer builds a new snapshot under a
//! short exclusive section and swaps it in, so a reader sees either the
//! previous cycle or the new one, never a mix.

use crate::hostname::normalize_hostname;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use routing_api::{CacheStatus, ServiceInstance};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// ServiceCache maps image ids to their healthy instances, with a secondary
/// hostname index
pub struct ServiceCache {
    snapshot: ArcSwap<CacheSnapshot>,
    // Serializes writers; readers never take it
    write_lock: Mutex<()>,
}

/// One immutable generation of the cache
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    by_image_id: BTreeMap<i64, Vec<ServiceInstance>>,
    // Keys are normalized hostnames
    hostname_to_image_id: HashMap<String, i64>,
    last_watch_index: u64,
    last_updated_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    fn build(instances: Vec<ServiceInstance>, index: u64) -> Self {
        let mut by_image_id: BTreeMap<i64, Vec<ServiceInstance>> = BTreeMap::new();
        let mut hostname_to_image_id = HashMap::new();

        for instance in instances {
            let Some(image_id) = instance.image_id else {
                debug!(instance_id = %instance.instance_id, "Skipping instance without image id");
                continue;
            };

            if let Some(hostname) = instance.routable_hostname.as_deref().and_then(normalize_hostname) {
                if let Some(previous) = hostname_to_image_id.insert(hostname.clone(), image_id) {
                    if previous != image_id {
                        warn!(
                            hostname = %hostname,
                            previous,
                            image_id,
                            "Hostname claimed by more than one image, last one wins"
                        );
                    }
                }
            }

            by_image_id.entry(image_id).or_default().push(instance);
        }

        Self {
            by_image_id,
            hostname_to_image_id,
            last_watch_index: index,
            last_updated_at: Some(Utc::now()),
        }
    }

    /// Instances of one image
    pub fn instances(&self, image_id: i64) -> &[ServiceInstance] {
        self.by_image_id.get(&image_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Image id a hostname resolves to
    pub fn resolve_hostname(&self, hostname: &str) -> Option<i64> {
        let key = normalize_hostname(hostname)?;
        self.hostname_to_image_id.get(&key).copied()
    }

    pub fn last_watch_index(&self) -> u64 {
        self.last_watch_index
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at
    }

    pub fn total_instances(&self) -> usize {
        self.by_image_id.values().map(Vec::len).sum()
    }
}

impl ServiceCache {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CacheSnapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Replace the whole cache with `instances`, observed at registry `index`.
    ///
    /// The instances always replace the previous batch, but the published
    /// index never moves backwards: an index below the current one (a
    /// registry restart or snapshot restore) keeps the current index.
    ///
    /// Returns the number of instances stored.
    pub fn update(&self, instances: Vec<ServiceInstance>, index: u64) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.snapshot.load().last_watch_index;
        if index < current {
            warn!(index, current, "Registry index went backwards, keeping the current index");
        }
        let snapshot = CacheSnapshot::build(instances, index.max(current));
        let stored = snapshot.total_instances();
        let images = snapshot.by_image_id.len();
        self.snapshot.store(Arc::new(snapshot));

        debug!(index, instances = stored, images, "Service cache replaced");
        stored
    }

    /// Look up instances.
    ///
    /// A hostname takes precedence over an image id; an unknown hostname or
    /// image yields an empty list. With no filter every instance is returned.
    pub fn get(&self, image_id: Option<i64>, routable_hostname: Option<&str>) -> Vec<ServiceInstance> {
        let snapshot = self.snapshot.load();

        if let Some(hostname) = routable_hostname {
            return match snapshot.resolve_hostname(hostname) {
                Some(image_id) => snapshot.instances(image_id).to_vec(),
                None => Vec::new(),
            };
        }

        match image_id {
            Some(image_id) => snapshot.instances(image_id).to_vec(),
            None => snapshot.by_image_id.values().flatten().cloned().collect(),
        }
    }

    /// Whether at least one watch cycle has been applied
    pub fn is_warm(&self) -> bool {
        self.snapshot.load().last_updated_at.is_some()
    }

    /// Registry index of the last applied cycle
    pub fn last_index(&self) -> u64 {
        self.snapshot.load().last_watch_index
    }

    /// Current generation of the cache
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.snapshot.load_full()
    }

    /// Operational summary; not used on the routing path
    pub fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot.load();
        CacheStatus {
            last_index: snapshot.last_watch_index,
            last_updated_at: snapshot.last_updated_at,
            images: snapshot
                .by_image_id
                .iter()
                .map(|(image_id, instances)| (*image_id, instances.len()))
                .collect(),
            total_instances: snapshot.total_instances(),
        }
    }
}

impl Default for ServiceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, image_id: Option<i64>, hostname: Option<&str>) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            address: "10.0.0.1".to_string(),
            internal_port: 8080,
            health_status: "passing".to_string(),
            image_id,
            routable_hostname: hostname.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_cache_is_cold() {
        let cache = ServiceCache::new();
        assert!(!cache.is_warm());
        assert!(cache.get(None, None).is_empty());
        assert_eq!(cache.status().last_updated_at, None);
    }

    #[test]
    fn test_empty_update_warms_cache() {
        let cache = ServiceCache::new();
        cache.update(vec![], 3);
        assert!(cache.is_warm());
        assert_eq!(cache.last_index(), 3);
        assert!(cache.get(None, None).is_empty());
    }

    #[test]
    fn test_get_by_image_and_hostname() {
        let cache = ServiceCache::new();
        cache.update(
            vec![
                instance("a", Some(1), Some("X.com")),
                instance("b", Some(1), Some("x.com")),
                instance("c", Some(2), Some("y.com")),
            ],
            5,
        );

        assert_eq!(cache.get(Some(1), None).len(), 2);
        assert_eq!(cache.get(Some(2), None).len(), 1);
        assert!(cache.get(Some(3), None).is_empty());

        let by_host = cache.get(None, Some("https://X.COM/"));
        assert_eq!(by_host.len(), 2);
        assert!(cache.get(None, Some("unknown.com")).is_empty());

        // Hostname takes precedence over image id
        assert_eq!(cache.get(Some(1), Some("y.com"))[0].instance_id, "c");
    }

    #[test]
    fn test_get_all_concatenates_buckets() {
        let cache = ServiceCache::new();
        cache.update(
            vec![
                instance("c", Some(2), None),
                instance("a", Some(1), None),
                instance("b", Some(1), None),
            ],
            1,
        );

        let ids: Vec<String> = cache.get(None, None).into_iter().map(|i| i.instance_id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_update_replaces_previous_batch() {
        let cache = ServiceCache::new();
        cache.update(
            vec![instance("a", Some(1), Some("old.com")), instance("b", Some(2), None)],
            5,
        );
        cache.update(vec![instance("c", Some(2), Some("new.com"))], 9);

        assert!(cache.get(Some(1), None).is_empty());
        assert!(cache.get(None, Some("old.com")).is_empty());
        assert_eq!(cache.get(None, Some("new.com")).len(), 1);

        let status = cache.status();
        assert_eq!(status.last_index, 9);
        assert_eq!(status.total_instances, 1);
        assert_eq!(status.images.get(&2), Some(&1));
        assert_eq!(status.images.get(&1), None);
    }

    #[test]
    fn test_lower_index_replaces_data_but_keeps_index() {
        let cache = ServiceCache::new();
        cache.update(vec![instance("a", Some(1), Some("x.com"))], 10);
        cache.update(vec![instance("b", Some(2), Some("y.com"))], 3);

        assert_eq!(cache.last_index(), 10);
        assert!(cache.get(Some(1), None).is_empty());
        assert_eq!(cache.get(None, Some("y.com"))[0].instance_id, "b");

        cache.update(vec![], 12);
        assert_eq!(cache.last_index(), 12);
    }

    #[test]
    fn test_instances_without_image_are_skipped() {
        let cache = ServiceCache::new();
        let stored = cache.update(
            vec![instance("a", None, Some("x.com")), instance("b", Some(1), None)],
            2,
        );
        assert_eq!(stored, 1);
        assert!(cache.get(None, Some("x.com")).is_empty());
    }

    #[test]
    fn test_snapshot_survives_update() {
        let cache = ServiceCache::new();
        cache.update(vec![instance("a", Some(1), None)], 1);
        let before = cache.snapshot();
        cache.update(vec![], 2);

        assert_eq!(before.instances(1).len(), 1);
        assert_eq!(before.last_watch_index(), 1);
        assert_eq!(cache.snapshot().total_instances(), 0);
    }

    #[test]
    fn test_concurrent_readers_see_whole_generations() {
        let cache = Arc::new(ServiceCache::new());
        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for round in 0..200u64 {
                    let batch = (0..round % 5 + 1)
                        .map(|i| instance(&format!("{}-{}", round, i), Some(1), Some("x.com")))
                        .collect();
                    cache.update(batch, round);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = cache.snapshot();
            let instances = snapshot.instances(1);
            if let Some(first) = instances.first() {
                let round = first.instance_id.split('-').next().unwrap().to_string();
                assert!(instances.iter().all(|i| i.instance_id.starts_with(&format!("{}-", round))));
            }
        }

        writer.join().unwrap();
    }
}
