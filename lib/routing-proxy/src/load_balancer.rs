//! Instance selection for routing decisions

use routing_api::ServiceInstance;
use std::collections::HashMap;
use std::sync::Mutex;

/// Round-robin selector with one cursor per image id.
///
/// The candidate list is refetched on every call, so the cursor is a logical
/// slot rather than a pointer at a particular instance: when the set changes
/// between calls the rotation simply continues at the same position.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursors: Mutex<HashMap<i64, usize>>,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next instance for `image_id` from `candidates`.
    ///
    /// Candidates are trusted to be healthy; no filtering happens here.
    pub fn select<'a>(&self, image_id: i64, candidates: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if candidates.is_empty() {
            return None;
        }

        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let cursor = cursors.entry(image_id).or_insert(0);
        let slot = *cursor % candidates.len();
        *cursor = (slot + 1) % candidates.len();
        candidates.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn instances(ids: &[&str]) -> Vec<ServiceInstance> {
        ids.iter()
            .map(|id| ServiceInstance {
                instance_id: id.to_string(),
                image_id: Some(1),
                ..Default::default()
            })
            .collect()
    }

    fn pick(selector: &RoundRobinSelector, image_id: i64, candidates: &[ServiceInstance]) -> String {
        selector.select(image_id, candidates).unwrap().instance_id.clone()
    }

    #[test]
    fn test_round_robin_rotation() {
        let selector = RoundRobinSelector::new();
        let candidates = instances(&["a", "b", "c"]);

        let picks: Vec<String> = (0..4).map(|_| pick(&selector, 1, &candidates)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_empty_candidates() {
        let selector = RoundRobinSelector::new();
        assert!(selector.select(1, &[]).is_none());
    }

    #[test]
    fn test_cursors_are_per_image() {
        let selector = RoundRobinSelector::new();
        let candidates = instances(&["a", "b"]);

        assert_eq!(pick(&selector, 1, &candidates), "a");
        assert_eq!(pick(&selector, 2, &candidates), "a");
        assert_eq!(pick(&selector, 1, &candidates), "b");
    }

    #[test]
    fn test_candidate_set_shrinks_between_calls() {
        let selector = RoundRobinSelector::new();
        let three = instances(&["a", "b", "c"]);
        assert_eq!(pick(&selector, 1, &three), "a");
        assert_eq!(pick(&selector, 1, &three), "b");

        // Cursor is 2; with two candidates it wraps to slot 0
        let two = instances(&["x", "y"]);
        assert_eq!(pick(&selector, 1, &two), "x");
        assert_eq!(pick(&selector, 1, &two), "y");
        assert_eq!(pick(&selector, 1, &three), "a");
    }

    #[test]
    fn test_concurrent_selection_is_even() {
        let selector = Arc::new(RoundRobinSelector::new());
        let candidates = Arc::new(instances(&["a", "b"]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let selector = selector.clone();
                let candidates = candidates.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| pick(&selector, 1, &candidates) == "a")
                        .count()
                })
            })
            .collect();

        let a_picks: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(a_picks, 100);
    }
}
