use dashmap::DashMap;
use std::time::{Duration, Instant};

struct RemoteCount {
    connections: usize,
    seen_at: Instant,
}

/// Last-known connection counts of other instances.
///
/// Eventually consistent: an instance that stops heartbeating drops out after
/// `expiry`.
pub struct PresenceTracker {
    remote: DashMap<String, RemoteCount>,
    expiry: Duration,
}

impl PresenceTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            remote: DashMap::new(),
            expiry,
        }
    }

    /// Record a heartbeat from `origin`
    pub fn record(&self, origin: &str, connections: usize) {
        self.record_at(origin, connections, Instant::now());
    }

    pub(crate) fn record_at(&self, origin: &str, connections: usize, seen_at: Instant) {
        self.remote.insert(
            origin.to_string(),
            RemoteCount {
                connections,
                seen_at,
            },
        );
    }

    /// Sum of fresh remote counts; expired entries are pruned
    pub fn remote_observers(&self) -> usize {
        let now = Instant::now();
        self.remote
            .retain(|_, count| now.duration_since(count.seen_at) <= self.expiry);
        self.remote.iter().map(|entry| entry.connections).sum()
    }

    /// Number of remote instances currently considered alive
    pub fn live_instances(&self) -> usize {
        let now = Instant::now();
        self.remote
            .iter()
            .filter(|entry| now.duration_since(entry.seen_at) <= self.expiry)
            .count()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_sum_across_instances() {
        let presence = PresenceTracker::new(Duration::from_secs(10));
        presence.record("a", 3);
        presence.record("b", 4);
        assert_eq!(presence.remote_observers(), 7);
        assert_eq!(presence.live_instances(), 2);
    }

    #[test]
    fn test_latest_beat_replaces_previous() {
        let presence = PresenceTracker::new(Duration::from_secs(10));
        presence.record("a", 3);
        presence.record("a", 0);
        assert_eq!(presence.remote_observers(), 0);
    }

    #[test]
    fn test_stale_instances_expire() {
        let presence = PresenceTracker::new(Duration::from_secs(5));
        let long_ago = Instant::now()
            .checked_sub(Duration::from_secs(60))
            .unwrap_or_else(Instant::now);
        presence.record_at("gone", 10, long_ago);
        presence.record("alive", 1);

        assert_eq!(presence.remote_observers(), 1);
        assert_eq!(presence.live_instances(), 1);
    }
}
