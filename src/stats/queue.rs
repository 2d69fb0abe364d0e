use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::event::{EntityId, EventKind, QueueEntry, StatEvent, EVENT_KIND_COUNT};

/// Coalescing buffer holding the latest admitted entry per (kind, entity).
///
/// The outer key is the closed `EventKind` set, so each kind owns a fixed
/// slot. Inner maps are `DashMap`s: the compare-and-overwrite for a single
/// pair runs under that pair's shard lock.
pub struct Queue {
    created: Instant,
    maps: [DashMap<EntityId, QueueEntry>; EVENT_KIND_COUNT],
}

impl Queue {
    /// Builds an empty queue with one map per event kind.
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            maps: std::array::from_fn(|_| DashMap::with_capacity(16)),
        }
    }

    /// Admits `event` if no entry exists for its pair, or if the queued
    /// entry's timestamp is not newer. Ties favor the incoming event.
    ///
    /// Returns whether the event was stored.
    pub fn admit(&self, event: StatEvent) -> bool {
        let map = &self.maps[event.kind.index()];
        match map.entry(event.entity.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().timestamp <= event.timestamp {
                    existing.insert(event);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(event);
                true
            }
        }
    }

    /// Time since this queue generation was built.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Returns a copy of the entry queued for (kind, entity), if any.
    pub fn get(&self, kind: EventKind, entity: &EntityId) -> Option<QueueEntry> {
        self.maps[kind.index()].get(entity).map(|e| e.value().clone())
    }

    /// Number of entries queued for `kind`.
    pub fn len_of(&self, kind: EventKind) -> usize {
        self.maps[kind.index()].len()
    }

    /// Total number of queued entries across all kinds.
    pub fn len(&self) -> usize {
        self.maps.iter().map(DashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(DashMap::is_empty)
    }

    /// Copies every queued entry out, in unspecified order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        let mut entries = Vec::with_capacity(self.len());
        for map in &self.maps {
            entries.extend(map.iter().map(|e| e.value().clone()));
        }
        entries
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, ts: u64, entity: &str, value: f64) -> StatEvent {
        StatEvent::new(kind, ts, entity, value)
    }

    #[test]
    fn test_new_queue_is_empty() {
        let q = Queue::new();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
        for kind in EventKind::all() {
            assert_eq!(q.len_of(*kind), 0);
        }
    }

    #[test]
    fn test_age_grows_from_construction() {
        let q = Queue::new();
        std::thread::sleep(Duration::from_millis(5));
        assert!(q.age() >= Duration::from_millis(5));
    }

    #[test]
    fn test_first_of_its_kind_is_admitted() {
        let q = Queue::new();
        assert!(q.admit(ev(EventKind::Connected, 100, "t1", 1.0)));

        let entry = q
            .get(EventKind::Connected, &EntityId::from("t1"))
            .expect("entry exists");
        assert_eq!(entry.timestamp, 100);
        assert_eq!(entry.value, 1.0);
    }

    #[test]
    fn test_older_timestamp_is_rejected() {
        let q = Queue::new();
        q.admit(ev(EventKind::Connected, 100, "t1", 1.0));
        assert!(!q.admit(ev(EventKind::Connected, 50, "t1", 2.0)));

        let entry = q
            .get(EventKind::Connected, &EntityId::from("t1"))
            .expect("entry exists");
        assert_eq!(entry.timestamp, 100);
        assert_eq!(entry.value, 1.0);
    }

    #[test]
    fn test_equal_timestamp_overwrites() {
        let q = Queue::new();
        q.admit(ev(EventKind::Retrying, 10, "t1", 1.0));
        assert!(q.admit(ev(EventKind::Retrying, 10, "t1", 2.0)));

        let entry = q
            .get(EventKind::Retrying, &EntityId::from("t1"))
            .expect("entry exists");
        assert_eq!(entry.value, 2.0);
    }

    #[test]
    fn test_increasing_timestamps_keep_last() {
        let q = Queue::new();
        for ts in 1..=20u64 {
            q.admit(ev(EventKind::Age, ts, "t9", ts as f64 * 10.0));
        }

        assert_eq!(q.len(), 1);
        let entry = q
            .get(EventKind::Age, &EntityId::from("t9"))
            .expect("entry exists");
        assert_eq!(entry.timestamp, 20);
        assert_eq!(entry.value, 200.0);
    }

    #[test]
    fn test_distinct_entities_do_not_collide() {
        let q = Queue::new();
        q.admit(ev(EventKind::Failed, 10, "t1", 5.0));
        q.admit(ev(EventKind::Failed, 10, "t2", 7.0));

        assert_eq!(q.len_of(EventKind::Failed), 2);
        assert_eq!(
            q.get(EventKind::Failed, &EntityId::from("t1"))
                .map(|e| e.value),
            Some(5.0)
        );
        assert_eq!(
            q.get(EventKind::Failed, &EntityId::from("t2"))
                .map(|e| e.value),
            Some(7.0)
        );
    }

    #[test]
    fn test_same_entity_different_kinds_are_independent() {
        let q = Queue::new();
        q.admit(ev(EventKind::Connected, 100, "t1", 1.0));
        q.admit(ev(EventKind::ConnectCost, 5, "t1", 250.0));

        assert_eq!(q.len(), 2);
        assert_eq!(q.len_of(EventKind::Connected), 1);
        assert_eq!(q.len_of(EventKind::ConnectCost), 1);
    }

    #[test]
    fn test_snapshot_copies_all_entries() {
        let q = Queue::new();
        q.admit(ev(EventKind::Status, 1, "a", 1.0));
        q.admit(ev(EventKind::Stopped, 2, "b", 2.0));
        q.admit(ev(EventKind::Stopped, 3, "c", 3.0));

        let mut snap = q.snapshot();
        snap.sort_by(|a, b| a.entity.cmp(&b.entity));
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].entity.as_str(), "a");
        assert_eq!(snap[2].value, 3.0);

        // Snapshot does not consume.
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_concurrent_admit_keeps_newest() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(Queue::new());
        let mut handles = Vec::new();

        for worker in 0..4u64 {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..1000u64 {
                    let ts = i * 4 + worker;
                    q.admit(StatEvent::new(EventKind::Retrying, ts, "t1", ts as f64));
                }
            }));
        }

        for h in handles {
            h.join().expect("thread panicked");
        }

        let entry = q
            .get(EventKind::Retrying, &EntityId::from("t1"))
            .expect("entry exists");
        assert_eq!(entry.timestamp, 3999);
        assert_eq!(entry.value, 3999.0);
    }
}
