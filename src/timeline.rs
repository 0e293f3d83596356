//! Audit timeline of committed workflow changes
use crate::error::WorkflowError;
use crate::types::{Actor, ActorId, TimeStamp};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct TimelineEntry {
    #[n(0)]
    pub trip_id: String,
    #[n(1)]
    pub actor_id: ActorId,
    #[n(2)]
    pub actor_name: String,
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
    #[n(4)]
    pub details: String,
}

impl TimelineEntry {
    pub fn new(trip_id: &str, actor: &Actor, timestamp: TimeStamp<Utc>, details: String) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            timestamp,
            details,
        }
    }

    // content address of the entry: sha256 over its cbor encoding
    pub fn build(&self) -> Result<(String, Vec<u8>), WorkflowError> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Write-only sink for timeline entries.
pub trait TimelineSink: Send + Sync {
    fn record(&self, entry: TimelineEntry) -> Result<(), WorkflowError>;
}

/// Keeps entries in memory. Useful for tests and short-lived embeddings.
///
/// Entries already pushed stay valid after a panicking writer, so a poisoned
/// lock is recovered instead of refusing further commits.
#[derive(Debug, Default, Clone)]
pub struct MemoryTimeline {
    entries: Arc<Mutex<Vec<TimelineEntry>>>,
}

impl MemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_trip(&self, trip_id: &str) -> Vec<TimelineEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.trip_id == trip_id)
            .collect()
    }
}

impl TimelineSink for MemoryTimeline {
    fn record(&self, entry: TimelineEntry) -> Result<(), WorkflowError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}

/// Stores entries in a sled tree, keyed by trip, time and content hash.
pub struct SledTimeline {
    tree: sled::Tree,
}

impl SledTimeline {
    pub fn open(db: &sled::Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            tree: db.open_tree("timeline")?,
        })
    }

    /// Entries of one trip, oldest first.
    pub fn for_trip(&self, trip_id: &str) -> Result<Vec<TimelineEntry>, WorkflowError> {
        self.tree
            .scan_prefix(format!("{trip_id}/").as_bytes())
            .values()
            .map(|value| -> Result<TimelineEntry, WorkflowError> {
                Ok(minicbor::decode(&value?)?)
            })
            .collect()
    }
}

impl TimelineSink for SledTimeline {
    fn record(&self, entry: TimelineEntry) -> Result<(), WorkflowError> {
        let (hash, cbor) = entry.build()?;
        let nanos = entry.timestamp.to_datetime_utc().timestamp_nanos_opt().unwrap_or(0);
        let key = format!("{}/{:020}/{}", entry.trip_id, nanos, hash);
        self.tree.insert(key.as_bytes(), cbor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use tempfile::tempdir;

    fn entry(trip_id: &str, details: &str) -> TimelineEntry {
        let actor = Actor::new("u-acc", "Divya", Role::Accounts);
        TimelineEntry::new(trip_id, &actor, TimeStamp::new(), details.to_string())
    }

    #[test]
    fn identical_entries_share_a_hash() {
        let a = entry("trip_1", "approved advance");
        let b = a.clone();
        assert_eq!(a.build().unwrap().0, b.build().unwrap().0);
    }

    #[test]
    fn memory_timeline_filters_by_trip() {
        let timeline = MemoryTimeline::new();
        timeline.record(entry("trip_1", "a")).unwrap();
        timeline.record(entry("trip_2", "b")).unwrap();
        assert_eq!(timeline.entries().len(), 2);
        assert_eq!(timeline.for_trip("trip_1")[0].details, "a");
    }

    #[test]
    fn memory_timeline_keeps_recording_after_a_panicking_writer() {
        let timeline = MemoryTimeline::new();
        timeline.record(entry("trip_1", "before")).unwrap();
        let shared = timeline.clone();
        let _ = std::thread::spawn(move || {
            let _held = shared.entries.lock().unwrap();
            panic!("timeline writer died");
        })
        .join();
        assert!(timeline.entries.is_poisoned());

        timeline.record(entry("trip_1", "after")).unwrap();
        let details: Vec<_> = timeline.for_trip("trip_1").into_iter().map(|e| e.details).collect();
        assert_eq!(details, vec!["before", "after"]);
    }

    #[test]
    fn sled_timeline_keeps_order_per_trip() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("timeline.db")).unwrap();
        let timeline = SledTimeline::open(&db).unwrap();

        let mut second = entry("trip_1", "second");
        second.timestamp = TimeStamp::new_with(2026, 5, 2, 10, 0, 0);
        let mut first = entry("trip_1", "first");
        first.timestamp = TimeStamp::new_with(2026, 5, 1, 10, 0, 0);

        timeline.record(second).unwrap();
        timeline.record(entry("trip_10", "other trip")).unwrap();
        timeline.record(first).unwrap();

        let details: Vec<_> = timeline
            .for_trip("trip_1")
            .unwrap()
            .into_iter()
            .map(|e| e.details)
            .collect();
        assert_eq!(details, vec!["first", "second"]);
    }
}
