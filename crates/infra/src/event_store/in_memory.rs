use std::collections::HashMap;
use std::sync::RwLock;

use stockroom_core::{AggregateId, ExpectedVersion, StoreId};
use stockroom_events::StreamKey;

use super::r#trait::{batch_stream, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Ordered event log with a per-stream index.
///
/// `prepare` decides what an append would commit without touching the log, so
/// durable backends can persist first and `commit` only once the write landed.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    events: Vec<StoredEvent>,
    streams: HashMap<StreamKey, Vec<usize>>,
    owners: HashMap<(String, AggregateId), StoreId>,
}

impl EventLog {
    /// Rebuild a log from persisted events, checking stream and global ordering.
    pub(crate) fn from_events(events: Vec<StoredEvent>) -> Result<Self, EventStoreError> {
        let mut log = Self::default();
        let mut last_position = 0u64;
        for e in events {
            if e.position <= last_position {
                return Err(EventStoreError::Corrupt(format!(
                    "non-increasing position (last={last_position}, found={})",
                    e.position
                )));
            }
            let key = e.stream();
            let expected = log.streams.get(&key).map_or(0, Vec::len) as u64 + 1;
            if e.sequence_number != expected {
                return Err(EventStoreError::Corrupt(format!(
                    "stream {}/{} has sequence {} where {expected} was expected",
                    e.aggregate_type, e.aggregate_id, e.sequence_number
                )));
            }
            last_position = e.position;
            log.push(key, e);
        }
        Ok(log)
    }

    fn push(&mut self, key: StreamKey, event: StoredEvent) {
        let idx = self.events.len();
        self.owners
            .entry((key.aggregate_type.clone(), key.aggregate_id))
            .or_insert(key.store_id);
        self.events.push(event);
        self.streams.entry(key).or_default().push(idx);
    }

    fn last_position(&self) -> u64 {
        self.events.last().map(|e| e.position).unwrap_or(0)
    }

    pub(crate) fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub(crate) fn stream(
        &self,
        store_id: StoreId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Vec<StoredEvent> {
        self.streams
            .get(&StreamKey::new(store_id, aggregate_type, aggregate_id))
            .map(|idxs| idxs.iter().map(|i| self.events[*i].clone()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn prepare(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((store_id, aggregate_type, aggregate_id)) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        // Another stream on the same id must not be of a different store.
        if let Some(owner) = self.owners.get(&(aggregate_type.clone(), aggregate_id)) {
            if *owner != store_id {
                return Err(EventStoreError::StoreIsolation(format!(
                    "stream {aggregate_type}/{aggregate_id} belongs to another store"
                )));
            }
        }

        let current = self.stream(store_id, &aggregate_type, aggregate_id).len() as u64;
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut next = current + 1;
        let mut position = self.last_position() + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            committed.push(StoredEvent {
                event_id: e.event_id,
                store_id: e.store_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                position,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
            position += 1;
        }
        Ok(committed)
    }

    pub(crate) fn commit(&mut self, committed: &[StoredEvent]) {
        for e in committed {
            self.push(e.stream(), e.clone());
        }
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<EventLog>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut log = self
            .log
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let committed = log.prepare(events, expected_version)?;
        log.commit(&committed);
        Ok(committed)
    }

    fn load_stream(
        &self,
        store_id: StoreId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(log.stream(store_id, aggregate_type, aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(log.events().to_vec())
    }
}
