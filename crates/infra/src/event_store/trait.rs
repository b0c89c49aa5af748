use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockroom_core::{AggregateId, ExpectedVersion, StoreId};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Events go through this lifecycle:
///
/// 1. **Domain event**: produced by an aggregate's `handle()`
/// 2. **UncommittedEvent**: serialized payload plus stream metadata
/// 3. **StoredEvent**: persisted with a stream `sequence_number` and a global `position`
/// 4. **EventEnvelope**: handed to the bus for projections
///
/// Build one with [`UncommittedEvent::from_typed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub store_id: StoreId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// A stream is `(store_id, aggregate_type, aggregate_id)`. Sequence numbers are
/// stream-scoped and start at 1; `position` orders events across the whole log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub store_id: StoreId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,
    /// Global append order across all streams.
    pub position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    pub fn stream(&self) -> stockroom_events::StreamKey {
        stockroom_events::StreamKey::new(self.store_id, self.aggregate_type.clone(), self.aggregate_id)
    }

    /// Convert a stored event into a store-scoped envelope for publication.
    pub fn to_envelope(&self) -> stockroom_events::EventEnvelope<JsonValue> {
        stockroom_events::EventEnvelope::new(
            self.event_id,
            self.store_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation), as opposed to
/// domain errors.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("store isolation violation: {0}")]
    StoreIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event log is corrupt: {0}")]
    Corrupt(String),
}

/// Append-only, store-scoped event store.
///
/// Append rules:
/// - a batch targets exactly one stream
/// - the stream revision must match `expected_version`
/// - sequence numbers continue at `current_version + 1`
/// - a batch is persisted entirely or not at all
///
/// `load_stream` returns an empty vector for streams that do not exist yet.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load one stream in sequence order.
    fn load_stream(
        &self,
        store_id: StoreId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the whole log in global append order.
    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        store_id: StoreId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(store_id, aggregate_type, aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all()
    }
}

impl UncommittedEvent {
    /// Build an uncommitted event from a typed domain event.
    pub fn from_typed<E>(
        store_id: StoreId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: stockroom_events::Event + Serialize,
    {
        let aggregate_type = aggregate_type.into();
        if event.aggregate_type() != aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "{} cannot be appended to a {aggregate_type} stream",
                event.event_type()
            )));
        }
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            store_id,
            aggregate_id,
            aggregate_type,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Check that a batch targets a single stream; returns that stream's key.
pub(crate) fn batch_stream(
    events: &[UncommittedEvent],
) -> Result<Option<(StoreId, String, AggregateId)>, EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };

    for (idx, e) in events.iter().enumerate() {
        if e.store_id != first.store_id {
            return Err(EventStoreError::StoreIsolation(format!(
                "batch contains multiple store_ids (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }

    Ok(Some((first.store_id, first.aggregate_type.clone(), first.aggregate_id)))
}
