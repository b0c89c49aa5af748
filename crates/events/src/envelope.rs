use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_core::{AggregateId, StoreId};

/// Identity of one event stream.
///
/// A product has two streams under the same `aggregate_id` (its catalog
/// record and its stock ledger), told apart by `aggregate_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub store_id: StoreId,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
}

impl StreamKey {
    pub fn new(store_id: StoreId, aggregate_type: impl Into<String>, aggregate_id: AggregateId) -> Self {
        Self {
            store_id,
            aggregate_type: aggregate_type.into(),
            aggregate_id,
        }
    }
}

impl core::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}@{}", self.aggregate_type, self.aggregate_id, self.store_id)
    }
}

/// A committed event as handed to consumers: stream identity, position in the
/// stream, and the payload.
///
/// `sequence_number` is 1 for the first event of a stream and grows by one per
/// event, so consumers can detect both redelivery and gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    store_id: StoreId,
    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        store_id: StoreId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            store_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn stream(&self) -> StreamKey {
        StreamKey::new(self.store_id, self.aggregate_type.clone(), self.aggregate_id)
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Same metadata, transformed payload.
    pub fn map_payload<F>(self, f: impl FnOnce(E) -> F) -> EventEnvelope<F> {
        EventEnvelope {
            event_id: self.event_id,
            store_id: self.store_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            payload: f(self.payload),
        }
    }
}

impl EventEnvelope<JsonValue> {
    /// Deserialize the JSON payload into a typed domain event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
