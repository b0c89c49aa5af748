//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream (store_id, aggregate_type, aggregate_id)
//!   ↓
//! 2. Rehydrate the aggregate from its history
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with an exact expected revision
//!   ↓
//! 5. Publish committed envelopes to the bus (projections)
//! ```
//!
//! Publication only happens after a successful append. A rejected command
//! appends and publishes nothing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockroom_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, StoreId};
use stockroom_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure or duplicate creation.
    #[error("conflict: {0}")]
    Concurrency(String),
    /// Loaded history belongs to another store or stream.
    #[error("store isolation violation: {0}")]
    StoreIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },
    #[error("not found")]
    NotFound,
    /// Historical payloads do not decode into the aggregate event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::StoreIsolation(msg) => DispatchError::StoreIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InsufficientStock { requested, available } => {
                DispatchError::InsufficientStock { requested, available }
            }
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline and return the committed
    /// events (with their sequence numbers and positions).
    pub fn dispatch<A>(
        &self,
        store_id: StoreId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(StoreId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(store_id, aggregate_type, aggregate_id)?;
        validate_loaded_stream(store_id, aggregate_type, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(store_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(store_id, aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        tracing::debug!(
            aggregate_type,
            %aggregate_id,
            events = committed.len(),
            "command committed"
        );
        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        store_id: StoreId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(StoreId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(store_id, aggregate_type, aggregate_id)?;
        validate_loaded_stream(store_id, aggregate_type, aggregate_id, &history)?;
        let mut aggregate = make_aggregate(store_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    store_id: StoreId,
    aggregate_type: &str,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.store_id != store_id {
            return Err(DispatchError::StoreIsolation(format!(
                "loaded stream contains wrong store_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id || e.aggregate_type != aggregate_type {
            return Err(DispatchError::StoreIsolation(format!(
                "loaded stream contains another stream's event at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::Corrupt(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
