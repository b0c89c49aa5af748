//! Per-stream projection cursors.
//!
//! A cursor holds the last applied `sequence_number` of each
//! `(store, aggregate_type, aggregate_id)` stream, which makes projections
//! idempotent under at-least-once delivery and rejects gaps.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use stockroom_core::StoreId;
use stockroom_events::{EventEnvelope, StreamKey};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("store isolation violation: {0}")]
    StoreIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Decision for an incoming envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCheck {
    /// Next in sequence: apply, then `advance`.
    Apply,
    /// Already applied.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<StreamKey, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, envelope: &EventEnvelope<JsonValue>) -> Result<CursorCheck, ProjectionError> {
        let seq = envelope.sequence_number();
        let last = self
            .inner
            .read()
            .ok()
            .and_then(|c| c.get(&envelope.stream()).copied())
            .unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorCheck::Duplicate);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(envelope.stream(), envelope.sequence_number());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

/// Decode an envelope payload into a typed domain event.
pub(crate) fn decode<E: serde::de::DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    envelope.decode().map_err(|e| {
        ProjectionError::Deserialize(format!("{} #{}: {e}", envelope.stream(), envelope.sequence_number()))
    })
}

/// Reject payloads whose store does not match the envelope.
pub(crate) fn ensure_store(
    envelope: &EventEnvelope<JsonValue>,
    event_store: StoreId,
) -> Result<(), ProjectionError> {
    if envelope.store_id() != event_store {
        return Err(ProjectionError::StoreIsolation(
            "event store_id does not match envelope store_id".to_string(),
        ));
    }
    Ok(())
}
