use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::StoreId;
use stockroom_events::EventEnvelope;
use stockroom_stores::{StoreEvent, StoreStatus};

use super::cursor::{decode, ensure_store, CursorCheck, ProjectionError, StreamCursors};

/// Queryable store record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreView {
    pub store_id: StoreId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: StoreStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Directory of every store, the only read model not partitioned by store.
#[derive(Debug, Default)]
pub struct StoreDirectoryProjection {
    stores: RwLock<HashMap<StoreId, StoreView>>,
    cursors: StreamCursors,
}

impl StoreDirectoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, store_id: StoreId) -> Option<StoreView> {
        self.stores.read().ok()?.get(&store_id).cloned()
    }

    /// Open stores, by name.
    pub fn list_open(&self) -> Vec<StoreView> {
        let mut open: Vec<StoreView> = match self.stores.read() {
            Ok(map) => map
                .values()
                .filter(|s| s.status == StoreStatus::Open)
                .cloned()
                .collect(),
            Err(_) => return vec![],
        };
        open.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.store_id.cmp(&b.store_id))
        });
        open
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: StoreEvent = decode(envelope)?;
        let store_id = event.store_id();
        ensure_store(envelope, store_id)?;

        let mut stores = self
            .stores
            .write()
            .map_err(|_| ProjectionError::StoreIsolation("store directory lock poisoned".to_string()))?;

        match event {
            StoreEvent::StoreRegistered(e) => {
                stores.insert(
                    store_id,
                    StoreView {
                        store_id,
                        name: e.name,
                        address: e.contact.address,
                        phone: e.contact.phone,
                        status: StoreStatus::Open,
                        registered_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            StoreEvent::StoreUpdated(e) => {
                if let Some(view) = stores.get_mut(&store_id) {
                    view.name = e.name;
                    view.address = e.contact.address;
                    view.phone = e.contact.phone;
                    view.updated_at = e.occurred_at;
                }
            }
            StoreEvent::StoreClosed(e) => {
                if let Some(view) = stores.get_mut(&store_id) {
                    view.status = StoreStatus::Closed;
                    view.updated_at = e.occurred_at;
                }
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    /// Drop all rows and cursors (rebuild support).
    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut stores) = self.stores.write() {
            stores.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    use stockroom_stores::{ContactInfo, Store, StoreClosed, StoreRegistered, StoreUpdated, STORE_AGGREGATE_TYPE};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    fn envelope(store_id: StoreId, seq: u64, event: StoreEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            store_id,
            Store::stream_id(store_id),
            STORE_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn registered(store_id: StoreId, name: &str) -> EventEnvelope<JsonValue> {
        envelope(
            store_id,
            1,
            StoreEvent::StoreRegistered(StoreRegistered {
                store_id,
                name: name.to_string(),
                contact: ContactInfo::default(),
                occurred_at: at(8),
            }),
        )
    }

    #[test]
    fn closed_stores_stay_readable_but_are_not_listed() {
        let directory = StoreDirectoryProjection::new();
        let (north, south) = (StoreId::new(), StoreId::new());
        directory.apply_envelope(&registered(south, "south")).unwrap();
        directory.apply_envelope(&registered(north, "North")).unwrap();

        let names: Vec<_> = directory.list_open().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["North", "south"]);

        let closed = StoreEvent::StoreClosed(StoreClosed { store_id: south, occurred_at: at(18) });
        directory.apply_envelope(&envelope(south, 2, closed)).unwrap();

        assert_eq!(directory.list_open().len(), 1);
        let view = directory.get(south).unwrap();
        assert_eq!(view.status, StoreStatus::Closed);
        assert_eq!(view.updated_at, at(18));
    }

    #[test]
    fn updates_replace_name_and_contact() {
        let directory = StoreDirectoryProjection::new();
        let store_id = StoreId::new();
        directory.apply_envelope(&registered(store_id, "Loja")).unwrap();

        let updated = StoreEvent::StoreUpdated(StoreUpdated {
            store_id,
            name: "Loja Centro".to_string(),
            contact: ContactInfo {
                address: Some("Rua A, 1".to_string()),
                phone: None,
            },
            occurred_at: at(10),
        });
        let env = envelope(store_id, 2, updated);
        directory.apply_envelope(&env).unwrap();
        directory.apply_envelope(&env).unwrap();

        let view = directory.get(store_id).unwrap();
        assert_eq!(view.name, "Loja Centro");
        assert_eq!(view.address.as_deref(), Some("Rua A, 1"));
        assert_eq!(view.registered_at, at(8));
    }
}
