use std::collections::HashSet;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_core::StoreId;
use stockroom_events::EventEnvelope;
use stockroom_inventory::{InventoryEvent, MovementKind, StockMovement};
use stockroom_products::ProductId;

use super::cursor::{decode, ensure_store, CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadTable;

/// Movement history query. Dates are whole UTC calendar days, both inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub kind: Option<MovementKind>,
    pub product_id: Option<ProductId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl MovementFilter {
    pub fn matches(&self, m: &StockMovement) -> bool {
        let day = m.occurred_at.date_naive();
        self.kind.is_none_or(|k| k == m.kind)
            && self.product_id.is_none_or(|p| p == m.product_id)
            && self.from.is_none_or(|from| day >= from)
            && self.to.is_none_or(|to| day <= to)
    }
}

/// Movement history projection (one row per recorded movement).
#[derive(Debug)]
pub struct MovementLedgerProjection<T>
where
    T: ReadTable<Uuid, StockMovement>,
{
    table: T,
    cursors: StreamCursors,
    seen_stores: RwLock<HashSet<StoreId>>,
}

impl<T> MovementLedgerProjection<T>
where
    T: ReadTable<Uuid, StockMovement>,
{
    pub fn new(table: T) -> Self {
        Self {
            table,
            cursors: StreamCursors::new(),
            seen_stores: RwLock::new(HashSet::new()),
        }
    }

    /// Matching movements, newest first.
    pub fn query(&self, store_id: StoreId, filter: &MovementFilter) -> Vec<StockMovement> {
        let mut rows: Vec<StockMovement> = self
            .table
            .list(store_id)
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();
        rows.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then(b.movement_id.cmp(&a.movement_id))
        });
        rows
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let movement = decode::<InventoryEvent>(envelope)?.into_movement();
        ensure_store(envelope, movement.store_id)?;
        if movement.product_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::StoreIsolation(
                "movement product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let store_id = movement.store_id;
        self.table.upsert(store_id, movement.movement_id, movement);
        if let Ok(mut seen) = self.seen_stores.write() {
            seen.insert(store_id);
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    /// Drop all rows and cursors (rebuild support).
    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut seen) = self.seen_stores.write() {
            for store_id in seen.drain() {
                self.table.clear_store(store_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockroom_core::{Actor, AggregateId, Money};

    fn movement(kind: MovementKind, day: u32, hour: u32) -> StockMovement {
        StockMovement {
            movement_id: Uuid::now_v7(),
            store_id: StoreId::new(),
            product_id: ProductId::new(AggregateId::new()),
            product_name: "Radiator".to_string(),
            kind,
            quantity: 1,
            unit_price: Money::ZERO,
            reason: None,
            document_number: None,
            actor: Actor::named("Ana").unwrap(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
            on_hand_after: 1,
        }
    }

    #[test]
    fn date_bounds_include_the_whole_end_day() {
        let filter = MovementFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 10),
            to: NaiveDate::from_ymd_opt(2024, 3, 12),
            ..MovementFilter::default()
        };
        assert!(filter.matches(&movement(MovementKind::Entry, 10, 0)));
        assert!(filter.matches(&movement(MovementKind::Entry, 12, 23)));
        assert!(!filter.matches(&movement(MovementKind::Entry, 9, 23)));
        assert!(!filter.matches(&movement(MovementKind::Entry, 13, 0)));
    }

    #[test]
    fn kind_filter_selects_direction() {
        let filter = MovementFilter {
            kind: Some(MovementKind::Exit),
            ..MovementFilter::default()
        };
        assert!(filter.matches(&movement(MovementKind::Exit, 1, 1)));
        assert!(!filter.matches(&movement(MovementKind::Entry, 1, 1)));
    }
}
