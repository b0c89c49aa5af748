use std::collections::HashSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::{Actor, Money, StoreId};
use stockroom_events::EventEnvelope;
use stockroom_purchasing::{OrderItem, OrderStatus, PurchaseOrderEvent, PurchaseOrderId};

use super::cursor::{decode, ensure_store, CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadTable;

/// Queryable purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: PurchaseOrderId,
    pub store_id: StoreId,
    pub supplier: String,
    pub items: Vec<OrderItem>,
    pub total_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_by: Actor,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PurchaseOrdersProjection<T>
where
    T: ReadTable<PurchaseOrderId, OrderView>,
{
    table: T,
    cursors: StreamCursors,
    seen_stores: RwLock<HashSet<StoreId>>,
}

impl<T> PurchaseOrdersProjection<T>
where
    T: ReadTable<PurchaseOrderId, OrderView>,
{
    pub fn new(table: T) -> Self {
        Self {
            table,
            cursors: StreamCursors::new(),
            seen_stores: RwLock::new(HashSet::new()),
        }
    }

    pub fn get(&self, store_id: StoreId, order_id: &PurchaseOrderId) -> Option<OrderView> {
        self.table.get(store_id, order_id)
    }

    /// Orders of a store, newest first.
    pub fn list(&self, store_id: StoreId) -> Vec<OrderView> {
        let mut rows = self.table.list(store_id);
        rows.sort_by(|a, b| {
            b.placed_at
                .cmp(&a.placed_at)
                .then(b.order_id.cmp(&a.order_id))
        });
        rows
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: PurchaseOrderEvent = decode(envelope)?;
        let order_id = event.order_id();
        if order_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::StoreIsolation(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            PurchaseOrderEvent::OrderPlaced(e) => {
                ensure_store(envelope, e.store_id)?;
                self.table.upsert(
                    e.store_id,
                    order_id,
                    OrderView {
                        order_id,
                        store_id: e.store_id,
                        supplier: e.supplier,
                        items: e.items,
                        total_value: e.total_value,
                        notes: e.notes,
                        status: OrderStatus::Pending,
                        created_by: e.created_by,
                        placed_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            PurchaseOrderEvent::OrderApproved(e) => {
                ensure_store(envelope, e.store_id)?;
                self.set_status(e.store_id, order_id, OrderStatus::Approved, e.occurred_at);
            }
            PurchaseOrderEvent::OrderCanceled(e) => {
                ensure_store(envelope, e.store_id)?;
                self.set_status(e.store_id, order_id, OrderStatus::Canceled, e.occurred_at);
            }
            PurchaseOrderEvent::OrderDelivered(e) => {
                ensure_store(envelope, e.store_id)?;
                self.set_status(e.store_id, order_id, OrderStatus::Delivered, e.occurred_at);
            }
        }

        if let Ok(mut seen) = self.seen_stores.write() {
            seen.insert(envelope.store_id());
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    fn set_status(&self, store_id: StoreId, order_id: PurchaseOrderId, status: OrderStatus, at: DateTime<Utc>) {
        if let Some(mut row) = self.table.get(store_id, &order_id) {
            row.status = status;
            row.updated_at = at;
            self.table.upsert(store_id, order_id, row);
        }
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
    use chrono::TimeZone;
    use uuid::Uuid;

    use stockroom_core::AggregateId;
    use stockroom_products::ProductId;
    use stockroom_purchasing::{
        OrderApproved, OrderCanceled, OrderDelivered, OrderPlaced, PURCHASE_ORDER_AGGREGATE_TYPE,
    };

    use crate::read_model::InMemoryReadTable;

    type Orders = PurchaseOrdersProjection<InMemoryReadTable<PurchaseOrderId, OrderView>>;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 8, 0, 0).unwrap()
    }

    fn envelope(
        store_id: StoreId,
        order_id: PurchaseOrderId,
        seq: u64,
        event: PurchaseOrderEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            store_id,
            order_id.0,
            PURCHASE_ORDER_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn placed(store_id: StoreId, order_id: PurchaseOrderId, day: u32) -> EventEnvelope<JsonValue> {
        let item = OrderItem {
            product_id: ProductId::new(AggregateId::new()),
            product_name: "Hinge".to_string(),
            quantity: 4,
            unit_price: Money::from_cents(250),
            total_price: Money::from_cents(1000),
        };
        envelope(
            store_id,
            order_id,
            1,
            PurchaseOrderEvent::OrderPlaced(OrderPlaced {
                store_id,
                order_id,
                supplier: "Acme".to_string(),
                items: vec![item],
                total_value: Money::from_cents(1000),
                notes: None,
                created_by: Actor::named("Ana").unwrap(),
                occurred_at: at(day),
            }),
        )
    }

    fn new_order() -> (StoreId, PurchaseOrderId) {
        (StoreId::new(), PurchaseOrderId::new(AggregateId::new()))
    }

    #[test]
    fn statuses_follow_the_order_lifecycle() {
        let orders = Orders::new(InMemoryReadTable::new());
        let (store_id, order_id) = new_order();

        orders.apply_envelope(&placed(store_id, order_id, 1)).unwrap();
        assert_eq!(orders.get(store_id, &order_id).unwrap().status, OrderStatus::Pending);

        let approved = OrderApproved { store_id, order_id, occurred_at: at(2) };
        orders
            .apply_envelope(&envelope(store_id, order_id, 2, PurchaseOrderEvent::OrderApproved(approved)))
            .unwrap();
        assert_eq!(orders.get(store_id, &order_id).unwrap().status, OrderStatus::Approved);

        let items = orders.get(store_id, &order_id).unwrap().items;
        let delivered = OrderDelivered { store_id, order_id, items, occurred_at: at(3) };
        orders
            .apply_envelope(&envelope(store_id, order_id, 3, PurchaseOrderEvent::OrderDelivered(delivered)))
            .unwrap();

        let view = orders.get(store_id, &order_id).unwrap();
        assert_eq!(view.status, OrderStatus::Delivered);
        assert_eq!(view.placed_at, at(1));
        assert_eq!(view.updated_at, at(3));
    }

    #[test]
    fn canceled_orders_keep_their_items() {
        let orders = Orders::new(InMemoryReadTable::new());
        let (store_id, order_id) = new_order();
        orders.apply_envelope(&placed(store_id, order_id, 1)).unwrap();

        let canceled = OrderCanceled { store_id, order_id, occurred_at: at(4) };
        let env = envelope(store_id, order_id, 2, PurchaseOrderEvent::OrderCanceled(canceled));
        orders.apply_envelope(&env).unwrap();
        orders.apply_envelope(&env).unwrap();

        let view = orders.get(store_id, &order_id).unwrap();
        assert_eq!(view.status, OrderStatus::Canceled);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.total_value, Money::from_cents(1000));
    }

    #[test]
    fn list_is_newest_first_and_scoped_by_store() {
        let orders = Orders::new(InMemoryReadTable::new());
        let store_id = StoreId::new();
        let older = PurchaseOrderId::new(AggregateId::new());
        let newer = PurchaseOrderId::new(AggregateId::new());
        orders.apply_envelope(&placed(store_id, older, 1)).unwrap();
        orders.apply_envelope(&placed(store_id, newer, 5)).unwrap();
        let (other_store, other_order) = new_order();
        orders.apply_envelope(&placed(other_store, other_order, 9)).unwrap();

        let ids: Vec<_> = orders.list(store_id).into_iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![newer, older]);
        assert!(orders.get(store_id, &other_order).is_none());
    }

    #[test]
    fn envelope_store_must_match_the_event() {
        let orders = Orders::new(InMemoryReadTable::new());
        let (store_id, order_id) = new_order();
        let mut env = placed(store_id, order_id, 1);
        env = EventEnvelope::new(
            env.event_id(),
            StoreId::new(),
            env.aggregate_id(),
            env.aggregate_type().to_string(),
            env.sequence_number(),
            env.into_payload(),
        );
        assert!(orders.apply_envelope(&env).is_err());
        assert!(orders.list(store_id).is_empty());
    }
}
