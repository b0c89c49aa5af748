use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::{Money, StoreId};
use stockroom_events::EventEnvelope;
use stockroom_inventory::{AlertLevel, InventoryEvent};
use stockroom_products::{ProductDetails, ProductEvent, ProductId, PRODUCT_AGGREGATE_TYPE};

use super::cursor::{decode, ensure_store, CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::ReadTable;

/// Catalog row: product fields plus the ledger's current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cost_price: Money,
    pub sell_price: Money,
    pub quantity: u64,
    pub min_quantity: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ProductView {
    pub fn details(&self) -> ProductDetails {
        ProductDetails {
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            cost_price: self.cost_price,
            sell_price: self.sell_price,
            min_quantity: self.min_quantity,
            category: self.category.clone(),
            supplier: self.supplier.clone(),
        }
    }

    pub fn alert_level(&self) -> Option<AlertLevel> {
        AlertLevel::evaluate(self.quantity, self.min_quantity)
    }

    /// Case-insensitive substring match on name or code.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.name.to_lowercase().contains(&term)
            || self.code.to_lowercase().contains(&term)
    }
}

/// Balance seen on the ledger before the product row exists.
#[derive(Debug, Clone, Copy)]
struct PendingBalance {
    quantity: u64,
    at: DateTime<Utc>,
}

/// Product catalog projection.
///
/// Consumes both catalog (`products.product`) and ledger (`inventory.stock`)
/// envelopes. Deleted products leave the table.
#[derive(Debug)]
pub struct ProductCatalogProjection<T>
where
    T: ReadTable<ProductId, ProductView>,
{
    table: T,
    cursors: StreamCursors,
    pending: RwLock<HashMap<(StoreId, ProductId), PendingBalance>>,
    seen_stores: RwLock<HashSet<StoreId>>,
}

impl<T> ProductCatalogProjection<T>
where
    T: ReadTable<ProductId, ProductView>,
{
    pub fn new(table: T) -> Self {
        Self {
            table,
            cursors: StreamCursors::new(),
            pending: RwLock::new(HashMap::new()),
            seen_stores: RwLock::new(HashSet::new()),
        }
    }

    pub fn get(&self, store_id: StoreId, product_id: &ProductId) -> Option<ProductView> {
        self.table.get(store_id, product_id)
    }

    /// Live products of a store, by code.
    pub fn list(&self, store_id: StoreId) -> Vec<ProductView> {
        let mut rows = self.table.list(store_id);
        rows.sort_by(|a, b| {
            a.code
                .to_lowercase()
                .cmp(&b.code.to_lowercase())
                .then(a.product_id.cmp(&b.product_id))
        });
        rows
    }

    /// Live product holding `code` (case-insensitive), if any.
    pub fn find_by_code(&self, store_id: StoreId, code: &str) -> Option<ProductView> {
        let code = code.trim().to_lowercase();
        self.table
            .list(store_id)
            .into_iter()
            .find(|p| p.code.to_lowercase() == code)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorCheck::Duplicate {
            return Ok(());
        }

        if envelope.aggregate_type() == PRODUCT_AGGREGATE_TYPE {
            self.apply_product(envelope)?;
        } else {
            self.apply_ledger(envelope)?;
        }

        if let Ok(mut seen) = self.seen_stores.write() {
            seen.insert(envelope.store_id());
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    fn apply_product(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let event: ProductEvent = decode(envelope)?;
        let store_id = event.store_id();
        let product_id = event.product_id();
        ensure_store(envelope, store_id)?;
        if product_id.0 != envelope.aggregate_id() {
            return Err(ProjectionError::StoreIsolation(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            ProductEvent::ProductCreated(e) => {
                let pending = self
                    .pending
                    .write()
                    .ok()
                    .and_then(|mut p| p.remove(&(store_id, product_id)));
                let d = e.details;
                self.table.upsert(
                    store_id,
                    product_id,
                    ProductView {
                        product_id,
                        store_id,
                        code: d.code,
                        name: d.name,
                        description: d.description,
                        cost_price: d.cost_price,
                        sell_price: d.sell_price,
                        quantity: pending.map(|p| p.quantity).unwrap_or(0),
                        min_quantity: d.min_quantity,
                        category: d.category,
                        supplier: d.supplier,
                        created_at: e.occurred_at,
                        last_updated: pending.map(|p| p.at.max(e.occurred_at)).unwrap_or(e.occurred_at),
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(mut row) = self.table.get(store_id, &product_id) {
                    let d = e.details;
                    row.code = d.code;
                    row.name = d.name;
                    row.description = d.description;
                    row.cost_price = d.cost_price;
                    row.sell_price = d.sell_price;
                    row.min_quantity = d.min_quantity;
                    row.category = d.category;
                    row.supplier = d.supplier;
                    row.last_updated = e.occurred_at;
                    self.table.upsert(store_id, product_id, row);
                }
            }
            ProductEvent::ProductDeleted(_) => {
                self.table.remove(store_id, &product_id);
            }
        }
        Ok(())
    }

    fn apply_ledger(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let event: InventoryEvent = decode(envelope)?;
        let movement = event.movement();
        ensure_store(envelope, movement.store_id)?;
        let (store_id, product_id) = (movement.store_id, movement.product_id);

        match self.table.get(store_id, &product_id) {
            Some(mut row) => {
                row.quantity = movement.on_hand_after;
                row.last_updated = movement.occurred_at;
                self.table.upsert(store_id, product_id, row);
            }
            None => {
                if let Ok(mut pending) = self.pending.write() {
                    pending.insert(
                        (store_id, product_id),
                        PendingBalance {
                            quantity: movement.on_hand_after,
                            at: movement.occurred_at,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Drop all rows, buffers and cursors (rebuild support).
    pub fn reset(&self) {
        self.cursors.clear();
        if let Ok(mut pending) = self.pending.write() {
            pending.clear();
        }
        if let Ok(mut seen) = self.seen_stores.write() {
            for store_id in seen.drain() {
                self.table.clear_store(store_id);
            }
        }
    }
}
