//! Projections (read model builders).
//!
//! Projections consume committed envelopes and build query-side views. They
//! are rebuildable from the log and idempotent under redelivery.

pub mod catalog;
pub mod cursor;
pub mod movements;
pub mod orders;
pub mod stores;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_events::EventEnvelope;
use stockroom_inventory::{StockMovement, STOCK_LEDGER_AGGREGATE_TYPE};
use stockroom_products::{ProductId, PRODUCT_AGGREGATE_TYPE};
use stockroom_purchasing::{PurchaseOrderId, PURCHASE_ORDER_AGGREGATE_TYPE};
use stockroom_stores::STORE_AGGREGATE_TYPE;

use crate::read_model::InMemoryReadTable;

pub use catalog::{ProductCatalogProjection, ProductView};
pub use cursor::{CursorCheck, ProjectionError, StreamCursors};
pub use movements::{MovementFilter, MovementLedgerProjection};
pub use orders::{OrderView, PurchaseOrdersProjection};
pub use stores::{StoreDirectoryProjection, StoreView};

/// Every read model of the application, fed from one envelope stream.
#[derive(Debug)]
pub struct Projections {
    pub stores: StoreDirectoryProjection,
    pub catalog: ProductCatalogProjection<InMemoryReadTable<ProductId, ProductView>>,
    pub movements: MovementLedgerProjection<InMemoryReadTable<Uuid, StockMovement>>,
    pub orders: PurchaseOrdersProjection<InMemoryReadTable<PurchaseOrderId, OrderView>>,
}

impl Default for Projections {
    fn default() -> Self {
        Self::new()
    }
}

impl Projections {
    pub fn new() -> Self {
        Self {
            stores: StoreDirectoryProjection::new(),
            catalog: ProductCatalogProjection::new(InMemoryReadTable::new()),
            movements: MovementLedgerProjection::new(InMemoryReadTable::new()),
            orders: PurchaseOrdersProjection::new(InMemoryReadTable::new()),
        }
    }

    /// Route an envelope to the projections that read its stream type.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            STORE_AGGREGATE_TYPE => self.stores.apply_envelope(envelope),
            PRODUCT_AGGREGATE_TYPE => self.catalog.apply_envelope(envelope),
            STOCK_LEDGER_AGGREGATE_TYPE => {
                self.catalog.apply_envelope(envelope)?;
                self.movements.apply_envelope(envelope)
            }
            PURCHASE_ORDER_AGGREGATE_TYPE => self.orders.apply_envelope(envelope),
            other => {
                tracing::debug!(aggregate_type = other, "no projection for stream type");
                Ok(())
            }
        }
    }

    /// Drop every read model and replay `envelopes` in order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        self.stores.reset();
        self.catalog.reset();
        self.movements.reset();
        self.orders.reset();

        let mut applied = 0;
        for env in envelopes {
            self.apply_envelope(&env)?;
            applied += 1;
        }
        tracing::debug!(events = applied, "projections rebuilt");
        Ok(applied)
    }
}
