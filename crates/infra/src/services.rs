//! Application service: the inventory operations, composed from the event
//! store, the dispatcher and the projections.
//!
//! Every command goes through the dispatcher; committed envelopes are drained
//! from the bus into the projections before the call returns, so reads issued
//! right after a write observe it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockroom_core::{Actor, Aggregate, AggregateId, DomainError, Money, StoreId};
use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockroom_inventory::{
    AlertLevel, InventoryCommand, MovementKind, MovementRequest, RecordEntry, RecordExit, StockLedger,
    StockMovement, STOCK_LEDGER_AGGREGATE_TYPE,
};
use stockroom_products::{
    CreateProduct, DeleteProduct, Product, ProductCommand, ProductDetails, ProductId, UpdateProduct,
    PRODUCT_AGGREGATE_TYPE,
};
use stockroom_purchasing::{
    ApproveOrder, CancelOrder, DeliverOrder, OrderItem, OrderLine, OrderStatus, PlaceOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, PURCHASE_ORDER_AGGREGATE_TYPE,
};
use stockroom_stores::{
    CloseStore, ContactInfo, RegisterStore, Store, StoreCommand, UpdateStore, STORE_AGGREGATE_TYPE,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, JsonFileEventStore, StoredEvent};
use crate::projections::{
    MovementFilter, OrderView, ProductView, ProjectionError, Projections, StoreView,
};

/// Reason recorded on the entry created for a product's opening quantity.
pub const OPENING_BALANCE_REASON: &str = "opening balance";
/// Reason recorded on entries created when an order is delivered.
pub const ORDER_DELIVERY_REASON: &str = "order delivery";

type Envelope = EventEnvelope<JsonValue>;
type Bus = Arc<InMemoryEventBus<Envelope>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: u64,
        available: u64,
    },

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("read model update failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("report output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => ServiceError::Validation(msg),
            DispatchError::InvariantViolation(msg) => ServiceError::InvalidOperation(msg),
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            DispatchError::NotFound => ServiceError::NotFound("record".to_string()),
            DispatchError::InsufficientStock { requested, available } => ServiceError::InsufficientStock {
                product: "product".to_string(),
                requested,
                available,
            },
            DispatchError::Store(e) => ServiceError::Store(e),
            other => ServiceError::Dispatch(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

/// Quantity and optional overrides for one movement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementInput {
    pub quantity: u64,
    /// Defaults to the cost price for entries and the sell price for exits.
    pub unit_price: Option<Money>,
    pub reason: Option<String>,
    pub document_number: Option<String>,
}

impl MovementInput {
    pub fn quantity(quantity: u64) -> Self {
        Self {
            quantity,
            ..Self::default()
        }
    }
}

/// A product at or below its minimum quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlert {
    #[serde(flatten)]
    pub product: ProductView,
    pub level: AlertLevel,
}

/// The inventory application service.
///
/// Writes that validate against the read models before dispatching (code
/// uniqueness, delivery pre-checks) hold `writes` from the check to the
/// dispatch, so concurrent callers cannot both pass the same check.
pub struct Stockroom {
    dispatcher: CommandDispatcher<Arc<dyn EventStore>, Bus>,
    subscription: Mutex<Subscription<Envelope>>,
    projections: Projections,
    writes: Mutex<()>,
}

impl core::fmt::Debug for Stockroom {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stockroom")
            .field("projections", &self.projections)
            .finish_non_exhaustive()
    }
}

impl Stockroom {
    /// Open over an event store, replaying its whole log into the read models
    /// and finishing any delivery whose stock entries were never recorded.
    pub fn open(store: Arc<dyn EventStore>) -> Result<Self, ServiceError> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let projections = Projections::new();

        let history = store.load_all()?;
        let replayed = projections.rebuild_from_scratch(history.iter().map(StoredEvent::to_envelope))?;
        tracing::debug!(events = replayed, "stockroom opened");

        let room = Self {
            dispatcher: CommandDispatcher::new(store, bus),
            subscription: Mutex::new(subscription),
            projections,
            writes: Mutex::new(()),
        };
        room.reconcile_deliveries()?;
        Ok(room)
    }

    /// Open over the JSON event log at `path` (created on first write).
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let store = JsonFileEventStore::open(path.as_ref())?;
        Self::open(Arc::new(store))
    }

    /// Volatile instance, for tests and dry runs.
    pub fn in_memory() -> Result<Self, ServiceError> {
        Self::open(Arc::new(InMemoryEventStore::new()))
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply everything published since the last sync. The lock is held while
    /// applying so envelopes reach the projections in publication order.
    fn sync(&self) -> Result<(), ServiceError> {
        let subscription = self.subscription.lock().unwrap_or_else(PoisonError::into_inner);
        for env in subscription.drain() {
            self.projections.apply_envelope(&env)?;
        }
        Ok(())
    }

    fn dispatch<A>(
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
        let result = self
            .dispatcher
            .dispatch(store_id, aggregate_id, aggregate_type, command, make_aggregate);
        if let Err(e) = &result {
            tracing::warn!(aggregate_type, %aggregate_id, error = %e, "command rejected");
        }
        result
    }

    // ---- stores ----------------------------------------------------------

    pub fn register_store(&self, name: &str, contact: ContactInfo) -> Result<StoreView, ServiceError> {
        let store_id = StoreId::new();
        let cmd = StoreCommand::RegisterStore(RegisterStore {
            store_id,
            name: name.to_string(),
            contact,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, Store::stream_id(store_id), STORE_AGGREGATE_TYPE, cmd, |s, _| {
            Store::empty(s)
        })?;
        self.sync()?;

        let view = self.get_store(store_id)?;
        tracing::info!(%store_id, name = %view.name, "store registered");
        Ok(view)
    }

    pub fn update_store(
        &self,
        store_id: StoreId,
        name: &str,
        contact: ContactInfo,
    ) -> Result<StoreView, ServiceError> {
        self.open_store(store_id)?;
        let cmd = StoreCommand::UpdateStore(UpdateStore {
            store_id,
            name: name.to_string(),
            contact,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, Store::stream_id(store_id), STORE_AGGREGATE_TYPE, cmd, |s, _| {
            Store::empty(s)
        })?;
        self.sync()?;
        tracing::info!(%store_id, "store updated");
        self.get_store(store_id)
    }

    pub fn close_store(&self, store_id: StoreId) -> Result<StoreView, ServiceError> {
        self.get_store(store_id)?;
        let cmd = StoreCommand::CloseStore(CloseStore {
            store_id,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, Store::stream_id(store_id), STORE_AGGREGATE_TYPE, cmd, |s, _| {
            Store::empty(s)
        })?;
        self.sync()?;
        tracing::info!(%store_id, "store closed");
        self.get_store(store_id)
    }

    /// Open stores, by name.
    pub fn list_stores(&self) -> Vec<StoreView> {
        self.projections.stores.list_open()
    }

    /// Any registered store, open or closed.
    pub fn get_store(&self, store_id: StoreId) -> Result<StoreView, ServiceError> {
        self.projections
            .stores
            .get(store_id)
            .ok_or_else(|| ServiceError::NotFound(format!("store {store_id}")))
    }

    fn open_store(&self, store_id: StoreId) -> Result<StoreView, ServiceError> {
        match self.projections.stores.get(store_id) {
            Some(view) if view.status == stockroom_stores::StoreStatus::Open => Ok(view),
            _ => Err(ServiceError::NotFound(format!("store {store_id}"))),
        }
    }

    // ---- products --------------------------------------------------------

    fn ensure_code_free(
        &self,
        store_id: StoreId,
        code: &str,
        except: Option<ProductId>,
    ) -> Result<(), ServiceError> {
        match self.projections.catalog.find_by_code(store_id, code) {
            Some(existing) if Some(existing.product_id) != except => Err(ServiceError::Conflict(format!(
                "product code '{}' is already used by {}",
                existing.code, existing.name
            ))),
            _ => Ok(()),
        }
    }

    /// Create a product. A positive `opening_quantity` is recorded as an entry
    /// movement at cost price.
    pub fn add_product(
        &self,
        store_id: StoreId,
        details: ProductDetails,
        opening_quantity: u64,
        actor: &Actor,
    ) -> Result<ProductView, ServiceError> {
        let _guard = self.write_guard();
        self.open_store(store_id)?;
        let details = details.normalized()?;
        self.ensure_code_free(store_id, &details.code, None)?;

        let product_id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            store_id,
            product_id,
            details,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, |_, id| {
            Product::empty(ProductId::new(id))
        })?;
        self.sync()?;
        tracing::info!(%store_id, %product_id, "product added");

        if opening_quantity > 0 {
            let input = MovementInput {
                quantity: opening_quantity,
                reason: Some(OPENING_BALANCE_REASON.to_string()),
                ..MovementInput::default()
            };
            self.record_entry(store_id, product_id, input, actor)?;
        }
        self.get_product(store_id, product_id)
    }

    /// Replace a product's catalog fields. The quantity is owned by the ledger
    /// and is not part of the update.
    pub fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        details: ProductDetails,
    ) -> Result<ProductView, ServiceError> {
        let _guard = self.write_guard();
        self.open_store(store_id)?;
        self.get_product(store_id, product_id)?;
        let details = details.normalized()?;
        self.ensure_code_free(store_id, &details.code, Some(product_id))?;

        let cmd = ProductCommand::UpdateProduct(UpdateProduct {
            store_id,
            product_id,
            details,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, |_, id| {
            Product::empty(ProductId::new(id))
        })?;
        self.sync()?;
        tracing::info!(%store_id, %product_id, "product updated");
        self.get_product(store_id, product_id)
    }

    /// Remove a product from the catalog. Its movement history is kept.
    pub fn delete_product(&self, store_id: StoreId, product_id: ProductId) -> Result<ProductView, ServiceError> {
        self.open_store(store_id)?;
        let view = self.get_product(store_id, product_id)?;
        let cmd = ProductCommand::DeleteProduct(DeleteProduct {
            store_id,
            product_id,
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, |_, id| {
            Product::empty(ProductId::new(id))
        })?;
        self.sync()?;
        tracing::info!(%store_id, %product_id, code = %view.code, "product deleted");
        Ok(view)
    }

    pub fn get_product(&self, store_id: StoreId, product_id: ProductId) -> Result<ProductView, ServiceError> {
        self.projections
            .catalog
            .get(store_id, &product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))
    }

    /// Live products, by code.
    pub fn list_products(&self, store_id: StoreId) -> Vec<ProductView> {
        self.projections.catalog.list(store_id)
    }

    /// Products whose name or code contains `term`, ignoring case.
    pub fn search_products(&self, store_id: StoreId, term: &str) -> Vec<ProductView> {
        self.list_products(store_id)
            .into_iter()
            .filter(|p| p.matches(term))
            .collect()
    }

    // ---- movements -------------------------------------------------------

    fn record_movement(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        kind: MovementKind,
        input: MovementInput,
        actor: &Actor,
    ) -> Result<StockMovement, ServiceError> {
        self.open_store(store_id)?;
        let product = self.get_product(store_id, product_id)?;
        let default_price = match kind {
            MovementKind::Entry => product.cost_price,
            MovementKind::Exit => product.sell_price,
        };
        let request = MovementRequest {
            store_id,
            product_id,
            movement_id: Uuid::now_v7(),
            product_name: product.name.clone(),
            quantity: input.quantity,
            unit_price: input.unit_price.unwrap_or(default_price),
            reason: input.reason,
            document_number: input.document_number,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        };
        let cmd = match kind {
            MovementKind::Entry => InventoryCommand::RecordEntry(RecordEntry(request)),
            MovementKind::Exit => InventoryCommand::RecordExit(RecordExit(request)),
        };

        let committed = self
            .dispatch(store_id, product_id.0, STOCK_LEDGER_AGGREGATE_TYPE, cmd, |_, id| {
                StockLedger::empty(ProductId::new(id))
            })
            .map_err(|e| match e {
                DispatchError::InsufficientStock { requested, available } => ServiceError::InsufficientStock {
                    product: product.name.clone(),
                    requested,
                    available,
                },
                other => other.into(),
            })?;
        self.sync()?;

        let stored = committed
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidOperation("movement produced no event".to_string()))?;
        let movement = serde_json::from_value::<stockroom_inventory::InventoryEvent>(stored.payload)?
            .into_movement();
        tracing::info!(
            %store_id,
            %product_id,
            kind = %movement.kind,
            quantity = movement.quantity,
            on_hand = movement.on_hand_after,
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// Receive goods. The unit price defaults to the product's cost price.
    pub fn record_entry(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        input: MovementInput,
        actor: &Actor,
    ) -> Result<StockMovement, ServiceError> {
        self.record_movement(store_id, product_id, MovementKind::Entry, input, actor)
    }

    /// Take goods out. Refused, with nothing recorded, when the quantity
    /// exceeds what is on hand. The unit price defaults to the sell price.
    pub fn record_exit(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        input: MovementInput,
        actor: &Actor,
    ) -> Result<StockMovement, ServiceError> {
        self.record_movement(store_id, product_id, MovementKind::Exit, input, actor)
    }

    /// Movement history, newest first.
    pub fn list_movements(&self, store_id: StoreId, filter: &MovementFilter) -> Vec<StockMovement> {
        self.projections.movements.query(store_id, filter)
    }

    // ---- orders ----------------------------------------------------------

    /// Place a purchase order. Names and unit prices (cost price) come from
    /// the catalog; repeated products are merged.
    pub fn place_order(
        &self,
        store_id: StoreId,
        supplier: &str,
        lines: &[(ProductId, u64)],
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        self.open_store(store_id)?;
        let lines = lines
            .iter()
            .map(|(product_id, quantity)| {
                let product = self.get_product(store_id, *product_id)?;
                Ok(OrderLine {
                    product_id: *product_id,
                    product_name: product.name,
                    quantity: *quantity,
                    unit_price: product.cost_price,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let order_id = PurchaseOrderId::new(AggregateId::new());
        let cmd = PurchaseOrderCommand::PlaceOrder(PlaceOrder {
            store_id,
            order_id,
            supplier: supplier.to_string(),
            lines,
            notes,
            created_by: actor.clone(),
            occurred_at: Utc::now(),
        });
        self.dispatch(store_id, order_id.0, PURCHASE_ORDER_AGGREGATE_TYPE, cmd, |_, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        self.sync()?;

        let view = self.get_order(store_id, order_id)?;
        tracing::info!(%store_id, %order_id, total = %view.total_value, "purchase order placed");
        Ok(view)
    }

    fn transition_order(
        &self,
        store_id: StoreId,
        order_id: PurchaseOrderId,
        cmd: PurchaseOrderCommand,
    ) -> Result<OrderView, ServiceError> {
        self.open_store(store_id)?;
        self.get_order(store_id, order_id)?;
        self.dispatch(store_id, order_id.0, PURCHASE_ORDER_AGGREGATE_TYPE, cmd, |_, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        self.sync()?;
        let view = self.get_order(store_id, order_id)?;
        tracing::info!(%store_id, %order_id, status = %view.status, "purchase order updated");
        Ok(view)
    }

    pub fn approve_order(&self, store_id: StoreId, order_id: PurchaseOrderId) -> Result<OrderView, ServiceError> {
        let cmd = PurchaseOrderCommand::ApproveOrder(ApproveOrder {
            store_id,
            order_id,
            occurred_at: Utc::now(),
        });
        self.transition_order(store_id, order_id, cmd)
    }

    pub fn cancel_order(&self, store_id: StoreId, order_id: PurchaseOrderId) -> Result<OrderView, ServiceError> {
        let cmd = PurchaseOrderCommand::CancelOrder(CancelOrder {
            store_id,
            order_id,
            occurred_at: Utc::now(),
        });
        self.transition_order(store_id, order_id, cmd)
    }

    /// Mark an approved order delivered and receive its items into stock.
    /// Items whose product was deleted in the meantime are skipped.
    ///
    /// Every item is checked against its current balance first, so a
    /// delivery that cannot be stocked in full is refused before the order
    /// changes state.
    pub fn deliver_order(
        &self,
        store_id: StoreId,
        order_id: PurchaseOrderId,
        actor: &Actor,
    ) -> Result<OrderView, ServiceError> {
        let _guard = self.write_guard();
        let order = self.get_order(store_id, order_id)?;
        for item in &order.items {
            match self.projections.catalog.get(store_id, &item.product_id) {
                Some(product) if product.quantity.checked_add(item.quantity).is_none() => {
                    return Err(ServiceError::Validation(format!(
                        "delivering {} {} would overflow its stock balance of {}",
                        item.quantity, product.name, product.quantity
                    )));
                }
                Some(_) => {}
                None => tracing::warn!(
                    %order_id,
                    product_id = %item.product_id,
                    product = %item.product_name,
                    "delivered item no longer in catalog, stock not replenished"
                ),
            }
        }

        let cmd = PurchaseOrderCommand::DeliverOrder(DeliverOrder {
            store_id,
            order_id,
            occurred_at: Utc::now(),
        });
        let view = self.transition_order(store_id, order_id, cmd)?;
        self.replenish(&view, actor)?;
        Ok(view)
    }

    /// Items of a delivered order whose product is still in the catalog but
    /// has no delivery entry for this order yet.
    fn unreceived_items<'a>(&self, order: &'a OrderView) -> Vec<&'a OrderItem> {
        let document = order.order_id.to_string();
        order
            .items
            .iter()
            .filter(|item| self.projections.catalog.get(order.store_id, &item.product_id).is_some())
            .filter(|item| {
                let filter = MovementFilter {
                    kind: Some(MovementKind::Entry),
                    product_id: Some(item.product_id),
                    ..MovementFilter::default()
                };
                !self
                    .list_movements(order.store_id, &filter)
                    .iter()
                    .any(|m| m.document_number.as_deref() == Some(document.as_str()))
            })
            .collect()
    }

    /// Record the delivery entries still missing for `order`.
    fn replenish(&self, order: &OrderView, actor: &Actor) -> Result<usize, ServiceError> {
        let pending = self.unreceived_items(order);
        for item in &pending {
            let input = MovementInput {
                quantity: item.quantity,
                unit_price: Some(item.unit_price),
                reason: Some(ORDER_DELIVERY_REASON.to_string()),
                document_number: Some(order.order_id.to_string()),
            };
            self.record_entry(order.store_id, item.product_id, input, actor)?;
        }
        Ok(pending.len())
    }

    /// Record the stock entries of delivered orders that were interrupted
    /// between the status change and their entries. Entries are attributed to
    /// whoever placed the order. Returns the number of entries recorded.
    ///
    /// An entry that still cannot be recorded is logged and left for the next
    /// run; it does not prevent the rest of the inventory from opening.
    pub fn reconcile_deliveries(&self) -> Result<usize, ServiceError> {
        let _guard = self.write_guard();
        let mut recorded = 0;
        for store in self.list_stores() {
            for order in self.list_orders(store.store_id) {
                if order.status != OrderStatus::Delivered || self.unreceived_items(&order).is_empty() {
                    continue;
                }
                match self.replenish(&order, &order.created_by) {
                    Ok(n) => {
                        tracing::info!(order_id = %order.order_id, entries = n, "interrupted delivery completed");
                        recorded += n;
                    }
                    Err(e) => tracing::warn!(
                        order_id = %order.order_id,
                        error = %e,
                        "delivered order still missing stock entries"
                    ),
                }
            }
        }
        Ok(recorded)
    }

    /// Orders, newest first.
    pub fn list_orders(&self, store_id: StoreId) -> Vec<OrderView> {
        self.projections.orders.list(store_id)
    }

    pub fn get_order(&self, store_id: StoreId, order_id: PurchaseOrderId) -> Result<OrderView, ServiceError> {
        self.projections
            .orders
            .get(store_id, &order_id)
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    // ---- alerts ----------------------------------------------------------

    /// Products at or below their minimum, lowest quantity first.
    pub fn alerts(&self, store_id: StoreId) -> Vec<StockAlert> {
        let mut alerts: Vec<StockAlert> = self
            .list_products(store_id)
            .into_iter()
            .filter_map(|product| {
                product
                    .alert_level()
                    .map(|level| StockAlert { product, level })
            })
            .collect();
        alerts.sort_by(|a, b| {
            a.product
                .quantity
                .cmp(&b.product.quantity)
                .then_with(|| a.product.code.to_lowercase().cmp(&b.product.code.to_lowercase()))
        });
        alerts
    }
}
