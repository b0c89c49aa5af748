use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, Money, StoreId};
use stockroom_events::Event;
use stockroom_products::ProductId;

/// Stream type of purchase orders.
pub const PURCHASE_ORDER_AGGREGATE_TYPE: &str = "purchasing.order";

/// Purchase order identifier (store-scoped via `store_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for PurchaseOrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested line, before merging and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u64,
    pub unit_price: Money,
}

/// A priced order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u64,
    pub unit_price: Money,
    pub total_price: Money,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    store_id: Option<StoreId>,
    supplier: String,
    items: Vec<OrderItem>,
    total_value: Money,
    status: OrderStatus,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            store_id: None,
            supplier: String::new(),
            items: Vec::new(),
            total_value: Money::ZERO,
            status: OrderStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn supplier(&self) -> &str {
        &self.supplier
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_value(&self) -> Money {
        self.total_value
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub supplier: String,
    pub lines: Vec<OrderLine>,
    pub notes: Option<String>,
    pub created_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    PlaceOrder(PlaceOrder),
    ApproveOrder(ApproveOrder),
    CancelOrder(CancelOrder),
    DeliverOrder(DeliverOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub supplier: String,
    pub items: Vec<OrderItem>,
    pub total_value: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
///
/// Carries the delivered items so the caller can record the matching stock
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub store_id: StoreId,
    pub order_id: PurchaseOrderId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    OrderPlaced(OrderPlaced),
    OrderApproved(OrderApproved),
    OrderCanceled(OrderCanceled),
    OrderDelivered(OrderDelivered),
}

impl PurchaseOrderEvent {
    pub fn order_id(&self) -> PurchaseOrderId {
        match self {
            PurchaseOrderEvent::OrderPlaced(e) => e.order_id,
            PurchaseOrderEvent::OrderApproved(e) => e.order_id,
            PurchaseOrderEvent::OrderCanceled(e) => e.order_id,
            PurchaseOrderEvent::OrderDelivered(e) => e.order_id,
        }
    }
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::OrderPlaced(_) => "purchasing.order.placed",
            PurchaseOrderEvent::OrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::OrderCanceled(_) => "purchasing.order.canceled",
            PurchaseOrderEvent::OrderDelivered(_) => "purchasing.order.delivered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::OrderPlaced(e) => e.occurred_at,
            PurchaseOrderEvent::OrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::OrderCanceled(e) => e.occurred_at,
            PurchaseOrderEvent::OrderDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.store_id = Some(e.store_id);
                self.supplier = e.supplier.clone();
                self.items = e.items.clone();
                self.total_value = e.total_value;
                self.status = OrderStatus::Pending;
                self.created = true;
            }
            PurchaseOrderEvent::OrderApproved(_) => {
                self.status = OrderStatus::Approved;
            }
            PurchaseOrderEvent::OrderCanceled(_) => {
                self.status = OrderStatus::Canceled;
            }
            PurchaseOrderEvent::OrderDelivered(_) => {
                self.status = OrderStatus::Delivered;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            PurchaseOrderCommand::ApproveOrder(cmd) => {
                self.ensure_transition(cmd.store_id, cmd.order_id, OrderStatus::Pending, "approved")?;
                Ok(vec![PurchaseOrderEvent::OrderApproved(OrderApproved {
                    store_id: cmd.store_id,
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PurchaseOrderCommand::CancelOrder(cmd) => {
                self.ensure_transition(cmd.store_id, cmd.order_id, OrderStatus::Pending, "canceled")?;
                Ok(vec![PurchaseOrderEvent::OrderCanceled(OrderCanceled {
                    store_id: cmd.store_id,
                    order_id: cmd.order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            PurchaseOrderCommand::DeliverOrder(cmd) => {
                self.ensure_transition(cmd.store_id, cmd.order_id, OrderStatus::Approved, "delivered")?;
                Ok(vec![PurchaseOrderEvent::OrderDelivered(OrderDelivered {
                    store_id: cmd.store_id,
                    order_id: cmd.order_id,
                    items: self.items.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl PurchaseOrder {
    fn ensure_store(&self, store_id: StoreId) -> Result<(), DomainError> {
        if self.store_id != Some(store_id) {
            return Err(DomainError::invariant("store mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_transition(
        &self,
        store_id: StoreId,
        order_id: PurchaseOrderId,
        from: OrderStatus,
        to: &str,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_store(store_id)?;
        self.ensure_order_id(order_id)?;
        if self.status != from {
            return Err(DomainError::invariant(format!(
                "a {} order cannot be {to}",
                self.status
            )));
        }
        Ok(())
    }

    /// Merge lines per product (quantities summed, first unit price kept) and
    /// price them.
    fn merge_lines(lines: &[OrderLine]) -> Result<(Vec<OrderItem>, Money), DomainError> {
        let overflow = || DomainError::validation("order total is too large");

        let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for '{}' must be greater than zero",
                    line.product_name
                )));
            }
            match merged.iter_mut().find(|m| m.product_id == line.product_id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(line.quantity)
                        .ok_or_else(overflow)?;
                }
                None => merged.push(line.clone()),
            }
        }

        let mut total = Money::ZERO;
        let mut items = Vec::with_capacity(merged.len());
        for line in merged {
            let total_price = line.unit_price.checked_mul(line.quantity).ok_or_else(overflow)?;
            total = total.checked_add(total_price).ok_or_else(overflow)?;
            items.push(OrderItem {
                product_id: line.product_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price,
            });
        }
        Ok((items, total))
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        let supplier = cmd.supplier.trim();
        if supplier.is_empty() {
            return Err(DomainError::validation("supplier cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one item"));
        }
        let (items, total_value) = Self::merge_lines(&cmd.lines)?;
        let notes = cmd
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(vec![PurchaseOrderEvent::OrderPlaced(OrderPlaced {
            store_id: cmd.store_id,
            order_id: cmd.order_id,
            supplier: supplier.to_string(),
            items,
            total_value,
            notes,
            created_by: cmd.created_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
