use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::{Actor, Aggregate, AggregateRoot, DomainError, Money, StoreId};
use stockroom_events::Event;
use stockroom_products::ProductId;

/// Stream type of stock ledgers. A ledger shares its aggregate id with the
/// product it tracks.
pub const STOCK_LEDGER_AGGREGATE_TYPE: &str = "inventory.stock";

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Entry,
    Exit,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(MovementKind::Entry),
            "exit" | "out" => Ok(MovementKind::Exit),
            other => Err(DomainError::validation(format!(
                "unknown movement kind '{other}' (expected entry or exit)"
            ))),
        }
    }
}

/// A recorded stock movement. This is the body of both ledger events and the
/// row type of the movement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: Uuid,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub product_name: String,
    pub kind: MovementKind,
    pub quantity: u64,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    /// Ledger balance right after this movement.
    pub on_hand_after: u64,
}

impl StockMovement {
    /// `quantity × unit_price`, saturating at the maximum amount.
    pub fn total_value(&self) -> Money {
        self.unit_price
            .checked_mul(self.quantity)
            .unwrap_or(Money::from_cents(u64::MAX))
    }
}

/// Input shared by entry and exit commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub movement_id: Uuid,
    pub product_name: String,
    pub quantity: u64,
    pub unit_price: Money,
    pub reason: Option<String>,
    pub document_number: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordEntry (goods received).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry(pub MovementRequest);

/// Command: RecordExit (goods leaving the store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExit(pub MovementRequest);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RecordEntry(RecordEntry),
    RecordExit(RecordExit),
}

/// Event: StockEntered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntered(pub StockMovement);

/// Event: StockExited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockExited(pub StockMovement);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    StockEntered(StockEntered),
    StockExited(StockExited),
}

impl InventoryEvent {
    pub fn movement(&self) -> &StockMovement {
        match self {
            InventoryEvent::StockEntered(StockEntered(m)) => m,
            InventoryEvent::StockExited(StockExited(m)) => m,
        }
    }

    pub fn into_movement(self) -> StockMovement {
        match self {
            InventoryEvent::StockEntered(StockEntered(m)) => m,
            InventoryEvent::StockExited(StockExited(m)) => m,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockEntered(_) => "inventory.stock.entered",
            InventoryEvent::StockExited(_) => "inventory.stock.exited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.movement().occurred_at
    }
}

/// Aggregate root: StockLedger (one per product).
///
/// A ledger needs no creation event: the first movement binds it to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    id: ProductId,
    store_id: Option<StoreId>,
    on_hand: u64,
    movement_count: u64,
    version: u64,
}

impl StockLedger {
    /// Create an empty ledger for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            store_id: None,
            on_hand: 0,
            movement_count: 0,
            version: 0,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn on_hand(&self) -> u64 {
        self.on_hand
    }

    pub fn movement_count(&self) -> u64 {
        self.movement_count
    }
}

impl AggregateRoot for StockLedger {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for StockLedger {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let movement = event.movement();
        self.id = movement.product_id;
        self.store_id = Some(movement.store_id);
        self.on_hand = movement.on_hand_after;
        self.movement_count += 1;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RecordEntry(RecordEntry(req)) => self.handle_entry(req),
            InventoryCommand::RecordExit(RecordExit(req)) => self.handle_exit(req),
        }
    }
}

impl StockLedger {
    fn ensure_store(&self, store_id: StoreId) -> Result<(), DomainError> {
        match self.store_id {
            Some(existing) if existing != store_id => Err(DomainError::invariant("store mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn validate(&self, req: &MovementRequest) -> Result<(), DomainError> {
        self.ensure_store(req.store_id)?;
        self.ensure_product_id(req.product_id)?;
        if req.quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if req.product_name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        Ok(())
    }

    fn movement(req: &MovementRequest, kind: MovementKind, on_hand_after: u64) -> StockMovement {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        StockMovement {
            movement_id: req.movement_id,
            store_id: req.store_id,
            product_id: req.product_id,
            product_name: req.product_name.trim().to_string(),
            kind,
            quantity: req.quantity,
            unit_price: req.unit_price,
            reason: clean(&req.reason),
            document_number: clean(&req.document_number),
            actor: req.actor.clone(),
            occurred_at: req.occurred_at,
            on_hand_after,
        }
    }

    fn handle_entry(&self, req: &MovementRequest) -> Result<Vec<InventoryEvent>, DomainError> {
        self.validate(req)?;
        let on_hand_after = self
            .on_hand
            .checked_add(req.quantity)
            .ok_or_else(|| DomainError::validation("entry would overflow the stock balance"))?;

        Ok(vec![InventoryEvent::StockEntered(StockEntered(Self::movement(
            req,
            MovementKind::Entry,
            on_hand_after,
        )))])
    }

    fn handle_exit(&self, req: &MovementRequest) -> Result<Vec<InventoryEvent>, DomainError> {
        self.validate(req)?;
        if req.quantity > self.on_hand {
            return Err(DomainError::insufficient_stock(req.quantity, self.on_hand));
        }

        Ok(vec![InventoryEvent::StockExited(StockExited(Self::movement(
            req,
            MovementKind::Exit,
            self.on_hand - req.quantity,
        )))])
    }
}
