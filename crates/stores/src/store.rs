use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateId, AggregateRoot, DomainError, StoreId};
use stockroom_events::Event;

/// Stream type of store aggregates.
pub const STORE_AGGREGATE_TYPE: &str = "stores.store";

/// Store status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Open,
    Closed,
}

/// Contact information for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    /// Trim fields and drop the ones left blank.
    pub fn normalized(&self) -> Self {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
        Self {
            address: clean(&self.address),
            phone: clean(&self.phone),
        }
    }
}

/// Aggregate root: Store.
///
/// A store's stream is scoped by its own id, so the aggregate id and the
/// store id carry the same UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    id: StoreId,
    name: String,
    contact: ContactInfo,
    status: StoreStatus,
    version: u64,
    created: bool,
}

impl Store {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: StoreId) -> Self {
        Self {
            id,
            name: String::new(),
            contact: ContactInfo::default(),
            status: StoreStatus::Open,
            version: 0,
            created: false,
        }
    }

    /// Aggregate id of the stream holding this store's events.
    pub fn stream_id(id: StoreId) -> AggregateId {
        AggregateId::from_uuid(*id.as_uuid())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn status(&self) -> StoreStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.created && self.status == StoreStatus::Open
    }
}

impl AggregateRoot for Store {
    type Id = StoreId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterStore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStore {
    pub store_id: StoreId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStore (replaces name and contact details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStore {
    pub store_id: StoreId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseStore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseStore {
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreCommand {
    RegisterStore(RegisterStore),
    UpdateStore(UpdateStore),
    CloseStore(CloseStore),
}

/// Event: StoreRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRegistered {
    pub store_id: StoreId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StoreUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUpdated {
    pub store_id: StoreId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StoreClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreClosed {
    pub store_id: StoreId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    StoreRegistered(StoreRegistered),
    StoreUpdated(StoreUpdated),
    StoreClosed(StoreClosed),
}

impl StoreEvent {
    pub fn store_id(&self) -> StoreId {
        match self {
            StoreEvent::StoreRegistered(e) => e.store_id,
            StoreEvent::StoreUpdated(e) => e.store_id,
            StoreEvent::StoreClosed(e) => e.store_id,
        }
    }
}

impl Event for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::StoreRegistered(_) => "stores.store.registered",
            StoreEvent::StoreUpdated(_) => "stores.store.updated",
            StoreEvent::StoreClosed(_) => "stores.store.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StoreEvent::StoreRegistered(e) => e.occurred_at,
            StoreEvent::StoreUpdated(e) => e.occurred_at,
            StoreEvent::StoreClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Store {
    type Command = StoreCommand;
    type Event = StoreEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StoreEvent::StoreRegistered(e) => {
                self.id = e.store_id;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.status = StoreStatus::Open;
                self.created = true;
            }
            StoreEvent::StoreUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
            StoreEvent::StoreClosed(_) => {
                self.status = StoreStatus::Closed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StoreCommand::RegisterStore(cmd) => self.handle_register(cmd),
            StoreCommand::UpdateStore(cmd) => self.handle_update(cmd),
            StoreCommand::CloseStore(cmd) => self.handle_close(cmd),
        }
    }
}

impl Store {
    fn ensure_store_id(&self, store_id: StoreId) -> Result<(), DomainError> {
        if self.id != store_id {
            return Err(DomainError::invariant("store_id mismatch"));
        }
        Ok(())
    }

    fn clean_name(name: &str) -> Result<String, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("store name cannot be empty"));
        }
        Ok(name.to_string())
    }

    fn handle_register(&self, cmd: &RegisterStore) -> Result<Vec<StoreEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("store already exists"));
        }
        let name = Self::clean_name(&cmd.name)?;

        Ok(vec![StoreEvent::StoreRegistered(StoreRegistered {
            store_id: cmd.store_id,
            name,
            contact: cmd.contact.normalized(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateStore) -> Result<Vec<StoreEvent>, DomainError> {
        if !self.is_open() {
            return Err(DomainError::not_found());
        }
        self.ensure_store_id(cmd.store_id)?;
        let name = Self::clean_name(&cmd.name)?;

        Ok(vec![StoreEvent::StoreUpdated(StoreUpdated {
            store_id: cmd.store_id,
            name,
            contact: cmd.contact.normalized(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseStore) -> Result<Vec<StoreEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_store_id(cmd.store_id)?;
        if self.status == StoreStatus::Closed {
            return Err(DomainError::conflict("store is already closed"));
        }

        Ok(vec![StoreEvent::StoreClosed(StoreClosed {
            store_id: cmd.store_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
