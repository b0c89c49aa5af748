use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, StoreId};
use stockroom_events::Event;

/// Stream type of product aggregates.
pub const PRODUCT_AGGREGATE_TYPE: &str = "products.product";

/// Product identifier (store-scoped via `store_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Deleted,
}

/// Editable catalog fields of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_price: Money,
    pub sell_price: Money,
    /// Alert threshold: the product is flagged once on-hand falls to this level.
    pub min_quantity: u64,
    pub category: Option<String>,
    pub supplier: Option<String>,
}

impl ProductDetails {
    /// Trim text fields, drop blank optionals and require code and name.
    pub fn normalized(&self) -> Result<Self, DomainError> {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        let code = self.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }

        Ok(Self {
            code: code.to_string(),
            name: name.to_string(),
            description: clean(&self.description),
            cost_price: self.cost_price,
            sell_price: self.sell_price,
            min_quantity: self.min_quantity,
            category: clean(&self.category),
            supplier: clean(&self.supplier),
        })
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    store_id: Option<StoreId>,
    details: ProductDetails,
    status: ProductStatus,
    last_updated: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            store_id: None,
            details: ProductDetails::default(),
            status: ProductStatus::Active,
            last_updated: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Created and not deleted.
    pub fn is_live(&self) -> bool {
        self.created && self.status == ProductStatus::Active
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (replaces all catalog fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    DeleteProduct(DeleteProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductDeleted(ProductDeleted),
}

impl ProductEvent {
    pub fn store_id(&self) -> StoreId {
        match self {
            ProductEvent::ProductCreated(e) => e.store_id,
            ProductEvent::ProductUpdated(e) => e.store_id,
            ProductEvent::ProductDeleted(e) => e.store_id,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::ProductDeleted(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductUpdated(_) => "products.product.updated",
            ProductEvent::ProductDeleted(_) => "products.product.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.store_id = Some(e.store_id);
                self.details = e.details.clone();
                self.status = ProductStatus::Active;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.details = e.details.clone();
            }
            ProductEvent::ProductDeleted(_) => {
                self.status = ProductStatus::Deleted;
            }
        }

        self.last_updated = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::DeleteProduct(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Product {
    fn ensure_store(&self, store_id: StoreId) -> Result<(), DomainError> {
        if self.store_id != Some(store_id) {
            return Err(DomainError::invariant("store mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        let details = cmd.details.normalized()?;

        // Code uniqueness spans the whole store and is checked by the caller
        // against the catalog before dispatching.
        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found());
        }
        self.ensure_store(cmd.store_id)?;
        self.ensure_product_id(cmd.product_id)?;
        let details = cmd.details.normalized()?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found());
        }
        self.ensure_store(cmd.store_id)?;
        self.ensure_product_id(cmd.product_id)?;

        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            store_id: cmd.store_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store_id() -> StoreId {
        StoreId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn radiator() -> ProductDetails {
        ProductDetails {
            code: "RAD-001".to_string(),
            name: "Radiator".to_string(),
            description: Some("Aluminium core".to_string()),
            cost_price: Money::from_cents(12_000),
            sell_price: Money::from_cents(18_500),
            min_quantity: 2,
            category: None,
            supplier: Some("Acme".to_string()),
        }
    }

    fn created(store_id: StoreId, product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                store_id,
                product_id,
                details: radiator(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let store_id = test_store_id();
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let cmd = CreateProduct {
            store_id,
            product_id,
            details: radiator(),
            occurred_at: test_time(),
        };

        let events = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.store_id, store_id);
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.details.code, "RAD-001");
                assert_eq!(e.details.name, "Radiator");
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_trims_and_drops_blank_optionals() {
        let product_id = test_product_id();
        let mut details = radiator();
        details.code = "  RAD-001 ".to_string();
        details.category = Some("   ".to_string());

        let events = Product::empty(product_id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                store_id: test_store_id(),
                product_id,
                details,
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.details.code, "RAD-001");
                assert_eq!(e.details.category, None);
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_empty_name() {
        let mut details = radiator();
        details.name = "   ".to_string();
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                store_id: test_store_id(),
                product_id,
                details,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("name")),
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn create_product_rejects_empty_code() {
        let mut details = radiator();
        details.code = String::new();
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                store_id: test_store_id(),
                product_id,
                details,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("code")),
            _ => panic!("Expected Validation error for empty code"),
        }
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let store_id = test_store_id();
        let product_id = test_product_id();
        let product = created(store_id, product_id);

        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                store_id,
                product_id,
                details: radiator(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_product_replaces_details_and_touches_last_updated() {
        let store_id = test_store_id();
        let product_id = test_product_id();
        let mut product = created(store_id, product_id);
        let first_update = product.last_updated().unwrap();

        let mut details = radiator();
        details.sell_price = Money::from_cents(19_900);
        details.min_quantity = 5;
        let later = first_update + chrono::Duration::seconds(5);
        let events = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                store_id,
                product_id,
                details,
                occurred_at: later,
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.details().sell_price, Money::from_cents(19_900));
        assert_eq!(product.details().min_quantity, 5);
        assert_eq!(product.last_updated(), Some(later));
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn update_product_rejects_wrong_store() {
        let product_id = test_product_id();
        let product = created(test_store_id(), product_id);

        let err = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                store_id: test_store_id(),
                product_id,
                details: radiator(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("store mismatch")),
            _ => panic!("Expected InvariantViolation for wrong store"),
        }
    }

    #[test]
    fn update_product_rejects_non_existent_product() {
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                store_id: test_store_id(),
                product_id,
                details: radiator(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn deleted_product_cannot_be_updated_or_deleted_again() {
        let store_id = test_store_id();
        let product_id = test_product_id();
        let mut product = created(store_id, product_id);

        let delete = ProductCommand::DeleteProduct(DeleteProduct {
            store_id,
            product_id,
            occurred_at: test_time(),
        });
        let events = product.handle(&delete).unwrap();
        product.apply(&events[0]);
        assert_eq!(product.status(), ProductStatus::Deleted);
        assert!(!product.is_live());

        assert_eq!(product.handle(&delete).unwrap_err(), DomainError::NotFound);
        let update = ProductCommand::UpdateProduct(UpdateProduct {
            store_id,
            product_id,
            details: radiator(),
            occurred_at: test_time(),
        });
        assert_eq!(product.handle(&update).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let store_id = test_store_id();
        let product_id = test_product_id();
        let product = created(store_id, product_id);
        let before = product.clone();

        let _ = product.handle(&ProductCommand::DeleteProduct(DeleteProduct {
            store_id,
            product_id,
            occurred_at: test_time(),
        }));
        assert_eq!(product, before);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: replaying the same events always yields the same state.
            #[test]
            fn apply_is_deterministic(
                code in "[A-Z0-9-]{1,12}",
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                cost in 0u64..1_000_000,
                min_quantity in 0u64..1_000,
            ) {
                let store_id = test_store_id();
                let product_id = test_product_id();
                let at = Utc::now();
                let details = ProductDetails {
                    code,
                    name,
                    cost_price: Money::from_cents(cost),
                    min_quantity,
                    ..ProductDetails::default()
                };
                let events = vec![
                    ProductEvent::ProductCreated(ProductCreated {
                        store_id,
                        product_id,
                        details: details.clone(),
                        occurred_at: at,
                    }),
                    ProductEvent::ProductUpdated(ProductUpdated {
                        store_id,
                        product_id,
                        details,
                        occurred_at: at,
                    }),
                ];

                let mut a = Product::empty(product_id);
                let mut b = Product::empty(product_id);
                for e in &events {
                    a.apply(e);
                    b.apply(e);
                }
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.version(), 2);
            }

            /// Property: a blank code or name is always rejected.
            #[test]
            fn blank_identity_is_rejected(blank in "[ \t]{0,5}") {
                let mut details = ProductDetails {
                    code: "C-1".to_string(),
                    name: blank.clone(),
                    ..ProductDetails::default()
                };
                prop_assert!(details.normalized().is_err());
                details.name = "Valid".to_string();
                details.code = blank;
                prop_assert!(details.normalized().is_err());
            }
        }
    }
}
