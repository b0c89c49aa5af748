//! Products domain module (event-sourced).
//!
//! Business rules for the product catalog, implemented as deterministic
//! domain logic (no IO, no storage). On-hand quantity is not part of the
//! catalog; it belongs to the stock ledger in `stockroom-inventory`.

pub mod product;

pub use product::{
    CreateProduct, DeleteProduct, Product, ProductCommand, ProductCreated, ProductDeleted,
    ProductDetails, ProductEvent, ProductId, ProductStatus, ProductUpdated, UpdateProduct,
    PRODUCT_AGGREGATE_TYPE,
};
