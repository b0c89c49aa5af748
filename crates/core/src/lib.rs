//! `stockroom-core`: ids, errors, aggregate traits and value objects shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits and shared value objects.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, StoreId, UserId};
pub use value_object::{Actor, Money, ValueObject};
