//! Store-scoped read model tables.

pub mod read_table;

pub use read_table::{InMemoryReadTable, ReadTable};
