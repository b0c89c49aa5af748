//! Aggregate traits shared by the store, catalog, ledger and purchasing models.

use crate::error::{DomainError, DomainResult};

/// Aggregate root: identity plus the number of events applied so far.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Stream revision: +1 per applied event, 0 before the first one.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a stream append.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the stream to be at an exact revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "stale stream revision (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Pure decision/evolution contract.
///
/// - `handle(&self, cmd)` decides which events a command produces, without mutating.
/// - `apply(&mut self, event)` evolves state from one event.
///
/// Neither may perform IO. Replaying the same events must yield the same state.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_revision() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_rejects_stale_revision() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        match ExpectedVersion::Exact(3).check(4) {
            Err(DomainError::Conflict(msg)) => assert!(msg.contains("actual: 4")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
