use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are immutable facts, versioned for schema evolution, and only ever
/// appended to a stream.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, `<aggregate type>.<fact>` (e.g. "inventory.stock.entered").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Stream type the event belongs to: the event type minus its last segment.
    fn aggregate_type(&self) -> &'static str {
        let name = self.event_type();
        name.rsplit_once('.').map_or(name, |(prefix, _)| prefix)
    }
}
