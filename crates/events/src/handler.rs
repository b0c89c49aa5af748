/// Decide and apply in one step, without persistence.
///
/// Calls `handle`, then applies every decided event to the aggregate. Useful in
/// tests and for in-process replays; the infrastructure dispatcher is the
/// persistent counterpart.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockroom_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
