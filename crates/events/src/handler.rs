/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: calls `aggregate.handle(command)` to get events (pure, no mutation)
/// 2. **Evolve**: applies each event to the aggregate via `aggregate.apply(event)`
///
/// The aggregate is only mutated when `handle` succeeds, so a rejected command
/// leaves the in-memory state exactly as it was loaded.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: stockroom_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
