//! Builds a recorded run from the animator history.

use crate::{Clock, Entry, HistoryItem, Machine, Run, Snapshot, Step, classify};

/// One (Step, Snapshot) pair per external or setup operation. Each snapshot
/// holds the non-private values that changed since they were last recorded,
/// including changes made by internal operations fired after the step.
pub fn make_run(name: &str, history: &[HistoryItem], machine: &Machine, setup_operation: &str) -> Run {
    let mut run = Run::new(name);
    let mut clock = Clock::default();
    let mut open_snapshot: Option<usize> = None;

    for item in history {
        let Some(op) = item.operation.as_ref() else {
            continue;
        };
        if classify(op, machine).is_external() || op.name == setup_operation {
            run.entries
                .push(Entry::Step(Step::from_operation(op, &machine.name, clock.stamp())));
            run.entries
                .push(Entry::Snapshot(Snapshot::new(&machine.name, clock.stamp())));
            open_snapshot = Some(run.entries.len() - 1);
            clock.increment();
        }

        for (identifier, value) in &item.state {
            if machine.is_private(identifier) || !has_changed(&run, identifier, value) {
                continue;
            }
            if let Some(idx) = open_snapshot
                && let Some(Entry::Snapshot(snapshot)) = run.entries.get_mut(idx)
            {
                snapshot.values.insert(identifier.clone(), value.clone());
            }
        }
    }
    run
}

/// A revert to an older value still counts as a change.
pub fn has_changed(run: &Run, identifier: &str, value: &str) -> bool {
    run.entries
        .iter()
        .rev()
        .filter_map(Entry::as_snapshot)
        .find_map(|s| s.values.get(identifier))
        .is_none_or(|recorded| recorded != value)
}
