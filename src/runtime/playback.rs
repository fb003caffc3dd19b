//! Read cursor over a recorded run.

use crate::{Entry, Operation, Snapshot, Step};

/// Position moves in (Step, Snapshot) pairs; it never exceeds the entry count.
#[derive(Debug, Clone)]
pub struct Playback {
    entries: Vec<Entry>,
    position: usize,
}

impl Playback {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_step().is_some()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_steps(&self) -> usize {
        self.entries[self.position..]
            .iter()
            .filter(|e| e.as_step().is_some())
            .count()
    }

    pub fn next_step(&self) -> Option<&Step> {
        self.entries.get(self.position).and_then(Entry::as_step)
    }

    pub fn next_operation(&self) -> Option<Operation> {
        self.next_step().map(Step::to_operation)
    }

    pub fn next_snapshot(&self) -> Option<&Snapshot> {
        self.next_step()?;
        self.entries
            .get(self.position.saturating_add(1))
            .and_then(Entry::as_snapshot)
    }

    /// Snapshot paired with the most recently consumed step.
    pub fn expected_snapshot(&self) -> Option<&Snapshot> {
        if self.position < 2 {
            return None;
        }
        self.entries
            .get(self.position - 1)
            .and_then(Entry::as_snapshot)
    }

    pub fn consume_step(&mut self) {
        if self.position < self.entries.len() {
            self.position = self.position.saturating_add(2).min(self.entries.len());
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_entries() -> Vec<Entry> {
        let mut entries = Vec::new();
        for (clock, name) in ["a", "b"].iter().enumerate() {
            entries.push(Entry::Step(Step::from_operation(
                &Operation::named(*name),
                "m",
                clock.to_string(),
            )));
            let mut snapshot = Snapshot::new("m", clock.to_string());
            snapshot.values.insert("x".to_string(), clock.to_string());
            entries.push(Entry::Snapshot(snapshot));
        }
        entries
    }

    #[test]
    fn consumes_pairs_until_exhausted() {
        let mut cursor = Playback::new(two_step_entries());
        assert!(cursor.is_active());
        assert_eq!(cursor.next_operation(), Some(Operation::named("a")));
        assert!(cursor.expected_snapshot().is_none());
        assert_eq!(cursor.next_snapshot().map(|s| s.clock.as_str()), Some("0"));

        cursor.consume_step();
        assert_eq!(cursor.next_operation(), Some(Operation::named("b")));
        assert_eq!(cursor.expected_snapshot().map(|s| s.clock.as_str()), Some("0"));
        assert_eq!(cursor.remaining_steps(), 1);

        cursor.consume_step();
        assert!(!cursor.is_active());
        assert!(cursor.next_operation().is_none());
        assert!(cursor.next_snapshot().is_none());
        assert_eq!(cursor.expected_snapshot().map(|s| s.clock.as_str()), Some("1"));
    }

    #[test]
    fn consuming_past_end_is_a_no_op() {
        let mut cursor = Playback::new(two_step_entries());
        for _ in 0..5 {
            cursor.consume_step();
        }
        assert_eq!(cursor.position(), 4);
        assert!(!cursor.is_active());
    }

    #[test]
    fn reset_returns_to_start_without_dropping_entries() {
        let mut cursor = Playback::new(two_step_entries());
        cursor.consume_step();
        cursor.consume_step();
        cursor.reset();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.remaining_steps(), 2);
        assert_eq!(cursor.next_operation(), Some(Operation::named("a")));
    }

    #[test]
    fn empty_run_is_never_active() {
        let cursor = Playback::new(Vec::new());
        assert!(!cursor.is_active());
        assert!(cursor.next_snapshot().is_none());
    }
}
