//! Logical clock counting externally visible transitions.

use serde::{Deserialize, Serialize};

use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Clock {
    ticks: u64,
}

impl Clock {
    pub fn value(&self) -> u64 {
        self.ticks
    }

    /// Timestamp form used for step and snapshot entries of a recorded run.
    pub fn stamp(&self) -> String {
        self.ticks.to_string()
    }

    pub fn increment(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }
}

pub fn wall_time_iso_utc() -> String {
    // Metadata only (oracle `saved_at`); never feeds scenario decisions.
    let now = SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
