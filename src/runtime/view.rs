//! Observer views notified by the scenario checker.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Recording,
    Playback,
}

/// One displayed state row: the live value and, during playback, the recorded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueComparison {
    pub identifier: String,
    pub live: Option<String>,
    pub expected: Option<String>,
}

impl ValueComparison {
    pub fn is_divergent(&self) -> bool {
        self.expected.is_some() && self.live != self.expected
    }
}

/// Push-only notifications; views never feed back into stepping.
pub trait ScenarioView {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn is_ready(&self) -> bool {
        true
    }

    fn update_state(&mut self, rows: &[ValueComparison]);

    fn update_enabled_operations(&mut self, signatures: &[String], selected: Option<usize>);

    fn update_mode_indicator(&mut self, mode: Mode);

    fn update_dirty_status(&mut self, dirty: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(u64);

/// Views in registration order.
#[derive(Default)]
pub struct ViewRegistry {
    next_id: u64,
    views: Vec<(ViewId, Box<dyn ScenarioView>)>,
}

impl ViewRegistry {
    pub fn add(&mut self, view: Box<dyn ScenarioView>) -> ViewId {
        let id = ViewId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.views.push((id, view));
        id
    }

    pub fn remove(&mut self, id: ViewId) -> Option<Box<dyn ScenarioView>> {
        let idx = self.views.iter().position(|(vid, _)| *vid == id)?;
        Some(self.views.remove(idx).1)
    }

    pub fn any_ready(&self) -> bool {
        self.views.iter().any(|(_, v)| v.is_ready())
    }

    pub fn notify(&mut self, mut f: impl FnMut(&mut dyn ScenarioView)) {
        for (_, view) in &mut self.views {
            f(view.as_mut());
        }
    }
}

/// Logs every notification; used by the command-line driver.
#[derive(Debug, Default)]
pub struct TracingView;

impl ScenarioView for TracingView {
    fn start(&mut self) {
        tracing::debug!("scenario view started");
    }

    fn stop(&mut self) {
        tracing::debug!("scenario view stopped");
    }

    fn update_state(&mut self, rows: &[ValueComparison]) {
        for row in rows.iter().filter(|r| r.is_divergent()) {
            tracing::warn!(
                identifier = %row.identifier,
                live = row.live.as_deref().unwrap_or("<missing>"),
                expected = row.expected.as_deref().unwrap_or(""),
                "state differs from recorded snapshot"
            );
        }
        tracing::trace!(rows = rows.len(), "state updated");
    }

    fn update_enabled_operations(&mut self, signatures: &[String], selected: Option<usize>) {
        tracing::debug!(enabled = ?signatures, selected = ?selected, "enabled operations updated");
    }

    fn update_mode_indicator(&mut self, mode: Mode) {
        tracing::debug!(mode = ?mode, "mode indicator updated");
    }

    fn update_dirty_status(&mut self, dirty: bool) {
        tracing::trace!(dirty, "dirty status updated");
    }
}
