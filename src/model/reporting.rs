//! Session reports printed by the command-line driver.

use serde::{Deserialize, Serialize};

use crate::{Divergence, RunOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pass,
    Diverged,
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub model: String,
    pub mode: crate::Mode,
    pub seed: u64,
    pub clock: u64,
    pub dirty: bool,
    pub outcome: RunOutcome,
    pub status: SessionStatus,
    #[serde(rename = "remainingSteps", skip_serializing_if = "Option::is_none")]
    pub remaining_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<Divergence>,
    #[serde(rename = "savedTo", skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
}

impl SessionReport {
    pub fn status_for(outcome: RunOutcome, divergences: &[Divergence]) -> SessionStatus {
        if !divergences.is_empty() {
            SessionStatus::Diverged
        } else if outcome == RunOutcome::Completed {
            SessionStatus::Pass
        } else {
            SessionStatus::Stalled
        }
    }

    pub fn render_pretty(&self) -> String {
        let mut out = format!(
            "model {} | mode {:?} | clock {} | seed {} | {:?} ({:?})",
            self.model, self.mode, self.clock, self.seed, self.status, self.outcome
        );
        if let Some(remaining) = self.remaining_steps {
            out.push_str(&format!(" | {remaining} recorded step(s) left"));
        }
        if self.dirty {
            out.push_str(" | unsaved");
        }
        if let Some(path) = &self.saved_to {
            out.push_str(&format!("\nsaved: {path}"));
        }
        for d in &self.divergences {
            out.push_str(&format!(
                "\n  diverged @{} {}: live={} expected={}",
                d.clock,
                d.identifier,
                d.live.as_deref().unwrap_or("<missing>"),
                d.expected
            ));
        }
        out
    }
}
