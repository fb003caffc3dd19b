//! Scenario checker core: steppable recording and deterministic playback of
//! scenarios over a state-transition animator.

#[path = "runtime/animator.rs"]
mod animator;
#[path = "runtime/clock.rs"]
mod clock;
#[path = "platform/config.rs"]
mod config;
#[path = "runtime/controller.rs"]
mod controller;
#[path = "platform/envinfo.rs"]
mod envinfo;
#[path = "platform/error.rs"]
mod error;
#[path = "model/machine.rs"]
mod machine;
#[path = "model/operation.rs"]
mod operation;
#[path = "model/oracle.rs"]
mod oracle;
#[path = "runtime/oraclefile.rs"]
mod oraclefile;
#[path = "runtime/playback.rs"]
mod playback;
#[path = "runtime/recorder.rs"]
mod recorder;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "runtime/selector.rs"]
mod selector;
#[path = "runtime/view.rs"]
mod view;

pub use animator::*;
pub use clock::*;
pub use config::*;
pub use controller::*;
pub use envinfo::*;
pub use error::*;
pub use machine::*;
pub use operation::*;
pub use oracle::*;
pub use oraclefile::*;
pub use playback::*;
pub use recorder::*;
pub use reporting::*;
pub use selector::*;
pub use view::*;
