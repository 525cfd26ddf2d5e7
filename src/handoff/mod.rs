//! Downstream handoff of completed downloads
//!
//! After every successful download the orchestrator passes a
//! [`CompletedDownload`](crate::types::CompletedDownload) to a [`Handoff`]
//! (subtitle generation, dubbing, upload pipelines, ...). Handoff failures are
//! reported but never undo the completion.

mod script;
mod traits;

pub use script::ScriptHandoff;
pub use traits::{Handoff, NoOpHandoff};
