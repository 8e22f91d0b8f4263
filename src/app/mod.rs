//! Run orchestration.
//!
//! The fetch phase is all-or-nothing: any [`RunError`] aborts the run before a
//! single document is downloaded. The download phase never fails the run.

mod orchestrator;

pub use orchestrator::{RunError, RunSummary, run, run_with};
