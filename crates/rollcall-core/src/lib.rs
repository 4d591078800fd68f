//! Core engine for rollcall
//!
//! This crate evaluates scans against event schedules, turns attendance
//! outcomes into fines, aggregates each student's ledger and builds
//! system-wide collection reports. The engine is
//! the only part that touches the store.

mod activity;
mod engine;
mod evaluator;
mod fines;
mod ledger;
mod report;
mod sequencer;

pub use activity::*;
pub use engine::*;
pub use evaluator::*;
pub use fines::*;
pub use ledger::*;
pub use report::*;
pub use sequencer::*;
