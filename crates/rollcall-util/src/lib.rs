//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (StudentId, EventId, AttendanceId, ...) and their generators
//! - Wall-clock helpers, including mock time for development
//! - The closed `TimeWindow` value type used by attendance evaluation
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
