//! Domain types shared across rollcall
//!
//! This crate defines the vocabulary every other crate speaks:
//! - Attendance status, sessions, directions and scan requests
//! - Persisted records (students, attendance, fines, payments, service)
//! - Ledger transactions and clearance status

mod records;
mod transactions;
mod types;

pub use records::*;
pub use transactions::*;
pub use types::*;
