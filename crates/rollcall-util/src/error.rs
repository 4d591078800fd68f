//! Error types for rollcall

use thiserror::Error;

use crate::{EventId, StudentId};

/// Core error type for rollcall operations
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Student not found: {0}")]
    StudentNotFound(StudentId),

    #[error("No student registered for RFID tag: {0}")]
    UnknownRfid(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Attendance for event {event_id} closed: event date {event_date} is more than {grace_days} day(s) ago")]
    ScanExpired {
        event_id: EventId,
        event_date: chrono::NaiveDate,
        grace_days: u32,
    },

    #[error("Attendance window is still open until {until}")]
    WindowStillOpen { until: chrono::NaiveTime },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RollcallError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors caused by the request itself rather than by the store
    /// or a bug; callers use this to decide whether a retry could help.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::StoreError(_) | Self::Internal(_))
    }
}

pub type Result<T> = std::result::Result<T, RollcallError>;
