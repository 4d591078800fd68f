//! Audit event types

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceStatus, Direction, Session};
use rollcall_util::{EventId, FineId, PaymentId, ServiceId, StudentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Configuration loaded
    ConfigLoaded { event_count: usize },

    /// Student added or updated
    StudentEnrolled { student_id: StudentId },

    /// Scan accepted and applied to the attendance record
    ScanRecorded {
        student_id: StudentId,
        event_id: EventId,
        session: Session,
        direction: Direction,
        status: AttendanceStatus,
        minutes_late: u32,
    },

    /// Scan refused before any record was touched
    ScanRejected {
        identity: String,
        event_id: EventId,
        reason: String,
    },

    /// Manual check-out
    CheckOutRecorded {
        student_id: StudentId,
        event_id: EventId,
    },

    FineIssued {
        fine_id: FineId,
        student_id: StudentId,
        event_id: EventId,
        amount: Decimal,
    },

    /// Students without a record were marked absent
    AbsenteesMarked {
        event_id: EventId,
        session: Option<Session>,
        count: usize,
    },

    EventFinalized {
        event_id: EventId,
        absentees_marked: usize,
        fines_issued: usize,
    },

    PaymentRecorded {
        payment_id: PaymentId,
        student_id: StudentId,
        amount: Decimal,
        receipt_no: String,
    },

    ServiceRecorded {
        service_id: ServiceId,
        student_id: StudentId,
        hours: u32,
        credit_amount: Decimal,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: rollcall_util::now(),
            event,
        }
    }
}
