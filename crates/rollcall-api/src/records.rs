//! Persisted records

use chrono::{DateTime, Local, NaiveDate};
use rollcall_util::{
    AttendanceId, EventId, FineId, PaymentId, ServiceId, StudentId, TransactionId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AttendanceStatus, ScanSource, Session};

/// An enrolled student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub course: String,
    pub year_level: u8,
    pub section: String,
    /// Card tag; unique across students when present
    pub rfid_tag: Option<String>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The single attendance record for a (student, event) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: AttendanceId,
    pub student_id: StudentId,
    pub event_id: EventId,
    pub status: AttendanceStatus,
    /// Only meaningful for `Late`
    pub minutes_late: u32,
    pub check_in: Option<DateTime<Local>>,
    pub check_out: Option<DateTime<Local>>,
    pub source: ScanSource,
    /// `None` for legacy events and whole-event finalization
    pub session: Option<Session>,
}

impl AttendanceRecord {
    /// A record with no timestamps, as created at finalization
    pub fn absent(student_id: StudentId, event_id: EventId, session: Option<Session>) -> Self {
        Self {
            id: AttendanceId::generate(),
            student_id,
            event_id,
            status: AttendanceStatus::Absent,
            minutes_late: 0,
            check_in: None,
            check_out: None,
            source: ScanSource::Manual,
            session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineRecord {
    pub fine_id: FineId,
    pub transaction_id: TransactionId,
    pub student_id: StudentId,
    pub event_id: EventId,
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// A cash payment backed by an official receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub transaction_id: TransactionId,
    pub student_id: StudentId,
    pub amount: Decimal,
    /// Official receipt number, digits only
    pub receipt_no: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    pub student_id: StudentId,
    pub hours: u32,
    pub credit_amount: Decimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}
