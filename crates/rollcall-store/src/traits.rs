//! Store trait definitions

use rollcall_api::{AttendanceRecord, FineRecord, PaymentRecord, ServiceRecord, Student};
use rollcall_util::{EventId, StudentId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Students

    /// Insert or replace a student
    fn upsert_student(&self, student: &Student) -> StoreResult<()>;

    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>>;

    fn find_student_by_rfid(&self, tag: &str) -> StoreResult<Option<Student>>;

    /// All students, ordered by id
    fn list_students(&self) -> StoreResult<Vec<Student>>;

    // Attendance

    fn get_attendance(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
    ) -> StoreResult<Option<AttendanceRecord>>;

    fn list_attendance_for_event(&self, event_id: &EventId) -> StoreResult<Vec<AttendanceRecord>>;

    /// Fails with `Conflict` if the (student, event) pair already has a record
    fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// Overwrite the record with the same id
    fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    // Fines

    /// Fails with `Conflict` if the (student, event) pair is already fined
    fn insert_fine(&self, fine: &FineRecord) -> StoreResult<()>;

    fn fine_exists(&self, student_id: &StudentId, event_id: &EventId) -> StoreResult<bool>;

    fn list_fines_for_event(&self, event_id: &EventId) -> StoreResult<Vec<FineRecord>>;

    fn list_fines_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<FineRecord>>;

    /// Every fine, oldest first
    fn list_fines(&self) -> StoreResult<Vec<FineRecord>>;

    // Payments

    fn insert_payment(&self, payment: &PaymentRecord) -> StoreResult<()>;

    fn list_payments_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<PaymentRecord>>;

    fn list_payments(&self) -> StoreResult<Vec<PaymentRecord>>;

    // Community service

    fn insert_service(&self, record: &ServiceRecord) -> StoreResult<()>;

    fn list_service_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<ServiceRecord>>;

    fn list_service(&self) -> StoreResult<Vec<ServiceRecord>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
