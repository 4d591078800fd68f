//! Attendance engine
//!
//! Orchestrates scans, fine generation, payments, community service and
//! ledger reads on top of an injected store. The engine holds no per-request
//! state; every call reads what it needs from the store.

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{
    AttendanceRecord, AttendanceStatus, ClearanceStatus, Direction, FineRecord, PaymentRecord,
    ScanIdentity, ScanRequest, ServiceRecord, Session, Student, Transaction,
};
use rollcall_config::{AttendanceSchedule, Event, Policy};
use rollcall_store::{AuditEvent, AuditEventType, Store, StoreError};
use rollcall_util::{
    EventId, FineId, PaymentId, Result, RollcallError, ServiceId, StudentId, TransactionId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{
    Evaluation, Evaluator, FineCalculator, Ledger, RecentActivityLog, ReportSource, ScanSequencer,
    SummaryReport,
};

/// Result of an accepted scan
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub student: Student,
    pub record: AttendanceRecord,
    /// The scan created the record rather than updating it
    pub created: bool,
    /// Fine issued by this scan, if any
    pub fine: Option<FineRecord>,
}

/// Summary of an absentee marking pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalizationReport {
    pub event_id: Option<EventId>,
    pub absentees_marked: usize,
    pub fines_issued: usize,
    pub amount_fined: Decimal,
}

/// The attendance engine
pub struct AttendanceEngine {
    policy: Policy,
    store: Arc<dyn Store>,
    fines: FineCalculator,
    activity: Mutex<RecentActivityLog>,
}

impl AttendanceEngine {
    pub fn new(policy: Policy, store: Arc<dyn Store>) -> Self {
        let event_count = policy.events.len();
        info!(event_count, "Attendance engine initialized");

        let _ = store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded { event_count }));

        Self {
            fines: FineCalculator::new(policy.fines),
            activity: Mutex::new(RecentActivityLog::new(
                policy.service.recent_activity_capacity,
            )),
            policy,
            store,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn event(&self, id: &EventId) -> Result<&Event> {
        self.policy
            .get_event(id)
            .ok_or_else(|| RollcallError::EventNotFound(id.clone()))
    }

    fn student(&self, id: &StudentId) -> Result<Student> {
        self.store
            .get_student(id)?
            .ok_or_else(|| RollcallError::StudentNotFound(id.clone()))
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    fn activity(&self) -> MutexGuard<'_, RecentActivityLog> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Students

    /// Add or update a student
    pub fn enroll_student(&self, mut student: Student) -> Result<()> {
        if student.id.as_str().trim().is_empty() {
            return Err(RollcallError::validation("Student id must not be empty"));
        }
        if student.first_name.trim().is_empty() || student.last_name.trim().is_empty() {
            return Err(RollcallError::validation(format!(
                "Student {} needs a first and last name",
                student.id
            )));
        }
        student.rfid_tag = student
            .rfid_tag
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty());

        match self.store.upsert_student(&student) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(RollcallError::validation(format!(
                    "RFID tag {} is already assigned to another student",
                    student.rfid_tag.as_deref().unwrap_or_default()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(student_id = %student.id, name = %student.full_name(), "Student enrolled");
        self.audit(AuditEventType::StudentEnrolled {
            student_id: student.id,
        });
        Ok(())
    }

    /// Look up the student a scan identifies
    pub fn resolve_student(&self, identity: &ScanIdentity) -> Result<Student> {
        match identity {
            ScanIdentity::Rfid(tag) => self
                .store
                .find_student_by_rfid(tag.trim())?
                .ok_or_else(|| RollcallError::UnknownRfid(tag.clone())),
            ScanIdentity::Student(id) => self.student(id),
        }
    }

    // Scans

    /// Apply one scan to the (student, event) attendance record.
    ///
    /// Rejected scans leave no record behind and are audited with the reason.
    pub fn scan(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        match self.apply_scan(request) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if e.is_rejection() {
                    warn!(
                        identity = %request.identity,
                        event_id = %request.event_id,
                        error = %e,
                        "Scan rejected"
                    );
                    self.audit(AuditEventType::ScanRejected {
                        identity: request.identity.to_string(),
                        event_id: request.event_id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Scan through a shared sequencer so concurrent readers apply their
    /// scans in arrival order
    pub fn scan_in_order(
        &self,
        sequencer: &ScanSequencer,
        request: ScanRequest,
    ) -> Result<ScanOutcome> {
        sequencer
            .run(request, |request| self.scan(request))
            .unwrap_or_else(|| {
                Err(RollcallError::internal(
                    "Scan was dequeued by another consumer",
                ))
            })
    }

    fn apply_scan(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        let student = self.resolve_student(&request.identity)?;
        let event = self.event(&request.event_id)?;
        self.check_not_expired(event, request.scanned_at.date_naive())?;

        if event.schedule.is_unconfigured() {
            return Err(RollcallError::config(format!(
                "Event {} has no attendance windows or reference times",
                event.id
            )));
        }
        if !event.sessions.offers(request.session) {
            return Err(RollcallError::config(format!(
                "Event {} does not hold a {} session",
                event.id, request.session
            )));
        }

        let evaluation = Evaluator::for_scan(&event.schedule, request.session, request.direction)
            .evaluate(request.scanned_at.time());
        let session = match event.schedule {
            AttendanceSchedule::Windowed(_) => Some(request.session),
            AttendanceSchedule::Legacy(_) => None,
        };

        let (record, created) = match self.store.get_attendance(&student.id, &event.id)? {
            Some(record) => (self.apply_to_existing(record, request, evaluation)?, false),
            None => {
                let record = new_record(&student, request, evaluation, session);
                match self.store.insert_attendance(&record) {
                    Ok(()) => (record, true),
                    // Another writer created the record after our read
                    Err(StoreError::Conflict(_)) => {
                        debug!(
                            student_id = %student.id,
                            event_id = %event.id,
                            "Attendance record appeared concurrently, updating it"
                        );
                        let existing = self
                            .store
                            .get_attendance(&student.id, &event.id)?
                            .ok_or_else(|| {
                                RollcallError::internal("Conflicting attendance record vanished")
                            })?;
                        (self.apply_to_existing(existing, request, evaluation)?, false)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        info!(
            student_id = %student.id,
            event_id = %event.id,
            session = %request.session,
            direction = %request.direction,
            status = %record.status,
            minutes_late = record.minutes_late,
            created,
            "Scan recorded"
        );
        self.audit(AuditEventType::ScanRecorded {
            student_id: student.id.clone(),
            event_id: event.id.clone(),
            session: request.session,
            direction: request.direction,
            status: record.status,
            minutes_late: record.minutes_late,
        });

        let fine = if record.status == AttendanceStatus::Late && record.minutes_late > 0 {
            self.generate_fine(&record, event, request.scanned_at.date_naive())?
        } else {
            None
        };

        Ok(ScanOutcome {
            student,
            record,
            created,
            fine,
        })
    }

    fn apply_to_existing(
        &self,
        mut record: AttendanceRecord,
        request: &ScanRequest,
        evaluation: Evaluation,
    ) -> Result<AttendanceRecord> {
        update_record(&mut record, request, evaluation);
        self.store.update_attendance(&record)?;
        Ok(record)
    }

    fn check_not_expired(&self, event: &Event, scan_day: NaiveDate) -> Result<()> {
        let grace_days = self.policy.service.scan_grace_days;
        if (scan_day - event.date).num_days() > i64::from(grace_days) {
            return Err(RollcallError::ScanExpired {
                event_id: event.id.clone(),
                event_date: event.date,
                grace_days,
            });
        }
        Ok(())
    }

    /// Stamp the check-out time on an existing record. `None` when the
    /// student has no record for the event.
    pub fn check_out(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
        at: DateTime<Local>,
    ) -> Result<Option<AttendanceRecord>> {
        self.event(event_id)?;
        let Some(mut record) = self.store.get_attendance(student_id, event_id)? else {
            debug!(student_id = %student_id, event_id = %event_id, "No record to check out");
            return Ok(None);
        };

        record.check_out = Some(at);
        self.store.update_attendance(&record)?;

        info!(student_id = %student_id, event_id = %event_id, "Check-out recorded");
        self.audit(AuditEventType::CheckOutRecorded {
            student_id: student_id.clone(),
            event_id: event_id.clone(),
        });
        Ok(Some(record))
    }

    // Fines

    /// Issue the fine a record calls for, at most once per (student, event)
    pub fn generate_fine(
        &self,
        record: &AttendanceRecord,
        event: &Event,
        date: NaiveDate,
    ) -> Result<Option<FineRecord>> {
        if !record.status.is_fineable() {
            return Ok(None);
        }
        if self.store.fine_exists(&record.student_id, &event.id)? {
            debug!(
                student_id = %record.student_id,
                event_id = %event.id,
                "Fine already issued, skipping"
            );
            return Ok(None);
        }

        let amount = self
            .fines
            .calculate(record.status, record.minutes_late, &event.fine_overrides);
        if amount <= Decimal::ZERO {
            return Ok(None);
        }

        let fine = FineRecord {
            fine_id: FineId::generate(),
            transaction_id: TransactionId::generate(),
            student_id: record.student_id.clone(),
            event_id: event.id.clone(),
            amount,
            date,
        };
        match self.store.insert_fine(&fine) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                debug!(
                    student_id = %record.student_id,
                    event_id = %event.id,
                    "Fine inserted concurrently, skipping"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            fine_id = %fine.fine_id,
            student_id = %fine.student_id,
            event_id = %fine.event_id,
            status = %record.status,
            amount = %fine.amount,
            "Fine issued"
        );
        self.activity().push(Transaction::from(&fine));
        self.audit(AuditEventType::FineIssued {
            fine_id: fine.fine_id.clone(),
            student_id: fine.student_id.clone(),
            event_id: fine.event_id.clone(),
            amount: fine.amount,
        });
        Ok(Some(fine))
    }

    // Absentees

    /// Mark every student without a record absent, then fine every absent
    /// or late record that has no fine yet. Safe to run repeatedly.
    pub fn finalize_event(&self, event_id: &EventId) -> Result<FinalizationReport> {
        let event = self.event(event_id)?;
        let today = rollcall_util::now().date_naive();

        let mut report = self.mark_absent_and_fine(event, None, today)?;
        report.event_id = Some(event.id.clone());

        info!(
            event_id = %event.id,
            absentees_marked = report.absentees_marked,
            fines_issued = report.fines_issued,
            amount_fined = %report.amount_fined,
            "Event finalized"
        );
        self.audit(AuditEventType::EventFinalized {
            event_id: event.id.clone(),
            absentees_marked: report.absentees_marked,
            fines_issued: report.fines_issued,
        });
        Ok(report)
    }

    /// Finalization scoped to one session's window. Refused until the
    /// window has closed on the event day.
    pub fn mark_session_absentees(
        &self,
        event_id: &EventId,
        session: Session,
        direction: Direction,
        now: DateTime<Local>,
    ) -> Result<FinalizationReport> {
        let event = self.event(event_id)?;
        if !event.sessions.offers(session) {
            return Err(RollcallError::config(format!(
                "Event {} does not hold a {} session",
                event.id, session
            )));
        }

        let window = match &event.schedule {
            AttendanceSchedule::Windowed(windows) => windows.get(session, direction),
            AttendanceSchedule::Legacy(_) => None,
        }
        .ok_or_else(|| {
            RollcallError::config(format!(
                "Event {} has no {} {} window",
                event.id, session, direction
            ))
        })?;

        let today = now.date_naive();
        if today < event.date || (today == event.date && now.time() < window.stop()) {
            return Err(RollcallError::WindowStillOpen {
                until: window.stop(),
            });
        }

        let mut report = self.mark_absent_and_fine(event, Some(session), today)?;
        report.event_id = Some(event.id.clone());
        Ok(report)
    }

    fn mark_absent_and_fine(
        &self,
        event: &Event,
        session: Option<Session>,
        fine_date: NaiveDate,
    ) -> Result<FinalizationReport> {
        let mut report = FinalizationReport::default();

        let recorded: HashSet<StudentId> = self
            .store
            .list_attendance_for_event(&event.id)?
            .into_iter()
            .map(|record| record.student_id)
            .collect();

        for student in self.store.list_students()? {
            if recorded.contains(&student.id) {
                continue;
            }
            let record = AttendanceRecord::absent(student.id.clone(), event.id.clone(), session);
            match self.store.insert_attendance(&record) {
                Ok(()) => report.absentees_marked += 1,
                Err(StoreError::Conflict(_)) => {
                    debug!(student_id = %student.id, "Record appeared concurrently, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if report.absentees_marked > 0 {
            info!(
                event_id = %event.id,
                session = ?session,
                count = report.absentees_marked,
                "Absentees marked"
            );
            self.audit(AuditEventType::AbsenteesMarked {
                event_id: event.id.clone(),
                session,
                count: report.absentees_marked,
            });
        }

        for record in self.store.list_attendance_for_event(&event.id)? {
            if let Some(fine) = self.generate_fine(&record, event, fine_date)? {
                report.fines_issued += 1;
                report.amount_fined += fine.amount;
            }
        }

        Ok(report)
    }

    // Payments and community service

    /// Record a cash payment against an official receipt
    pub fn record_payment(
        &self,
        student_id: &StudentId,
        amount: Decimal,
        receipt_no: &str,
        date: NaiveDate,
    ) -> Result<PaymentRecord> {
        if amount <= Decimal::ZERO {
            return Err(RollcallError::validation(format!(
                "Payment amount must be positive, got {}",
                amount
            )));
        }
        let receipt_no = receipt_no.trim();
        if receipt_no.is_empty() || !receipt_no.chars().all(|c| c.is_ascii_digit()) {
            return Err(RollcallError::validation(format!(
                "Receipt number must be digits only, got '{}'",
                receipt_no
            )));
        }
        self.student(student_id)?;

        let payment = PaymentRecord {
            payment_id: PaymentId::generate(),
            transaction_id: TransactionId::generate(),
            student_id: student_id.clone(),
            amount,
            receipt_no: receipt_no.to_string(),
            date,
        };
        self.store.insert_payment(&payment)?;

        info!(
            payment_id = %payment.payment_id,
            student_id = %student_id,
            amount = %amount,
            receipt_no,
            "Payment recorded"
        );
        self.activity().push(Transaction::from(&payment));
        self.audit(AuditEventType::PaymentRecorded {
            payment_id: payment.payment_id.clone(),
            student_id: student_id.clone(),
            amount,
            receipt_no: payment.receipt_no.clone(),
        });
        Ok(payment)
    }

    /// Record community service hours; the credit lowers the balance
    pub fn record_service(
        &self,
        student_id: &StudentId,
        hours: u32,
        date: NaiveDate,
        description: Option<String>,
    ) -> Result<ServiceRecord> {
        if hours == 0 {
            return Err(RollcallError::validation(
                "Service hours must be greater than zero",
            ));
        }
        self.student(student_id)?;

        let record = ServiceRecord {
            service_id: ServiceId::generate(),
            student_id: student_id.clone(),
            hours,
            credit_amount: self.policy.credits.credit_for(hours),
            date,
            description: description.filter(|d| !d.trim().is_empty()),
        };
        self.store.insert_service(&record)?;

        info!(
            service_id = %record.service_id,
            student_id = %student_id,
            hours,
            credit = %record.credit_amount,
            "Community service recorded"
        );
        self.activity().push(Transaction::from(&record));
        self.audit(AuditEventType::ServiceRecorded {
            service_id: record.service_id.clone(),
            student_id: student_id.clone(),
            hours,
            credit_amount: record.credit_amount,
        });
        Ok(record)
    }

    // Ledger

    /// Rebuild a student's ledger from the store
    pub fn ledger_for_student(
        &self,
        student_id: &StudentId,
        as_of: DateTime<Local>,
    ) -> Result<Ledger> {
        self.student(student_id)?;

        let fines = self.store.list_fines_for_student(student_id)?;
        let payments = self.store.list_payments_for_student(student_id)?;
        let services = self.store.list_service_for_student(student_id)?;

        let mut transactions: Vec<Transaction> = fines
            .iter()
            .map(Transaction::from)
            .chain(payments.iter().map(Transaction::from))
            .collect();
        transactions.sort_by_key(|t| t.date);

        let service_total: Decimal = services.iter().map(|s| s.credit_amount).sum();
        let ledger = Ledger::aggregate(
            student_id.clone(),
            Decimal::ZERO,
            transactions,
            service_total,
            as_of,
        )
        .with_service_entries(services.iter().map(Transaction::from).collect());

        debug!(
            student_id = %student_id,
            closing_balance = %ledger.closing_balance,
            "Ledger aggregated"
        );
        Ok(ledger)
    }

    /// Statement entries dated within `[start, end]`
    pub fn transactions_between(
        &self,
        student_id: &StudentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let ledger = self.ledger_for_student(student_id, rollcall_util::now())?;
        Ok(ledger
            .transactions_between(start, end)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn clearance(&self, student_id: &StudentId) -> Result<ClearanceStatus> {
        Ok(self
            .ledger_for_student(student_id, rollcall_util::now())?
            .clearance())
    }

    /// System-wide collection totals for records dated within `[from, to]`
    pub fn summary_report(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<SummaryReport> {
        if let (Some(start), Some(end)) = (from, to) {
            if start > end {
                return Err(RollcallError::validation(format!(
                    "Report range starts after it ends ({} > {})",
                    start, end
                )));
            }
        }

        let students = self.store.list_students()?;
        let fines = self.store.list_fines()?;
        let payments = self.store.list_payments()?;
        let services = self.store.list_service()?;

        let report = SummaryReport::build(
            ReportSource {
                students: &students,
                events: &self.policy.events,
                fines: &fines,
                payments: &payments,
                services: &services,
            },
            from,
            to,
            rollcall_util::now(),
        );

        info!(
            fines = %report.overall.fines,
            collected = %report.overall.collected(),
            outstanding = %report.overall.outstanding,
            "Summary report built"
        );
        Ok(report)
    }

    /// Up to `n` most recent money movements made through this engine
    pub fn recent_activity(&self, n: usize) -> Vec<Transaction> {
        self.activity().peek_recent(n)
    }
}

fn new_record(
    student: &Student,
    request: &ScanRequest,
    evaluation: Evaluation,
    session: Option<Session>,
) -> AttendanceRecord {
    let (check_in, check_out) = match request.direction {
        Direction::TimeIn => (Some(request.scanned_at), None),
        Direction::TimeOut => (None, Some(request.scanned_at)),
    };

    AttendanceRecord {
        id: rollcall_util::AttendanceId::generate(),
        student_id: student.id.clone(),
        event_id: request.event_id.clone(),
        status: evaluation.status,
        minutes_late: evaluation.minutes_late,
        check_in,
        check_out,
        source: request.identity.source(),
        session,
    }
}

/// Fold a later scan into an existing record. Time-in replaces the arrival
/// outcome; time-out can only make it worse. Excused records keep their
/// status.
fn update_record(record: &mut AttendanceRecord, request: &ScanRequest, evaluation: Evaluation) {
    match request.direction {
        Direction::TimeIn => {
            record.check_in = Some(request.scanned_at);
            if record.status != AttendanceStatus::Excused {
                record.status = evaluation.status;
                record.minutes_late = evaluation.minutes_late;
            }
        }
        Direction::TimeOut => {
            record.check_out = Some(request.scanned_at);
            let escalates = matches!(
                record.status,
                AttendanceStatus::Present | AttendanceStatus::Late
            );
            if escalates && evaluation.is_late() {
                record.status = AttendanceStatus::Late;
                record.minutes_late = record.minutes_late.max(evaluation.minutes_late);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use rollcall_api::{ScanSource, SessionConfig};
    use rollcall_config::{FineOverrides, LegacyTimes, WindowSet};
    use rollcall_store::{SqliteStore, StoreResult};
    use rollcall_util::TimeWindow;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: NaiveTime, stop: NaiveTime) -> Option<TimeWindow> {
        TimeWindow::new(start, stop)
    }

    fn event_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, h, m, 0).unwrap()
    }

    fn event(id: &str, sessions: SessionConfig, schedule: AttendanceSchedule) -> Event {
        Event {
            id: EventId::new(id),
            name: format!("{} assembly", id),
            date: event_day(),
            semester: 2,
            school_year: "2024-2025".into(),
            sessions,
            schedule,
            fine_overrides: FineOverrides::default(),
        }
    }

    fn make_test_policy() -> Policy {
        let windows = WindowSet {
            am_in: window(hm(7, 0), hm(7, 30)),
            am_out: window(hm(11, 30), hm(12, 0)),
            pm_in: window(hm(13, 0), hm(13, 30)),
            pm_out: window(hm(16, 30), hm(17, 0)),
        };
        let legacy = LegacyTimes {
            am_in: Some(hm(8, 0)),
            pm_in: Some(hm(13, 0)),
            ..Default::default()
        };
        let mut morning = event(
            "EVT-AM",
            SessionConfig::MorningOnly,
            AttendanceSchedule::Windowed(WindowSet {
                am_in: window(hm(8, 0), hm(8, 15)),
                ..Default::default()
            }),
        );
        morning.fine_overrides = FineOverrides {
            absent: Some(dec!(150)),
            late_per_minute: Some(dec!(3)),
        };

        Policy {
            events: vec![
                event("EVT-1", SessionConfig::Both, AttendanceSchedule::Windowed(windows)),
                event("EVT-LEG", SessionConfig::Both, AttendanceSchedule::Legacy(legacy)),
                morning,
                event(
                    "EVT-EMPTY",
                    SessionConfig::Both,
                    AttendanceSchedule::Windowed(WindowSet::default()),
                ),
            ],
            ..Default::default()
        }
    }

    fn student(id: &str, tag: Option<&str>) -> Student {
        Student {
            id: StudentId::new(id),
            first_name: "Juan".into(),
            last_name: format!("Dela Cruz {}", id),
            course: "BSIT".into(),
            year_level: 2,
            section: "A".into(),
            rfid_tag: tag.map(String::from),
        }
    }

    fn setup() -> (AttendanceEngine, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = AttendanceEngine::new(make_test_policy(), store.clone());
        engine.enroll_student(student("2023-0001", Some("04A1"))).unwrap();
        engine.enroll_student(student("2023-0002", Some("04A2"))).unwrap();
        engine.enroll_student(student("2023-0003", None)).unwrap();
        (engine, store)
    }

    fn rfid_scan(
        tag: &str,
        event_id: &str,
        session: Session,
        direction: Direction,
        scanned_at: DateTime<Local>,
    ) -> ScanRequest {
        ScanRequest::new(
            ScanIdentity::Rfid(tag.into()),
            EventId::new(event_id),
            session,
            direction,
            scanned_at,
        )
    }

    fn am_in(tag: &str, scanned_at: DateTime<Local>) -> ScanRequest {
        rfid_scan(tag, "EVT-1", Session::Am, Direction::TimeIn, scanned_at)
    }

    fn id(s: &str) -> StudentId {
        StudentId::new(s)
    }

    #[test]
    fn on_time_scan_creates_present_record() {
        let (engine, store) = setup();

        let outcome = engine.scan(&am_in("04A1", at(7, 10))).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.record.status, AttendanceStatus::Present);
        assert_eq!(outcome.record.source, ScanSource::Rfid);
        assert_eq!(outcome.record.session, Some(Session::Am));
        assert_eq!(outcome.record.check_in, Some(at(7, 10)));
        assert!(outcome.fine.is_none());

        assert!(!store.fine_exists(&id("2023-0001"), &EventId::new("EVT-1")).unwrap());
    }

    #[test]
    fn late_scan_issues_fine() {
        let (engine, _store) = setup();

        let outcome = engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 15);

        let fine = outcome.fine.unwrap();
        assert_eq!(fine.amount, dec!(30));
        assert_eq!(fine.date, event_day());
    }

    #[test]
    fn early_scan_counts_as_late() {
        let (engine, _store) = setup();

        let outcome = engine.scan(&am_in("04A1", at(6, 50))).unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 10);
        assert_eq!(outcome.fine.unwrap().amount, dec!(20));
    }

    #[test]
    fn repeated_scans_update_one_record_and_fine_once() {
        let (engine, store) = setup();

        let first = engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        let second = engine.scan(&am_in("04A1", at(7, 50))).unwrap();

        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.minutes_late, 20);
        assert!(second.fine.is_none());

        let fines = store.list_fines_for_event(&EventId::new("EVT-1")).unwrap();
        assert_eq!(fines.len(), 1);
        assert_eq!(fines[0].amount, dec!(30));
    }

    #[test]
    fn late_check_out_escalates_present_record() {
        let (engine, _store) = setup();

        engine.scan(&am_in("04A1", at(7, 10))).unwrap();
        let outcome = engine
            .scan(&rfid_scan("04A1", "EVT-1", Session::Am, Direction::TimeOut, at(12, 20)))
            .unwrap();

        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 20);
        assert_eq!(outcome.record.check_in, Some(at(7, 10)));
        assert_eq!(outcome.record.check_out, Some(at(12, 20)));
        assert_eq!(outcome.fine.unwrap().amount, dec!(40));
    }

    #[test]
    fn on_time_check_out_keeps_lateness() {
        let (engine, _store) = setup();

        engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        let outcome = engine
            .scan(&rfid_scan("04A1", "EVT-1", Session::Am, Direction::TimeOut, at(11, 45)))
            .unwrap();

        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 15);
    }

    #[test]
    fn excused_record_is_not_changed_by_scans() {
        let (engine, store) = setup();

        let mut record =
            AttendanceRecord::absent(id("2023-0001"), EventId::new("EVT-1"), Some(Session::Am));
        record.status = AttendanceStatus::Excused;
        store.insert_attendance(&record).unwrap();

        let outcome = engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Excused);
        assert_eq!(outcome.record.source, ScanSource::Manual);
        assert!(outcome.fine.is_none());
    }

    #[test]
    fn manual_scan_by_student_id() {
        let (engine, _store) = setup();

        let request = ScanRequest::new(
            ScanIdentity::Student(id("2023-0003")),
            EventId::new("EVT-1"),
            Session::Pm,
            Direction::TimeIn,
            at(13, 5),
        );
        let outcome = engine.scan(&request).unwrap();
        assert_eq!(outcome.record.source, ScanSource::Manual);
        assert_eq!(outcome.record.session, Some(Session::Pm));
        assert_eq!(outcome.record.status, AttendanceStatus::Present);
    }

    #[test]
    fn legacy_event_uses_reference_time() {
        let (engine, _store) = setup();

        let outcome = engine
            .scan(&rfid_scan("04A2", "EVT-LEG", Session::Am, Direction::TimeIn, at(8, 25)))
            .unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 25);
        assert_eq!(outcome.record.session, None);
        assert_eq!(outcome.fine.unwrap().amount, dec!(50));
    }

    #[test]
    fn event_override_rate_applies() {
        let (engine, _store) = setup();

        let outcome = engine
            .scan(&rfid_scan("04A1", "EVT-AM", Session::Am, Direction::TimeIn, at(8, 25)))
            .unwrap();
        assert_eq!(outcome.record.minutes_late, 10);
        assert_eq!(outcome.fine.unwrap().amount, dec!(30));
    }

    #[test]
    fn rejected_scans_leave_no_record() {
        let (engine, store) = setup();

        let err = engine.scan(&am_in("FFFF", at(7, 10))).unwrap_err();
        assert!(matches!(err, RollcallError::UnknownRfid(_)));

        let err = engine
            .scan(&rfid_scan("04A1", "NOPE", Session::Am, Direction::TimeIn, at(7, 10)))
            .unwrap_err();
        assert!(matches!(err, RollcallError::EventNotFound(_)));

        let err = engine
            .scan(&rfid_scan("04A1", "EVT-EMPTY", Session::Am, Direction::TimeIn, at(7, 10)))
            .unwrap_err();
        assert!(matches!(err, RollcallError::ConfigError(_)));

        let err = engine
            .scan(&rfid_scan("04A1", "EVT-AM", Session::Pm, Direction::TimeIn, at(13, 10)))
            .unwrap_err();
        assert!(matches!(err, RollcallError::ConfigError(_)));

        assert!(store.get_attendance(&id("2023-0001"), &EventId::new("EVT-AM")).unwrap().is_none());
        assert!(store.list_attendance_for_event(&EventId::new("EVT-EMPTY")).unwrap().is_empty());

        let audits = store.get_recent_audits(10).unwrap();
        let rejected = audits
            .iter()
            .filter(|a| matches!(a.event, AuditEventType::ScanRejected { .. }))
            .count();
        assert_eq!(rejected, 4);
    }

    #[test]
    fn scans_expire_after_grace_days() {
        let (engine, _store) = setup();

        let next_day = Local.with_ymd_and_hms(2025, 3, 15, 7, 10, 0).unwrap();
        assert!(engine.scan(&am_in("04A1", next_day)).is_ok());

        let two_days_later = Local.with_ymd_and_hms(2025, 3, 16, 7, 10, 0).unwrap();
        let err = engine.scan(&am_in("04A2", two_days_later)).unwrap_err();
        assert!(matches!(err, RollcallError::ScanExpired { grace_days: 1, .. }));
    }

    #[test]
    fn check_out_stamps_existing_record() {
        let (engine, _store) = setup();
        let event_id = EventId::new("EVT-1");

        assert!(engine.check_out(&id("2023-0001"), &event_id, at(17, 0)).unwrap().is_none());

        engine.scan(&am_in("04A1", at(7, 10))).unwrap();
        let record = engine
            .check_out(&id("2023-0001"), &event_id, at(17, 0))
            .unwrap()
            .unwrap();
        assert_eq!(record.check_out, Some(at(17, 0)));
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[test]
    fn finalization_marks_absentees_and_is_idempotent() {
        let (engine, store) = setup();
        let event_id = EventId::new("EVT-1");

        engine.scan(&am_in("04A1", at(7, 10))).unwrap();
        engine.scan(&am_in("04A2", at(7, 45))).unwrap();

        let report = engine.finalize_event(&event_id).unwrap();
        assert_eq!(report.absentees_marked, 1);
        assert_eq!(report.fines_issued, 1);
        assert_eq!(report.amount_fined, dec!(100));

        let again = engine.finalize_event(&event_id).unwrap();
        assert_eq!(again.absentees_marked, 0);
        assert_eq!(again.fines_issued, 0);

        let present = store.get_attendance(&id("2023-0001"), &event_id).unwrap().unwrap();
        assert_eq!(present.status, AttendanceStatus::Present);
        let late = store.get_attendance(&id("2023-0002"), &event_id).unwrap().unwrap();
        assert_eq!(late.status, AttendanceStatus::Late);
        let absent = store.get_attendance(&id("2023-0003"), &event_id).unwrap().unwrap();
        assert_eq!(absent.status, AttendanceStatus::Absent);
        assert_eq!(absent.session, None);

        assert_eq!(store.list_fines_for_event(&event_id).unwrap().len(), 2);
    }

    #[test]
    fn finalization_uses_absent_override() {
        let (engine, _store) = setup();

        let report = engine.finalize_event(&EventId::new("EVT-AM")).unwrap();
        assert_eq!(report.absentees_marked, 3);
        assert_eq!(report.amount_fined, dec!(450));
    }

    #[test]
    fn session_absentees_wait_for_window_to_close() {
        let (engine, store) = setup();
        let event_id = EventId::new("EVT-1");

        let err = engine
            .mark_session_absentees(&event_id, Session::Pm, Direction::TimeIn, at(13, 10))
            .unwrap_err();
        assert!(matches!(err, RollcallError::WindowStillOpen { until } if until == hm(13, 30)));

        engine.scan(&rfid_scan("04A1", "EVT-1", Session::Pm, Direction::TimeIn, at(13, 5))).unwrap();
        let report = engine
            .mark_session_absentees(&event_id, Session::Pm, Direction::TimeIn, at(13, 30))
            .unwrap();
        assert_eq!(report.absentees_marked, 2);
        assert_eq!(report.fines_issued, 2);

        let absent = store.get_attendance(&id("2023-0002"), &event_id).unwrap().unwrap();
        assert_eq!(absent.session, Some(Session::Pm));
        assert_eq!(absent.status, AttendanceStatus::Absent);
    }

    #[test]
    fn session_absentees_need_a_window() {
        let (engine, _store) = setup();

        let err = engine
            .mark_session_absentees(&EventId::new("EVT-LEG"), Session::Am, Direction::TimeIn, at(18, 0))
            .unwrap_err();
        assert!(matches!(err, RollcallError::ConfigError(_)));

        let err = engine
            .mark_session_absentees(&EventId::new("EVT-AM"), Session::Pm, Direction::TimeIn, at(18, 0))
            .unwrap_err();
        assert!(matches!(err, RollcallError::ConfigError(_)));
    }

    #[test]
    fn payment_validation() {
        let (engine, _store) = setup();
        let student = id("2023-0001");
        let day = event_day();

        assert!(matches!(
            engine.record_payment(&student, Decimal::ZERO, "1001", day),
            Err(RollcallError::ValidationError(_))
        ));
        assert!(matches!(
            engine.record_payment(&student, dec!(-5), "1001", day),
            Err(RollcallError::ValidationError(_))
        ));
        assert!(matches!(
            engine.record_payment(&student, dec!(50), "OR-12", day),
            Err(RollcallError::ValidationError(_))
        ));
        assert!(matches!(
            engine.record_payment(&student, dec!(50), "  ", day),
            Err(RollcallError::ValidationError(_))
        ));
        assert!(matches!(
            engine.record_payment(&id("1999-0000"), dec!(50), "1001", day),
            Err(RollcallError::StudentNotFound(_))
        ));

        let payment = engine.record_payment(&student, dec!(50), " 1001 ", day).unwrap();
        assert_eq!(payment.receipt_no, "1001");
    }

    #[test]
    fn service_credit_uses_hourly_rate() {
        let (engine, _store) = setup();
        let student = id("2023-0001");

        assert!(matches!(
            engine.record_service(&student, 0, event_day(), None),
            Err(RollcallError::ValidationError(_))
        ));

        let record = engine
            .record_service(&student, 2, event_day(), Some("Library shelving".into()))
            .unwrap();
        assert_eq!(record.credit_amount, dec!(100));
    }

    #[test]
    fn ledger_and_clearance_follow_balance() {
        let (engine, _store) = setup();
        let student = id("2023-0003");

        engine.finalize_event(&EventId::new("EVT-1")).unwrap();
        engine.record_payment(&student, dec!(40), "2001", event_day()).unwrap();
        engine.record_service(&student, 1, event_day(), None).unwrap();

        let ledger = engine.ledger_for_student(&student, at(18, 0)).unwrap();
        assert_eq!(ledger.total_fines, dec!(100));
        assert_eq!(ledger.total_payments, dec!(40));
        assert_eq!(ledger.total_service_credits, dec!(50));
        assert_eq!(ledger.closing_balance, dec!(10));
        assert_eq!(ledger.transactions().len(), 2);
        assert_eq!(ledger.statement().len(), 3);
        assert!(ledger.service_entries()[0].id.as_str().starts_with("SVC-TXN-"));
        assert_eq!(
            engine.clearance(&student).unwrap(),
            ClearanceStatus::WithBalance(dec!(10))
        );

        engine.record_service(&student, 1, event_day(), None).unwrap();
        let ledger = engine.ledger_for_student(&student, at(18, 0)).unwrap();
        assert_eq!(ledger.closing_balance, dec!(-40));
        assert_eq!(ledger.outstanding(), Decimal::ZERO);
        assert!(engine.clearance(&student).unwrap().is_cleared());
    }

    #[test]
    fn ledger_for_unknown_student_fails() {
        let (engine, _store) = setup();
        assert!(matches!(
            engine.ledger_for_student(&id("1999-0000"), at(18, 0)),
            Err(RollcallError::StudentNotFound(_))
        ));
    }

    #[test]
    fn recent_activity_is_newest_first() {
        let (engine, _store) = setup();
        let student = id("2023-0001");

        engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        engine.record_payment(&student, dec!(30), "3001", event_day()).unwrap();
        engine.record_service(&student, 1, event_day(), None).unwrap();

        let recent = engine.recent_activity(10);
        let labels: Vec<&str> = recent.iter().map(|t| t.kind.label()).collect();
        assert_eq!(labels, vec!["service credit", "payment", "fine"]);
        assert_eq!(engine.recent_activity(1).len(), 1);
    }

    #[test]
    fn rfid_tags_stay_unique() {
        let (engine, _store) = setup();
        let err = engine.enroll_student(student("2023-0009", Some("04A1"))).unwrap_err();
        assert!(matches!(err, RollcallError::ValidationError(_)));
    }

    #[test]
    fn sequenced_scan_is_applied() {
        let (engine, _store) = setup();
        let sequencer = ScanSequencer::new();

        let outcome = engine.scan_in_order(&sequencer, am_in("04A1", at(7, 20))).unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Present);
        assert!(sequencer.is_empty());
    }

    /// Store whose next attendance read misses a record that another writer
    /// inserts before the caller gets to insert its own
    struct InterleavingStore {
        inner: SqliteStore,
        armed: AtomicBool,
    }

    impl Store for InterleavingStore {
        fn append_audit(&self, event: AuditEvent) -> StoreResult<()> {
            self.inner.append_audit(event)
        }
        fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
            self.inner.get_recent_audits(limit)
        }
        fn upsert_student(&self, student: &Student) -> StoreResult<()> {
            self.inner.upsert_student(student)
        }
        fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>> {
            self.inner.get_student(id)
        }
        fn find_student_by_rfid(&self, tag: &str) -> StoreResult<Option<Student>> {
            self.inner.find_student_by_rfid(tag)
        }
        fn list_students(&self) -> StoreResult<Vec<Student>> {
            self.inner.list_students()
        }
        fn get_attendance(
            &self,
            student_id: &StudentId,
            event_id: &EventId,
        ) -> StoreResult<Option<AttendanceRecord>> {
            if self.armed.swap(false, Ordering::SeqCst) {
                let absent =
                    AttendanceRecord::absent(student_id.clone(), event_id.clone(), None);
                self.inner.insert_attendance(&absent)?;
                return Ok(None);
            }
            self.inner.get_attendance(student_id, event_id)
        }
        fn list_attendance_for_event(
            &self,
            event_id: &EventId,
        ) -> StoreResult<Vec<AttendanceRecord>> {
            self.inner.list_attendance_for_event(event_id)
        }
        fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
            self.inner.insert_attendance(record)
        }
        fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
            self.inner.update_attendance(record)
        }
        fn insert_fine(&self, fine: &FineRecord) -> StoreResult<()> {
            self.inner.insert_fine(fine)
        }
        fn fine_exists(&self, student_id: &StudentId, event_id: &EventId) -> StoreResult<bool> {
            self.inner.fine_exists(student_id, event_id)
        }
        fn list_fines_for_event(&self, event_id: &EventId) -> StoreResult<Vec<FineRecord>> {
            self.inner.list_fines_for_event(event_id)
        }
        fn list_fines_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<FineRecord>> {
            self.inner.list_fines_for_student(student_id)
        }
        fn list_fines(&self) -> StoreResult<Vec<FineRecord>> {
            self.inner.list_fines()
        }
        fn insert_payment(&self, payment: &PaymentRecord) -> StoreResult<()> {
            self.inner.insert_payment(payment)
        }
        fn list_payments_for_student(
            &self,
            student_id: &StudentId,
        ) -> StoreResult<Vec<PaymentRecord>> {
            self.inner.list_payments_for_student(student_id)
        }
        fn list_payments(&self) -> StoreResult<Vec<PaymentRecord>> {
            self.inner.list_payments()
        }
        fn insert_service(&self, record: &ServiceRecord) -> StoreResult<()> {
            self.inner.insert_service(record)
        }
        fn list_service_for_student(
            &self,
            student_id: &StudentId,
        ) -> StoreResult<Vec<ServiceRecord>> {
            self.inner.list_service_for_student(student_id)
        }
        fn list_service(&self) -> StoreResult<Vec<ServiceRecord>> {
            self.inner.list_service()
        }
        fn is_healthy(&self) -> bool {
            self.inner.is_healthy()
        }
    }

    #[test]
    fn scan_updates_record_created_between_read_and_insert() {
        let store = Arc::new(InterleavingStore {
            inner: SqliteStore::in_memory().unwrap(),
            armed: AtomicBool::new(false),
        });
        let engine = AttendanceEngine::new(make_test_policy(), store.clone());
        engine.enroll_student(student("2023-0001", Some("04A1"))).unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let outcome = engine.scan(&am_in("04A1", at(7, 45))).unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.record.status, AttendanceStatus::Late);
        assert_eq!(outcome.record.minutes_late, 15);
        assert_eq!(outcome.fine.map(|f| f.amount), Some(dec!(30)));

        let event_id = EventId::new("EVT-1");
        let stored = store.get_attendance(&id("2023-0001"), &event_id).unwrap().unwrap();
        assert_eq!(stored.status, AttendanceStatus::Late);
        assert!(stored.check_in.is_some());
        assert_eq!(store.list_attendance_for_event(&event_id).unwrap().len(), 1);
    }

    #[test]
    fn summary_report_reads_every_student() {
        let (engine, _store) = setup();
        engine.scan(&am_in("04A1", at(7, 45))).unwrap();
        engine.finalize_event(&EventId::new("EVT-1")).unwrap();
        engine
            .record_payment(&id("2023-0001"), dec!(50), "4001", event_day())
            .unwrap();
        engine.record_service(&id("2023-0002"), 1, event_day(), None).unwrap();

        let report = engine.summary_report(None, None).unwrap();
        // late 30 plus two absences of 100
        assert_eq!(report.overall.fines, dec!(230));
        assert_eq!(report.overall.fine_count, 3);
        assert_eq!(report.overall.payments, dec!(50));
        assert_eq!(report.overall.service_credits, dec!(50));
        assert_eq!(report.overall.service_hours, 1);
        // 0 + 50 + 100
        assert_eq!(report.overall.outstanding, dec!(150));
        assert_eq!(report.by_event.len(), 1);
        assert_eq!(report.by_event[0].name.as_deref(), Some("EVT-1 assembly"));
        assert_eq!(report.by_section.len(), 1);
        assert_eq!(report.by_section[0].students, 3);

        let err = engine
            .summary_report(Some(event_day()), Some(event_day().pred_opt().unwrap()))
            .unwrap_err();
        assert!(matches!(err, RollcallError::ValidationError(_)));
    }
}
