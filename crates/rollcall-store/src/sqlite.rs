//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceRecord, FineRecord, PaymentRecord, ServiceRecord, Student};
use rollcall_util::{EventId, StudentId};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                student_id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                course TEXT NOT NULL,
                year_level INTEGER NOT NULL,
                section TEXT NOT NULL,
                rfid_tag TEXT UNIQUE
            );

            -- One record per (student, event)
            CREATE TABLE IF NOT EXISTS attendance (
                attendance_id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                status TEXT NOT NULL,
                minutes_late INTEGER NOT NULL DEFAULT 0,
                check_in TEXT,
                check_out TEXT,
                source TEXT NOT NULL,
                session TEXT,
                UNIQUE (student_id, event_id)
            );

            -- At most one fine per (student, event)
            CREATE TABLE IF NOT EXISTS fines (
                fine_id TEXT PRIMARY KEY,
                transaction_id TEXT NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                date TEXT NOT NULL,
                UNIQUE (student_id, event_id)
            );

            CREATE TABLE IF NOT EXISTS payments (
                payment_id TEXT PRIMARY KEY,
                transaction_id TEXT NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                receipt_no TEXT NOT NULL,
                date TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_records (
                service_id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                hours INTEGER NOT NULL,
                credit_amount TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_attendance_event ON attendance(event_id);
            CREATE INDEX IF NOT EXISTS idx_fines_student ON fines(student_id);
            CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id);
            CREATE INDEX IF NOT EXISTS idx_service_student ON service_records(student_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

// Row conversion helpers

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Local>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Local))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: StudentId::new(row.get::<_, String>(0)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        course: row.get(3)?,
        year_level: row.get(4)?,
        section: row.get(5)?,
        rfid_tag: row.get(6)?,
    })
}

const STUDENT_COLUMNS: &str =
    "student_id, first_name, last_name, course, year_level, section, rfid_tag";

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let session: Option<String> = row.get(8)?;
    Ok(AttendanceRecord {
        id: row.get::<_, String>(0)?.into(),
        student_id: row.get::<_, String>(1)?.into(),
        event_id: row.get::<_, String>(2)?.into(),
        status: parse_column(3, &row.get::<_, String>(3)?)?,
        minutes_late: row.get(4)?,
        check_in: parse_timestamp(5, row.get(5)?)?,
        check_out: parse_timestamp(6, row.get(6)?)?,
        source: parse_column(7, &row.get::<_, String>(7)?)?,
        session: session.map(|s| parse_column(8, &s)).transpose()?,
    })
}

const ATTENDANCE_COLUMNS: &str = "attendance_id, student_id, event_id, status, minutes_late, \
     check_in, check_out, source, session";

fn fine_from_row(row: &Row<'_>) -> rusqlite::Result<FineRecord> {
    Ok(FineRecord {
        fine_id: row.get::<_, String>(0)?.into(),
        transaction_id: row.get::<_, String>(1)?.into(),
        student_id: row.get::<_, String>(2)?.into(),
        event_id: row.get::<_, String>(3)?.into(),
        amount: parse_column(4, &row.get::<_, String>(4)?)?,
        date: parse_column(5, &row.get::<_, String>(5)?)?,
    })
}

const FINE_COLUMNS: &str = "fine_id, transaction_id, student_id, event_id, amount, date";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        payment_id: row.get::<_, String>(0)?.into(),
        transaction_id: row.get::<_, String>(1)?.into(),
        student_id: row.get::<_, String>(2)?.into(),
        amount: parse_column(3, &row.get::<_, String>(3)?)?,
        receipt_no: row.get(4)?,
        date: parse_column(5, &row.get::<_, String>(5)?)?,
    })
}

fn service_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceRecord> {
    Ok(ServiceRecord {
        service_id: row.get::<_, String>(0)?.into(),
        student_id: row.get::<_, String>(1)?.into(),
        hours: row.get(2)?,
        credit_amount: parse_column(3, &row.get::<_, String>(3)?)?,
        date: parse_column(4, &row.get::<_, String>(4)?)?,
        description: row.get(5)?,
    })
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| rollcall_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn upsert_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO students (student_id, first_name, last_name, course, year_level, section, rfid_tag)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(student_id)
            DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                course = excluded.course,
                year_level = excluded.year_level,
                section = excluded.section,
                rfid_tag = excluded.rfid_tag
            "#,
            params![
                student.id.as_str(),
                student.first_name,
                student.last_name,
                student.course,
                student.year_level,
                student.section,
                student.rfid_tag,
            ],
        )?;

        debug!(student_id = %student.id, "Student saved");
        Ok(())
    }

    fn get_student(&self, id: &StudentId) -> StoreResult<Option<Student>> {
        let conn = self.conn()?;
        let student = conn
            .query_row(
                &format!("SELECT {} FROM students WHERE student_id = ?", STUDENT_COLUMNS),
                [id.as_str()],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn find_student_by_rfid(&self, tag: &str) -> StoreResult<Option<Student>> {
        let conn = self.conn()?;
        let student = conn
            .query_row(
                &format!("SELECT {} FROM students WHERE rfid_tag = ?", STUDENT_COLUMNS),
                [tag],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM students ORDER BY student_id",
            STUDENT_COLUMNS
        ))?;
        let students = stmt
            .query_map([], student_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }

    fn get_attendance(
        &self,
        student_id: &StudentId,
        event_id: &EventId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM attendance WHERE student_id = ? AND event_id = ?",
                    ATTENDANCE_COLUMNS
                ),
                [student_id.as_str(), event_id.as_str()],
                attendance_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list_attendance_for_event(&self, event_id: &EventId) -> StoreResult<Vec<AttendanceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM attendance WHERE event_id = ? ORDER BY student_id",
            ATTENDANCE_COLUMNS
        ))?;
        let records = stmt
            .query_map([event_id.as_str()], attendance_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            &format!(
                "INSERT INTO attendance ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ATTENDANCE_COLUMNS
            ),
            params![
                record.id.as_str(),
                record.student_id.as_str(),
                record.event_id.as_str(),
                record.status.as_str(),
                record.minutes_late,
                record.check_in.map(|t| t.to_rfc3339()),
                record.check_out.map(|t| t.to_rfc3339()),
                record.source.as_str(),
                record.session.map(|s| s.as_str()),
            ],
        )?;

        debug!(
            attendance_id = %record.id,
            student_id = %record.student_id,
            event_id = %record.event_id,
            status = %record.status,
            "Attendance inserted"
        );
        Ok(())
    }

    fn update_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            UPDATE attendance
            SET status = ?, minutes_late = ?, check_in = ?, check_out = ?, source = ?, session = ?
            WHERE attendance_id = ?
            "#,
            params![
                record.status.as_str(),
                record.minutes_late,
                record.check_in.map(|t| t.to_rfc3339()),
                record.check_out.map(|t| t.to_rfc3339()),
                record.source.as_str(),
                record.session.map(|s| s.as_str()),
                record.id.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("attendance {}", record.id)));
        }

        debug!(
            attendance_id = %record.id,
            status = %record.status,
            minutes_late = record.minutes_late,
            "Attendance updated"
        );
        Ok(())
    }

    fn insert_fine(&self, fine: &FineRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            &format!("INSERT INTO fines ({}) VALUES (?, ?, ?, ?, ?, ?)", FINE_COLUMNS),
            params![
                fine.fine_id.as_str(),
                fine.transaction_id.as_str(),
                fine.student_id.as_str(),
                fine.event_id.as_str(),
                fine.amount.to_string(),
                fine.date.to_string(),
            ],
        )?;

        debug!(fine_id = %fine.fine_id, amount = %fine.amount, "Fine inserted");
        Ok(())
    }

    fn fine_exists(&self, student_id: &StudentId, event_id: &EventId) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM fines WHERE student_id = ? AND event_id = ?",
                [student_id.as_str(), event_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_fines_for_event(&self, event_id: &EventId) -> StoreResult<Vec<FineRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fines WHERE event_id = ? ORDER BY student_id",
            FINE_COLUMNS
        ))?;
        let fines = stmt
            .query_map([event_id.as_str()], fine_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fines)
    }

    fn list_fines_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<FineRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fines WHERE student_id = ? ORDER BY date, rowid",
            FINE_COLUMNS
        ))?;
        let fines = stmt
            .query_map([student_id.as_str()], fine_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fines)
    }

    fn list_fines(&self) -> StoreResult<Vec<FineRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM fines ORDER BY date, rowid",
            FINE_COLUMNS
        ))?;
        let fines = stmt
            .query_map([], fine_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fines)
    }

    fn insert_payment(&self, payment: &PaymentRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO payments (payment_id, transaction_id, student_id, amount, receipt_no, date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                payment.payment_id.as_str(),
                payment.transaction_id.as_str(),
                payment.student_id.as_str(),
                payment.amount.to_string(),
                payment.receipt_no,
                payment.date.to_string(),
            ],
        )?;

        debug!(payment_id = %payment.payment_id, amount = %payment.amount, "Payment inserted");
        Ok(())
    }

    fn list_payments_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<PaymentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payment_id, transaction_id, student_id, amount, receipt_no, date
            FROM payments WHERE student_id = ? ORDER BY date, rowid
            "#,
        )?;
        let payments = stmt
            .query_map([student_id.as_str()], payment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(payments)
    }

    fn list_payments(&self) -> StoreResult<Vec<PaymentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payment_id, transaction_id, student_id, amount, receipt_no, date
            FROM payments ORDER BY date, rowid
            "#,
        )?;
        let payments = stmt
            .query_map([], payment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(payments)
    }

    fn insert_service(&self, record: &ServiceRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO service_records (service_id, student_id, hours, credit_amount, date, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.service_id.as_str(),
                record.student_id.as_str(),
                record.hours,
                record.credit_amount.to_string(),
                record.date.to_string(),
                record.description,
            ],
        )?;

        debug!(service_id = %record.service_id, hours = record.hours, "Service record inserted");
        Ok(())
    }

    fn list_service_for_student(&self, student_id: &StudentId) -> StoreResult<Vec<ServiceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT service_id, student_id, hours, credit_amount, date, description
            FROM service_records WHERE student_id = ? ORDER BY date, rowid
            "#,
        )?;
        let records = stmt
            .query_map([student_id.as_str()], service_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn list_service(&self) -> StoreResult<Vec<ServiceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT service_id, student_id, hours, credit_amount, date, description
            FROM service_records ORDER BY date, rowid
            "#,
        )?;
        let records = stmt
            .query_map([], service_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
