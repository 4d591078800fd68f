//! Attendance vocabulary: status, sessions, directions, scan requests

use chrono::{DateTime, Local};
use rollcall_util::{EventId, StudentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Failure to parse one of the textual enums below
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value:?}")]
pub struct ParseTypeError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseTypeError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Outcome of attendance for one student at one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Excused => "EXCUSED",
        }
    }

    /// Statuses that can carry a fine
    pub fn is_fineable(&self) -> bool {
        matches!(self, AttendanceStatus::Late | AttendanceStatus::Absent)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "LATE" => Ok(AttendanceStatus::Late),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "EXCUSED" => Ok(AttendanceStatus::Excused),
            _ => Err(ParseTypeError::new("attendance status", s)),
        }
    }
}

/// Half of an event day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    Am,
    Pm,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Am => "AM",
            Session::Pm => "PM",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AM" | "MORNING" => Ok(Session::Am),
            "PM" | "AFTERNOON" => Ok(Session::Pm),
            _ => Err(ParseTypeError::new("session", s)),
        }
    }
}

/// Whether a scan records arrival or departure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    TimeIn,
    TimeOut,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::TimeIn => "time_in",
            Direction::TimeOut => "time_out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in" | "time_in" => Ok(Direction::TimeIn),
            "out" | "time_out" => Ok(Direction::TimeOut),
            _ => Err(ParseTypeError::new("direction", s)),
        }
    }
}

/// Which sessions an event runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionConfig {
    MorningOnly,
    AfternoonOnly,
    #[default]
    Both,
}

impl SessionConfig {
    pub fn offers(&self, session: Session) -> bool {
        match self {
            SessionConfig::MorningOnly => session == Session::Am,
            SessionConfig::AfternoonOnly => session == Session::Pm,
            SessionConfig::Both => true,
        }
    }
}

/// How an attendance record was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanSource {
    Rfid,
    Manual,
}

impl ScanSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSource::Rfid => "RFID",
            ScanSource::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanSource {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RFID" => Ok(ScanSource::Rfid),
            "MANUAL" => Ok(ScanSource::Manual),
            _ => Err(ParseTypeError::new("scan source", s)),
        }
    }
}

/// Who is being scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScanIdentity {
    /// Tag read by a card reader
    Rfid(String),
    /// Student number typed in by staff
    Student(StudentId),
}

impl ScanIdentity {
    pub fn source(&self) -> ScanSource {
        match self {
            ScanIdentity::Rfid(_) => ScanSource::Rfid,
            ScanIdentity::Student(_) => ScanSource::Manual,
        }
    }
}

impl fmt::Display for ScanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanIdentity::Rfid(tag) => write!(f, "rfid:{}", tag),
            ScanIdentity::Student(id) => write!(f, "student:{}", id),
        }
    }
}

/// A single check-in or check-out request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub identity: ScanIdentity,
    pub event_id: EventId,
    pub session: Session,
    pub direction: Direction,
    pub scanned_at: DateTime<Local>,
}

impl ScanRequest {
    pub fn new(
        identity: ScanIdentity,
        event_id: EventId,
        session: Session,
        direction: Direction,
        scanned_at: DateTime<Local>,
    ) -> Self {
        Self {
            identity,
            event_id,
            session,
            direction,
            scanned_at,
        }
    }
}
