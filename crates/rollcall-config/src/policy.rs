//! Validated policy structures

use crate::schema::{
    RawConfig, RawCredits, RawEvent, RawFines, RawLegacyTimes, RawServiceConfig, RawTimeWindow,
    RawWindows,
};
use crate::validation::{parse_date, parse_time};
use chrono::{NaiveDate, NaiveTime};
use rollcall_api::{Direction, Session, SessionConfig};
use rollcall_util::{EventId, TimeWindow, default_data_dir, is_before_noon};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;

/// Flat fine for an absence when the event sets no override
pub const DEFAULT_FINE_ABSENT: Decimal = dec!(100);

/// Per-minute late fine when the event sets no override
pub const DEFAULT_FINE_PER_MINUTE_LATE: Decimal = dec!(2);

/// Smallest fine charged for any late arrival
pub const DEFAULT_MIN_FINE_LATE: Decimal = dec!(20);

/// Credit earned per hour of community service
pub const DEFAULT_CREDIT_PER_HOUR: Decimal = dec!(50);

pub const DEFAULT_SCAN_GRACE_DAYS: u32 = 1;

pub const DEFAULT_RECENT_ACTIVITY_CAPACITY: usize = 50;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub service: ServiceConfig,

    /// System default fine rates
    pub fines: FineSchedule,

    pub credits: CreditPolicy,

    /// Validated events
    pub events: Vec<Event>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            fines: FineSchedule::from_raw(raw.fines),
            credits: CreditPolicy::from_raw(raw.credits),
            events: raw.events.into_iter().map(Event::from_raw).collect(),
        }
    }

    /// Get event by ID
    pub fn get_event(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| &e.id == id)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub scan_grace_days: u32,
    pub recent_activity_capacity: usize,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            scan_grace_days: raw.scan_grace_days.unwrap_or(DEFAULT_SCAN_GRACE_DAYS),
            recent_activity_capacity: raw
                .recent_activity_capacity
                .unwrap_or(DEFAULT_RECENT_ACTIVITY_CAPACITY),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// System-wide fine rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineSchedule {
    pub absent: Decimal,
    pub late_per_minute: Decimal,
    pub minimum_late: Decimal,
}

impl FineSchedule {
    fn from_raw(raw: RawFines) -> Self {
        Self {
            absent: raw.absent.unwrap_or(DEFAULT_FINE_ABSENT),
            late_per_minute: raw.late_per_minute.unwrap_or(DEFAULT_FINE_PER_MINUTE_LATE),
            minimum_late: raw.minimum_late.unwrap_or(DEFAULT_MIN_FINE_LATE),
        }
    }
}

impl Default for FineSchedule {
    fn default() -> Self {
        Self {
            absent: DEFAULT_FINE_ABSENT,
            late_per_minute: DEFAULT_FINE_PER_MINUTE_LATE,
            minimum_late: DEFAULT_MIN_FINE_LATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPolicy {
    pub per_hour: Decimal,
}

impl CreditPolicy {
    fn from_raw(raw: RawCredits) -> Self {
        Self {
            per_hour: raw.per_hour.unwrap_or(DEFAULT_CREDIT_PER_HOUR),
        }
    }

    /// Credit earned for `hours` of service
    pub fn credit_for(&self, hours: u32) -> Decimal {
        self.per_hour * Decimal::from(hours)
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            per_hour: DEFAULT_CREDIT_PER_HOUR,
        }
    }
}

/// Validated event definition
#[derive(Debug, Clone)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub date: NaiveDate,
    pub semester: u8,
    pub school_year: String,
    pub sessions: SessionConfig,
    pub schedule: AttendanceSchedule,
    pub fine_overrides: FineOverrides,
}

impl Event {
    fn from_raw(raw: RawEvent) -> Self {
        // Validation has already rejected unparseable dates
        let date = parse_date(&raw.date).unwrap_or_default();

        let schedule = match (raw.windows, raw.legacy) {
            (_, Some(legacy)) => AttendanceSchedule::Legacy(convert_legacy(legacy)),
            (Some(windows), None) => AttendanceSchedule::Windowed(convert_windows(windows)),
            (None, None) => AttendanceSchedule::Windowed(WindowSet::default()),
        };

        Self {
            id: EventId::new(raw.id),
            name: raw.name,
            date,
            semester: raw.semester,
            school_year: raw.school_year,
            sessions: raw.sessions,
            schedule,
            fine_overrides: FineOverrides {
                absent: raw.fine_absent,
                late_per_minute: raw.fine_late_per_minute,
            },
        }
    }
}

/// Per-event replacements for the system fine rates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FineOverrides {
    pub absent: Option<Decimal>,
    pub late_per_minute: Option<Decimal>,
}

/// How an event decides whether a scan is on time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceSchedule {
    /// A closed window per (session, direction)
    Windowed(WindowSet),
    /// A single reference time per half-day; later scans are late
    Legacy(LegacyTimes),
}

impl AttendanceSchedule {
    /// True when the event carries no timing information at all
    pub fn is_unconfigured(&self) -> bool {
        match self {
            AttendanceSchedule::Windowed(windows) => windows.is_empty(),
            AttendanceSchedule::Legacy(times) => times.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSet {
    pub am_in: Option<TimeWindow>,
    pub am_out: Option<TimeWindow>,
    pub pm_in: Option<TimeWindow>,
    pub pm_out: Option<TimeWindow>,
}

impl WindowSet {
    pub fn get(&self, session: Session, direction: Direction) -> Option<TimeWindow> {
        match (session, direction) {
            (Session::Am, Direction::TimeIn) => self.am_in,
            (Session::Am, Direction::TimeOut) => self.am_out,
            (Session::Pm, Direction::TimeIn) => self.pm_in,
            (Session::Pm, Direction::TimeOut) => self.pm_out,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.am_in.is_none() && self.am_out.is_none() && self.pm_in.is_none() && self.pm_out.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyTimes {
    pub am_in: Option<NaiveTime>,
    pub am_out: Option<NaiveTime>,
    pub pm_in: Option<NaiveTime>,
    pub pm_out: Option<NaiveTime>,
}

impl LegacyTimes {
    /// Reference time for a scan: morning time-in before noon, afternoon
    /// time-in otherwise.
    pub fn reference_for(&self, scanned: NaiveTime) -> Option<NaiveTime> {
        if is_before_noon(scanned) {
            self.am_in
        } else {
            self.pm_in
        }
    }

    pub fn is_empty(&self) -> bool {
        self.am_in.is_none() && self.am_out.is_none() && self.pm_in.is_none() && self.pm_out.is_none()
    }
}

// Conversion helpers

fn convert_windows(raw: RawWindows) -> WindowSet {
    WindowSet {
        am_in: raw.am_in.and_then(convert_time_window),
        am_out: raw.am_out.and_then(convert_time_window),
        pm_in: raw.pm_in.and_then(convert_time_window),
        pm_out: raw.pm_out.and_then(convert_time_window),
    }
}

fn convert_time_window(raw: RawTimeWindow) -> Option<TimeWindow> {
    let start = parse_time(&raw.start).ok()?;
    let stop = parse_time(&raw.stop).ok()?;
    TimeWindow::new(start, stop)
}

fn convert_legacy(raw: RawLegacyTimes) -> LegacyTimes {
    let parse = |value: Option<String>| value.and_then(|v| parse_time(&v).ok());
    LegacyTimes {
        am_in: parse(raw.am_in),
        am_out: parse(raw.am_out),
        pm_in: parse(raw.pm_in),
        pm_out: parse(raw.pm_out),
    }
}
