//! Scan classification against an event's schedule

use chrono::NaiveTime;
use rollcall_api::{AttendanceStatus, Direction, Session};
use rollcall_config::{AttendanceSchedule, LegacyTimes};
use rollcall_util::{TimeWindow, whole_minutes_between};

/// Result of classifying one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: AttendanceStatus,
    pub minutes_late: u32,
}

impl Evaluation {
    pub const ON_TIME: Evaluation = Evaluation {
        status: AttendanceStatus::Present,
        minutes_late: 0,
    };

    pub fn late(minutes_late: u32) -> Self {
        Self {
            status: AttendanceStatus::Late,
            minutes_late,
        }
    }

    pub fn is_late(&self) -> bool {
        self.status == AttendanceStatus::Late
    }
}

/// Strategy used to classify a scan. Never produces `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluator {
    /// On time inside the closed window, late on either side of it
    Window(TimeWindow),
    /// Late after the half-day's reference time
    Legacy(LegacyTimes),
    /// Nothing to compare against
    Unreferenced,
}

impl Evaluator {
    /// Pick the evaluator for a scan of `session`/`direction` at an event
    pub fn for_scan(schedule: &AttendanceSchedule, session: Session, direction: Direction) -> Self {
        match schedule {
            AttendanceSchedule::Windowed(windows) => windows
                .get(session, direction)
                .map(Evaluator::Window)
                .unwrap_or(Evaluator::Unreferenced),
            AttendanceSchedule::Legacy(times) => Evaluator::Legacy(*times),
        }
    }

    pub fn evaluate(&self, scanned: NaiveTime) -> Evaluation {
        match self {
            Evaluator::Window(window) => evaluate_window(window, scanned),
            Evaluator::Legacy(times) => evaluate_reference(times.reference_for(scanned), scanned),
            Evaluator::Unreferenced => Evaluation::ON_TIME,
        }
    }
}

/// Early and late scans are both `Late`, by their distance to the window
pub fn evaluate_window(window: &TimeWindow, scanned: NaiveTime) -> Evaluation {
    if window.contains(scanned) {
        Evaluation::ON_TIME
    } else {
        Evaluation::late(window.minutes_outside(scanned))
    }
}

pub fn evaluate_reference(reference: Option<NaiveTime>, scanned: NaiveTime) -> Evaluation {
    match reference {
        Some(reference) if scanned > reference => {
            Evaluation::late(whole_minutes_between(reference, scanned))
        }
        _ => Evaluation::ON_TIME,
    }
}
