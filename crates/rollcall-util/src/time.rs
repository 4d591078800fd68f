//! Time utilities for rollcall
//!
//! Provides wall-clock access for scan timestamps and the closed
//! [`TimeWindow`] used to classify scans as on time or late.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time for every time-sensitive operation. This is
//! useful for rehearsing an event's scan windows ahead of the day.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-03-14 07:45:00`)
//!
//! Example:
//! ```bash
//! ROLLCALL_MOCK_TIME="2025-03-14 07:45:00" rollcall station --event EVT-001 --session AM
//! ```

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => {
                            tracing::warn!(
                                mock_time = %mock_time_str,
                                "Failed to convert mock time to local timezone"
                            );
                        }
                    },
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a time of day as `HH:MM`
pub fn format_clock_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse an `HH:MM` time of day
pub fn parse_clock_time(s: &str) -> Result<NaiveTime, String> {
    let (hour, minute) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| "Expected HH:MM format".to_string())?;

    let hour: u32 = hour.parse().map_err(|_| "Invalid hour".to_string())?;
    let minute: u32 = minute.parse().map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| "Invalid time".to_string())
}

/// Whole minutes from `earlier` to `later`, rounded down; zero if `later`
/// is not after `earlier`.
pub fn whole_minutes_between(earlier: NaiveTime, later: NaiveTime) -> u32 {
    let minutes = (later - earlier).num_minutes();
    u32::try_from(minutes).unwrap_or(0)
}

/// True for times strictly before 12:00
pub fn is_before_noon(t: NaiveTime) -> bool {
    t.hour() < 12
}

/// A closed time-of-day interval `[start, stop]`.
///
/// Both bounds belong to the window. Windows never cross midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: NaiveTime,
    stop: NaiveTime,
}

impl TimeWindow {
    /// Returns `None` when `start > stop`
    pub fn new(start: NaiveTime, stop: NaiveTime) -> Option<Self> {
        (start <= stop).then_some(Self { start, stop })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn stop(&self) -> NaiveTime {
        self.stop
    }

    /// Check if the given time of day falls within this window
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t <= self.stop
    }

    /// Whole minutes by which `t` misses the window; zero inside it.
    pub fn minutes_outside(&self, t: NaiveTime) -> u32 {
        if t < self.start {
            whole_minutes_between(t, self.start)
        } else if t > self.stop {
            whole_minutes_between(self.stop, t)
        } else {
            0
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_clock_time(self.start),
            format_clock_time(self.stop)
        )
    }
}
