//! Configuration validation

use crate::schema::{RawConfig, RawEvent, RawLegacyTimes, RawTimeWindow, RawWindows};
use chrono::{NaiveDate, NaiveTime};
use rollcall_api::{Session, SessionConfig};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Event '{event_id}': {message}")]
    EventError { event_id: String, message: String },

    #[error("Duplicate event ID: {0}")]
    DuplicateEventId(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Amount for {field} must not be negative (got {value})")]
    NegativeAmount { field: String, value: Decimal },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.recent_activity_capacity == Some(0) {
        errors.push(ValidationError::GlobalError(
            "recent_activity_capacity must be at least 1".into(),
        ));
    }

    let amounts = [
        ("fines.absent", config.fines.absent),
        ("fines.late_per_minute", config.fines.late_per_minute),
        ("fines.minimum_late", config.fines.minimum_late),
        ("credits.per_hour", config.credits.per_hour),
    ];
    for (field, value) in amounts {
        errors.extend(check_amount(field, value));
    }

    // Check for duplicate event IDs
    let mut seen_ids = HashSet::new();
    for event in &config.events {
        if !seen_ids.insert(&event.id) {
            errors.push(ValidationError::DuplicateEventId(event.id.clone()));
        }
    }

    for event in &config.events {
        errors.extend(validate_event(event));
    }

    errors
}

fn check_amount(field: &str, value: Option<Decimal>) -> Option<ValidationError> {
    match value {
        Some(v) if v < Decimal::ZERO => Some(ValidationError::NegativeAmount {
            field: field.to_string(),
            value: v,
        }),
        _ => None,
    }
}

fn validate_event(event: &RawEvent) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let event_error = |message: String| ValidationError::EventError {
        event_id: event.id.clone(),
        message,
    };

    if event.id.trim().is_empty() {
        errors.push(event_error("id cannot be empty".into()));
    }
    if event.name.trim().is_empty() {
        errors.push(event_error("name cannot be empty".into()));
    }
    if !(1..=2).contains(&event.semester) {
        errors.push(event_error(format!(
            "semester must be 1 or 2 (got {})",
            event.semester
        )));
    }
    if let Err(e) = parse_date(&event.date) {
        errors.push(e);
    }

    errors.extend(check_amount(
        &format!("events.{}.fine_absent", event.id),
        event.fine_absent,
    ));
    errors.extend(check_amount(
        &format!("events.{}.fine_late_per_minute", event.id),
        event.fine_late_per_minute,
    ));

    match (&event.windows, &event.legacy) {
        (Some(_), Some(_)) => {
            errors.push(event_error(
                "an event uses either windows or legacy times, not both".into(),
            ));
        }
        (Some(windows), None) => errors.extend(validate_windows(windows, event)),
        (None, Some(legacy)) => errors.extend(validate_legacy(legacy)),
        (None, None) => {}
    }

    errors
}

fn validate_windows(windows: &RawWindows, event: &RawEvent) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let slots = [
        ("am_in", Session::Am, &windows.am_in),
        ("am_out", Session::Am, &windows.am_out),
        ("pm_in", Session::Pm, &windows.pm_in),
        ("pm_out", Session::Pm, &windows.pm_out),
    ];

    for (name, session, window) in slots {
        let Some(window) = window else {
            continue;
        };

        if !event.sessions.offers(session) {
            errors.push(ValidationError::EventError {
                event_id: event.id.clone(),
                message: format!(
                    "window {} configured but the event runs {}",
                    name,
                    describe_sessions(event.sessions)
                ),
            });
        }

        errors.extend(validate_time_window(window, name, &event.id));
    }

    errors
}

fn validate_time_window(window: &RawTimeWindow, name: &str, event_id: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let start = parse_time(&window.start);
    let stop = parse_time(&window.stop);

    match (start, stop) {
        (Ok(start), Ok(stop)) => {
            if start > stop {
                errors.push(ValidationError::EventError {
                    event_id: event_id.to_string(),
                    message: format!(
                        "window {} starts at {} after it stops at {}",
                        name, window.start, window.stop
                    ),
                });
            }
        }
        (start, stop) => {
            errors.extend(start.err());
            errors.extend(stop.err());
        }
    }

    errors
}

fn validate_legacy(legacy: &RawLegacyTimes) -> Vec<ValidationError> {
    [&legacy.am_in, &legacy.am_out, &legacy.pm_in, &legacy.pm_out]
        .into_iter()
        .flatten()
        .filter_map(|value| parse_time(value).err())
        .collect()
}

fn describe_sessions(sessions: SessionConfig) -> &'static str {
    match sessions {
        SessionConfig::MorningOnly => "morning only",
        SessionConfig::AfternoonOnly => "afternoon only",
        SessionConfig::Both => "both sessions",
    }
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<NaiveTime, ValidationError> {
    rollcall_util::parse_clock_time(s).map_err(|message| ValidationError::InvalidTimeFormat {
        value: s.to_string(),
        message,
    })
}

/// Parse YYYY-MM-DD date format
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        value: s.to_string(),
    })
}
