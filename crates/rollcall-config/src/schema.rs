//! Raw configuration schema (as parsed from TOML)

use rollcall_api::SessionConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    /// System-wide fine rates
    #[serde(default)]
    pub fines: RawFines,

    #[serde(default)]
    pub credits: RawCredits,

    /// Scheduled events
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Days after the event date during which scans are still accepted
    pub scan_grace_days: Option<u32>,

    /// Number of transactions kept for the recent activity view
    pub recent_activity_capacity: Option<usize>,
}

/// Default fine amounts, used when an event has no override
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawFines {
    pub absent: Option<Decimal>,
    pub late_per_minute: Option<Decimal>,
    pub minimum_late: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCredits {
    /// Credit earned per hour of community service
    pub per_hour: Option<Decimal>,
}

/// Raw event definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEvent {
    /// Unique stable ID
    pub id: String,

    pub name: String,

    /// Event date (YYYY-MM-DD)
    pub date: String,

    pub semester: u8,

    /// e.g. "2024-2025"
    pub school_year: String,

    #[serde(default)]
    pub sessions: SessionConfig,

    /// Flat absent fine for this event
    pub fine_absent: Option<Decimal>,

    /// Per-minute late fine for this event
    pub fine_late_per_minute: Option<Decimal>,

    /// Scan windows per (session, direction)
    pub windows: Option<RawWindows>,

    /// Bare reference times for events created before windows existed
    pub legacy: Option<RawLegacyTimes>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWindows {
    pub am_in: Option<RawTimeWindow>,
    pub am_out: Option<RawTimeWindow>,
    pub pm_in: Option<RawTimeWindow>,
    pub pm_out: Option<RawTimeWindow>,
}

/// Time window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTimeWindow {
    /// Start time (HH:MM format)
    pub start: String,

    /// Stop time (HH:MM format)
    pub stop: String,
}

/// Legacy reference times (HH:MM format)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLegacyTimes {
    pub am_in: Option<String>,
    pub am_out: Option<String>,
    pub pm_in: Option<String>,
    pub pm_out: Option<String>,
}
