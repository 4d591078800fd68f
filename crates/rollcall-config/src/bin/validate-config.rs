//! Config validation CLI tool
//!
//! Validates a rollcall configuration file and reports any errors.

use rollcall_config::{AttendanceSchedule, ConfigError, CURRENT_CONFIG_VERSION};
use rollcall_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a rollcall configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!(
                "  Fines: absent {}, late {}/min (minimum {})",
                policy.fines.absent, policy.fines.late_per_minute, policy.fines.minimum_late
            );
            println!("  Service credit: {}/hour", policy.credits.per_hour);
            println!("  Events: {}", policy.events.len());

            if !policy.events.is_empty() {
                println!();
                println!("Events:");
                for event in &policy.events {
                    let schedule = match &event.schedule {
                        s if s.is_unconfigured() => "no timing".to_string(),
                        AttendanceSchedule::Windowed(windows) => {
                            let count = [windows.am_in, windows.am_out, windows.pm_in, windows.pm_out]
                                .iter()
                                .flatten()
                                .count();
                            format!("{} window(s)", count)
                        }
                        AttendanceSchedule::Legacy(_) => "legacy times".to_string(),
                    };
                    println!(
                        "  - {} [{}, {}]: {}",
                        event.id, event.date, schedule, event.name
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
