//! Default paths for rollcall
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/rollcall/config.toml` or `~/.config/rollcall/config.toml`
//! - Data: `$XDG_DATA_HOME/rollcall` or `~/.local/share/rollcall`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const ROLLCALL_CONFIG_ENV: &str = "ROLLCALL_CONFIG";

/// Environment variable for overriding the data directory
pub const ROLLCALL_DATA_DIR_ENV: &str = "ROLLCALL_DATA_DIR";

const APP_DIR: &str = "rollcall";

const CONFIG_FILENAME: &str = "config.toml";

/// Database filename within the data directory
pub const STORE_FILENAME: &str = "rollcall.db";

fn xdg_dir(var: &str, home_relative: &[&str], fallback: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(var) {
        return PathBuf::from(dir).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        let mut path = PathBuf::from(home);
        path.extend(home_relative);
        return path.join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(fallback)
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$ROLLCALL_CONFIG` (if set)
/// 2. `$XDG_CONFIG_HOME/rollcall/config.toml`
/// 3. `~/.config/rollcall/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ROLLCALL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    xdg_dir("XDG_CONFIG_HOME", &[".config"], "config").join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ROLLCALL_DATA_DIR` (if set)
/// 2. `$XDG_DATA_HOME/rollcall`
/// 3. `~/.local/share/rollcall`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ROLLCALL_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking `ROLLCALL_DATA_DIR`.
fn data_dir_without_env() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"], "data")
}

/// Path of the SQLite store inside a data directory
pub fn store_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(STORE_FILENAME)
}
