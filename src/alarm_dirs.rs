//! Centralized application directory paths for alarmd.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/alarmd/` | `~/.local/share/alarmd/` |
//! | Config | `~/Library/Application Support/alarmd/` | `~/.config/alarmd/` |
//!
//! # Environment Overrides
//!
//! - `ALARMD_DATA_DIR` overrides [`data_dir`]
//! - `ALARMD_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the persisted reminder store and log files.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ALARMD_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("alarmd"))
        .unwrap_or_else(|| PathBuf::from("/tmp/alarmd-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ALARMD_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("alarmd"))
        .unwrap_or_else(|| PathBuf::from("/tmp/alarmd-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted reminder store (`data_dir()/reminders.json`).
#[must_use]
pub fn reminders_file() -> PathBuf {
    data_dir().join("reminders.json")
}
