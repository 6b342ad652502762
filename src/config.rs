//! Configuration types for the reminder scheduler host.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the reminder scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Scheduling and lifecycle policy.
    pub scheduler: SchedulerConfig,
    /// Notification presentation defaults.
    pub notification: NotificationConfig,
    /// Persistent reminder store.
    pub store: StoreConfig,
    /// Host command channel sizing.
    pub host: HostConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// What happens to a reminder record once it reaches a terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Remove the record from the store immediately.
    #[default]
    Delete,
    /// Keep the record with its terminal status for audit.
    Retain,
}

/// Scheduler lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Snooze duration applied when a schedule request omits one.
    pub default_snooze_minutes: u32,
    /// Record retention once dismissed, completed, snoozed or cancelled.
    pub retention: RetentionPolicy,
    /// Cancel the just-armed timer when the store rejects the `put`.
    pub rollback_on_persist_failure: bool,
    /// Longest single timer sleep. Longer delays are re-armed in chunks.
    ///
    /// `None` arms the full delay at once and relies on restore-on-start for
    /// durability.
    pub max_arm_delay_ms: Option<u64>,
    /// Absolute fire times at most this far in the past fire immediately.
    /// Anything older is rejected as invalid.
    pub past_due_grace_ms: u64,
    /// Period of the wall-clock sweep that fires pending reminders already
    /// past due. Catches timers that slept through a host suspend.
    ///
    /// `None` or `0` disables the sweep.
    pub sweep_interval_ms: Option<u64>,
    /// One-shot reminders left `fired` (never snoozed, dismissed or
    /// completed) are removed once their fire time is this old. Applies only
    /// under [`RetentionPolicy::Delete`]; `None` keeps them.
    pub prune_fired_after_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_snooze_minutes: 10,
            retention: RetentionPolicy::Delete,
            rollback_on_persist_failure: true,
            max_arm_delay_ms: None,
            past_due_grace_ms: 1_000,
            sweep_interval_ms: Some(60_000),
            prune_fired_after_ms: Some(7 * 24 * 60 * 60 * 1000),
        }
    }
}

/// Notification presentation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Icon URL or path handed to the presenter.
    pub icon: Option<String>,
    /// Monochrome badge URL or path.
    pub badge: Option<String>,
    /// Vibration pattern (ms on/off) used when a reminder has none.
    pub default_vibration: Vec<u32>,
    /// Keep the notification on screen until the user acts on it.
    pub require_interaction: bool,
    /// Add a `complete` action button next to snooze and dismiss.
    pub offer_complete_action: bool,
    /// Show a silent confirmation notification when a reminder is scheduled.
    pub confirm_on_schedule: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: Some("/icons/alarm-192.png".to_owned()),
            badge: Some("/icons/badge-96.png".to_owned()),
            default_vibration: vec![200, 100, 200, 100, 200],
            require_interaction: true,
            offer_complete_action: false,
            confirm_on_schedule: false,
        }
    }
}

/// Reminder store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON store path (None = `alarm_dirs::reminders_file()`).
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolved store path.
    #[must_use]
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::alarm_dirs::reminders_file)
    }
}

/// Host command channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Pending request capacity.
    pub request_capacity: usize,
    /// Broadcast buffer per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily-rolling log file under `alarm_dirs::logs_dir()`.
    pub file: bool,
}

impl AlarmConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AlarmError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AlarmError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/alarmd/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::alarm_dirs::config_file()
    }
}
