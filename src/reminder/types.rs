//! Reminder records, schedule descriptors and repeat policies.

use crate::error::{AlarmError, Result};
use serde::{Deserialize, Serialize};

/// How a reminder is rescheduled after it fires.
///
/// Serialises as `{"type": "daily"}`. Deserialisation also accepts the bare
/// name (`"daily"`) for policies without parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    try_from = "RepeatPolicyWire"
)]
pub enum RepeatPolicy {
    /// Fire once, then wait for the user.
    #[default]
    Once,
    /// Every 24 hours from the previous fire time.
    Daily,
    /// Every 7 days from the previous fire time.
    Weekly,
    /// Every 24 hours, skipping Saturday and Sunday.
    Weekdays,
    /// Every `interval_ms` milliseconds.
    #[serde(alias = "custom-interval")]
    CustomInterval {
        /// Interval between occurrences.
        interval_ms: u64,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RepeatPolicyWire {
    Name(String),
    Tagged(TaggedRepeatPolicy),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedRepeatPolicy {
    Once,
    Daily,
    Weekly,
    Weekdays,
    #[serde(alias = "custom-interval")]
    CustomInterval { interval_ms: u64 },
}

impl TryFrom<RepeatPolicyWire> for RepeatPolicy {
    type Error = String;

    fn try_from(wire: RepeatPolicyWire) -> std::result::Result<Self, Self::Error> {
        match wire {
            RepeatPolicyWire::Name(name) => match name.as_str() {
                "once" => Ok(Self::Once),
                "daily" => Ok(Self::Daily),
                "weekly" => Ok(Self::Weekly),
                "weekdays" => Ok(Self::Weekdays),
                "custom_interval" | "custom-interval" => {
                    Err("custom-interval repeat needs an interval_ms".to_owned())
                }
                other => Err(format!("unknown repeat policy: {other}")),
            },
            RepeatPolicyWire::Tagged(tagged) => Ok(match tagged {
                TaggedRepeatPolicy::Once => Self::Once,
                TaggedRepeatPolicy::Daily => Self::Daily,
                TaggedRepeatPolicy::Weekly => Self::Weekly,
                TaggedRepeatPolicy::Weekdays => Self::Weekdays,
                TaggedRepeatPolicy::CustomInterval { interval_ms } => {
                    Self::CustomInterval { interval_ms }
                }
            }),
        }
    }
}

impl RepeatPolicy {
    /// Returns `true` for every policy except [`RepeatPolicy::Once`].
    #[must_use]
    pub fn repeats(&self) -> bool {
        !matches!(self, Self::Once)
    }
}

impl std::fmt::Display for RepeatPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Weekdays => write!(f, "weekdays"),
            Self::CustomInterval { interval_ms } => write!(f, "every {interval_ms}ms"),
        }
    }
}

/// Lifecycle status of a stored reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Armed (or due for re-arming after a restart).
    Pending,
    /// Notification shown, awaiting user action.
    Fired,
    /// User deferred it; a derived reminder carries the new fire time.
    Snoozed,
    Dismissed,
    Completed,
}

impl ReminderStatus {
    /// Terminal states never fire again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Snoozed | Self::Dismissed | Self::Completed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fired => "fired",
            Self::Snoozed => "snoozed",
            Self::Dismissed => "dismissed",
            Self::Completed => "completed",
        }
    }
}

/// Presentation hints passed straight through to the notification presenter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentationHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration_pattern: Option<Vec<u32>>,
}

/// A schedule request as sent by a foreground context.
///
/// Exactly one of `delay_ms` / `scheduled_at_epoch_ms` is expected. When both
/// are present the absolute time wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderDescriptor {
    /// Caller-chosen id. A fresh id is minted when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    /// Custom notification body. Defaults to the formatted fire time.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<i64>,
    #[serde(default)]
    pub scheduled_at_epoch_ms: Option<i64>,
    #[serde(default)]
    pub repeat: RepeatPolicy,
    #[serde(default)]
    pub snooze_minutes: Option<u32>,
    #[serde(flatten)]
    pub hints: PresentationHints,
}

impl ReminderDescriptor {
    /// Minimal descriptor firing `delay_ms` from now.
    #[must_use]
    pub fn after(label: impl Into<String>, delay_ms: i64) -> Self {
        Self {
            label: label.into(),
            delay_ms: Some(delay_ms),
            ..Self::default()
        }
    }

    /// Minimal descriptor firing at an absolute epoch time.
    #[must_use]
    pub fn at(label: impl Into<String>, scheduled_at_epoch_ms: i64) -> Self {
        Self {
            label: label.into(),
            scheduled_at_epoch_ms: Some(scheduled_at_epoch_ms),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    #[must_use]
    pub fn with_snooze_minutes(mut self, minutes: u32) -> Self {
        self.snooze_minutes = Some(minutes);
        self
    }

    /// Validate the request and resolve its absolute fire time.
    ///
    /// A zero delay, or an absolute time no more than `past_due_grace_ms`
    /// behind `now_ms`, resolves to `now_ms` so the reminder fires
    /// immediately instead of being dropped.
    pub fn resolve_fire_time(&self, now_ms: u64, past_due_grace_ms: u64) -> Result<u64> {
        if self.label.trim().is_empty() {
            return Err(AlarmError::InvalidReminder(
                "label cannot be empty".to_owned(),
            ));
        }
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(AlarmError::InvalidReminder(
                "id cannot be empty when provided".to_owned(),
            ));
        }
        if let RepeatPolicy::CustomInterval { interval_ms: 0 } = self.repeat {
            return Err(AlarmError::InvalidReminder(
                "custom_interval requires interval_ms > 0".to_owned(),
            ));
        }

        match (self.scheduled_at_epoch_ms, self.delay_ms) {
            (Some(at), _) => {
                let earliest = now_ms.saturating_sub(past_due_grace_ms);
                if at < 0 || (at as u64) < earliest {
                    return Err(AlarmError::InvalidReminder(format!(
                        "scheduled_at_epoch_ms {at} is in the past"
                    )));
                }
                Ok((at as u64).max(now_ms))
            }
            (None, Some(delay)) if delay < 0 => Err(AlarmError::InvalidReminder(format!(
                "delay_ms cannot be negative (got {delay})"
            ))),
            (None, Some(delay)) => Ok(now_ms.saturating_add(delay as u64)),
            (None, None) => Err(AlarmError::InvalidReminder(
                "either delay_ms or scheduled_at_epoch_ms is required".to_owned(),
            )),
        }
    }
}

/// A persisted reminder record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    /// Notification title text (without the alarm-clock prefix).
    pub label: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Absolute fire time, fixed when the reminder is armed.
    pub scheduled_at_epoch_ms: u64,
    /// Informational: fire time minus the time the reminder was scheduled.
    #[serde(default)]
    pub delay_ms: u64,
    pub snooze_minutes: u32,
    #[serde(default)]
    pub repeat: RepeatPolicy,
    pub status: ReminderStatus,
    #[serde(flatten)]
    pub hints: PresentationHints,
    #[serde(default)]
    pub created_at_epoch_ms: u64,
    /// Original reminder id when this record was minted by a snooze.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_from: Option<String>,
}

impl Reminder {
    /// Build a pending record from a validated descriptor.
    #[must_use]
    pub fn pending(
        id: String,
        descriptor: &ReminderDescriptor,
        scheduled_at_epoch_ms: u64,
        now_ms: u64,
        default_snooze_minutes: u32,
    ) -> Self {
        Self {
            id,
            label: descriptor.label.trim().to_owned(),
            message: descriptor.message.clone(),
            scheduled_at_epoch_ms,
            delay_ms: scheduled_at_epoch_ms.saturating_sub(now_ms),
            snooze_minutes: descriptor
                .snooze_minutes
                .unwrap_or(default_snooze_minutes),
            repeat: descriptor.repeat.clone(),
            status: ReminderStatus::Pending,
            hints: descriptor.hints.clone(),
            created_at_epoch_ms: now_ms,
            snoozed_from: None,
        }
    }

    /// Milliseconds until this reminder is due (0 when already due).
    #[must_use]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.scheduled_at_epoch_ms.saturating_sub(now_ms)
    }
}
