//! Notification presenter contract.
//!
//! The OS notification facility lives outside this crate. The scheduler only
//! builds [`Notification`] values with a fixed content contract and hands them
//! to a [`NotificationPresenter`]; user interaction comes back as a
//! [`NotificationInteraction`].

use crate::config::NotificationConfig;
use crate::error::{AlarmError, Result};
use crate::reminder::Reminder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Title prefix for every reminder notification.
pub const TITLE_PREFIX: &str = "⏰ ";

pub const ACTION_SNOOZE: &str = "snooze";
pub const ACTION_DISMISS: &str = "dismiss";
pub const ACTION_COMPLETE: &str = "complete";

/// Notification tag for a reminder id.
///
/// A re-fire of the same id replaces the previous notification instead of
/// stacking a second one.
#[must_use]
pub fn notification_tag(id: &str) -> String {
    format!("alarm-{id}")
}

/// Tag of the silent confirmation shown when a reminder is scheduled.
#[must_use]
pub fn confirmation_tag(id: &str) -> String {
    format!("scheduled-{id}")
}

/// An action button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

impl NotificationAction {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// A system notification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
    /// Opaque payload echoed back on interaction.
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default)]
    pub vibrate: Vec<u32>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default)]
    pub silent: bool,
}

/// Build the notification shown when `reminder` fires.
#[must_use]
pub fn fire_notification(reminder: &Reminder, config: &NotificationConfig) -> Notification {
    let mut actions = Vec::with_capacity(3);
    if reminder.snooze_minutes > 0 {
        actions.push(NotificationAction::new(
            ACTION_SNOOZE,
            format!("Snooze ({}min)", reminder.snooze_minutes),
        ));
    }
    actions.push(NotificationAction::new(ACTION_DISMISS, "Dismiss"));
    if config.offer_complete_action {
        actions.push(NotificationAction::new(ACTION_COMPLETE, "Complete"));
    }

    let body = reminder
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Time: {}", format_fire_time(reminder.scheduled_at_epoch_ms)));

    Notification {
        title: format!("{TITLE_PREFIX}{}", reminder.label),
        body,
        tag: notification_tag(&reminder.id),
        actions,
        data: serde_json::json!({
            "reminder_id": reminder.id,
            "scheduled_at_epoch_ms": reminder.scheduled_at_epoch_ms,
        }),
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        sound: reminder.hints.sound.clone(),
        volume: reminder.hints.volume,
        vibrate: reminder
            .hints
            .vibration_pattern
            .clone()
            .unwrap_or_else(|| config.default_vibration.clone()),
        require_interaction: config.require_interaction,
        silent: false,
    }
}

/// Silent notice that a reminder has been armed.
#[must_use]
pub fn confirmation_notification(reminder: &Reminder, config: &NotificationConfig) -> Notification {
    Notification {
        title: format!("{TITLE_PREFIX}Alarm Scheduled"),
        body: format!(
            "{} set for {}",
            reminder.label,
            format_fire_time(reminder.scheduled_at_epoch_ms)
        ),
        tag: confirmation_tag(&reminder.id),
        actions: Vec::new(),
        data: serde_json::json!({"reminder_id": reminder.id}),
        icon: config.icon.clone(),
        badge: None,
        sound: None,
        volume: None,
        vibrate: Vec::new(),
        require_interaction: false,
        silent: true,
    }
}

/// Placeholder notification for the "test notification" request.
#[must_use]
pub fn test_notification(config: &NotificationConfig) -> Notification {
    Notification {
        title: format!("{TITLE_PREFIX}Test Notification"),
        body: "Notifications are working.".to_owned(),
        tag: notification_tag("test"),
        actions: Vec::new(),
        data: serde_json::json!({"test": true}),
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        sound: None,
        volume: None,
        vibrate: config.default_vibration.clone(),
        require_interaction: false,
        silent: false,
    }
}

/// `HH:MM` in the host's local time zone.
#[must_use]
pub fn format_fire_time(epoch_ms: u64) -> String {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|utc| {
            utc.with_timezone(&chrono::Local)
                .format("%H:%M")
                .to_string()
        })
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// What the user did with a shown notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationInteraction {
    /// Action button id, or `None` for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
    /// The `data` payload of the notification that was interacted with.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Typed interaction the scheduler core acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Body click: focus or open a foreground context.
    Open,
    Snooze,
    Dismiss,
    Complete,
}

impl NotificationInteraction {
    /// Reminder id carried in the notification data.
    pub fn reminder_id(&self) -> Result<String> {
        self.data
            .get("reminder_id")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                AlarmError::Contract("notification data has no reminder_id".to_owned())
            })
    }

    /// Map the raw action id. `stop` and `done` are accepted as aliases.
    pub fn kind(&self) -> Result<InteractionKind> {
        match self.action.as_deref().map(str::trim) {
            None | Some("") => Ok(InteractionKind::Open),
            Some(ACTION_SNOOZE) => Ok(InteractionKind::Snooze),
            Some(ACTION_DISMISS) | Some("stop") => Ok(InteractionKind::Dismiss),
            Some(ACTION_COMPLETE) | Some("done") => Ok(InteractionKind::Complete),
            Some(other) => Err(AlarmError::UnknownAction(other.to_owned())),
        }
    }
}

/// Displays system notifications.
#[async_trait]
pub trait NotificationPresenter: Send + Sync + 'static {
    /// Show (or replace, by tag) a notification.
    async fn show(&self, notification: &Notification) -> Result<()>;
}

/// Forwards notifications over a channel to whoever owns the OS facility
/// (the stdio host bridge, or a test).
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelPresenter {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPresenter for ChannelPresenter {
    async fn show(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| AlarmError::Presenter("notification receiver dropped".to_owned()))
    }
}

/// Logs notifications instead of showing them. Used by headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresenter;

#[async_trait]
impl NotificationPresenter for TracingPresenter {
    async fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            body = %notification.body,
            tag = %notification.tag,
            "notification"
        );
        Ok(())
    }
}
