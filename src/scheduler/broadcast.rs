//! Client broadcast: fan-out of reminder lifecycle events to every connected
//! foreground context.
//!
//! Delivery is best-effort. Nobody acknowledges an event, and a context that
//! falls behind the buffer loses the oldest events (it sees `Lagged`).

use crate::reminder::Reminder;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Lifecycle event sent to all foreground contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderEvent {
    Scheduled {
        id: String,
        scheduled_at_epoch_ms: u64,
    },
    Fired {
        id: String,
        reminder: Reminder,
        /// `false` when the system notification could not be shown and the
        /// foreground should raise an in-app alert instead.
        presented: bool,
    },
    Snoozed {
        id: String,
        snooze_minutes: u32,
        /// Id of the derived reminder carrying the new fire time.
        snooze_id: String,
        scheduled_at_epoch_ms: u64,
    },
    Dismissed {
        id: String,
    },
    Completed {
        id: String,
    },
    Cancelled {
        id: String,
    },
    /// The notification body was clicked: a foreground context should focus
    /// itself, or the host should open one.
    Clicked {
        id: String,
    },
}

impl ReminderEvent {
    /// Wire name used in host event envelopes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "reminder.scheduled",
            Self::Fired { .. } => "reminder.fired",
            Self::Snoozed { .. } => "reminder.snoozed",
            Self::Dismissed { .. } => "reminder.dismissed",
            Self::Completed { .. } => "reminder.completed",
            Self::Cancelled { .. } => "reminder.cancelled",
            Self::Clicked { .. } => "reminder.clicked",
        }
    }

    /// Id of the reminder this event is about.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Scheduled { id, .. }
            | Self::Fired { id, .. }
            | Self::Snoozed { id, .. }
            | Self::Dismissed { id }
            | Self::Completed { id }
            | Self::Cancelled { id }
            | Self::Clicked { id } => id,
        }
    }
}

/// Sender half of the event fan-out. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientBroadcast {
    tx: broadcast::Sender<ReminderEvent>,
}

impl ClientBroadcast {
    /// Create a broadcast with room for `capacity` unread events per client.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new foreground context.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderEvent> {
        self.tx.subscribe()
    }

    /// Send to every subscribed context. Never fails.
    pub fn emit(&self, event: ReminderEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "reminder event broadcast"),
            Err(_) => debug!(event = name, "no foreground contexts connected"),
        }
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
