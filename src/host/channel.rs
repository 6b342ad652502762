//! Host command channel and router for the native shell.
//!
//! Commands arrive as [`CommandEnvelope`]s, are decoded into typed
//! [`SchedulerRequest`]s and answered with [`ResponseEnvelope`]s. Scheduler
//! events and presenter notifications are re-wrapped as [`EventEnvelope`]s
//! on a shared broadcast.

use crate::error::{AlarmError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::reminder::ReminderDescriptor;
use crate::scheduler::broadcast::ReminderEvent;
use crate::scheduler::presenter::{Notification, NotificationInteraction};
use crate::scheduler::service::{SchedulerHandle, SchedulerReply, SchedulerRequest};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Event name for notifications the native shell must display.
pub const NOTIFICATION_SHOW_EVENT: &str = "notification.show";

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            AlarmError::Contract(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| AlarmError::Channel(format!("failed to send host command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| AlarmError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event broadcast, for forwarders.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    scheduler: SchedulerHandle,
}

#[must_use]
pub fn command_channel(
    request_capacity: usize,
    event_capacity: usize,
    scheduler: SchedulerHandle,
) -> (HostCommandClient, HostCommandServer) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            scheduler,
        },
    )
}

impl HostCommandServer {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope).await;
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope. Failures become error responses carrying
    /// the same `request_id`.
    pub async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        let request_id = envelope.request_id.clone();
        match self.dispatch(envelope).await {
            Ok(payload) => ResponseEnvelope::ok(request_id, payload),
            Err(e) => {
                debug!(command = envelope.command.as_str(), error = %e, "host command failed");
                ResponseEnvelope::error(request_id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, envelope: &CommandEnvelope) -> Result<serde_json::Value> {
        match envelope.command {
            CommandName::HostPing => Ok(serde_json::json!({"pong": true})),
            CommandName::HostVersion => Ok(serde_json::json!({
                "contract_version": crate::host::contract::EVENT_VERSION,
                "channel": "alarmd_host_v1",
                "version": env!("CARGO_PKG_VERSION"),
            })),
            CommandName::ReminderSchedule => {
                let descriptor = parse_descriptor(&envelope.payload)?;
                let reminder = self.scheduler.schedule(descriptor).await?;
                Ok(serde_json::json!({"accepted": true, "reminder": reminder}))
            }
            CommandName::ReminderCancel => {
                let id = parse_non_empty_field(&envelope.payload, "id", "reminder.cancel")?;
                let cancelled = self.scheduler.cancel(id.clone()).await?;
                Ok(serde_json::json!({"accepted": true, "id": id, "cancelled": cancelled}))
            }
            CommandName::ReminderList => {
                let reminders = self.scheduler.list().await?;
                Ok(serde_json::json!({"reminders": reminders}))
            }
            CommandName::ReminderTestNotification => {
                self.scheduler
                    .request(SchedulerRequest::TestNotification)
                    .await?;
                Ok(serde_json::json!({"accepted": true}))
            }
            CommandName::NotificationInteract => {
                let interaction = parse_interaction(&envelope.payload)?;
                match self
                    .scheduler
                    .request(SchedulerRequest::Interact(interaction))
                    .await?
                {
                    SchedulerReply::Snoozed(derived) => {
                        Ok(serde_json::json!({"accepted": true, "snoozed": derived}))
                    }
                    _ => Ok(serde_json::json!({"accepted": true})),
                }
            }
            CommandName::RuntimeStop => {
                info!("runtime.stop accepted");
                Ok(serde_json::json!({"accepted": true}))
            }
        }
    }
}

/// Wrap a scheduler lifecycle event for the wire.
#[must_use]
pub fn reminder_event_envelope(event: &ReminderEvent) -> EventEnvelope {
    let payload = serde_json::to_value(event).unwrap_or_else(|e| {
        warn!(event = event.name(), error = %e, "cannot serialize reminder event");
        serde_json::json!({"id": event.id()})
    });
    EventEnvelope::fresh(event.name(), payload)
}

/// Wrap a notification the native shell should display.
#[must_use]
pub fn notification_envelope(notification: &Notification) -> EventEnvelope {
    let payload = serde_json::to_value(notification).unwrap_or_else(|e| {
        warn!(tag = %notification.tag, error = %e, "cannot serialize notification");
        serde_json::json!({"tag": notification.tag})
    });
    EventEnvelope::fresh(NOTIFICATION_SHOW_EVENT, payload)
}

/// Re-publish scheduler events as host events until the source closes or
/// `shutdown` resolves. Events already queued when `shutdown` resolves are
/// still forwarded.
pub async fn forward_reminder_events(
    mut events: broadcast::Receiver<ReminderEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => {
                    let _ = event_tx.send(reminder_event_envelope(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "reminder event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("reminder event broadcast closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                debug!("reminder event forwarder drained");
                break;
            }
        }
    }
}

/// Re-publish presenter notifications as `notification.show` events until
/// the presenter closes or `shutdown` resolves, draining the queue first.
pub async fn forward_notifications(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    event_tx: broadcast::Sender<EventEnvelope>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            received = notifications.recv() => match received {
                Some(notification) => {
                    let _ = event_tx.send(notification_envelope(&notification));
                }
                None => {
                    debug!("notification presenter channel closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                debug!("notification forwarder drained");
                break;
            }
        }
    }
}

fn parse_descriptor(payload: &serde_json::Value) -> Result<ReminderDescriptor> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        AlarmError::Contract(format!("reminder.schedule payload is not a reminder: {e}"))
    })
}

fn parse_interaction(payload: &serde_json::Value) -> Result<NotificationInteraction> {
    let interaction: NotificationInteraction = serde_json::from_value(payload.clone())
        .map_err(|e| AlarmError::Contract(format!("notification.interact payload: {e}")))?;
    if !interaction.data.is_object() {
        return Err(AlarmError::Contract(
            "notification.interact requires payload.data".to_owned(),
        ));
    }
    Ok(interaction)
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(AlarmError::Contract(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(AlarmError::Contract(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn non_empty_field_rejects_blank_and_missing() {
        let payload = serde_json::json!({"id": "  "});
        assert!(parse_non_empty_field(&payload, "id", "reminder.cancel").is_err());
        assert!(parse_non_empty_field(&serde_json::json!({}), "id", "reminder.cancel").is_err());
        let ok = serde_json::json!({"id": " a1 "});
        assert_eq!(
            parse_non_empty_field(&ok, "id", "reminder.cancel").unwrap(),
            "a1"
        );
    }

    #[test]
    fn descriptor_parses_from_schedule_payload() {
        let payload = serde_json::json!({
            "label": "Stretch",
            "delay_ms": 30000,
            "repeat": {"type": "daily"}
        });
        let descriptor = parse_descriptor(&payload).unwrap();
        assert_eq!(descriptor.label, "Stretch");
        assert_eq!(descriptor.delay_ms, Some(30_000));
    }

    #[test]
    fn interaction_requires_data_object() {
        let payload = serde_json::json!({"action": "snooze"});
        assert!(matches!(
            parse_interaction(&payload),
            Err(AlarmError::Contract(_))
        ));
    }

    #[test]
    fn reminder_event_envelope_uses_dotted_name() {
        let envelope = reminder_event_envelope(&ReminderEvent::Dismissed {
            id: "a1".to_owned(),
        });
        assert_eq!(envelope.event, "reminder.dismissed");
        assert_eq!(envelope.payload["id"], "a1");
        assert!(!envelope.event_id.is_empty());
    }

    #[tokio::test]
    async fn notification_forwarder_drains_queue_before_stopping() {
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = broadcast::channel(8);
        let config = crate::config::NotificationConfig::default();
        for _ in 0..3 {
            notification_tx
                .send(crate::scheduler::presenter::test_notification(&config))
                .unwrap();
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(()).unwrap();
        forward_notifications(notification_rx, event_tx, stop_rx).await;

        for _ in 0..3 {
            assert_eq!(event_rx.recv().await.unwrap().event, NOTIFICATION_SHOW_EVENT);
        }
        assert!(matches!(
            event_rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn reminder_forwarder_drains_queue_before_stopping() {
        let (source_tx, source_rx) = broadcast::channel(8);
        let (event_tx, mut event_rx) = broadcast::channel(8);
        source_tx
            .send(ReminderEvent::Dismissed { id: "a1".to_owned() })
            .unwrap();
        source_tx
            .send(ReminderEvent::Cancelled { id: "a2".to_owned() })
            .unwrap();

        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(()).unwrap();
        forward_reminder_events(source_rx, event_tx, stop_rx).await;

        assert_eq!(event_rx.recv().await.unwrap().event, "reminder.dismissed");
        assert_eq!(event_rx.recv().await.unwrap().event, "reminder.cancelled");
    }
}
