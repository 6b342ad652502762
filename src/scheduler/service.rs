//! Single-consumer service loop around [`SchedulerCore`].
//!
//! Foreground requests and expired-timer signals are drained by one task,
//! so no two scheduler operations ever interleave. A cancel that arrives
//! while a schedule is persisting waits its turn and then wins.

use crate::error::{AlarmError, Result};
use crate::reminder::{Reminder, ReminderDescriptor};
use crate::scheduler::broadcast::{ClientBroadcast, ReminderEvent};
use crate::scheduler::core::{SchedulerCore, TimerSignals};
use crate::scheduler::presenter::{NotificationInteraction, NotificationPresenter};
use crate::scheduler::store::ReminderStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A request from a foreground context.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerRequest {
    Schedule(ReminderDescriptor),
    Cancel { id: String },
    Snooze { id: String },
    Dismiss { id: String },
    Complete { id: String },
    /// Forwarded notification click or action button.
    Interact(NotificationInteraction),
    TestNotification,
    List,
}

impl SchedulerRequest {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schedule(_) => "schedule",
            Self::Cancel { .. } => "cancel",
            Self::Snooze { .. } => "snooze",
            Self::Dismiss { .. } => "dismiss",
            Self::Complete { .. } => "complete",
            Self::Interact(_) => "interact",
            Self::TestNotification => "test_notification",
            Self::List => "list",
        }
    }
}

/// Successful reply to a [`SchedulerRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerReply {
    Scheduled(Reminder),
    /// Ids actually removed (empty for an unknown id).
    Cancelled(Vec<String>),
    /// The reminder minted by a snooze.
    Snoozed(Reminder),
    Ack,
    Reminders(Vec<Reminder>),
}

struct ServiceRequest {
    request: SchedulerRequest,
    reply_tx: oneshot::Sender<Result<SchedulerReply>>,
}

/// Cloneable handle used by foreground contexts.
#[derive(Clone)]
pub struct SchedulerHandle {
    request_tx: mpsc::Sender<ServiceRequest>,
    broadcast: ClientBroadcast,
}

impl SchedulerHandle {
    /// Send a request and wait for the reply.
    pub async fn request(&self, request: SchedulerRequest) -> Result<SchedulerReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(ServiceRequest { request, reply_tx })
            .await
            .map_err(|_| AlarmError::Channel("scheduler service is not running".to_owned()))?;

        reply_rx
            .await
            .map_err(|_| AlarmError::Channel("scheduler service dropped reply".to_owned()))?
    }

    pub async fn schedule(&self, descriptor: ReminderDescriptor) -> Result<Reminder> {
        match self.request(SchedulerRequest::Schedule(descriptor)).await? {
            SchedulerReply::Scheduled(reminder) => Ok(reminder),
            other => Err(unexpected_reply("schedule", &other)),
        }
    }

    pub async fn cancel(&self, id: impl Into<String>) -> Result<Vec<String>> {
        match self.request(SchedulerRequest::Cancel { id: id.into() }).await? {
            SchedulerReply::Cancelled(ids) => Ok(ids),
            other => Err(unexpected_reply("cancel", &other)),
        }
    }

    pub async fn list(&self) -> Result<Vec<Reminder>> {
        match self.request(SchedulerRequest::List).await? {
            SchedulerReply::Reminders(reminders) => Ok(reminders),
            other => Err(unexpected_reply("list", &other)),
        }
    }

    /// Connect a new foreground context to the event broadcast.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderEvent> {
        self.broadcast.subscribe()
    }
}

fn unexpected_reply(kind: &str, reply: &SchedulerReply) -> AlarmError {
    AlarmError::Channel(format!("unexpected reply to {kind}: {reply:?}"))
}

/// Owns the core and drains requests and timer signals until every handle
/// is dropped.
pub struct SchedulerService<S: ReminderStore, P: NotificationPresenter> {
    core: SchedulerCore<S, P>,
    timer_rx: TimerSignals,
    request_rx: mpsc::Receiver<ServiceRequest>,
}

impl<S: ReminderStore, P: NotificationPresenter> SchedulerService<S, P> {
    /// Wrap a core. Requests beyond `request_capacity` wait for room.
    #[must_use]
    pub fn new(
        core: SchedulerCore<S, P>,
        timer_rx: TimerSignals,
        request_capacity: usize,
    ) -> (SchedulerHandle, Self) {
        let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
        let handle = SchedulerHandle {
            request_tx,
            broadcast: core.broadcast().clone(),
        };
        let service = Self {
            core,
            timer_rx,
            request_rx,
        };
        (handle, service)
    }

    /// Restore persisted reminders, then serve until all handles are gone.
    pub async fn run(mut self) {
        if let Err(e) = self.core.restore_on_start().await {
            error!(error = %e, "restore failed; starting with no armed reminders");
        }

        let mut sweep = self.core.sweep_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                Some(fired) = self.timer_rx.recv() => {
                    self.core.on_timer(fired).await;
                }
                () = next_sweep(&mut sweep) => {
                    if let Err(e) = self.core.sweep().await {
                        warn!(error = %e, "overdue reminder sweep failed");
                    }
                }
                maybe = self.request_rx.recv() => {
                    let Some(ServiceRequest { request, reply_tx }) = maybe else {
                        break;
                    };
                    let kind = request.kind();
                    let reply = dispatch(&mut self.core, request).await;
                    if let Err(e) = &reply {
                        debug!(kind, error = %e, "request failed");
                    }
                    if reply_tx.send(reply).is_err() {
                        debug!(kind, "requester went away before reply");
                    }
                }
            }
        }

        info!("scheduler service stopped");
    }
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Map one request to one core operation.
pub async fn dispatch<S: ReminderStore, P: NotificationPresenter>(
    core: &mut SchedulerCore<S, P>,
    request: SchedulerRequest,
) -> Result<SchedulerReply> {
    match request {
        SchedulerRequest::Schedule(descriptor) => {
            core.schedule(descriptor).await.map(SchedulerReply::Scheduled)
        }
        SchedulerRequest::Cancel { id } => core.cancel(&id).await.map(SchedulerReply::Cancelled),
        SchedulerRequest::Snooze { id } => core.snooze(&id).await.map(SchedulerReply::Snoozed),
        SchedulerRequest::Dismiss { id } => core.dismiss(&id).await.map(|()| SchedulerReply::Ack),
        SchedulerRequest::Complete { id } => {
            core.complete(&id).await.map(|()| SchedulerReply::Ack)
        }
        SchedulerRequest::Interact(interaction) => {
            match core.handle_interaction(&interaction).await? {
                Some(derived) => Ok(SchedulerReply::Snoozed(derived)),
                None => Ok(SchedulerReply::Ack),
            }
        }
        SchedulerRequest::TestNotification => {
            core.test_notification().await.map(|()| SchedulerReply::Ack)
        }
        SchedulerRequest::List => core.list().await.map(SchedulerReply::Reminders),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::AlarmConfig;
    use crate::scheduler::clock::ManualClock;
    use crate::scheduler::presenter::TracingPresenter;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::scheduler::store::MemoryReminderStore;

    fn spawn_service() -> SchedulerHandle {
        let (core, timer_rx) = SchedulerCore::new(
            MemoryReminderStore::new(),
            TracingPresenter,
            &AlarmConfig::default(),
        );
        let (handle, service) = SchedulerService::new(core, timer_rx, 8);
        tokio::spawn(service.run());
        handle
    }

    #[tokio::test]
    async fn schedule_then_list_round_trips_through_service() {
        let handle = spawn_service();
        let reminder = handle
            .schedule(ReminderDescriptor::after("Call mum", 60_000).with_id("call"))
            .await
            .unwrap();
        assert_eq!(reminder.id, "call");

        let listed = handle.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].label, "Call mum");
    }

    #[tokio::test]
    async fn errors_are_returned_to_requester() {
        let handle = spawn_service();
        let result = handle
            .request(SchedulerRequest::Dismiss {
                id: "ghost".to_owned(),
            })
            .await;
        assert!(matches!(result, Err(AlarmError::UnknownReminder(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep_fires_reminder_missed_during_suspend() {
        let clock = ManualClock::new(1_792_134_000_000);
        let (core, timer_rx) = SchedulerCore::new(
            MemoryReminderStore::new(),
            TracingPresenter,
            &AlarmConfig::default(),
        );
        let core = core.with_clock(Arc::new(clock.clone()));
        let (handle, service) = SchedulerService::new(core, timer_rx, 8);
        tokio::spawn(service.run());

        handle
            .schedule(ReminderDescriptor::after("Standup", 3_600_000).with_id("m1"))
            .await
            .unwrap();
        let mut events = handle.subscribe();

        // Wall clock jumps two hours; monotonic time barely moves.
        clock.advance(7_200_000);
        let event = tokio::time::timeout(Duration::from_secs(61), events.recv())
            .await
            .expect("sweep within one interval")
            .unwrap();

        match event {
            ReminderEvent::Fired { id, .. } => assert_eq!(id, "m1"),
            other => panic!("expected fired, got {other:?}"),
        }
        let listed = handle.list().await.unwrap();
        assert_eq!(listed[0].status, crate::reminder::ReminderStatus::Fired);
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_empty_success() {
        let handle = spawn_service();
        assert!(handle.cancel("ghost").await.unwrap().is_empty());
    }
}
