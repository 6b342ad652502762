//! Scheduler core: the reminder lifecycle state machine.
//!
//! ```text
//! pending ──timer──▶ fired ──┬─ snooze ──▶ snoozed (+ new pending "snooze-<id>-<ts>")
//!    ▲                       ├─ dismiss ─▶ dismissed
//!    └──── repeat renew ◀────┘─ complete ▶ completed
//! ```
//!
//! The store is authoritative. Every operation re-reads the record it acts
//! on, so a timer signal that outlived a cancel or a re-arm cannot resurrect
//! a reminder. Operations take `&mut self` and run to completion, which gives
//! per-id ordering for free when driven from [`super::service`].

use crate::config::{AlarmConfig, NotificationConfig, RetentionPolicy, SchedulerConfig};
use crate::error::{AlarmError, Result};
use crate::reminder::{Reminder, ReminderDescriptor, ReminderStatus, RepeatPolicy, next_occurrence};
use crate::scheduler::broadcast::{ClientBroadcast, ReminderEvent};
use crate::scheduler::clock::{Clock, SystemClock};
use crate::scheduler::presenter::{
    InteractionKind, NotificationInteraction, NotificationPresenter, confirmation_notification,
    fire_notification, test_notification,
};
use crate::scheduler::store::ReminderStore;
use crate::scheduler::timers::{TimerFired, TimerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Label prefix of reminders minted by a snooze.
pub const SNOOZE_LABEL_PREFIX: &str = "Snooze: ";

/// Receiver of expired-timer signals. Feed each one to
/// [`SchedulerCore::on_timer`].
pub type TimerSignals = mpsc::UnboundedReceiver<TimerFired>;

/// Result of a fire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Notification requested and `ReminderFired` broadcast.
    Fired {
        /// Whether the presenter accepted the notification.
        presented: bool,
        /// Next occurrence for repeating reminders.
        next_at_epoch_ms: Option<u64>,
    },
    /// No record: canceled between arming and firing.
    Missing,
    /// Record exists but is no longer pending.
    NotPending(ReminderStatus),
    /// Signal from a replaced or canceled timer.
    Stale,
    /// Chunked timer expired before the fire time; re-armed for the rest.
    Rearmed,
}

/// Counts from [`SchedulerCore::restore_on_start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Pending reminders re-armed for their remaining delay.
    pub rearmed: usize,
    /// Pending reminders already past due, fired during restore.
    pub caught_up: usize,
    /// Non-pending records left alone.
    pub skipped: usize,
    /// Stale `fired` one-shots removed.
    pub pruned: usize,
}

/// Counts from [`SchedulerCore::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Pending reminders found past due and fired.
    pub fired: usize,
    /// Stale `fired` one-shots removed.
    pub pruned: usize,
}

/// Owns the timer registry and drives every reminder transition.
pub struct SchedulerCore<S: ReminderStore, P: NotificationPresenter> {
    store: S,
    presenter: P,
    timers: TimerRegistry,
    broadcast: ClientBroadcast,
    clock: Arc<dyn Clock>,
    scheduler_config: SchedulerConfig,
    notification_config: NotificationConfig,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
}

impl<S: ReminderStore, P: NotificationPresenter> SchedulerCore<S, P> {
    /// Create a core using the system clock.
    ///
    /// The returned [`TimerSignals`] must be drained into [`Self::on_timer`]
    /// for armed reminders to fire.
    #[must_use]
    pub fn new(store: S, presenter: P, config: &AlarmConfig) -> (Self, TimerSignals) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let core = Self {
            store,
            presenter,
            timers: TimerRegistry::new(),
            broadcast: ClientBroadcast::new(config.host.event_capacity),
            clock: Arc::new(SystemClock),
            scheduler_config: config.scheduler.clone(),
            notification_config: config.notification.clone(),
            timer_tx,
        };
        (core, timer_rx)
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Event fan-out shared with every foreground context.
    #[must_use]
    pub fn broadcast(&self) -> &ClientBroadcast {
        &self.broadcast
    }

    #[must_use]
    pub fn is_armed(&self, id: &str) -> bool {
        self.timers.has(id)
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Period of [`Self::sweep`], if enabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.scheduler_config
            .sweep_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    // ── Schedule ────────────────────────────────────────────────────────────

    /// Validate, persist and arm a reminder. A reminder that is already due
    /// fires before this returns.
    ///
    /// Scheduling an existing id replaces it: the old timer is canceled and
    /// the new fire time wins.
    pub async fn schedule(&mut self, descriptor: ReminderDescriptor) -> Result<Reminder> {
        let now = self.clock.now_ms();
        let scheduled_at =
            descriptor.resolve_fire_time(now, self.scheduler_config.past_due_grace_ms)?;
        let id = descriptor
            .id
            .as_deref()
            .map(str::trim)
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let reminder = Reminder::pending(
            id,
            &descriptor,
            scheduled_at,
            now,
            self.scheduler_config.default_snooze_minutes,
        );
        self.schedule_record(reminder).await
    }

    async fn schedule_record(&mut self, reminder: Reminder) -> Result<Reminder> {
        let now = self.clock.now_ms();
        let due_now = reminder.scheduled_at_epoch_ms <= now;

        self.persist_and_arm(&reminder, now).await?;

        if self.notification_config.confirm_on_schedule && !due_now {
            let notification = confirmation_notification(&reminder, &self.notification_config);
            if let Err(e) = self.presenter.show(&notification).await {
                warn!(id = %reminder.id, error = %e, "schedule confirmation not shown");
            }
        }

        if due_now {
            self.fire(&reminder.id).await;
        }
        Ok(reminder)
    }

    /// Arm (unless already due), then persist, then broadcast `Scheduled`.
    async fn persist_and_arm(&mut self, reminder: &Reminder, now: u64) -> Result<()> {
        let due_now = reminder.scheduled_at_epoch_ms <= now;
        if due_now {
            self.timers.cancel(&reminder.id);
        } else {
            self.arm(reminder, now);
        }

        if let Err(e) = self.store.put(reminder).await {
            if self.scheduler_config.rollback_on_persist_failure {
                self.timers.cancel(&reminder.id);
            }
            error!(id = %reminder.id, error = %e, "cannot persist scheduled reminder");
            return Err(e);
        }

        info!(
            id = %reminder.id,
            label = %reminder.label,
            scheduled_at = reminder.scheduled_at_epoch_ms,
            repeat = %reminder.repeat,
            "reminder scheduled"
        );
        self.broadcast.emit(ReminderEvent::Scheduled {
            id: reminder.id.clone(),
            scheduled_at_epoch_ms: reminder.scheduled_at_epoch_ms,
        });
        Ok(())
    }

    fn arm(&mut self, reminder: &Reminder, now: u64) {
        let mut delay = reminder.remaining_ms(now);
        if let Some(ceiling) = self.scheduler_config.max_arm_delay_ms {
            delay = delay.min(ceiling.max(1));
        }
        let tx = self.timer_tx.clone();
        self.timers.arm(
            &reminder.id,
            i64::try_from(delay).unwrap_or(i64::MAX),
            move |fired| {
                let _ = tx.send(fired);
            },
        );
    }

    // ── Fire ────────────────────────────────────────────────────────────────

    /// Handle an expired timer.
    pub async fn on_timer(&mut self, fired: TimerFired) -> FireOutcome {
        if !self.timers.complete(&fired) {
            debug!(id = %fired.id, generation = fired.generation, "stale timer signal ignored");
            return FireOutcome::Stale;
        }

        if self.scheduler_config.max_arm_delay_ms.is_some() {
            match self.store.get(&fired.id).await {
                Ok(Some(record)) if record.status == ReminderStatus::Pending => {
                    let now = self.clock.now_ms();
                    if record.scheduled_at_epoch_ms > now {
                        debug!(
                            id = %record.id,
                            remaining_ms = record.remaining_ms(now),
                            "re-arming chunked timer"
                        );
                        self.arm(&record, now);
                        return FireOutcome::Rearmed;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(id = %fired.id, error = %e, "cannot load reminder for timer");
                    return FireOutcome::Missing;
                }
            }
        }

        self.fire(&fired.id).await
    }

    /// Fire a reminder now.
    ///
    /// Never fails: a missing or unreadable record is logged and skipped, and
    /// a presenter failure still broadcasts `Fired` so the foreground can
    /// alert in-app.
    pub async fn fire(&mut self, id: &str) -> FireOutcome {
        let record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(id, error = %AlarmError::MissingRecord(id.to_owned()), "fire skipped");
                return FireOutcome::Missing;
            }
            Err(e) => {
                warn!(id, error = %e, "cannot load reminder to fire; skipping");
                return FireOutcome::Missing;
            }
        };
        if record.status != ReminderStatus::Pending {
            debug!(id, status = record.status.as_str(), "fire skipped for non-pending reminder");
            return FireOutcome::NotPending(record.status);
        }

        let now = self.clock.now_ms();
        let mut fired = record.clone();
        fired.status = ReminderStatus::Fired;

        if !record.repeat.repeats() {
            if let Err(e) = self.store.put(&fired).await {
                warn!(id, error = %e, "cannot persist fired status");
            }
        }

        let notification = fire_notification(&fired, &self.notification_config);
        let presented = match self.presenter.show(&notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id, error = %e, "notification not shown; relying on in-app alert");
                false
            }
        };

        info!(id, label = %fired.label, presented, "reminder fired");
        self.broadcast.emit(ReminderEvent::Fired {
            id: id.to_owned(),
            reminder: fired,
            presented,
        });

        let next_at_epoch_ms = if record.repeat.repeats() {
            self.renew(record, now).await
        } else {
            None
        };

        FireOutcome::Fired {
            presented,
            next_at_epoch_ms,
        }
    }

    /// Replace a repeating reminder's record with its next occurrence.
    async fn renew(&mut self, record: Reminder, now: u64) -> Option<u64> {
        let next = next_occurrence(
            &record.repeat,
            record.scheduled_at_epoch_ms,
            now,
            &chrono::Local,
        )?;
        let renewed = Reminder {
            scheduled_at_epoch_ms: next,
            delay_ms: next.saturating_sub(now),
            status: ReminderStatus::Pending,
            ..record
        };
        match self.persist_and_arm(&renewed, now).await {
            Ok(()) => Some(next),
            Err(e) => {
                warn!(id = %renewed.id, error = %e, "cannot renew repeating reminder");
                None
            }
        }
    }

    // ── User actions ────────────────────────────────────────────────────────

    /// Defer a reminder by its snooze duration.
    ///
    /// Mints a one-shot reminder `snooze-<id>-<now>` labelled
    /// `"Snooze: <label>"`. A one-shot original becomes `snoozed`; a repeating
    /// original keeps its series.
    pub async fn snooze(&mut self, id: &str) -> Result<Reminder> {
        let record = self.load_existing(id).await?;
        if record.snooze_minutes == 0 {
            return Err(AlarmError::InvalidReminder(format!(
                "reminder {id} has snooze disabled"
            )));
        }

        let now = self.clock.now_ms();
        let scheduled_at = now.saturating_add(u64::from(record.snooze_minutes) * 60_000);
        let label = if record.label.starts_with(SNOOZE_LABEL_PREFIX) {
            record.label.clone()
        } else {
            format!("{SNOOZE_LABEL_PREFIX}{}", record.label)
        };
        let derived = Reminder {
            id: format!("snooze-{id}-{now}"),
            label,
            message: record.message.clone(),
            scheduled_at_epoch_ms: scheduled_at,
            delay_ms: scheduled_at - now,
            snooze_minutes: record.snooze_minutes,
            repeat: RepeatPolicy::Once,
            status: ReminderStatus::Pending,
            hints: record.hints.clone(),
            created_at_epoch_ms: now,
            snoozed_from: Some(id.to_owned()),
        };

        let derived = self.schedule_record(derived).await?;

        if !record.repeat.repeats() {
            self.timers.cancel(id);
            self.retire(record.clone(), ReminderStatus::Snoozed).await?;
        }

        info!(id, snooze_id = %derived.id, minutes = record.snooze_minutes, "reminder snoozed");
        self.broadcast.emit(ReminderEvent::Snoozed {
            id: id.to_owned(),
            snooze_minutes: record.snooze_minutes,
            snooze_id: derived.id.clone(),
            scheduled_at_epoch_ms: derived.scheduled_at_epoch_ms,
        });
        Ok(derived)
    }

    /// Acknowledge and stop a reminder.
    pub async fn dismiss(&mut self, id: &str) -> Result<()> {
        self.acknowledge(id, ReminderStatus::Dismissed).await?;
        self.broadcast.emit(ReminderEvent::Dismissed { id: id.to_owned() });
        Ok(())
    }

    /// Mark a reminder done.
    pub async fn complete(&mut self, id: &str) -> Result<()> {
        self.acknowledge(id, ReminderStatus::Completed).await?;
        self.broadcast.emit(ReminderEvent::Completed { id: id.to_owned() });
        Ok(())
    }

    async fn acknowledge(&mut self, id: &str, terminal: ReminderStatus) -> Result<()> {
        let record = match self.load_existing(id).await {
            Ok(record) => record,
            Err(e) => {
                self.timers.cancel(id);
                return Err(e);
            }
        };

        // A renewed repeating reminder is already pending its next
        // occurrence; the user is acknowledging the one that just rang.
        if record.repeat.repeats() && record.status == ReminderStatus::Pending {
            info!(id, status = terminal.as_str(), "repeating occurrence acknowledged");
            return Ok(());
        }

        self.timers.cancel(id);
        info!(id, status = terminal.as_str(), "reminder finished");
        self.retire(record, terminal).await
    }

    /// Explicit cancellation. Also cancels pending snoozes derived from `id`.
    ///
    /// Safe to call for an id that does not exist.
    pub async fn cancel(&mut self, id: &str) -> Result<Vec<String>> {
        let mut targets: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.id == id || r.snoozed_from.as_deref() == Some(id))
            .map(|r| r.id)
            .collect();
        if self.timers.has(id) && !targets.iter().any(|t| t == id) {
            targets.push(id.to_owned());
        }

        for target in &targets {
            self.timers.cancel(target);
            self.store.remove(target).await?;
            info!(id = %target, "reminder cancelled");
            self.broadcast.emit(ReminderEvent::Cancelled { id: target.clone() });
        }
        if targets.is_empty() {
            debug!(id, "cancel for unknown reminder is a no-op");
        }
        Ok(targets)
    }

    /// Route a notification interaction to the matching transition.
    ///
    /// Returns the derived reminder for a snooze.
    pub async fn handle_interaction(
        &mut self,
        interaction: &NotificationInteraction,
    ) -> Result<Option<Reminder>> {
        let kind = interaction.kind()?;
        let id = interaction.reminder_id()?;
        match kind {
            InteractionKind::Open => {
                debug!(id = %id, "notification body clicked");
                self.broadcast.emit(ReminderEvent::Clicked { id });
                Ok(None)
            }
            InteractionKind::Snooze => self.snooze(&id).await.map(Some),
            InteractionKind::Dismiss => self.dismiss(&id).await.map(|()| None),
            InteractionKind::Complete => self.complete(&id).await.map(|()| None),
        }
    }

    /// Show a placeholder notification. Nothing is persisted.
    pub async fn test_notification(&mut self) -> Result<()> {
        self.presenter
            .show(&test_notification(&self.notification_config))
            .await
    }

    /// All persisted reminders.
    pub async fn list(&self) -> Result<Vec<Reminder>> {
        self.store.get_all().await
    }

    // ── Restore ─────────────────────────────────────────────────────────────

    /// Rebuild timers from the store after a process start.
    ///
    /// Future reminders are re-armed for their remaining delay. Reminders
    /// whose time passed while the process was not running fire once now.
    pub async fn restore_on_start(&mut self) -> Result<RestoreReport> {
        let records = self.store.get_all().await?;
        let now = self.clock.now_ms();
        let mut report = RestoreReport::default();

        for record in records {
            if self.is_prunable(&record, now) {
                self.store.remove(&record.id).await?;
                report.pruned += 1;
                continue;
            }
            if record.status != ReminderStatus::Pending {
                report.skipped += 1;
                continue;
            }
            if record.scheduled_at_epoch_ms > now {
                self.arm(&record, now);
                report.rearmed += 1;
            } else {
                info!(id = %record.id, late_ms = now - record.scheduled_at_epoch_ms, "catching up missed reminder");
                self.fire(&record.id).await;
                report.caught_up += 1;
            }
        }

        info!(
            rearmed = report.rearmed,
            caught_up = report.caught_up,
            skipped = report.skipped,
            pruned = report.pruned,
            "reminder schedule restored"
        );
        Ok(report)
    }

    /// Fire pending reminders whose wall-clock time has already passed.
    ///
    /// Monotonic timers stop while the host is suspended, so a reminder that
    /// came due during sleep would otherwise ring late by the whole sleep.
    /// Stale `fired` one-shots are pruned on the same pass.
    pub async fn sweep(&mut self) -> Result<SweepReport> {
        let records = self.store.get_all().await?;
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for record in records {
            if record.status == ReminderStatus::Pending && record.scheduled_at_epoch_ms <= now {
                info!(
                    id = %record.id,
                    late_ms = now - record.scheduled_at_epoch_ms,
                    "firing overdue reminder"
                );
                self.timers.cancel(&record.id);
                self.fire(&record.id).await;
                report.fired += 1;
            } else if self.is_prunable(&record, now) {
                self.store.remove(&record.id).await?;
                report.pruned += 1;
            }
        }

        if report.fired > 0 || report.pruned > 0 {
            info!(fired = report.fired, pruned = report.pruned, "sweep finished");
        }
        Ok(report)
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    async fn load_existing(&self, id: &str) -> Result<Reminder> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AlarmError::UnknownReminder(id.to_owned()))
    }

    fn is_prunable(&self, record: &Reminder, now: u64) -> bool {
        if self.scheduler_config.retention != RetentionPolicy::Delete {
            return false;
        }
        let Some(max_age) = self.scheduler_config.prune_fired_after_ms else {
            return false;
        };
        record.status == ReminderStatus::Fired
            && !record.repeat.repeats()
            && now.saturating_sub(record.scheduled_at_epoch_ms) >= max_age
    }

    /// Apply the retention policy to a reminder that reached a terminal state.
    async fn retire(&mut self, mut record: Reminder, status: ReminderStatus) -> Result<()> {
        match self.scheduler_config.retention {
            RetentionPolicy::Delete => self.store.remove(&record.id).await,
            RetentionPolicy::Retain => {
                record.status = status;
                self.store.put(&record).await
            }
        }
    }
}
