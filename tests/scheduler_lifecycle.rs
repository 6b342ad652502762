//! End-to-end reminder lifecycle through the scheduler core with a paused
//! tokio clock and a manual wall clock kept in step with it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use alarmd::config::AlarmConfig;
use alarmd::error::{AlarmError, Result};
use alarmd::reminder::{Reminder, ReminderDescriptor, ReminderStatus};
use alarmd::scheduler::presenter::ACTION_SNOOZE;
use alarmd::scheduler::{
    ChannelPresenter, Clock, FireOutcome, ManualClock, MemoryReminderStore, Notification,
    NotificationInteraction, NotificationPresenter, ReminderEvent, ReminderStore, SchedulerCore,
    SchedulerService, TimerSignals,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

const START_MS: u64 = 1_792_134_000_000;

struct Fixture<P: NotificationPresenter> {
    core: SchedulerCore<Arc<MemoryReminderStore>, P>,
    timers: TimerSignals,
    store: Arc<MemoryReminderStore>,
    clock: ManualClock,
    events: broadcast::Receiver<ReminderEvent>,
    started: Instant,
}

impl<P: NotificationPresenter> Fixture<P> {
    fn new(presenter: P, config: AlarmConfig) -> Self {
        let store = Arc::new(MemoryReminderStore::new());
        let clock = ManualClock::new(START_MS);
        let (core, timers) = SchedulerCore::new(Arc::clone(&store), presenter, &config);
        let core = core.with_clock(Arc::new(clock.clone()));
        let events = core.broadcast().subscribe();
        Self {
            core,
            timers,
            store,
            clock,
            events,
            started: Instant::now(),
        }
    }

    fn sync_clock(&self) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap();
        self.clock.set(START_MS + elapsed);
    }

    /// Wait for the next timer expiry and hand it to the core.
    async fn drive_next_timer(&mut self) -> FireOutcome {
        let signal = self.timers.recv().await.expect("timer signal");
        self.sync_clock();
        self.core.on_timer(signal).await
    }

    async fn no_timer_within(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.timers.recv()).await.is_err()
    }

    fn drain_events(&mut self) -> Vec<ReminderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn channel_fixture(
    config: AlarmConfig,
) -> (
    Fixture<ChannelPresenter>,
    mpsc::UnboundedReceiver<Notification>,
) {
    let (presenter, shown) = ChannelPresenter::channel();
    (Fixture::new(presenter, config), shown)
}

struct RefusingPresenter;

#[async_trait]
impl NotificationPresenter for RefusingPresenter {
    async fn show(&self, _notification: &Notification) -> Result<()> {
        Err(AlarmError::Presenter("permission denied".to_owned()))
    }
}

#[tokio::test(start_paused = true)]
async fn take_pills_fires_after_five_seconds_then_snoozes() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());

    f.core
        .schedule(
            ReminderDescriptor::after("Take pills", 5_000)
                .with_id("a1")
                .with_snooze_minutes(10),
        )
        .await
        .unwrap();

    assert!(f.no_timer_within(Duration::from_millis(4_990)).await);
    let outcome = f.drive_next_timer().await;
    assert_eq!(
        outcome,
        FireOutcome::Fired {
            presented: true,
            next_at_epoch_ms: None
        }
    );

    let notification = shown.try_recv().unwrap();
    assert_eq!(notification.title, "⏰ Take pills");
    assert_eq!(notification.tag, "alarm-a1");
    let actions: Vec<(&str, &str)> = notification
        .actions
        .iter()
        .map(|a| (a.id.as_str(), a.label.as_str()))
        .collect();
    assert_eq!(
        actions,
        vec![("snooze", "Snooze (10min)"), ("dismiss", "Dismiss")]
    );
    assert_eq!(
        f.store.get("a1").await.unwrap().unwrap().status,
        ReminderStatus::Fired
    );
    assert_eq!(f.core.armed_count(), 0);

    // User presses "snooze" on the notification.
    let now = f.clock.now_ms();
    let interaction = NotificationInteraction {
        action: Some(ACTION_SNOOZE.to_owned()),
        data: notification.data.clone(),
    };
    let derived = f
        .core
        .handle_interaction(&interaction)
        .await
        .unwrap()
        .expect("snooze returns derived reminder");

    assert_ne!(derived.id, "a1");
    assert!(derived.id.starts_with("snooze-a1-"));
    assert_eq!(derived.label, "Snooze: Take pills");
    assert_eq!(derived.scheduled_at_epoch_ms, now + 10 * 60_000);
    assert!(f.core.is_armed(&derived.id));
    assert!(f.store.get("a1").await.unwrap().is_none());

    let snoozed = f
        .drain_events()
        .into_iter()
        .find_map(|event| match event {
            ReminderEvent::Snoozed {
                id, snooze_minutes, ..
            } => Some((id, snooze_minutes)),
            _ => None,
        })
        .expect("snoozed event");
    assert_eq!(snoozed, ("a1".to_owned(), 10));
}

#[tokio::test(start_paused = true)]
async fn snoozed_reminder_fires_again_with_prefixed_title() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());
    f.core
        .schedule(
            ReminderDescriptor::after("Stretch", 0)
                .with_id("s1")
                .with_snooze_minutes(1),
        )
        .await
        .unwrap();
    shown.try_recv().unwrap();

    let derived = f.core.snooze("s1").await.unwrap();
    assert!(f.no_timer_within(Duration::from_millis(59_000)).await);
    assert!(matches!(
        f.drive_next_timer().await,
        FireOutcome::Fired { .. }
    ));

    let second = shown.try_recv().unwrap();
    assert_eq!(second.title, "⏰ Snooze: Stretch");
    assert_eq!(second.tag, format!("alarm-{}", derived.id));

    // Snoozing a snooze keeps a single prefix.
    let again = f.core.snooze(&derived.id).await.unwrap();
    assert_eq!(again.label, "Snooze: Stretch");
}

#[tokio::test(start_paused = true)]
async fn scheduling_same_id_twice_keeps_one_timer_and_latest_time() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());

    f.core
        .schedule(ReminderDescriptor::after("Tea", 10_000).with_id("tea"))
        .await
        .unwrap();
    f.core
        .schedule(ReminderDescriptor::after("Tea", 20_000).with_id("tea"))
        .await
        .unwrap();

    assert_eq!(f.core.armed_count(), 1);
    let all = f.store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].scheduled_at_epoch_ms, START_MS + 20_000);

    assert!(f.no_timer_within(Duration::from_millis(19_990)).await);
    assert!(matches!(
        f.drive_next_timer().await,
        FireOutcome::Fired { .. }
    ));
    assert!(shown.try_recv().is_ok());
    assert!(shown.try_recv().is_err(), "fired more than once");
    assert!(f.no_timer_within(Duration::from_secs(60)).await);
}

#[tokio::test(start_paused = true)]
async fn zero_delay_fires_immediately() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());

    f.core
        .schedule(ReminderDescriptor::after("Now", 0).with_id("n1"))
        .await
        .unwrap();

    assert_eq!(shown.try_recv().unwrap().tag, "alarm-n1");
    let names: Vec<&str> = f.drain_events().iter().map(ReminderEvent::name).collect();
    assert_eq!(names, vec!["reminder.scheduled", "reminder.fired"]);
    assert_eq!(f.core.armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_descriptors_are_rejected_without_side_effects() {
    let (mut f, _shown) = channel_fixture(AlarmConfig::default());

    let blank = f.core.schedule(ReminderDescriptor::after("  ", 1_000)).await;
    assert!(matches!(blank, Err(AlarmError::InvalidReminder(_))));

    let negative = f.core.schedule(ReminderDescriptor::after("x", -5)).await;
    assert!(matches!(negative, Err(AlarmError::InvalidReminder(_))));

    let stale = f
        .core
        .schedule(ReminderDescriptor::at("x", (START_MS - 60_000) as i64))
        .await;
    assert!(matches!(stale, Err(AlarmError::InvalidReminder(_))));

    assert!(f.store.get_all().await.unwrap().is_empty());
    assert_eq!(f.core.armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_fire_removes_everything() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());
    f.core
        .schedule(ReminderDescriptor::after("Bins", 5_000).with_id("bins"))
        .await
        .unwrap();

    let cancelled = f.core.cancel("bins").await.unwrap();
    assert_eq!(cancelled, vec!["bins".to_owned()]);
    assert!(!f.core.is_armed("bins"));
    assert!(f.store.get("bins").await.unwrap().is_none());
    assert!(f.no_timer_within(Duration::from_secs(30)).await);
    assert!(shown.try_recv().is_err());

    assert!(f.core.cancel("bins").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_also_drops_pending_snoozes_of_the_reminder() {
    let (mut f, _shown) = channel_fixture(AlarmConfig::default());
    f.core
        .schedule(ReminderDescriptor::after("Walk", 0).with_id("walk"))
        .await
        .unwrap();
    let derived = f.core.snooze("walk").await.unwrap();

    let cancelled = f.core.cancel("walk").await.unwrap();
    assert_eq!(cancelled, vec![derived.id.clone()]);
    assert!(!f.core.is_armed(&derived.id));
    assert!(f.store.get_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn presenter_failure_still_broadcasts_fired() {
    let mut f = Fixture::new(RefusingPresenter, AlarmConfig::default());
    f.core
        .schedule(ReminderDescriptor::after("Hidden", 0).with_id("h1"))
        .await
        .unwrap();

    let fired = f
        .drain_events()
        .into_iter()
        .find(|e| matches!(e, ReminderEvent::Fired { .. }))
        .expect("fired event");
    assert!(matches!(
        fired,
        ReminderEvent::Fired {
            presented: false,
            ..
        }
    ));
    assert_eq!(
        f.store.get("h1").await.unwrap().unwrap().status,
        ReminderStatus::Fired
    );
}

#[tokio::test(start_paused = true)]
async fn dismiss_and_complete_accept_action_aliases() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());
    for id in ["d1", "c1"] {
        f.core
            .schedule(ReminderDescriptor::after("x", 0).with_id(id))
            .await
            .unwrap();
    }

    let stop = NotificationInteraction {
        action: Some("stop".to_owned()),
        data: shown.try_recv().unwrap().data,
    };
    let done = NotificationInteraction {
        action: Some("done".to_owned()),
        data: shown.try_recv().unwrap().data,
    };
    f.drain_events();

    assert!(f.core.handle_interaction(&stop).await.unwrap().is_none());
    assert!(f.core.handle_interaction(&done).await.unwrap().is_none());

    let names: Vec<&str> = f.drain_events().iter().map(ReminderEvent::name).collect();
    assert_eq!(names, vec!["reminder.dismissed", "reminder.completed"]);
    assert!(f.store.get_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn body_click_requests_focus() {
    let (mut f, _shown) = channel_fixture(AlarmConfig::default());
    let click = NotificationInteraction {
        action: None,
        data: serde_json::json!({"reminder_id": "a1"}),
    };
    assert!(f.core.handle_interaction(&click).await.unwrap().is_none());
    assert_eq!(
        f.drain_events(),
        vec![ReminderEvent::Clicked {
            id: "a1".to_owned()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn confirmation_is_silent_and_tagged_separately() {
    let mut config = AlarmConfig::default();
    config.notification.confirm_on_schedule = true;
    let (mut f, mut shown) = channel_fixture(config);

    f.core
        .schedule(ReminderDescriptor::after("Laundry", 60_000).with_id("l1"))
        .await
        .unwrap();

    let confirmation = shown.try_recv().unwrap();
    assert_eq!(confirmation.tag, "scheduled-l1");
    assert!(confirmation.silent);
    assert!(confirmation.actions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notification_is_not_persisted() {
    let (mut f, mut shown) = channel_fixture(AlarmConfig::default());
    f.core.test_notification().await.unwrap();

    let notification = shown.try_recv().unwrap();
    assert_eq!(notification.title, "⏰ Test Notification");
    assert_eq!(notification.tag, "alarm-test");
    assert!(f.store.get_all().await.unwrap().is_empty());
}

// ── Persistence failures ────────────────────────────────────────────────────

struct BrokenStore;

#[async_trait]
impl ReminderStore for BrokenStore {
    async fn put(&self, _reminder: &Reminder) -> Result<()> {
        Err(AlarmError::Persistence("disk full".to_owned()))
    }

    async fn get_all(&self) -> Result<Vec<Reminder>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn persist_failure_rolls_back_timer_by_default() {
    let (presenter, _shown) = ChannelPresenter::channel();
    let (mut core, _timers) = SchedulerCore::new(BrokenStore, presenter, &AlarmConfig::default());

    let result = core
        .schedule(ReminderDescriptor::after("x", 5_000).with_id("p1"))
        .await;
    assert!(matches!(result, Err(AlarmError::Persistence(_))));
    assert!(!core.is_armed("p1"));
}

#[tokio::test(start_paused = true)]
async fn persist_failure_keeps_timer_when_rollback_disabled() {
    let mut config = AlarmConfig::default();
    config.scheduler.rollback_on_persist_failure = false;
    let (presenter, _shown) = ChannelPresenter::channel();
    let (mut core, _timers) = SchedulerCore::new(BrokenStore, presenter, &config);

    let result = core
        .schedule(ReminderDescriptor::after("x", 5_000).with_id("p1"))
        .await;
    assert!(matches!(result, Err(AlarmError::Persistence(_))));
    assert!(core.is_armed("p1"));
}

// ── Through the service loop ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_queued_behind_schedule_wins() {
    let (presenter, mut shown) = ChannelPresenter::channel();
    let (core, timers) = SchedulerCore::new(
        MemoryReminderStore::new(),
        presenter,
        &AlarmConfig::default(),
    );
    let (handle, service) = SchedulerService::new(core, timers, 8);
    tokio::spawn(service.run());

    let (scheduled, cancelled) = tokio::join!(
        handle.schedule(ReminderDescriptor::after("Race", 1_000).with_id("r1")),
        handle.cancel("r1"),
    );
    scheduled.unwrap();
    assert_eq!(cancelled.unwrap(), vec!["r1".to_owned()]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(handle.list().await.unwrap().is_empty());
    assert!(shown.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn service_fires_armed_reminder_and_broadcasts_to_all_clients() {
    let (presenter, mut shown) = ChannelPresenter::channel();
    let (core, timers) = SchedulerCore::new(
        MemoryReminderStore::new(),
        presenter,
        &AlarmConfig::default(),
    );
    let (handle, service) = SchedulerService::new(core, timers, 8);
    let mut page_a = handle.subscribe();
    let mut page_b = handle.subscribe();
    tokio::spawn(service.run());

    handle
        .schedule(ReminderDescriptor::after("Meeting", 3_000).with_id("m1"))
        .await
        .unwrap();

    let notification = shown.recv().await.unwrap();
    assert_eq!(notification.tag, "alarm-m1");

    for page in [&mut page_a, &mut page_b] {
        assert_eq!(page.recv().await.unwrap().name(), "reminder.scheduled");
        assert_eq!(page.recv().await.unwrap().name(), "reminder.fired");
    }
}
