//! Background reminder scheduler.
//!
//! Reminders are persisted through a [`ReminderStore`], armed as in-memory
//! timers, and fired as system notifications through a
//! [`NotificationPresenter`]. Timers are rebuilt from the store whenever the
//! service starts, so a reminder that came due while nothing was running
//! fires once on the next start.

pub mod broadcast;
pub mod clock;
pub mod core;
pub mod presenter;
pub mod service;
pub mod store;
pub mod timers;

pub use broadcast::{ClientBroadcast, ReminderEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use self::core::{FireOutcome, RestoreReport, SchedulerCore, SweepReport, TimerSignals};
pub use presenter::{
    ChannelPresenter, InteractionKind, Notification, NotificationAction, NotificationInteraction,
    NotificationPresenter, TracingPresenter,
};
pub use service::{SchedulerHandle, SchedulerReply, SchedulerRequest, SchedulerService};
pub use store::{JsonFileReminderStore, MemoryReminderStore, ReminderStore};
pub use timers::{TimerFired, TimerRegistry};
