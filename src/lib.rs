//! alarmd: background reminder scheduler.
//!
//! Reminders are persisted, armed as in-process timers and fired as system
//! notifications from a long-lived background process that may be evicted
//! and restarted at any time.
//!
//! # Architecture
//!
//! - **Reminder model**: [`reminder`] records, descriptors and repeat policies
//! - **Scheduler core**: [`scheduler::SchedulerCore`] drives the lifecycle
//!   state machine (pending → fired → snoozed/dismissed/completed)
//! - **Service loop**: [`scheduler::SchedulerService`] serialises requests and
//!   timer expiries on a single task
//! - **Persistence**: [`scheduler::ReminderStore`] is the source of truth;
//!   timers are rebuilt from it on every start
//! - **Host bridge**: [`host`] speaks newline-delimited JSON envelopes with
//!   the native shell that owns the notification facility

pub mod alarm_dirs;
pub mod config;
pub mod error;
pub mod host;
pub mod reminder;
pub mod scheduler;

pub use config::AlarmConfig;
pub use error::{AlarmError, Result};
pub use reminder::{Reminder, ReminderDescriptor, ReminderStatus, RepeatPolicy};
pub use scheduler::{SchedulerCore, SchedulerHandle, SchedulerService};
