//! Reminder data model: records, schedule descriptors and recurrence.

pub mod recurrence;
pub mod types;

pub use recurrence::next_occurrence;
pub use types::{PresentationHints, Reminder, ReminderDescriptor, ReminderStatus, RepeatPolicy};
