//! Next-occurrence computation for repeating reminders.
//!
//! Occurrences advance from the previous *scheduled* fire time, never from
//! "now", so a repeating reminder does not drift. After a long downtime the
//! advance skips forward until the result is strictly in the future.

use crate::reminder::types::RepeatPolicy;
use chrono::{Datelike, TimeZone, Weekday};

/// One day in milliseconds.
pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// One week in milliseconds.
pub const WEEK_MS: u64 = 7 * DAY_MS;

/// Compute the next fire time after `fired_at_ms` that is strictly later than
/// `now_ms`.
///
/// Returns `None` for [`RepeatPolicy::Once`] and for a zero custom interval.
/// `tz` decides which calendar days count as the weekend for
/// [`RepeatPolicy::Weekdays`].
#[must_use]
pub fn next_occurrence<Tz: TimeZone>(
    policy: &RepeatPolicy,
    fired_at_ms: u64,
    now_ms: u64,
    tz: &Tz,
) -> Option<u64> {
    match policy {
        RepeatPolicy::Once => None,
        RepeatPolicy::Daily => advance_past(fired_at_ms, now_ms, DAY_MS),
        RepeatPolicy::Weekly => advance_past(fired_at_ms, now_ms, WEEK_MS),
        RepeatPolicy::CustomInterval { interval_ms } => {
            advance_past(fired_at_ms, now_ms, *interval_ms)
        }
        RepeatPolicy::Weekdays => {
            let mut next = advance_past(fired_at_ms, now_ms, DAY_MS)?;
            // At most two weekend days to skip.
            for _ in 0..2 {
                if !is_weekend(next, tz) {
                    break;
                }
                next = next.checked_add(DAY_MS)?;
            }
            Some(next)
        }
    }
}

/// Smallest `start + k * step` (k >= 1) that is strictly greater than `now`.
fn advance_past(start: u64, now: u64, step: u64) -> Option<u64> {
    if step == 0 {
        return None;
    }
    let first = start.checked_add(step)?;
    if first > now {
        return Some(first);
    }
    let steps = (now - start) / step + 1;
    start.checked_add(steps.checked_mul(step)?)
}

fn is_weekend<Tz: TimeZone>(epoch_ms: u64, tz: &Tz) -> bool {
    let Ok(ms) = i64::try_from(epoch_ms) else {
        return false;
    };
    match tz.timestamp_millis_opt(ms).single() {
        Some(dt) => matches!(dt.weekday(), Weekday::Sat | Weekday::Sun),
        None => false,
    }
}
