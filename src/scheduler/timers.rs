//! Timer registry: armed, cancelable delayed callbacks keyed by reminder id.
//!
//! Purely in-memory. Armed timers do not survive a process restart; the
//! scheduler core rebuilds them from the reminder store on start.

use std::collections::HashMap;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifies one arming of a timer.
///
/// Re-arming an id bumps the generation, so a signal from a timer that was
/// replaced after it expired can be told apart from the live one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerFired {
    pub id: String,
    pub generation: u64,
}

struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Registry of armed timers. At most one timer per id.
#[derive(Default)]
pub struct TimerRegistry {
    entries: HashMap<String, ArmedTimer>,
    next_generation: u64,
}

impl TimerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `callback` to run after `delay_ms`.
    ///
    /// Any timer already armed for `id` is canceled first. A negative delay
    /// runs the callback on the next scheduler turn. Must be called from
    /// within a tokio runtime.
    pub fn arm<F>(&mut self, id: &str, delay_ms: i64, callback: F)
    where
        F: FnOnce(TimerFired) + Send + 'static,
    {
        self.cancel(id);

        self.next_generation = self.next_generation.wrapping_add(1);
        let fired = TimerFired {
            id: id.to_owned(),
            generation: self.next_generation,
        };
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            callback(fired);
        });

        debug!(id, delay_ms, generation = self.next_generation, "timer armed");
        self.entries.insert(
            id.to_owned(),
            ArmedTimer {
                generation: self.next_generation,
                handle: task.abort_handle(),
            },
        );
    }

    /// Cancel and remove the timer for `id`. No-op when none is armed.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(id, generation = timer.generation, "timer canceled");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns `true` if `fired` belongs to the timer currently armed for its id.
    #[must_use]
    pub fn is_current(&self, fired: &TimerFired) -> bool {
        self.entries
            .get(&fired.id)
            .is_some_and(|timer| timer.generation == fired.generation)
    }

    /// Retire the entry for an expired timer.
    ///
    /// Returns `false` (and leaves the registry untouched) when the signal is
    /// stale because the id was canceled or re-armed in the meantime.
    pub fn complete(&mut self, fired: &TimerFired) -> bool {
        if !self.is_current(fired) {
            return false;
        }
        self.entries.remove(&fired.id);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancel every armed timer.
    pub fn clear(&mut self) {
        for (_, timer) in self.entries.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
