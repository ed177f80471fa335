//! Reveal cadence

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay before the first item appears
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(400);

/// Default spacing between items
pub const DEFAULT_STEP: Duration = Duration::from_millis(400);

/// Default pause between the last item and the done signal
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

/// Timing constants of a reveal schedule
///
/// Item `i` of `n` becomes visible at `initial + i * step`; the schedule is
/// done at `initial + (n - 1) * step + settle`, or `initial + settle` when
/// there is nothing to show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealTiming {
    /// Delay before the first item
    pub initial: Duration,
    /// Spacing between items
    pub step: Duration,
    /// Pause after the last item
    pub settle: Duration,
}

impl Default for RevealTiming {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DELAY,
            step: DEFAULT_STEP,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl RevealTiming {
    /// Offset of item `index` from the schedule start
    #[must_use]
    pub fn item_offset(&self, index: usize) -> Duration {
        let steps = u32::try_from(index).unwrap_or(u32::MAX);
        self.initial.saturating_add(self.step.saturating_mul(steps))
    }

    /// Offset of the done signal for `count` items
    #[must_use]
    pub fn done_offset(&self, count: usize) -> Duration {
        let last = match count.checked_sub(1) {
            Some(last) => self.item_offset(last),
            None => self.initial,
        };
        last.saturating_add(self.settle)
    }
}
