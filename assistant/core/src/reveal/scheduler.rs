//! Reveal Scheduler
//!
//! Decouples when proposals arrive from when they are shown. A schedule is a
//! tokio task that sleeps to absolute deadlines measured from the moment
//! [`RevealScheduler::schedule`] was called, so a slow consumer never
//! stretches the cadence.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::timing::RevealTiming;
use crate::messages::TransactionProposal;

/// Proposals shown so far and the user's selection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RevealBoard {
    visible: Vec<TransactionProposal>,
    selected: BTreeSet<usize>,
    done: bool,
}

impl RevealBoard {
    /// Show one more proposal, selected by default
    pub fn reveal(&mut self, item: TransactionProposal) {
        self.selected.insert(self.visible.len());
        self.visible.push(item);
    }

    /// Mark the schedule as finished
    pub fn settle(&mut self) {
        self.done = true;
    }

    /// Remove everything
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Flip the selection of a visible proposal
    ///
    /// Returns false if `index` is not visible.
    pub fn toggle(&mut self, index: usize) -> bool {
        if index >= self.visible.len() {
            return false;
        }
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
        true
    }

    /// Visible proposals in reveal order
    #[must_use]
    pub fn visible(&self) -> &[TransactionProposal] {
        &self.visible
    }

    /// Indices of selected proposals, ascending
    #[must_use]
    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    /// Selected proposals in reveal order
    #[must_use]
    pub fn selected_items(&self) -> Vec<TransactionProposal> {
        self.selected
            .iter()
            .filter_map(|&index| self.visible.get(index).cloned())
            .collect()
    }

    /// Whether the schedule reported done
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Owner of the board a schedule writes to
///
/// `with_board` runs `update` under whatever lock protects the board and
/// publishes a new snapshot when `update` returns true. Taking that lock
/// with a no-op update is how a cancelled schedule is fenced off.
pub trait RevealTarget: Send + Sync {
    /// Run `update` against the board
    fn with_board(&self, update: &mut dyn FnMut(&mut RevealBoard) -> bool);
}

/// Spawns reveal schedules with fixed timing
#[derive(Clone, Copy, Debug, Default)]
pub struct RevealScheduler {
    timing: RevealTiming,
}

impl RevealScheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(timing: RevealTiming) -> Self {
        Self { timing }
    }

    /// Timing constants in use
    #[must_use]
    pub fn timing(&self) -> RevealTiming {
        self.timing
    }

    /// Start revealing `items` on `target`
    ///
    /// Must be called from within a tokio runtime. The clock starts now, not
    /// when the task first runs.
    pub fn schedule(
        &self,
        items: Vec<TransactionProposal>,
        target: Arc<dyn RevealTarget>,
    ) -> RevealHandle {
        let start = Instant::now();
        let token = CancellationToken::new();
        let timing = self.timing;
        let count = items.len();

        tracing::debug!(count, ?timing, "Scheduling reveal");

        let task_token = token.clone();
        let task_target = Arc::clone(&target);
        tokio::spawn(async move {
            for (index, item) in items.into_iter().enumerate() {
                let deadline = start + timing.item_offset(index);
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => return,
                    () = sleep_until(deadline) => {}
                }

                let mut item = Some(item);
                task_target.with_board(&mut |board| {
                    if task_token.is_cancelled() {
                        return false;
                    }
                    match item.take() {
                        Some(item) => {
                            board.reveal(item);
                            true
                        }
                        None => false,
                    }
                });
            }

            tokio::select! {
                biased;
                () = task_token.cancelled() => return,
                () = sleep_until(start + timing.done_offset(count)) => {}
            }

            task_target.with_board(&mut |board| {
                if task_token.is_cancelled() {
                    return false;
                }
                board.settle();
                true
            });
            tracing::debug!(count, "Reveal complete");
        });

        RevealHandle { token, target }
    }
}

/// Control over one running schedule
pub struct RevealHandle {
    token: CancellationToken,
    target: Arc<dyn RevealTarget>,
}

impl std::fmt::Debug for RevealHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealHandle")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RevealHandle {
    /// Stop the schedule; the visible set stays as it is
    ///
    /// Must not be called while the target's lock is held.
    pub fn cancel(&self) {
        self.token.cancel();
        self.target.with_board(&mut |_| false);
    }

    /// Stop the schedule and empty the board
    pub fn clear(&self) {
        self.token.cancel();
        self.target.with_board(&mut |board| {
            board.clear();
            true
        });
    }

    /// Whether the schedule was stopped
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Revoke the token without fencing
    ///
    /// For callers that already hold the target's lock; the reveal task
    /// re-checks the token under that lock, so no reveal lands afterwards.
    pub(crate) fn revoke(&self) {
        self.token.cancel();
    }
}
