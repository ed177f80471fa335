//! Transaction Parsing Flow
//!
//! The parse endpoint streams proposed transactions as they are extracted
//! from free text. [`ParseReducer`] collects them; once the stream is done
//! the queue is handed to a [`RevealScheduler`] which shows them one at a
//! time on a fixed cadence.
//!
//! ```text
//! planning{count} ─▶ transaction{item}* ─▶ done ─▶ RevealScheduler
//!                                                    │  I        I+S       I+(N-1)S+F
//!                                                    └──▶ T1 ──▶ T2 ··· ──▶ done
//! ```

pub mod scheduler;
pub mod timing;

pub use scheduler::{RevealBoard, RevealHandle, RevealScheduler, RevealTarget};
pub use timing::RevealTiming;

use serde::Serialize;

use crate::conversation::ChatError;
use crate::events::DomainEvent;
use crate::messages::TransactionProposal;

/// What the caller should do after a parse event was applied
#[derive(Clone, Debug, PartialEq)]
pub enum ParseStep {
    /// Keep reading
    Continue,
    /// The stream is done; reveal these proposals
    Reveal(Vec<TransactionProposal>),
    /// The stream failed
    Failed,
}

/// Accumulates parse events until the stream is done
#[derive(Debug, Default)]
pub struct ParseReducer {
    expected: Option<usize>,
    queue: Vec<TransactionProposal>,
    received: usize,
    error: Option<ChatError>,
    active: bool,
    finished: bool,
}

impl ParseReducer {
    /// Create an idle reducer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new session
    pub fn begin(&mut self) {
        *self = Self {
            active: true,
            ..Self::default()
        };
    }

    /// Apply one event
    pub fn apply(&mut self, event: DomainEvent) -> ParseStep {
        if self.finished {
            tracing::debug!(event = event.kind(), "Ignoring event after parse finished");
            return ParseStep::Continue;
        }
        match event {
            DomainEvent::Planning { count } => {
                self.expected = Some(count);
            }
            DomainEvent::Transaction { item } => {
                self.received += 1;
                self.queue.push(item);
            }
            DomainEvent::TransactionPreviews { transactions, .. } => {
                self.received += transactions.len();
                self.queue.extend(transactions);
            }
            DomainEvent::Done { .. } => {
                return ParseStep::Reveal(self.finish());
            }
            DomainEvent::Error {
                message,
                recoverable,
            } => {
                tracing::warn!(%message, recoverable, "Parse failed");
                self.queue.clear();
                self.error = Some(ChatError {
                    message,
                    recoverable,
                });
                self.active = false;
                self.finished = true;
                return ParseStep::Failed;
            }
            DomainEvent::Thinking { .. } => {}
            other => {
                tracing::debug!(event = other.kind(), "Ignoring chat event on parse stream");
            }
        }
        ParseStep::Continue
    }

    /// Stream ended; returns whatever is queued if no terminal event was seen
    pub fn finish_stream(&mut self) -> Option<Vec<TransactionProposal>> {
        if self.finished {
            None
        } else {
            Some(self.finish())
        }
    }

    /// Session was cancelled
    pub fn abandon(&mut self) {
        self.queue.clear();
        self.active = false;
        self.finished = true;
    }

    /// Reveal finished
    pub fn settle(&mut self) {
        self.active = false;
    }

    /// Back to idle
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether a parse is in progress (streaming or revealing)
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Build a snapshot together with the reveal board
    #[must_use]
    pub fn snapshot(&self, board: &RevealBoard) -> ParseSnapshot {
        ParseSnapshot {
            expected: self.expected,
            received: self.received,
            visible: board.visible().to_vec(),
            selected: board.selected_indices(),
            loading: self.active && !board.is_done(),
            done: board.is_done(),
            error: self.error.clone(),
        }
    }

    fn finish(&mut self) -> Vec<TransactionProposal> {
        self.finished = true;
        if let Some(expected) = self.expected {
            if expected != self.received {
                tracing::debug!(expected, received = self.received, "Planned count differs");
            }
        }
        std::mem::take(&mut self.queue)
    }
}

/// Immutable view of the parse flow
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParseSnapshot {
    /// Count announced by `planning`
    pub expected: Option<usize>,
    /// Proposals received from the stream
    pub received: usize,
    /// Proposals revealed so far
    pub visible: Vec<TransactionProposal>,
    /// Selected indices into `visible`
    pub selected: Vec<usize>,
    /// Streaming or revealing
    pub loading: bool,
    /// Reveal finished
    pub done: bool,
    /// Failure, if any
    pub error: Option<ChatError>,
}
