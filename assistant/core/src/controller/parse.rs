//! Transaction parse controller

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use super::pump::{pump, EventSink, Flow};
use crate::api::{ApiError, Transaction, TransactionsApi};
use crate::events::DomainEvent;
use crate::messages::{SessionId, TransactionProposal};
use crate::reveal::{
    ParseReducer, ParseSnapshot, ParseStep, RevealBoard, RevealHandle, RevealScheduler,
    RevealTarget, RevealTiming,
};
use crate::session::{Session, SessionSlot};
use crate::transport::{EventTransport, ParseRequest, StreamRequest};

#[derive(Default)]
struct ParseState {
    reducer: ParseReducer,
    board: RevealBoard,
    reveal: Option<RevealHandle>,
    /// Session allowed to mutate the reducer
    owner: Option<SessionId>,
}

impl ParseState {
    /// Stop the running schedule; caller holds the state lock
    fn stop_reveal(&mut self) {
        if let Some(handle) = self.reveal.take() {
            handle.revoke();
        }
    }
}

struct ParseShared {
    state: Mutex<ParseState>,
    snapshots: watch::Sender<ParseSnapshot>,
    scheduler: RevealScheduler,
    this: Weak<ParseShared>,
}

impl ParseShared {
    fn publish(&self, state: &ParseState) {
        self.snapshots
            .send_replace(state.reducer.snapshot(&state.board));
    }

    fn owns(state: &ParseState, session: &Session) -> bool {
        !session.is_cancelled() && state.owner.as_ref() == Some(session.id())
    }

    fn start_reveal(&self, state: &mut ParseState, items: Vec<TransactionProposal>) {
        state.stop_reveal();
        if let Some(target) = self.this.upgrade() {
            state.reveal = Some(self.scheduler.schedule(items, target));
        }
    }
}

impl RevealTarget for ParseShared {
    fn with_board(&self, update: &mut dyn FnMut(&mut RevealBoard) -> bool) {
        let mut state = self.state.lock();
        if update(&mut state.board) {
            if state.board.is_done() {
                state.reducer.settle();
            }
            self.publish(&state);
        }
    }
}

impl EventSink for ParseShared {
    fn dispatch(&self, session: &Session, event: DomainEvent) -> Flow {
        let mut state = self.state.lock();
        if !Self::owns(&state, session) {
            tracing::debug!(session_id = %session.id(), event = event.kind(), "Dropping event for stale session");
            return Flow::Refused;
        }

        let flow = match state.reducer.apply(event) {
            ParseStep::Continue => Flow::Continue,
            ParseStep::Reveal(items) => {
                self.start_reveal(&mut state, items);
                Flow::Completed
            }
            ParseStep::Failed => Flow::Failed,
        };
        if flow != Flow::Continue {
            state.owner = None;
        }
        self.publish(&state);
        flow
    }

    fn end_of_stream(&self, session: &Session) {
        let mut state = self.state.lock();
        if !Self::owns(&state, session) {
            return;
        }
        if let Some(items) = state.reducer.finish_stream() {
            tracing::debug!(session_id = %session.id(), "Parse stream ended without done");
            self.start_reveal(&mut state, items);
        }
        state.owner = None;
        self.publish(&state);
    }
}

/// Owns the transaction parsing slot
///
/// Streams proposals for a piece of free text, reveals them on a cadence
/// and lets the user pick which ones to create.
pub struct ParseController<T: EventTransport + 'static> {
    transport: Arc<T>,
    account_id: i64,
    shared: Arc<ParseShared>,
    slot: SessionSlot,
}

impl<T: EventTransport + 'static> std::fmt::Debug for ParseController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseController")
            .field("transport", &self.transport.name())
            .field("account_id", &self.account_id)
            .field("timing", &self.shared.scheduler.timing())
            .finish_non_exhaustive()
    }
}

impl<T: EventTransport + 'static> ParseController<T> {
    /// Create a controller with default reveal timing
    pub fn new(transport: Arc<T>, account_id: i64) -> Self {
        Self::with_timing(transport, account_id, RevealTiming::default())
    }

    /// Create a controller with explicit reveal timing
    pub fn with_timing(transport: Arc<T>, account_id: i64, timing: RevealTiming) -> Self {
        let state = ParseState::default();
        let (snapshots, _) = watch::channel(state.reducer.snapshot(&state.board));
        let shared = Arc::new_cyclic(|this| ParseShared {
            state: Mutex::new(state),
            snapshots,
            scheduler: RevealScheduler::new(timing),
            this: this.clone(),
        });
        Self {
            transport,
            account_id,
            shared,
            slot: SessionSlot::new(),
        }
    }

    /// Follow state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ParseSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> ParseSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Parse `text` into proposals
    ///
    /// Supersedes any parse in flight and empties the board. Blank text is
    /// ignored. Must be called from within a tokio runtime.
    pub fn parse(&self, text: &str) -> Option<Session> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let session = Session::new(self.fence());
        self.slot.supersede(session.clone());

        {
            let mut state = self.shared.state.lock();
            state.stop_reveal();
            state.board.clear();
            state.reducer.begin();
            state.owner = Some(session.id().clone());
            self.shared.publish(&state);
        }

        let request = StreamRequest::Parse(ParseRequest {
            text: text.to_string(),
            account_id: self.account_id,
        });
        tokio::spawn(pump(
            Arc::clone(&self.transport),
            request,
            session.clone(),
            Arc::clone(&self.shared),
        ));
        Some(session)
    }

    /// Stop streaming and revealing; visible proposals stay
    pub fn cancel(&self) {
        self.slot.cancel();
        let mut state = self.shared.state.lock();
        state.stop_reveal();
        state.owner = None;
        if state.reducer.is_active() {
            state.reducer.abandon();
        }
        self.shared.publish(&state);
    }

    /// Stop everything and empty the board
    pub fn clear(&self) {
        self.slot.cancel();
        let mut state = self.shared.state.lock();
        state.stop_reveal();
        state.owner = None;
        state.board.clear();
        state.reducer.clear();
        self.shared.publish(&state);
    }

    /// Flip selection of a visible proposal
    pub fn toggle(&self, index: usize) -> bool {
        let mut state = self.shared.state.lock();
        let toggled = state.board.toggle(index);
        if toggled {
            self.shared.publish(&state);
        }
        toggled
    }

    /// Selected proposals in reveal order
    #[must_use]
    pub fn selected(&self) -> Vec<TransactionProposal> {
        self.shared.state.lock().board.selected_items()
    }

    /// Create the selected proposals as transactions
    ///
    /// The board is cleared once every proposal was created.
    ///
    /// # Errors
    ///
    /// Returns the first API error; proposals created before it stay created
    /// and the board is left as it is.
    pub async fn confirm(&self, api: &TransactionsApi) -> Result<Vec<Transaction>, ApiError> {
        let selected = self.selected();
        let created = api.create_all(self.account_id, &selected).await?;
        tracing::info!(created = created.len(), "Confirmed parsed transactions");
        self.clear();
        Ok(created)
    }

    fn fence(&self) -> crate::session::Fence {
        let shared = Arc::clone(&self.shared);
        Arc::new(move || drop(shared.state.lock()))
    }
}

impl<T: EventTransport + 'static> Drop for ParseController<T> {
    fn drop(&mut self) {
        self.shared.state.lock().stop_reveal();
    }
}
