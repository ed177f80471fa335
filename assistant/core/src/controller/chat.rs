//! Chat session controller

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::pump::{pump, EventSink, Flow};
use crate::api::{ApiError, ConversationsApi};
use crate::conversation::{ChatSnapshot, ConversationReducer, ReduceOutcome};
use crate::events::DomainEvent;
use crate::messages::{ConversationId, ConversationTurn, SessionId};
use crate::session::{Session, SessionSlot};
use crate::transport::{ChatRequest, EventTransport, StreamRequest};

struct ChatState {
    reducer: ConversationReducer,
    /// Session allowed to mutate `reducer`
    owner: Option<SessionId>,
}

struct ChatShared {
    state: Mutex<ChatState>,
    snapshots: watch::Sender<ChatSnapshot>,
}

impl ChatShared {
    fn publish(&self, state: &ChatState) {
        self.snapshots.send_replace(state.reducer.snapshot());
    }

    fn owns(state: &ChatState, session: &Session) -> bool {
        !session.is_cancelled() && state.owner.as_ref() == Some(session.id())
    }
}

impl EventSink for ChatShared {
    fn dispatch(&self, session: &Session, event: DomainEvent) -> Flow {
        let mut state = self.state.lock();
        if !Self::owns(&state, session) {
            tracing::debug!(session_id = %session.id(), event = event.kind(), "Dropping event for stale session");
            return Flow::Refused;
        }

        let outcome = state.reducer.apply(event);
        let flow = match outcome {
            ReduceOutcome::Continue => Flow::Continue,
            ReduceOutcome::Done => Flow::Completed,
            ReduceOutcome::Failed => Flow::Failed,
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
        tracing::debug!(session_id = %session.id(), "Stream ended without done");
        state.reducer.finish_stream();
        state.owner = None;
        self.publish(&state);
    }
}

/// Owns the chat conversation slot
///
/// At most one reply streams at a time. Sending a new message supersedes
/// the reply in flight. Readers follow the state through [`subscribe`].
///
/// [`subscribe`]: ChatController::subscribe
pub struct ChatController<T: EventTransport + 'static> {
    transport: Arc<T>,
    account_id: i64,
    shared: Arc<ChatShared>,
    slot: SessionSlot,
}

impl<T: EventTransport + 'static> std::fmt::Debug for ChatController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("transport", &self.transport.name())
            .field("account_id", &self.account_id)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<T: EventTransport + 'static> ChatController<T> {
    /// Create a controller for `account_id`
    pub fn new(transport: Arc<T>, account_id: i64) -> Self {
        let reducer = ConversationReducer::new();
        let (snapshots, _) = watch::channel(reducer.snapshot());
        Self {
            transport,
            account_id,
            shared: Arc::new(ChatShared {
                state: Mutex::new(ChatState {
                    reducer,
                    owner: None,
                }),
                snapshots,
            }),
            slot: SessionSlot::new(),
        }
    }

    /// Follow state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// The reply in flight, if any
    #[must_use]
    pub fn active_session(&self) -> Option<Session> {
        self.slot.active()
    }

    /// Send a message and start streaming the reply
    ///
    /// The user turn is in the transcript before this returns. Any reply
    /// still streaming is cancelled first. Blank messages are ignored; any
    /// other message is sent exactly as typed.
    /// Must be called from within a tokio runtime.
    pub fn send_message(&self, text: &str) -> Option<Session> {
        if text.trim().is_empty() {
            return None;
        }

        let session = Session::new(self.fence());
        self.slot.supersede(session.clone());

        let request = {
            let mut state = self.shared.state.lock();
            state.reducer.push_user_turn(text);
            let conversation_id = state.reducer.conversation_id().cloned();
            state.reducer.begin_turn();
            state.owner = Some(session.id().clone());
            self.shared.publish(&state);

            StreamRequest::Chat(ChatRequest {
                message: text.to_string(),
                account_id: self.account_id,
                conversation_id,
            })
        };

        tokio::spawn(pump(
            Arc::clone(&self.transport),
            request,
            session.clone(),
            Arc::clone(&self.shared),
        ));
        Some(session)
    }

    /// Stop the reply in flight; whatever arrived stays as it is
    pub fn cancel(&self) {
        let Some(session) = self.slot.cancel() else {
            return;
        };
        let mut state = self.shared.state.lock();
        if state.owner.as_ref() == Some(session.id()) {
            state.owner = None;
            state.reducer.abandon();
            self.shared.publish(&state);
        }
    }

    /// Start a new, empty conversation
    pub fn clear(&self) {
        self.slot.cancel();
        let mut state = self.shared.state.lock();
        state.owner = None;
        state.reducer.clear();
        self.shared.publish(&state);
    }

    /// Drop proposals awaiting confirmation
    pub fn dismiss_transactions(&self) {
        let mut state = self.shared.state.lock();
        state.reducer.dismiss_previews();
        self.shared.publish(&state);
    }

    /// Replace the conversation with stored history
    pub fn hydrate(&self, turns: Vec<ConversationTurn>, id: ConversationId) {
        self.slot.cancel();
        let mut state = self.shared.state.lock();
        state.owner = None;
        state.reducer.hydrate(turns, id);
        self.shared.publish(&state);
    }

    /// Load a stored conversation and continue it
    ///
    /// # Errors
    ///
    /// Returns the API error if the history cannot be fetched; the current
    /// conversation is left untouched in that case.
    pub async fn resume(&self, api: &ConversationsApi, id: &ConversationId) -> Result<(), ApiError> {
        let stored = api.get(id).await?;
        tracing::info!(conversation_id = %id, messages = stored.messages.len(), "Resuming conversation");
        self.hydrate(stored.into_turns(), id.clone());
        Ok(())
    }

    fn fence(&self) -> crate::session::Fence {
        let shared = Arc::clone(&self.shared);
        Arc::new(move || drop(shared.state.lock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ChatPhase;
    use crate::session::SessionStatus;
    use crate::transport::ReplayTransport;
    use pretty_assertions::assert_eq;

    fn frames(events: &[&str]) -> Vec<u8> {
        events
            .iter()
            .map(|e| format!("data: {e}\n\n"))
            .collect::<String>()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let controller = ChatController::new(Arc::new(ReplayTransport::new()), 1);
        assert!(controller.send_message("   ").is_none());
        assert!(controller.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_user_turn_is_synchronous() {
        let transport = Arc::new(ReplayTransport::new());
        let _tx = transport.push_channel();
        let controller = ChatController::new(Arc::clone(&transport), 1);

        let session = controller.send_message("hello").unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.transcript[0].content, "hello");
        assert!(snapshot.busy);
        assert_eq!(snapshot.phase, ChatPhase::Streaming);

        controller.cancel();
        assert_eq!(session.wait().await, SessionStatus::Cancelled);
        assert!(!controller.snapshot().busy);
    }

    #[tokio::test]
    async fn test_message_is_sent_as_typed() {
        let transport = Arc::new(ReplayTransport::new());
        transport.push_chunks([frames(&[r#"{"type":"done"}"#])]);
        let controller = ChatController::new(Arc::clone(&transport), 2);

        let session = controller.send_message("  rent?\n").unwrap();
        assert_eq!(controller.snapshot().transcript[0].content, "  rent?\n");
        assert_eq!(session.wait().await, SessionStatus::Completed);

        assert_eq!(
            transport.requests()[0],
            StreamRequest::Chat(ChatRequest {
                message: "  rent?\n".to_string(),
                account_id: 2,
                conversation_id: None,
            })
        );
    }

    #[tokio::test]
    async fn test_conversation_id_carried_into_next_request() {
        let transport = Arc::new(ReplayTransport::new());
        transport.push_chunks([frames(&[
            r#"{"type":"message_chunk","content":"Hi","is_final":true}"#,
            r#"{"type":"done","conversation_id":7}"#,
        ])]);
        transport.push_chunks([frames(&[r#"{"type":"done"}"#])]);
        let controller = ChatController::new(Arc::clone(&transport), 4);

        let first = controller.send_message("one").unwrap();
        assert_eq!(first.wait().await, SessionStatus::Completed);
        let second = controller.send_message("two").unwrap();
        assert_eq!(second.wait().await, SessionStatus::Completed);

        let requests = transport.requests();
        assert_eq!(
            requests[0],
            StreamRequest::Chat(ChatRequest {
                message: "one".to_string(),
                account_id: 4,
                conversation_id: None,
            })
        );
        assert_eq!(
            requests[1],
            StreamRequest::Chat(ChatRequest {
                message: "two".to_string(),
                account_id: 4,
                conversation_id: Some(ConversationId::from(7)),
            })
        );
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let transport = Arc::new(ReplayTransport::new());
        transport.push_chunks([frames(&[
            r#"{"type":"message_chunk","content":"Hi","is_final":true}"#,
            r#"{"type":"done","conversation_id":"c1"}"#,
        ])]);
        let controller = ChatController::new(transport, 1);

        controller.send_message("hey").unwrap().wait().await;
        assert_eq!(controller.snapshot().transcript.len(), 2);

        controller.clear();
        assert_eq!(controller.snapshot(), ChatSnapshot::default());
    }

    #[tokio::test]
    async fn test_hydrate_replaces_transcript() {
        let controller = ChatController::new(Arc::new(ReplayTransport::new()), 1);
        controller.hydrate(
            vec![ConversationTurn::user("earlier")],
            ConversationId::new("3"),
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.transcript[0].content, "earlier");
        assert_eq!(snapshot.conversation_id, Some(ConversationId::new("3")));
    }
}
