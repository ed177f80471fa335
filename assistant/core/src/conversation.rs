//! Conversation Reducer
//!
//! Folds the chat event sequence into a transcript of committed turns, a
//! table of tool invocations and an in-progress reply buffer.
//!
//! # State Machine
//!
//! ```text
//!            begin_turn            final chunk             done
//!   Idle ─────────────▶ Streaming ────────────▶ Finalizing ─────▶ Idle
//!                           │                        │
//!                           └──────── error ─────────┴──────────▶ Errored
//! ```
//!
//! The reducer is pure state: it never blocks, never spawns and never
//! looks at the clock except to stamp committed turns. The controller
//! decides which session may call [`ConversationReducer::apply`].

use serde::Serialize;

use crate::events::DomainEvent;
use crate::messages::{ConversationId, ConversationTurn, ToolInvocation, TransactionProposal};

/// What the caller should do after an event was applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOutcome {
    /// Keep reading the stream
    Continue,
    /// The stream finished normally
    Done,
    /// The stream failed; stop reading
    Failed,
}

/// Reducer phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// No reply in flight
    #[default]
    Idle,
    /// Receiving a reply
    Streaming,
    /// Reply committed, waiting for the end of the stream
    Finalizing,
    /// The last reply failed
    Errored,
}

/// Error surfaced to the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatError {
    /// Human-readable message
    pub message: String,
    /// Whether retrying makes sense
    pub recoverable: bool,
}

/// Tool invocations of the turn being assembled, in first-seen order
///
/// Keyed by tool name: a second invocation of the same tool within one turn
/// replaces the first one's record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolTable {
    entries: Vec<ToolInvocation>,
}

impl ToolTable {
    /// Record a start; an existing entry for `name` goes back to running
    pub fn start(&mut self, name: &str, input: serde_json::Value) {
        match self.get_mut(name) {
            Some(entry) => *entry = ToolInvocation::running(name, input),
            None => self.entries.push(ToolInvocation::running(name, input)),
        }
    }

    /// Record an end, creating the entry if no start was seen
    pub fn end(&mut self, name: &str, output: serde_json::Value, success: bool, error: Option<String>) {
        if self.get_mut(name).is_none() {
            tracing::debug!(tool = name, "tool_end without tool_start");
            self.entries
                .push(ToolInvocation::running(name, serde_json::Value::Null));
        }
        if let Some(entry) = self.get_mut(name) {
            entry.finish(output, success, error);
        }
    }

    /// Look up an entry by tool name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolInvocation> {
        self.entries.iter().find(|entry| entry.tool_name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ToolInvocation> {
        self.entries.iter_mut().find(|entry| entry.tool_name == name)
    }

    /// All entries
    #[must_use]
    pub fn entries(&self) -> &[ToolInvocation] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take(&mut self) -> Vec<ToolInvocation> {
        std::mem::take(&mut self.entries)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Single-shot guard around turn commits
///
/// Fires when a turn is committed. While fired, further final chunks are
/// ignored. Fresh reply material (a non-empty chunk or a tool call) arms it
/// again, so a later model call in the same session can commit its own turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinalizeLatch {
    fired: bool,
}

impl FinalizeLatch {
    /// Fire the latch; returns false if it was already fired
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    /// Arm the latch again
    pub fn rearm(&mut self) {
        self.fired = false;
    }

    /// Whether the latch is fired
    #[must_use]
    pub fn is_fired(self) -> bool {
        self.fired
    }
}

/// Immutable view of the chat state, published after every change
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChatSnapshot {
    /// Committed turns, oldest first
    pub transcript: Vec<ConversationTurn>,
    /// Reply text received so far
    pub in_progress: String,
    /// Tools of the reply in flight
    pub tools: Vec<ToolInvocation>,
    /// Proposals awaiting confirmation
    pub pending_transactions: Vec<TransactionProposal>,
    /// Durable conversation identifier, once assigned
    pub conversation_id: Option<ConversationId>,
    /// Whether the assistant is working
    pub busy: bool,
    /// Latest status line from a `thinking` event
    pub thinking: Option<String>,
    /// Error from the last reply
    pub error: Option<ChatError>,
    /// Reducer phase
    pub phase: ChatPhase,
}

/// Chat state machine
#[derive(Debug, Default)]
pub struct ConversationReducer {
    transcript: Vec<ConversationTurn>,
    buffer: String,
    tools: ToolTable,
    pending_transactions: Vec<TransactionProposal>,
    conversation_id: Option<ConversationId>,
    busy: bool,
    thinking: Option<String>,
    error: Option<ChatError>,
    phase: ChatPhase,
    latch: FinalizeLatch,
}

impl ConversationReducer {
    /// Create an empty reducer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn; user turns are never revised
    pub fn push_user_turn(&mut self, content: impl Into<String>) {
        self.transcript.push(ConversationTurn::user(content));
    }

    /// Reset per-reply state for a new session
    pub fn begin_turn(&mut self) {
        self.buffer.clear();
        self.tools.clear();
        self.error = None;
        self.thinking = None;
        self.latch.rearm();
        self.busy = true;
        self.phase = ChatPhase::Streaming;
    }

    /// Apply one event
    pub fn apply(&mut self, event: DomainEvent) -> ReduceOutcome {
        match event {
            DomainEvent::Thinking { message } => {
                self.busy = true;
                if message.is_some() {
                    self.thinking = message;
                }
            }
            DomainEvent::ToolStart {
                tool_name,
                tool_input,
            } => {
                self.busy = true;
                self.latch.rearm();
                self.tools.start(&tool_name, tool_input);
            }
            DomainEvent::ToolEnd {
                tool_name,
                tool_output,
                success,
                error,
            } => {
                self.latch.rearm();
                self.tools.end(&tool_name, tool_output, success, error);
            }
            DomainEvent::MessageChunk {
                content,
                is_final: false,
            } => {
                self.busy = true;
                if !content.is_empty() {
                    self.latch.rearm();
                    self.buffer.push_str(&content);
                }
            }
            DomainEvent::MessageChunk {
                content,
                is_final: true,
            } => {
                if self.latch.is_fired() {
                    tracing::debug!("Ignoring duplicate final chunk");
                } else {
                    self.buffer.push_str(&content);
                    if self.buffer.is_empty() {
                        // Nothing to commit, but the next model call starts fresh
                        self.tools.clear();
                    } else {
                        self.commit();
                    }
                    self.busy = false;
                }
            }
            DomainEvent::TransactionPreviews {
                transactions,
                count,
            } => {
                if count != transactions.len() {
                    tracing::debug!(count, received = transactions.len(), "Preview count mismatch");
                }
                self.pending_transactions = transactions;
            }
            DomainEvent::ConversationId { conversation_id } => {
                self.adopt(conversation_id);
            }
            DomainEvent::Planning { .. } | DomainEvent::Transaction { .. } => {
                tracing::debug!("Ignoring parse event on chat stream");
            }
            DomainEvent::Error {
                message,
                recoverable,
            } => {
                tracing::warn!(%message, recoverable, "Assistant reported an error");
                self.error = Some(ChatError {
                    message,
                    recoverable,
                });
                self.busy = false;
                self.thinking = None;
                self.phase = ChatPhase::Errored;
                return ReduceOutcome::Failed;
            }
            DomainEvent::Done { conversation_id } => {
                if let Some(id) = conversation_id {
                    self.adopt(id);
                }
                self.finish_stream();
                return ReduceOutcome::Done;
            }
        }
        ReduceOutcome::Continue
    }

    /// Stream ended; commit any reply that never saw its final chunk
    pub fn finish_stream(&mut self) {
        self.commit();
        self.busy = false;
        self.thinking = None;
        if self.phase != ChatPhase::Errored {
            self.phase = ChatPhase::Idle;
        }
    }

    /// Session was cancelled; the buffer stays frozen as it is
    pub fn abandon(&mut self) {
        self.busy = false;
        self.thinking = None;
        if self.phase != ChatPhase::Errored {
            self.phase = ChatPhase::Idle;
        }
    }

    /// Start over with an empty conversation
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop proposals awaiting confirmation
    pub fn dismiss_previews(&mut self) {
        self.pending_transactions.clear();
    }

    /// Replace the transcript with stored history
    pub fn hydrate(&mut self, turns: Vec<ConversationTurn>, id: ConversationId) {
        self.clear();
        self.transcript = turns;
        self.conversation_id = Some(id);
    }

    /// Durable conversation identifier
    #[must_use]
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Committed turns
    #[must_use]
    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    /// Current tool table
    #[must_use]
    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    /// Clone the state for readers
    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            transcript: self.transcript.clone(),
            in_progress: self.buffer.clone(),
            tools: self.tools.entries().to_vec(),
            pending_transactions: self.pending_transactions.clone(),
            conversation_id: self.conversation_id.clone(),
            busy: self.busy,
            thinking: self.thinking.clone(),
            error: self.error.clone(),
            phase: self.phase,
        }
    }

    fn adopt(&mut self, id: ConversationId) {
        if self.conversation_id.as_ref() != Some(&id) {
            tracing::debug!(conversation_id = %id, "Adopting conversation id");
            self.conversation_id = Some(id);
        }
    }

    /// Commit the buffer as an assistant turn, if there is anything to commit
    fn commit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if !self.latch.fire() {
            return;
        }
        let content = std::mem::take(&mut self.buffer);
        let tools = self.tools.take();
        self.transcript.push(ConversationTurn::assistant(content, tools));
        self.phase = ChatPhase::Finalizing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ToolStatus, TurnRole};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn chunk(content: &str, is_final: bool) -> DomainEvent {
        DomainEvent::MessageChunk {
            content: content.to_string(),
            is_final,
        }
    }

    fn started() -> ConversationReducer {
        let mut reducer = ConversationReducer::new();
        reducer.push_user_turn("hi");
        reducer.begin_turn();
        reducer
    }

    #[test]
    fn test_scenario_tool_then_reply() {
        let mut reducer = started();
        let events = vec![
            DomainEvent::Thinking { message: None },
            DomainEvent::ToolStart {
                tool_name: "lookup".to_string(),
                tool_input: Value::Null,
            },
            DomainEvent::ToolEnd {
                tool_name: "lookup".to_string(),
                tool_output: json!({"x": 1}),
                success: true,
                error: None,
            },
            chunk("Hello", false),
            chunk(" world", true),
        ];
        for event in events {
            assert_eq!(reducer.apply(event), ReduceOutcome::Continue);
        }
        assert_eq!(
            reducer.apply(DomainEvent::Done { conversation_id: None }),
            ReduceOutcome::Done
        );

        let snapshot = reducer.snapshot();
        assert_eq!(snapshot.transcript.len(), 2);
        let reply = &snapshot.transcript[1];
        assert_eq!(reply.role, TurnRole::Assistant);
        assert_eq!(reply.content, "Hello world");
        assert_eq!(reply.tool_invocations.len(), 1);
        assert_eq!(reply.tool_invocations[0].tool_name, "lookup");
        assert_eq!(reply.tool_invocations[0].status, ToolStatus::Success);
        assert_eq!(reply.tool_invocations[0].output, Some(json!({"x": 1})));
        assert!(snapshot.in_progress.is_empty());
        assert!(snapshot.tools.is_empty());
        assert!(!snapshot.busy);
        assert_eq!(snapshot.phase, ChatPhase::Idle);
    }

    #[test]
    fn test_duplicate_final_commits_once() {
        let mut reducer = started();
        reducer.apply(chunk("Hello", false));
        reducer.apply(chunk(" world", true));
        reducer.apply(chunk(" world", true));

        let transcript = reducer.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "Hello world");
    }

    #[test]
    fn test_empty_final_commits_nothing() {
        let mut reducer = started();
        reducer.apply(DomainEvent::ToolStart {
            tool_name: "lookup".to_string(),
            tool_input: Value::Null,
        });
        reducer.apply(chunk("", true));

        assert_eq!(reducer.transcript().len(), 1);
        assert!(reducer.tools().is_empty());
        assert!(!reducer.snapshot().busy);
    }

    #[test]
    fn test_empty_final_does_not_leak_tools_into_next_reply() {
        let mut reducer = started();
        reducer.apply(DomainEvent::ToolStart {
            tool_name: "lookup".to_string(),
            tool_input: Value::Null,
        });
        reducer.apply(DomainEvent::ToolEnd {
            tool_name: "lookup".to_string(),
            tool_output: json!({"x": 1}),
            success: true,
            error: None,
        });
        reducer.apply(chunk("", true));
        reducer.apply(DomainEvent::Done { conversation_id: None });

        let snapshot = reducer.snapshot();
        assert!(snapshot.tools.is_empty());
        assert!(!snapshot.busy);
        assert_eq!(snapshot.phase, ChatPhase::Idle);

        reducer.apply(chunk("Later", false));
        reducer.apply(chunk(" reply", true));

        let transcript = reducer.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "Later reply");
        assert!(transcript[1].tool_invocations.is_empty());
    }

    #[test]
    fn test_later_model_call_commits_its_own_turn() {
        let mut reducer = started();
        reducer.apply(chunk("Let me check.", true));
        reducer.apply(DomainEvent::ToolStart {
            tool_name: "balance".to_string(),
            tool_input: json!({"account": 1}),
        });
        reducer.apply(DomainEvent::ToolEnd {
            tool_name: "balance".to_string(),
            tool_output: json!(120),
            success: true,
            error: None,
        });
        reducer.apply(chunk("You have 120.", true));

        let transcript = reducer.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].content, "Let me check.");
        assert!(transcript[1].tool_invocations.is_empty());
        assert_eq!(transcript[2].content, "You have 120.");
        assert_eq!(transcript[2].tool_invocations[0].tool_name, "balance");
    }

    #[test]
    fn test_tool_end_without_start() {
        let mut reducer = started();
        reducer.apply(DomainEvent::ToolEnd {
            tool_name: "X".to_string(),
            tool_output: Value::Null,
            success: true,
            error: None,
        });

        let tool = reducer.tools().get("X").unwrap();
        assert_eq!(tool.status, ToolStatus::Success);
        assert_eq!(reducer.tools().len(), 1);
    }

    #[test]
    fn test_tool_restart_replaces_entry() {
        let mut table = ToolTable::default();
        table.start("search", json!({"q": "a"}));
        table.end("search", json!([1]), false, Some("bad".to_string()));
        table.start("search", json!({"q": "b"}));

        assert_eq!(table.len(), 1);
        let tool = table.get("search").unwrap();
        assert_eq!(tool.status, ToolStatus::Running);
        assert_eq!(tool.input, json!({"q": "b"}));
        assert_eq!(tool.error, None);
        assert_eq!(tool.output, None);
    }

    #[test]
    fn test_done_flushes_unfinalized_reply() {
        let mut reducer = started();
        reducer.apply(chunk("partial", false));
        reducer.apply(DomainEvent::Done {
            conversation_id: Some(ConversationId::new("12")),
        });

        assert_eq!(reducer.transcript()[1].content, "partial");
        assert_eq!(reducer.conversation_id(), Some(&ConversationId::new("12")));
    }

    #[test]
    fn test_error_surfaces_and_fails() {
        let mut reducer = started();
        reducer.apply(chunk("half", false));
        let outcome = reducer.apply(DomainEvent::Error {
            message: "backend down".to_string(),
            recoverable: true,
        });

        assert_eq!(outcome, ReduceOutcome::Failed);
        let snapshot = reducer.snapshot();
        assert_eq!(
            snapshot.error,
            Some(ChatError {
                message: "backend down".to_string(),
                recoverable: true
            })
        );
        assert_eq!(snapshot.phase, ChatPhase::Errored);
        assert!(!snapshot.busy);
        assert_eq!(snapshot.transcript.len(), 1);
    }

    #[test]
    fn test_conversation_id_adoption() {
        let mut reducer = started();
        reducer.apply(DomainEvent::ConversationId {
            conversation_id: ConversationId::new("abc"),
        });
        assert_eq!(reducer.conversation_id(), Some(&ConversationId::new("abc")));

        reducer.begin_turn();
        assert_eq!(reducer.conversation_id(), Some(&ConversationId::new("abc")));
    }

    #[test]
    fn test_previews_staged_and_dismissed() {
        let mut reducer = started();
        let proposal: TransactionProposal = serde_json::from_value(json!({
            "amount": 9.5,
            "type": "expense",
            "description": "Taxi",
            "date": "2024-02-10",
            "category_id": 7
        }))
        .unwrap();
        reducer.apply(DomainEvent::TransactionPreviews {
            transactions: vec![proposal.clone()],
            count: 1,
        });
        assert_eq!(reducer.snapshot().pending_transactions, vec![proposal]);
        assert_eq!(reducer.transcript().len(), 1);

        reducer.dismiss_previews();
        assert!(reducer.snapshot().pending_transactions.is_empty());
    }

    #[test]
    fn test_clear_and_hydrate() {
        let mut reducer = started();
        reducer.apply(chunk("hello", true));
        reducer.clear();
        assert_eq!(reducer.snapshot(), ChatSnapshot::default());

        reducer.hydrate(
            vec![ConversationTurn::user("old"), ConversationTurn::assistant("reply", vec![])],
            ConversationId::new("5"),
        );
        let snapshot = reducer.snapshot();
        assert_eq!(snapshot.transcript.len(), 2);
        assert_eq!(snapshot.conversation_id, Some(ConversationId::new("5")));
        assert_eq!(snapshot.phase, ChatPhase::Idle);
    }

    #[test]
    fn test_abandon_freezes_buffer() {
        let mut reducer = started();
        reducer.apply(chunk("cut o", false));
        reducer.abandon();

        let snapshot = reducer.snapshot();
        assert_eq!(snapshot.in_progress, "cut o");
        assert!(!snapshot.busy);
        assert_eq!(snapshot.transcript.len(), 1);
    }

    #[test]
    fn test_latch_fires_once() {
        let mut latch = FinalizeLatch::default();
        assert!(latch.fire());
        assert!(!latch.fire());
        latch.rearm();
        assert!(latch.fire());
    }
}
