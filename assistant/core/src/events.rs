//! Domain Events
//!
//! Typed events decoded from the assistant stream. Every record carries one
//! JSON object whose `type` field selects the variant.
//!
//! # Design Philosophy
//!
//! The parser is forgiving at the record level and strict at the type level:
//! a record that cannot be decoded is logged and skipped, but anything that
//! makes it through is a fully typed [`DomainEvent`] and the reducers can
//! match on it exhaustively.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::messages::{ConversationId, TransactionProposal};
use crate::transport::frame::Record;

/// Discriminators this client understands
const KNOWN_TYPES: &[&str] = &[
    "thinking",
    "tool_start",
    "tool_end",
    "message_chunk",
    "transaction_previews",
    "planning",
    "transaction",
    "conversation_id",
    "done",
    "error",
];

/// Longest payload excerpt written to the log for a rejected record
const LOG_EXCERPT_LEN: usize = 200;

/// Events from the assistant backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ============================================
    // Chat Events
    // ============================================
    /// The agent is working; no content yet
    Thinking {
        /// Optional status line
        #[serde(default)]
        message: Option<String>,
    },

    /// A tool invocation started
    ToolStart {
        /// Tool name
        tool_name: String,
        /// Arguments passed to the tool
        #[serde(default)]
        tool_input: Value,
    },

    /// A tool invocation finished
    ToolEnd {
        /// Tool name
        tool_name: String,
        /// Tool result
        #[serde(default)]
        tool_output: Value,
        /// Whether the tool succeeded
        success: bool,
        /// Error text for failures
        #[serde(default)]
        error: Option<String>,
    },

    /// A piece of the assistant's reply
    MessageChunk {
        /// Text to append; non-string content arrives as its JSON rendering
        #[serde(default, deserialize_with = "content_as_text")]
        content: String,
        /// Whether this chunk closes the reply
        #[serde(default)]
        is_final: bool,
    },

    /// Proposed transactions, all at once
    TransactionPreviews {
        /// The proposals
        #[serde(default, alias = "items")]
        transactions: Vec<TransactionProposal>,
        /// Count as reported by the backend
        #[serde(default)]
        count: usize,
    },

    /// The backend durable conversation ID
    ConversationId {
        /// Conversation identifier
        #[serde(alias = "id")]
        conversation_id: ConversationId,
    },

    // ============================================
    // Parse Events
    // ============================================
    /// How many transactions to expect
    Planning {
        /// Expected count
        #[serde(default)]
        count: usize,
    },

    /// One proposed transaction
    Transaction {
        /// The proposal
        #[serde(alias = "data")]
        item: TransactionProposal,
    },

    // ============================================
    // Terminal Events
    // ============================================
    /// The stream is complete
    Done {
        /// Conversation the exchange was stored under
        #[serde(default)]
        conversation_id: Option<ConversationId>,
    },

    /// The backend reported a failure
    Error {
        /// Human-readable message
        #[serde(default = "default_error_message")]
        message: String,
        /// Whether the user may retry
        #[serde(default = "default_recoverable")]
        recoverable: bool,
    },
}

fn default_recoverable() -> bool {
    true
}

fn default_error_message() -> String {
    "The assistant reported an error".to_string()
}

/// String content passes through, `null` is empty, anything else is JSON text
fn content_as_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl DomainEvent {
    /// Wire discriminator of this event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::MessageChunk { .. } => "message_chunk",
            Self::TransactionPreviews { .. } => "transaction_previews",
            Self::ConversationId { .. } => "conversation_id",
            Self::Planning { .. } => "planning",
            Self::Transaction { .. } => "transaction",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Synthetic error standing in for a transport failure
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            recoverable: false,
        }
    }
}

/// Decode one record into an event
///
/// Records without a payload, with invalid JSON, with an unknown `type` or
/// with a payload that does not fit the variant are logged and yield `None`.
/// None of these are errors for the caller: one bad record never ends the
/// stream.
#[must_use]
pub fn parse_record(record: &Record) -> Option<DomainEvent> {
    let Some(payload) = record.data() else {
        tracing::trace!(raw = %excerpt(record.raw()), "Record without data line");
        return None;
    };

    let value: Value = match serde_json::from_str(&payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, payload = %excerpt(&payload), "Skipping malformed record");
            return None;
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        tracing::warn!(payload = %excerpt(&payload), "Skipping record without event type");
        return None;
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        tracing::debug!(event_type = %kind, "Skipping unknown event type");
        return None;
    }

    match serde_json::from_value::<DomainEvent>(value) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(
                event_type = %kind,
                error = %e,
                payload = %excerpt(&payload),
                "Skipping record with invalid payload"
            );
            None
        }
    }
}

fn excerpt(text: &str) -> &str {
    if text.len() <= LOG_EXCERPT_LEN {
        return text;
    }
    let mut end = LOG_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(payload: &str) -> Option<DomainEvent> {
        parse_record(&Record::new(format!("data: {payload}")))
    }

    #[test]
    fn test_parse_message_chunk() {
        let event = parse(r#"{"type":"message_chunk","content":"Hello","is_final":false}"#);
        assert_eq!(
            event,
            Some(DomainEvent::MessageChunk {
                content: "Hello".to_string(),
                is_final: false
            })
        );
    }

    #[test]
    fn test_non_string_content_is_rendered() {
        let event = parse(r#"{"type":"message_chunk","content":{"a":1},"is_final":true}"#);
        assert_eq!(
            event,
            Some(DomainEvent::MessageChunk {
                content: r#"{"a":1}"#.to_string(),
                is_final: true
            })
        );

        let event = parse(r#"{"type":"message_chunk","content":null}"#);
        assert_eq!(
            event,
            Some(DomainEvent::MessageChunk {
                content: String::new(),
                is_final: false
            })
        );
    }

    #[test]
    fn test_parse_tool_events() {
        let start = parse(r#"{"type":"tool_start","tool_name":"lookup","tool_input":{"q":"rent"}}"#);
        assert_eq!(
            start,
            Some(DomainEvent::ToolStart {
                tool_name: "lookup".to_string(),
                tool_input: json!({"q": "rent"})
            })
        );

        let end = parse(r#"{"type":"tool_end","tool_name":"lookup","success":false,"error":"timeout"}"#);
        assert_eq!(
            end,
            Some(DomainEvent::ToolEnd {
                tool_name: "lookup".to_string(),
                tool_output: Value::Null,
                success: false,
                error: Some("timeout".to_string())
            })
        );
    }

    #[test]
    fn test_error_defaults_to_recoverable() {
        let event = parse(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        assert_eq!(
            event,
            DomainEvent::Error {
                message: "rate limited".to_string(),
                recoverable: true
            }
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn test_wire_aliases() {
        let event = parse(r#"{"type":"conversation_id","id":17}"#);
        assert_eq!(
            event,
            Some(DomainEvent::ConversationId {
                conversation_id: ConversationId::from(17)
            })
        );

        let event = parse(
            r#"{"type":"transaction","data":{"amount":"4.20","type":"expense","description":"Coffee","date":"2024-05-02","category_id":2}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "transaction");
    }

    #[test]
    fn test_done_with_conversation_id() {
        let event = parse(r#"{"type":"done","conversation_id":"9"}"#);
        assert_eq!(
            event,
            Some(DomainEvent::Done {
                conversation_id: Some(ConversationId::new("9"))
            })
        );
        assert_eq!(parse(r#"{"type":"done"}"#), Some(DomainEvent::Done { conversation_id: None }));
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        assert_eq!(parse("{not json"), None);
        assert_eq!(parse(r#"{"content":"no type"}"#), None);
        assert_eq!(parse(r#"{"type":5,"content":"x"}"#), None);
        assert_eq!(parse(r#"{"type":"confirmation_needed"}"#), None);
        assert_eq!(parse(r#"{"type":"tool_end","tool_name":"x"}"#), None);
        assert_eq!(parse_record(&Record::new(": comment")), None);
    }

    #[test]
    fn test_transport_failure_is_not_recoverable() {
        let event = DomainEvent::transport_failure("connection refused");
        assert_eq!(
            event,
            DomainEvent::Error {
                message: "connection refused".to_string(),
                recoverable: false
            }
        );
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let long = "\u{e9}".repeat(LOG_EXCERPT_LEN);
        let cut = excerpt(&long);
        assert!(cut.len() <= LOG_EXCERPT_LEN);
        assert!(cut.chars().all(|c| c == '\u{e9}'));
    }
}
