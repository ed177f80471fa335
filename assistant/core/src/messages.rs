//! Assistant Data Model
//!
//! The values that flow out of the streaming pipeline and into whatever
//! renders them: committed conversation turns, tool invocation records and
//! the transaction proposals produced by the agent.
//!
//! # Design Philosophy
//!
//! Everything here is plain data. Nothing in this module knows about the
//! wire format or the session lifecycle; the reducers own the rules for how
//! these values change.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Durable identifier the backend assigns to a conversation
///
/// The backend stores conversations under integer keys but the streaming
/// protocol echoes them back as strings, so both forms are accepted.
/// Numeric identifiers are written back as JSON numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Create an identifier from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for ConversationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.parse::<i64>() {
            Ok(n) => serializer.serialize_i64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

/// Identifier for one streaming session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Typed by the user
    User,
    /// Produced by the assistant
    Assistant,
}

/// One committed unit of conversation
///
/// Content is immutable once the turn has been committed to a transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who authored the turn
    pub role: TurnRole,
    /// Turn text
    pub content: String,
    /// When the turn was committed
    pub timestamp: DateTime<Utc>,
    /// Tools the assistant ran while producing this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
}

impl ConversationTurn {
    /// A user turn stamped with the current time
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            tool_invocations: Vec::new(),
        }
    }

    /// An assistant turn carrying a snapshot of the tools it used
    pub fn assistant(content: impl Into<String>, tool_invocations: Vec<ToolInvocation>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            tool_invocations,
        }
    }
}

/// Lifecycle of a tool invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Started, no result yet
    Running,
    /// Finished successfully
    Success,
    /// Finished with an error
    Error,
}

/// Client-side record of one tool's execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name; the key within a turn
    pub tool_name: String,
    /// Arguments the agent passed
    #[serde(default)]
    pub input: Value,
    /// Result, once finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Current status
    pub status: ToolStatus,
    /// Error text for failed invocations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolInvocation {
    /// A freshly started invocation
    pub fn running(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
            output: None,
            status: ToolStatus::Running,
            error: None,
        }
    }

    /// Record the outcome of the invocation
    pub fn finish(&mut self, output: Value, success: bool, error: Option<String>) {
        self.output = Some(output);
        self.status = if success {
            ToolStatus::Success
        } else {
            ToolStatus::Error
        };
        self.error = error;
    }

    /// Whether the tool is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ToolStatus::Running
    }
}

/// Direction of money movement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money in
    Income,
    /// Money out
    Expense,
}

/// A candidate transaction proposed by the agent
///
/// Never mutated by the client; only materialised through the
/// transactions resource after the user confirms it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionProposal {
    /// Unsigned amount; the sign comes from `kind`
    #[serde(deserialize_with = "amount_from_json")]
    pub amount: f64,
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Booking date
    pub date: NaiveDate,
    /// Category reference
    pub category_id: i64,
    /// Tag references
    #[serde(default)]
    pub tags: Vec<i64>,
}

impl TransactionProposal {
    /// Amount signed by direction: expenses are negative
    #[must_use]
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionType::Income => self.amount.abs(),
            TransactionType::Expense => -self.amount.abs(),
        }
    }
}

/// Decimal amounts arrive either as JSON numbers or as decimal strings
pub(crate) fn amount_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid amount {s:?}: {e}"))),
        other => Err(serde::de::Error::custom(format!(
            "amount must be a number or decimal string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_id_accepts_numbers_and_strings() {
        let from_text: ConversationId = serde_json::from_value(json!("abc")).unwrap();
        let from_number: ConversationId = serde_json::from_value(json!(42)).unwrap();

        assert_eq!(from_text.as_str(), "abc");
        assert_eq!(from_number, ConversationId::from(42));
        assert_eq!(serde_json::to_value(&from_number).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(&from_text).unwrap(), json!("abc"));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_proposal_amount_forms() {
        let proposal: TransactionProposal = serde_json::from_value(json!({
            "amount": "12.50",
            "type": "expense",
            "description": "Lunch",
            "date": "2024-03-01",
            "category_id": 3
        }))
        .unwrap();

        assert!((proposal.amount - 12.5).abs() < f64::EPSILON);
        assert!((proposal.signed_amount() + 12.5).abs() < f64::EPSILON);
        assert!(proposal.tags.is_empty());

        let income: TransactionProposal = serde_json::from_value(json!({
            "amount": 1000,
            "type": "income",
            "description": "Salary",
            "date": "2024-03-01",
            "category_id": 1,
            "tags": [4, 5]
        }))
        .unwrap();

        assert!((income.signed_amount() - 1000.0).abs() < f64::EPSILON);
        assert_eq!(income.tags, vec![4, 5]);
    }

    #[test]
    fn test_proposal_rejects_bad_amount() {
        let result: Result<TransactionProposal, _> = serde_json::from_value(json!({
            "amount": "twelve",
            "type": "expense",
            "date": "2024-03-01",
            "category_id": 3
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_invocation_finish() {
        let mut tool = ToolInvocation::running("lookup", json!({"q": 1}));
        assert!(tool.is_running());

        tool.finish(json!("nope"), false, Some("boom".to_string()));
        assert_eq!(tool.status, ToolStatus::Error);
        assert_eq!(tool.error.as_deref(), Some("boom"));
        assert_eq!(tool.output, Some(json!("nope")));
    }
}
