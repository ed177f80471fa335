//! Finance API Resources
//!
//! Typed handles over the REST resources the assistant flows depend on:
//! - `/transaction/` - materialise confirmed proposals
//! - `/category/` and `/tag/` - resolve the integer references in proposals
//! - `/assistant/conversations` - stored chat history

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::client::{ApiClient, ApiError};
use crate::messages::{
    amount_from_json, ConversationId, ConversationTurn, TransactionProposal, TransactionType, TurnRole,
};

// ============================================
// Wire Types
// ============================================

/// Transaction category
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Icon name
    #[serde(default)]
    pub icon: Option<String>,
    /// Hex color
    #[serde(default)]
    pub color: Option<String>,
}

/// Transaction tag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag ID
    pub id: i64,
    /// Display name
    pub name: String,
    /// Hex color
    #[serde(default)]
    pub color: Option<String>,
}

/// Body of a transaction create request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewTransaction {
    /// Owning account
    pub account_id: i64,
    /// Category reference
    pub category_id: i64,
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Positive amount
    pub amount: f64,
    /// Description
    pub description: String,
    /// Booking date
    pub date: NaiveDate,
    /// Creating user
    pub user_id: i64,
    /// Tag references
    pub tags: Vec<i64>,
}

impl NewTransaction {
    /// Build a create request from a confirmed proposal
    #[must_use]
    pub fn from_proposal(proposal: &TransactionProposal, account_id: i64, user_id: i64) -> Self {
        Self {
            account_id,
            category_id: proposal.category_id,
            kind: proposal.kind,
            amount: proposal.amount.abs(),
            description: proposal.description.clone(),
            date: proposal.date,
            user_id,
            tags: proposal.tags.clone(),
        }
    }
}

/// A stored transaction
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Category reference
    pub category_id: i64,
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Positive amount
    #[serde(deserialize_with = "amount_from_json")]
    pub amount: f64,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Booking date
    pub date: NaiveDate,
    /// Attached tags
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Conversation summary
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StoredConversation {
    /// Conversation ID
    pub id: i64,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Creation time
    #[serde(deserialize_with = "timestamp_from_json")]
    pub created_at: DateTime<Utc>,
    /// Last activity
    #[serde(deserialize_with = "timestamp_from_json")]
    pub updated_at: DateTime<Utc>,
}

/// Listing of conversations
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConversationList {
    /// Conversations, most recent first
    pub conversations: Vec<StoredConversation>,
    /// Total number stored
    #[serde(default)]
    pub total: usize,
}

/// One stored message
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StoredMessage {
    /// Author role: `user`, `assistant` or `system`
    pub role: String,
    /// Message text
    pub content: String,
    /// Summary of tools the assistant used
    #[serde(default)]
    pub tool_calls_summary: Option<String>,
    /// When the message was stored
    #[serde(deserialize_with = "timestamp_from_json")]
    pub created_at: DateTime<Utc>,
}

/// A conversation with its messages
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConversationWithMessages {
    /// Conversation ID
    pub id: i64,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Messages, oldest first
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl ConversationWithMessages {
    /// Committed turns for hydrating a transcript
    ///
    /// System messages and unknown roles are skipped.
    #[must_use]
    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.messages
            .into_iter()
            .filter_map(|message| {
                let role = match message.role.as_str() {
                    "user" => TurnRole::User,
                    "assistant" => TurnRole::Assistant,
                    other => {
                        tracing::debug!(role = other, "Skipping stored message");
                        return None;
                    }
                };
                Some(ConversationTurn {
                    role,
                    content: message.content,
                    timestamp: message.created_at,
                    tool_invocations: Vec::new(),
                })
            })
            .collect()
    }
}

/// Timestamps arrive as RFC 3339 or as naive ISO datetimes in UTC
fn timestamp_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

// ============================================
// Resource Handles
// ============================================

/// `/transaction/`
#[derive(Clone, Debug)]
pub struct TransactionsApi {
    client: ApiClient,
    user_id: i64,
}

impl TransactionsApi {
    pub(crate) fn new(client: ApiClient, user_id: i64) -> Self {
        Self { client, user_id }
    }

    /// Create one transaction from a proposal
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn create(
        &self,
        account_id: i64,
        proposal: &TransactionProposal,
    ) -> Result<Transaction, ApiError> {
        let body = NewTransaction::from_proposal(proposal, account_id, self.user_id);
        self.client.post_json("/transaction/", &body).await
    }

    /// Create proposals in order, stopping at the first failure
    ///
    /// # Errors
    ///
    /// Returns the first API error.
    pub async fn create_all(
        &self,
        account_id: i64,
        proposals: &[TransactionProposal],
    ) -> Result<Vec<Transaction>, ApiError> {
        let mut created = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            created.push(self.create(account_id, proposal).await?);
        }
        Ok(created)
    }
}

/// `/category/`
#[derive(Clone, Debug)]
pub struct CategoriesApi {
    client: ApiClient,
}

impl CategoriesApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// All categories of the current user
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn list(&self) -> Result<Vec<Category>, ApiError> {
        self.client.get_json("/category/").await
    }
}

/// `/tag/`
#[derive(Clone, Debug)]
pub struct TagsApi {
    client: ApiClient,
}

impl TagsApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// All tags of the current user
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn list(&self) -> Result<Vec<Tag>, ApiError> {
        self.client.get_json("/tag/").await
    }
}

/// `/assistant/conversations`
#[derive(Clone, Debug)]
pub struct ConversationsApi {
    client: ApiClient,
}

impl ConversationsApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Stored conversations, most recent first
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn list(&self) -> Result<ConversationList, ApiError> {
        self.client.get_json("/assistant/conversations").await
    }

    /// One conversation with its messages
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn get(&self, id: &ConversationId) -> Result<ConversationWithMessages, ApiError> {
        self.client
            .get_json(&format!("/assistant/conversations/{id}"))
            .await
    }

    /// Delete a conversation
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn delete(&self, id: &ConversationId) -> Result<(), ApiError> {
        self.client
            .delete(&format!("/assistant/conversations/{id}"))
            .await
    }
}

// ============================================
// Reference Resolution
// ============================================

/// Category and tag names for displaying proposals
#[derive(Clone, Debug, Default)]
pub struct ReferenceBook {
    categories: HashMap<i64, Category>,
    tags: HashMap<i64, Tag>,
}

impl ReferenceBook {
    /// Build from already fetched lists
    #[must_use]
    pub fn new(categories: Vec<Category>, tags: Vec<Tag>) -> Self {
        Self {
            categories: categories.into_iter().map(|c| (c.id, c)).collect(),
            tags: tags.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Fetch categories and tags concurrently
    ///
    /// # Errors
    ///
    /// Returns the first API error.
    pub async fn load(client: &ApiClient) -> Result<Self, ApiError> {
        let categories = client.categories();
        let tags = client.tags();
        let (categories, tags) = futures::try_join!(categories.list(), tags.list())?;
        Ok(Self::new(categories, tags))
    }

    /// Category for `id`
    #[must_use]
    pub fn category(&self, id: i64) -> Option<&Category> {
        self.categories.get(&id)
    }

    /// Category name, or `#id` when unknown
    #[must_use]
    pub fn category_label(&self, id: i64) -> String {
        self.category(id)
            .map_or_else(|| format!("#{id}"), |c| c.name.clone())
    }

    /// Tag names in the given order, `#id` for unknown tags
    #[must_use]
    pub fn tag_labels(&self, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.tags
                    .get(id)
                    .map_or_else(|| format!("#{id}"), |t| t.name.clone())
            })
            .collect()
    }
}
