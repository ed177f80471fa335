//! REST collaborators of the assistant flows
//!
//! Confirmed proposals become transactions, proposal references are
//! resolved to names for display, and stored conversations hydrate a chat
//! when it is resumed.

pub mod client;
pub mod resources;

pub use client::{ApiClient, ApiError};
pub use resources::{
    CategoriesApi, Category, ConversationList, ConversationWithMessages, ConversationsApi,
    NewTransaction, ReferenceBook, StoredConversation, StoredMessage, Tag, TagsApi, Transaction,
    TransactionsApi,
};
