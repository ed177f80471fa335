//! Assistant Core - Streaming Assistant Client for Mai
//!
//! This crate drives the two streaming flows of the Mai personal-finance
//! assistant: a multi-turn chat whose replies stream token by token, and a
//! parse flow that turns free text into transaction proposals revealed one
//! at a time. It has no UI dependencies; a terminal driver, a desktop shell
//! or a test harness all read the same snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Readers (UI, CLI)                         │
//! │        watch::Receiver<ChatSnapshot> / <ParseSnapshot>           │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                          ASSISTANT CORE                          │
//! │  ┌────────────────┐   ┌───────┴────────┐   ┌──────────────────┐  │
//! │  │ ChatController │   │ ParseController│──▶│ RevealScheduler  │  │
//! │  └───────┬────────┘   └───────┬────────┘   └──────────────────┘  │
//! │          │  Session / SessionSlot (cancel, supersede)            │
//! │  ┌───────┴────────────────────┴────────┐   ┌──────────────────┐  │
//! │  │ pump: FrameDecoder ─▶ parse_record  │   │ ApiClient (REST) │  │
//! │  └───────────────────┬─────────────────┘   └──────────────────┘  │
//! │                      │ EventTransport                            │
//! └──────────────────────┼───────────────────────────────────────────┘
//!                        ▼
//!           HttpTransport  |  ReplayTransport
//! ```
//!
//! # Key Types
//!
//! - [`ChatController`]: one chat conversation, one reply in flight at most
//! - [`ParseController`]: one parse request and its staged reveal
//! - [`Session`]: handle to a single streamed request, cancellable
//! - [`DomainEvent`]: one decoded event from the stream
//! - [`FrameDecoder`]: incremental server-sent-events record splitter
//! - [`ConversationReducer`]: folds chat events into transcript state
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use assistant_core::{load_config, ChatController, Credentials, HttpTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let credentials = Credentials::new(config.api_token.clone());
//!     let transport = Arc::new(HttpTransport::from_config(&config, credentials)?);
//!
//!     let chat = ChatController::new(transport, config.account_id);
//!     let mut snapshots = chat.subscribe();
//!     if let Some(session) = chat.send_message("How much did I spend on food?") {
//!         while snapshots.changed().await.is_ok() {
//!             let snapshot = snapshots.borrow_and_update().clone();
//!             // render snapshot.in_progress, snapshot.tools ...
//!             if !snapshot.busy {
//!                 break;
//!             }
//!         }
//!         session.wait().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: byte sources and record framing
//! - [`events`]: record payloads to typed events
//! - [`session`]: request lifecycle and cancellation
//! - [`conversation`]: chat reducer, tool table and finalize latch
//! - [`reveal`]: parse reducer and staged reveal
//! - [`controller`]: the two controllers tying the above together
//! - [`api`]: REST resources used around the streams
//! - [`config`]: TOML and environment configuration
//! - [`messages`]: shared value types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod events;
pub mod messages;
pub mod reveal;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use controller::{ChatController, ParseController};
pub use conversation::{
    ChatError, ChatPhase, ChatSnapshot, ConversationReducer, FinalizeLatch, ReduceOutcome,
    ToolTable,
};
pub use events::{parse_record, DomainEvent};
pub use messages::{
    ConversationId, ConversationTurn, SessionId, ToolInvocation, ToolStatus, TransactionProposal,
    TransactionType, TurnRole,
};
pub use session::{Session, SessionSlot, SessionStatus};

// Reveal exports
pub use reveal::{
    ParseReducer, ParseSnapshot, ParseStep, RevealBoard, RevealHandle, RevealScheduler,
    RevealTarget, RevealTiming,
};

// Transport exports
pub use transport::{
    Credentials, EventTransport, FrameDecoder, HttpTransport, Record, ReplayTransport,
    StreamRequest, TransportError,
};

// API exports
pub use api::{ApiClient, ApiError, ReferenceBook};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, AssistantConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
