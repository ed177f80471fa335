//! Transport Layer for the Assistant Stream
//!
//! Provides abstraction over where event bytes come from:
//! - `HttpTransport`: the assistant backend over chunked HTTP
//! - `ReplayTransport`: recorded responses (replays and tests)
//!
//! # Design Philosophy
//!
//! A transport only moves bytes. Record framing lives in [`frame`] and is
//! shared by every transport, so a replayed capture goes through exactly
//! the same decoding as a live response.
//!
//! # Security
//!
//! - Bearer tokens are attached per request from shared [`Credentials`]
//! - Error bodies are truncated before they are logged or surfaced

pub mod auth;
pub mod frame;
pub mod http;
pub mod replay;
pub mod traits;

// Re-exports for convenience
pub use auth::Credentials;
pub use frame::{FrameDecoder, Record, MAX_RECORD_SIZE};
pub use http::HttpTransport;
pub use replay::{ChunkSender, ReplayTransport};
pub use traits::{
    ByteStream, ChatRequest, EventTransport, ParseRequest, StreamEndpoint, StreamRequest,
    TransportError,
};
