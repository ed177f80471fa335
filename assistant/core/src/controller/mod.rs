//! Session Controllers
//!
//! A controller owns one conversation slot: the reducer state, the session
//! slot and the snapshot channel readers subscribe to. Starting a request
//! supersedes the previous one, then spawns a pump that feeds decoded events
//! back into the controller.
//!
//! ```text
//!  send_message / parse
//!        │
//!        ▼
//!  SessionSlot::supersede ──▶ pump task ──▶ FrameDecoder ──▶ parse_record
//!                                                              │
//!                              watch::Sender<Snapshot> ◀── reducer (under lock)
//! ```
//!
//! # Locking
//!
//! Reducer state sits behind one mutex per controller. A session's cancel
//! fence takes that same mutex, so session and reveal cancellation must
//! never run while it is held.

mod chat;
mod parse;
mod pump;

pub use chat::ChatController;
pub use parse::ParseController;
