//! Session Management
//!
//! A session is the lifecycle object for one in-flight streaming request.
//! It owns the cancellation token for that request and publishes its status.
//!
//! # Design Philosophy
//!
//! Cancellation is a capability, not a flag. Each session holds its own
//! [`CancellationToken`] that nothing else shares, so a superseding session
//! can never cancel a sibling by accident. The [`SessionSlot`] guarantees at
//! most one live session per conversation slot.
//!
//! `cancel()` also runs a fence supplied by the controller. The fence takes
//! and releases the lock that guards reducer state, so once `cancel()`
//! returns no event that was already being applied is still in progress,
//! and every later event sees the revoked token.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::messages::SessionId;

/// Session lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not started
    Idle,
    /// Opening the transport request
    Connecting,
    /// Receiving events
    Streaming,
    /// Stream ended, flushing the decoder remainder
    Finalizing,
    /// Finished normally
    Completed,
    /// Stopped by the user or superseded
    Cancelled,
    /// Stopped by a transport or backend error
    Errored,
}

impl SessionStatus {
    /// Whether the session can no longer change
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Barrier run after the token is revoked
pub(crate) type Fence = Arc<dyn Fn() + Send + Sync>;

struct SessionInner {
    id: SessionId,
    token: CancellationToken,
    status: watch::Sender<SessionStatus>,
    fence: Fence,
}

/// Handle to one streaming request
///
/// Cheap to clone; all clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(fence: Fence) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                token: CancellationToken::new(),
                status,
                fence,
            }),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Revoke the session
    ///
    /// Safe to call any number of times, from any thread, including from
    /// `Drop` implementations. A session that already reached a terminal
    /// status keeps it. When this returns, the session will not mutate
    /// shared state again.
    pub fn cancel(&self) {
        if !self.inner.token.is_cancelled() {
            tracing::debug!(session_id = %self.inner.id, "Cancelling session");
        }
        self.inner.token.cancel();
        self.inner.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = SessionStatus::Cancelled;
                true
            }
        });
        (self.inner.fence)();
    }

    /// Whether the token has been revoked
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Wait until the session reaches a terminal status
    pub async fn wait(&self) -> SessionStatus {
        let mut rx = self.inner.status.subscribe();
        let result = rx.wait_for(|status| status.is_terminal()).await;
        match result {
            Ok(status) => *status,
            // The sender lives as long as `self`, so this is unreachable
            Err(_) => SessionStatus::Cancelled,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Move to `next` unless the session already finished
    pub(crate) fn set_status(&self, next: SessionStatus) -> bool {
        self.inner.status.send_if_modified(|status| {
            if status.is_terminal() || *status == next {
                false
            } else {
                *status = next;
                true
            }
        })
    }
}

/// Holder of the single live session for one conversation slot
#[derive(Default)]
pub struct SessionSlot {
    active: Mutex<Option<Session>>,
}

impl fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSlot")
            .field("active", &*self.active.lock())
            .finish()
    }
}

impl SessionSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next`, cancelling whatever it replaces
    ///
    /// The predecessor is fully cancelled (fence included) before this
    /// returns, so `next` is the only session allowed to touch shared state.
    pub fn supersede(&self, next: Session) -> Option<Session> {
        let previous = self.active.lock().replace(next);
        if let Some(previous) = &previous {
            previous.cancel();
        }
        previous
    }

    /// The live session, if any
    #[must_use]
    pub fn active(&self) -> Option<Session> {
        self.active
            .lock()
            .as_ref()
            .filter(|session| !session.status().is_terminal())
            .cloned()
    }

    /// Cancel and forget the live session
    pub fn cancel(&self) -> Option<Session> {
        let taken = self.active.lock().take();
        if let Some(session) = &taken {
            session.cancel();
        }
        taken
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            session.cancel();
        }
    }
}
