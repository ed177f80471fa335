//! Session pump
//!
//! Drives one session: opens the transport, feeds chunks through the frame
//! decoder and event parser, and hands each event to the owning controller.

use std::sync::Arc;

use futures::StreamExt;

use crate::events::{parse_record, DomainEvent};
use crate::session::{Session, SessionStatus};
use crate::transport::{EventTransport, FrameDecoder, Record, StreamRequest};

/// Result of handing one event to a controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Keep reading
    Continue,
    /// Terminal event applied; the stream finished normally
    Completed,
    /// Terminal event applied; the stream failed
    Failed,
    /// The session no longer owns the state; nothing was applied
    Refused,
}

/// Controller side of a pump
///
/// Implementations take their state lock, re-check that `session` is not
/// cancelled and still owns the state, and only then apply the event. The
/// same lock is what a session's cancel fence waits on.
pub(crate) trait EventSink: Send + Sync + 'static {
    /// Apply one event on behalf of `session`
    fn dispatch(&self, session: &Session, event: DomainEvent) -> Flow;

    /// The byte stream ended without a terminal event
    fn end_of_stream(&self, session: &Session);
}

/// Run `session` to completion
pub(crate) async fn pump<T, S>(transport: Arc<T>, request: StreamRequest, session: Session, sink: Arc<S>)
where
    T: EventTransport + ?Sized + 'static,
    S: EventSink,
{
    let token = session.token().clone();
    let session_id = session.id().clone();

    tracing::info!(
        session_id = %session_id,
        transport = transport.name(),
        endpoint = request.endpoint().path(),
        "Session started"
    );
    session.set_status(SessionStatus::Connecting);

    let opened = tokio::select! {
        biased;
        () = token.cancelled() => {
            tracing::debug!(session_id = %session_id, "Cancelled while connecting");
            return;
        }
        opened = transport.open(&request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Transport failed");
            fail(&session, sink.as_ref(), e.to_string());
            return;
        }
    };

    session.set_status(SessionStatus::Streaming);
    let mut decoder = FrameDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(session_id = %session_id, "Cancelled while streaming");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                if let Some(status) = deliver(&session, sink.as_ref(), decoder.push(&bytes)) {
                    finish(&session, status);
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Stream interrupted");
                fail(&session, sink.as_ref(), e.to_string());
                return;
            }
            None => break,
        }
    }

    session.set_status(SessionStatus::Finalizing);
    if let Some(status) = deliver(&session, sink.as_ref(), decoder.finish()) {
        finish(&session, status);
        return;
    }

    if !token.is_cancelled() {
        sink.end_of_stream(&session);
    }
    finish(&session, SessionStatus::Completed);
}

/// Dispatch decoded records; returns a terminal status once one is reached
fn deliver<S, I>(session: &Session, sink: &S, records: I) -> Option<SessionStatus>
where
    S: EventSink + ?Sized,
    I: IntoIterator<Item = Record>,
{
    for record in records {
        if session.is_cancelled() {
            return Some(SessionStatus::Cancelled);
        }
        let Some(event) = parse_record(&record) else {
            continue;
        };
        tracing::trace!(session_id = %session.id(), event = event.kind(), "Dispatching event");
        match sink.dispatch(session, event) {
            Flow::Continue => {}
            Flow::Completed => return Some(SessionStatus::Completed),
            Flow::Failed => return Some(SessionStatus::Errored),
            Flow::Refused => return Some(SessionStatus::Cancelled),
        }
    }
    None
}

/// Surface a transport failure as a single non-recoverable error
fn fail<S: EventSink + ?Sized>(session: &Session, sink: &S, message: String) {
    sink.dispatch(session, DomainEvent::transport_failure(message));
    finish(session, SessionStatus::Errored);
}

fn finish(session: &Session, status: SessionStatus) {
    if session.set_status(status) {
        tracing::info!(session_id = %session.id(), %status, "Session finished");
    }
}
