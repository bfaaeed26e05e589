//! Session: the full lifecycle of one accepted connection.
//!
//! ```text
//! connection_made ──► greeting / rejection
//!                        │
//!         ┌──────────────┴───────────────┐
//!         │  select! (first one wins)    │
//!         │   • request loop             │
//!         │   • watchdog (idle timeout)  │
//!         │   • server shutdown          │
//!         └──────────────┬───────────────┘
//!                        ▼
//!              connection_lost (drop guard)
//! ```
//!
//! The branch that finishes first decides the [`SessionEnd`].  The losing
//! branches are dropped, which cancels any read or write still pending in the
//! request loop, so a timeout is reported as `TimedOut` and never surfaces as
//! an I/O error.
//!
//! `connection_lost` is called from a `Drop` guard created before
//! `connection_made`.  It runs on every exit path: early returns, errors,
//! handler panics, and the session future being dropped by the runtime.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::application::handler::{panic_message, Admission, ConnectionHandler, HandlerError};
use crate::domain::framer::{encode_response, LineFramer};
use crate::domain::identity::ConnectionId;
use crate::infrastructure::watchdog::{watchdog, Deadline};

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 4096;

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed its side of the connection.
    PeerClosed,
    /// No request arrived within the idle timeout.
    TimedOut,
    /// The server was shut down while the session was active.
    Shutdown,
    /// `connection_made` returned [`Admission::Reject`].
    Rejected,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionEnd::PeerClosed => "closed by peer",
            SessionEnd::TimedOut => "idle timeout",
            SessionEnd::Shutdown => "server shutdown",
            SessionEnd::Rejected => "rejected",
        };
        f.write_str(text)
    }
}

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket-level failure (reset, broken pipe, ...).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A handler callback failed or panicked.
    #[error("handler failed on connection {id}: {source}")]
    Handler {
        id: ConnectionId,
        #[source]
        source: HandlerError,
    },
}

/// One connection plus everything needed to serve it.
pub struct Session<S> {
    stream: S,
    id: ConnectionId,
    handler: Arc<dyn ConnectionHandler>,
    idle_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        id: ConnectionId,
        handler: Arc<dyn ConnectionHandler>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            id,
            handler,
            idle_timeout,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Serves the connection until the peer leaves, the idle timeout expires,
    /// `shutdown` completes, or an error occurs.
    ///
    /// `connection_lost` has been called exactly once by the time this returns
    /// (or the returned future is dropped).
    ///
    /// # Errors
    ///
    /// - [`SessionError::Transport`] if a read or write fails.
    /// - [`SessionError::Handler`] if a handler callback returns an error or panics.
    pub async fn run<F>(self, shutdown: F) -> Result<SessionEnd, SessionError>
    where
        F: Future<Output = ()>,
    {
        let Session {
            mut stream,
            id,
            handler,
            idle_timeout,
        } = self;

        let _lost = ConnectionLostGuard {
            handler: Arc::clone(&handler),
            id: id.clone(),
        };

        debug!("connection {id}: session {} started", id.session());

        let admission = catch_unwind(AssertUnwindSafe(|| handler.connection_made(&id)))
            .map_err(|payload| SessionError::Handler {
                id: id.clone(),
                source: HandlerError::from_panic(payload),
            })?;

        match admission {
            Admission::Accept => {}
            Admission::Greet(greeting) => {
                if !write_bounded(&mut stream, greeting, idle_timeout).await? {
                    info!("connection {id}: timed out while sending greeting");
                    return Ok(SessionEnd::TimedOut);
                }
            }
            Admission::Reject(message) => {
                if write_bounded(&mut stream, message, idle_timeout).await? {
                    // Best effort: the peer may already be gone.
                    let _ = stream.shutdown().await;
                }
                return Ok(SessionEnd::Rejected);
            }
        }

        let deadline = Deadline::after(idle_timeout);

        tokio::select! {
            result = request_loop(&mut stream, &id, handler.as_ref(), &deadline, idle_timeout) => result,
            () = watchdog(&deadline) => {
                info!("connection {id}: no request within {idle_timeout:?}; closing");
                Ok(SessionEnd::TimedOut)
            }
            () = shutdown => {
                debug!("connection {id}: server shutting down");
                Ok(SessionEnd::Shutdown)
            }
        }
    }
}

/// Reads requests, dispatches them, and writes responses, one at a time.
///
/// Extends `deadline` each time it starts waiting for a new request; partial
/// lines do not count as activity.
async fn request_loop<S>(
    stream: &mut S,
    id: &ConnectionId,
    handler: &dyn ConnectionHandler,
    deadline: &Deadline,
    idle_timeout: Duration,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        deadline.extend(idle_timeout);

        let request = loop {
            if let Some(request) = framer.next_request() {
                break request;
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                if !framer.is_empty() {
                    debug!(
                        "connection {id}: discarding {} unterminated byte(s) at EOF",
                        framer.pending_len()
                    );
                }
                return Ok(SessionEnd::PeerClosed);
            }
            framer.push(&chunk[..n]);
        };

        debug!("connection {id}: request {request:?}");

        let response = catch_unwind(AssertUnwindSafe(|| handler.request_received(id, &request)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))
            .map_err(|source| SessionError::Handler {
                id: id.clone(),
                source,
            })?;

        if let Some(bytes) = encode_response(response) {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
        }
    }
}

/// Writes a greeting or rejection, giving up after `limit`.
///
/// Returns `Ok(false)` if the write did not finish in time.  An empty `text`
/// writes nothing.
async fn write_bounded<S>(stream: &mut S, text: String, limit: Duration) -> Result<bool, SessionError>
where
    S: AsyncWrite + Unpin,
{
    let Some(bytes) = encode_response(text) else {
        return Ok(true);
    };
    let write = async {
        stream.write_all(&bytes).await?;
        stream.flush().await
    };
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result.map(|()| true).map_err(SessionError::from),
        Err(_elapsed) => Ok(false),
    }
}

/// Calls `connection_lost` when dropped.
struct ConnectionLostGuard {
    handler: Arc<dyn ConnectionHandler>,
    id: ConnectionId,
}

impl Drop for ConnectionLostGuard {
    fn drop(&mut self) {
        let (handler, id) = (&self.handler, &self.id);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.connection_lost(id))) {
            error!(
                "connection {id}: connection-lost callback panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        debug!("connection {id}: released");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
