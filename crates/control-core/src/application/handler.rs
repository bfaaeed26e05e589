//! The handler contract between the line server and the embedding application.
//!
//! Every accepted connection produces exactly this sequence of calls:
//!
//! ```text
//! connection_made(id)                 once
//! request_received(id, request) *     zero or more, strictly one at a time
//! connection_lost(id)                 once, on every exit path
//! ```
//!
//! `connection_lost` is the place to release per-connection resources (for
//! example tearing down a camera session), because it runs no matter how the
//! connection ended.

use thiserror::Error;

use crate::domain::identity::ConnectionId;

/// The verdict returned by [`ConnectionHandler::connection_made`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Proceed to the request loop without sending anything.
    Accept,
    /// Send this text (newline-terminated) and then process requests.
    Greet(String),
    /// Send this text, then close the connection without reading requests.
    Reject(String),
}

impl Admission {
    /// Maps a greeting string to an admission: empty means [`Admission::Accept`].
    pub fn greeting(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Admission::Accept
        } else {
            Admission::Greet(text)
        }
    }
}

/// Failure raised by [`ConnectionHandler::request_received`].
///
/// Any handler error terminates the connection; it is never turned into a
/// response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler refused the request (unknown command, bad payload, ...).
    #[error("{0}")]
    Rejected(String),

    /// A handler callback panicked; the message is the panic payload.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Any other error bubbled up from the handler with `?`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Builds a `Panicked` error from a payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        HandlerError::Panicked(panic_message(payload.as_ref()))
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Callbacks through which the server reports connection events and obtains
/// responses.
///
/// Calls for one connection never overlap.  Calls for different connections
/// may run concurrently on different threads, so shared state inside an
/// implementation needs its own synchronisation.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called once when a connection is accepted, before any request is read.
    fn connection_made(&self, id: &ConnectionId) -> Admission;

    /// Called exactly once when the connection ends, whatever the reason.
    ///
    /// A panic in here is caught and logged by the server.
    fn connection_lost(&self, id: &ConnectionId);

    /// Called once per framed request; the returned string is the response.
    ///
    /// Return `Ok(String::new())` to send nothing.
    ///
    /// # Errors
    ///
    /// Returning an error closes the connection without a response.
    fn request_received(&self, id: &ConnectionId, request: &str) -> Result<String, HandlerError>;
}

/// Lets a shared handler be used wherever a handler is expected, for example
/// inside [`ClientLimit`](crate::ClientLimit) while the application keeps a
/// reference to it.
impl<H: ConnectionHandler + ?Sized> ConnectionHandler for std::sync::Arc<H> {
    fn connection_made(&self, id: &ConnectionId) -> Admission {
        (**self).connection_made(id)
    }

    fn connection_lost(&self, id: &ConnectionId) {
        (**self).connection_lost(id)
    }

    fn request_received(&self, id: &ConnectionId, request: &str) -> Result<String, HandlerError> {
        (**self).request_received(id, request)
    }
}

type OnConnect = dyn Fn(&ConnectionId) -> Admission + Send + Sync;
type OnDisconnect = dyn Fn(&ConnectionId) + Send + Sync;
type OnRequest = dyn Fn(&ConnectionId, &str) -> Result<String, HandlerError> + Send + Sync;

/// Adapts three closures to [`ConnectionHandler`].
///
/// # Example
///
/// ```rust
/// use control_core::{Admission, CallbackHandler, ConnectionHandler, ConnectionId};
///
/// let handler = CallbackHandler::new(
///     |_id| Admission::Accept,
///     |_id| {},
///     |_id, request| Ok(if request == "ping" { "pong".into() } else { String::new() }),
/// );
/// let id = ConnectionId::new("127.0.0.1:40000".parse().unwrap());
/// assert_eq!(handler.request_received(&id, "ping").unwrap(), "pong");
/// ```
pub struct CallbackHandler {
    on_connect: Box<OnConnect>,
    on_disconnect: Box<OnDisconnect>,
    on_request: Box<OnRequest>,
}

impl CallbackHandler {
    /// Creates a handler from the connect, disconnect and request callbacks.
    pub fn new<C, D, R>(on_connect: C, on_disconnect: D, on_request: R) -> Self
    where
        C: Fn(&ConnectionId) -> Admission + Send + Sync + 'static,
        D: Fn(&ConnectionId) + Send + Sync + 'static,
        R: Fn(&ConnectionId, &str) -> Result<String, HandlerError> + Send + Sync + 'static,
    {
        Self {
            on_connect: Box::new(on_connect),
            on_disconnect: Box::new(on_disconnect),
            on_request: Box::new(on_request),
        }
    }
}

impl ConnectionHandler for CallbackHandler {
    fn connection_made(&self, id: &ConnectionId) -> Admission {
        (self.on_connect)(id)
    }

    fn connection_lost(&self, id: &ConnectionId) {
        (self.on_disconnect)(id)
    }

    fn request_received(&self, id: &ConnectionId, request: &str) -> Result<String, HandlerError> {
        (self.on_request)(id, request)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
