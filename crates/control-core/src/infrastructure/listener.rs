//! TCP listener: bind, accept loop, and per-session task management.
//!
//! [`LineServer::bind`] creates the listening socket in reject mode: address
//! reuse is disabled, so a second server on the same address fails with
//! [`ServerError::Bind`] instead of sharing the port.
//!
//! The accept loop never blocks on a session.  It accepts a connection,
//! spawns its [`Session`] onto the runtime handle given to `bind`, and goes
//! back to accepting.  Session tasks are tracked in a `JoinSet` so that
//! [`ServerHandle::stop`] only returns after every live session has ended and
//! its `connection_lost` callback has run.  If the accept loop fails instead,
//! the sessions are detached and keep serving their clients.
//!
//! # Shutdown
//!
//! Shutdown is a `watch` channel owned by [`ServerHandle`].  The accept loop
//! and every session hold a receiver.  Dropping the handle without calling
//! [`ServerHandle::shutdown`] closes the channel without setting the flag,
//! which receivers treat as "never shut down": the server is detached and
//! keeps running for the lifetime of the runtime.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::application::handler::ConnectionHandler;
use crate::domain::config::{ConfigError, ServerConfig};
use crate::domain::identity::ConnectionId;
use crate::infrastructure::session::{Session, SessionEnd, SessionError};

/// Pending-connection queue length passed to `listen`.
const LISTEN_BACKLOG: u32 = 1024;

/// Pause before accepting again when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors from binding or running a [`LineServer`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The address is in use, not local, or needs privileges we lack.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listening socket failed in a way the accept loop cannot recover from.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The accept-loop task panicked or was cancelled.
    #[error("accept loop task failed: {0}")]
    Task(String),
}

/// A bound line server that has not started accepting yet.
pub struct LineServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    handler: Arc<dyn ConnectionHandler>,
    runtime: Handle,
}

impl LineServer {
    /// Validates `config` and binds its address.
    ///
    /// `runtime` is the execution context: the listener registers with its
    /// reactor and every session is spawned onto it.
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidConfig`] if `config` fails validation.
    /// - [`ServerError::Bind`] if the port is already bound (reuse is
    ///   disabled) or cannot be bound at all.
    pub fn bind(
        runtime: &Handle,
        config: ServerConfig,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_addr;
        // TcpSocket::listen registers with the reactor of the current runtime.
        let _enter = runtime.enter();
        let listener = bind_exclusive(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(
            "line server listening on {local_addr} (idle timeout {:?})",
            config.idle_timeout
        );

        Ok(Self {
            listener,
            local_addr,
            config,
            handler,
            runtime: runtime.clone(),
        })
    }

    /// The bound address; reports the real port when bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept loop onto the runtime and returns its handle.
    pub fn start(self) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let local_addr = self.local_addr;
        let runtime = self.runtime.clone();
        let task = runtime.spawn(self.accept_loop(shutdown_rx));
        ServerHandle {
            local_addr,
            shutdown_tx,
            task,
        }
    }

    /// Runs the accept loop in the calling task until an unrecoverable
    /// accept error.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if the listening socket fails.
    pub async fn run(self) -> Result<(), ServerError> {
        // Keep the sender alive for the whole loop so the flag is never set.
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.accept_loop(shutdown_rx).await
    }

    async fn accept_loop(self, shutdown_rx: watch::Receiver<bool>) -> Result<(), ServerError> {
        let LineServer {
            listener,
            local_addr,
            config,
            handler,
            runtime,
        } = self;

        let mut sessions = JoinSet::new();
        let stop = shutdown_requested(shutdown_rx.clone());
        tokio::pin!(stop);

        let result = loop {
            tokio::select! {
                () = &mut stop => {
                    info!("line server on {local_addr}: shutdown requested; stopping accept loop");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = ConnectionId::new(peer);
                        info!("connection {id}: accepted on {local_addr}");
                        let session = prepare_session(stream, id, &handler, config.idle_timeout);
                        sessions.spawn_on(
                            serve_connection(session, shutdown_requested(shutdown_rx.clone())),
                            &runtime,
                        );
                    }
                    Err(e) if is_transient(&e) => {
                        // The peer gave up between SYN and accept; nothing to serve.
                        warn!("line server on {local_addr}: accept error (ignored): {e}");
                    }
                    Err(e) if is_resource_exhausted(&e) => {
                        // Live sessions will free descriptors as they end.
                        warn!(
                            "line server on {local_addr}: accept error: {e}; \
                             retrying in {ACCEPT_BACKOFF:?}"
                        );
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        error!("line server on {local_addr}: accept failed: {e}");
                        break Err(ServerError::Accept(e));
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join_error(joined);
                }
            }
        };

        // Stop accepting before waiting for sessions to drain.
        drop(listener);
        finish_sessions(sessions, result.is_ok()).await;
        if result.is_ok() {
            info!("line server on {local_addr}: all sessions closed");
        }
        result
    }
}

/// Handle to a running [`LineServer`].
///
/// Dropping it without calling [`shutdown`](Self::shutdown) detaches the
/// server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Asks the accept loop and every live session to stop.  Returns
    /// immediately; use [`join`](Self::join) to wait.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Whether the accept loop has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the accept loop, and after a shutdown for every session, to
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns the accept loop's error, or [`ServerError::Task`] if its task
    /// panicked or was cancelled.
    pub async fn join(self) -> Result<(), ServerError> {
        let ServerHandle {
            shutdown_tx, task, ..
        } = self;
        let joined = task.await;
        drop(shutdown_tx);
        joined.map_err(|e| ServerError::Task(e.to_string()))?
    }

    /// [`shutdown`](Self::shutdown) followed by [`join`](Self::join).
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown();
        self.join().await
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Binds `addr` with address reuse disabled.
fn bind_exclusive(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(false)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

fn prepare_session(
    stream: TcpStream,
    id: ConnectionId,
    handler: &Arc<dyn ConnectionHandler>,
    idle_timeout: Duration,
) -> Session<TcpStream> {
    // Requests and responses are single short lines.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("connection {id}: could not set TCP_NODELAY: {e}");
    }
    Session::new(stream, id, Arc::clone(handler), idle_timeout)
}

/// Errors that concern one pending connection rather than the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// The process or system file-descriptor table is full.
fn is_resource_exhausted(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(e.raw_os_error(), Some(libc::EMFILE | libc::ENFILE))
    }
    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}

/// After a shutdown, waits for every session to end.  Otherwise the accept
/// loop failed and the sessions are detached: they keep serving their clients
/// until they end on their own.
async fn finish_sessions(mut sessions: JoinSet<()>, drain: bool) {
    if drain {
        while let Some(joined) = sessions.join_next().await {
            log_join_error(joined);
        }
    } else {
        if !sessions.is_empty() {
            info!("{} session(s) left running after accept failure", sessions.len());
        }
        sessions.detach_all();
    }
}

/// Completes when shutdown is requested.  Never completes if the sender is
/// dropped without requesting it.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let requested = rx.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

/// Runs one session and logs how it ended.
async fn serve_connection(session: Session<TcpStream>, shutdown: impl Future<Output = ()>) {
    let id = session.id().clone();
    match session.run(shutdown).await {
        Ok(SessionEnd::TimedOut) => info!("connection {id}: closed after idle timeout"),
        Ok(end) => info!("connection {id}: closed ({end})"),
        Err(SessionError::Transport(e)) => warn!("connection {id}: closed with transport error: {e}"),
        Err(SessionError::Handler { source, .. }) => {
            error!("connection {id}: closed after handler failure: {source}")
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("session task panicked: {e}");
        } else {
            debug!("session task cancelled: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
