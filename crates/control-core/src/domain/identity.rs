//! Connection identity.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// Opaque token identifying one accepted connection.
///
/// Handlers use it as a map key and in log messages.  It displays as the
/// peer's `address:port`; a random per-session UUID keeps two sessions from
/// the same address and port (a reconnect after the OS reuses the port)
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    peer: SocketAddr,
    session: Uuid,
}

impl ConnectionId {
    /// Creates a fresh identity for a connection from `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            session: Uuid::new_v4(),
        }
    }

    /// The remote address of the connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The per-session token.
    pub fn session(&self) -> Uuid {
        self.session
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer)
    }
}
