//! Minimal line client.
//!
//! Used by `control-port send` and by integration tests.  It speaks the same
//! framing as the server: a request is one line out, a response is one line
//! back.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::domain::framer::DELIMITER;

/// Pause between connection attempts in [`LineClient::connect`].
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by [`LineClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr} within {waited:?}: {source}")]
    Connect {
        addr: SocketAddr,
        waited: Duration,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    Closed,
}

/// A connected line client.
pub struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl LineClient {
    /// Connects to `addr`, retrying every 100 ms for up to `retry_for`.
    ///
    /// A zero `retry_for` makes exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] with the last connect error once
    /// `retry_for` has elapsed.
    pub async fn connect(addr: SocketAddr, retry_for: Duration) -> Result<Self, ClientError> {
        let started = Instant::now();
        loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    let (read, write) = stream.into_split();
                    return Ok(Self {
                        reader: BufReader::new(read),
                        writer: write,
                        peer: addr,
                    });
                }
                Err(source) if started.elapsed() >= retry_for => {
                    return Err(ClientError::Connect {
                        addr,
                        waited: started.elapsed(),
                        source,
                    });
                }
                Err(e) => {
                    debug!("connect to {addr} failed ({e}); retrying");
                    sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes `request` followed by `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the write fails.
    pub async fn send(&mut self, request: &str) -> Result<(), ClientError> {
        let mut frame = Vec::with_capacity(request.len() + 1);
        frame.extend_from_slice(request.as_bytes());
        frame.push(DELIMITER);
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    /// Reads the next line with its `\n` and one trailing `\r` removed.
    ///
    /// Returns `Ok(None)` at end of stream.  Unterminated bytes before EOF are
    /// returned as a final line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the read fails.
    pub async fn read_line(&mut self) -> Result<Option<String>, ClientError> {
        let mut line = Vec::new();
        if self.reader.read_until(DELIMITER, &mut line).await? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&DELIMITER) {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Sends `request` and waits for one response line.
    ///
    /// Returns `Ok(None)` if the server closed the connection instead of
    /// answering.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] on a read or write failure.
    pub async fn send_request(&mut self, request: &str) -> Result<Option<String>, ClientError> {
        self.send(request).await?;
        self.read_line().await
    }

    /// Like [`send_request`](Self::send_request), but treats a closed
    /// connection as [`ClientError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if no response arrives before EOF.
    pub async fn request(&mut self, request: &str) -> Result<String, ClientError> {
        self.send_request(request).await?.ok_or(ClientError::Closed)
    }

    /// Closes the write side, telling the server we are done.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the shutdown fails.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
