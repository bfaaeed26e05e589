//! Newline framing for requests and responses.
//!
//! # Streaming
//!
//! TCP is a stream protocol: one `read()` may return half a request, or
//! several requests at once.  [`LineFramer`] accumulates bytes across reads
//! and hands out complete lines one at a time, keeping whatever follows the
//! last `\n` for the next call.  The sequence of requests it yields does not
//! depend on where the stream was split into reads.

/// The request/response delimiter.
pub const DELIMITER: u8 = b'\n';

/// Accumulates bytes and yields newline-terminated requests.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    // Bytes of `buf` already known to contain no delimiter.
    scanned: usize,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete request, if one is buffered.
    ///
    /// The delimiter is dropped and a single trailing `\r` is trimmed, so
    /// `"ping\r\n"` and `"ping\n"` both yield `"ping"`.  A `\r` anywhere else
    /// in the line is kept.  Bytes are decoded as UTF-8, replacing invalid
    /// sequences with U+FFFD.
    pub fn next_request(&mut self) -> Option<String> {
        let pos = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == DELIMITER)
            .map(|offset| self.scanned + offset);

        let Some(pos) = pos else {
            self.scanned = self.buf.len();
            return None;
        };

        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // the '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.scanned = 0;

        Some(match String::from_utf8(line) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Number of buffered bytes not yet returned as a request.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Turns a handler response into the bytes to write, or `None` to write nothing.
///
/// Appends `\n` unless the response already ends with one, so `"pong"` and
/// `"pong\n"` both go out as `"pong\n"`.
pub fn encode_response(response: String) -> Option<Vec<u8>> {
    if response.is_empty() {
        return None;
    }
    let mut bytes = response.into_bytes();
    if bytes.last() != Some(&DELIMITER) {
        bytes.push(DELIMITER);
    }
    Some(bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
