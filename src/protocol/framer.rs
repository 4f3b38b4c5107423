//! Reassembly of the tool's chunked output streams into discrete messages.

use crate::protocol::{TextEncoding, READY_TOKEN, READY_TOKEN_END};
use crate::{Error, Result};

/// One completed response, cut out of the stdout stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// The decimal key from the `{ready<key>}` delimiter, in its literal
    /// string form. Leading zeros are significant: `"01"` and `"1"` are
    /// different keys.
    pub key: String,
    /// Everything written to stdout since the previous delimiter (or the
    /// start of the stream), decoded with the configured encoding.
    pub text: String,
}

/// Stateful scanner that splits the stdout byte stream into
/// [`ResponseFrame`]s.
///
/// stdout arrives in arbitrary chunks; a delimiter may be split across any
/// number of writes. The framer accumulates bytes in a fixed-capacity buffer
/// and emits one frame per complete `{ready<digits>}` delimiter, in the order
/// the delimiters appear. The emitted frames for a given byte sequence are
/// identical regardless of how that sequence was chunked.
///
/// The framer is single-producer: it is only ever fed from the task reading
/// the process's stdout.
pub struct OutputFramer {
    buf: Vec<u8>,
    capacity: usize,
    start_token: Vec<u8>,
    end_token: Vec<u8>,
    encoding: TextEncoding,
}

impl OutputFramer {
    /// Create a framer with the standard ExifTool delimiter tokens.
    pub fn new(capacity: usize, encoding: TextEncoding) -> Self {
        Self::with_tokens(capacity, encoding, READY_TOKEN, READY_TOKEN_END)
    }

    /// Create a framer with custom delimiter tokens.
    pub fn with_tokens(
        capacity: usize,
        encoding: TextEncoding,
        start_token: &[u8],
        end_token: &[u8],
    ) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(4096)),
            capacity,
            start_token: start_token.to_vec(),
            end_token: end_token.to_vec(),
            encoding,
        }
    }

    /// Number of bytes currently buffered and not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard all buffered bytes. Never called mid-stream by the client;
    /// exists so a framer can be reused against a fresh stream.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Append a chunk of stdout bytes and return every frame completed by it.
    ///
    /// An empty chunk is a no-op. Frames are returned in the order their
    /// delimiters appear in the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] if the chunk does not fit in the
    /// remaining capacity. The buffer is left untouched in that case; the
    /// condition means the provisioned capacity is too small for the real
    /// traffic and is not recoverable by retrying.
    pub fn write(&mut self, chunk: &[u8]) -> Result<Vec<ResponseFrame>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        let needed = self.buf.len() + chunk.len();
        if needed > self.capacity {
            return Err(Error::BufferOverflow {
                needed,
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(self.scan())
    }

    /// Scan the buffered region for complete delimiters, emit one frame per
    /// match, and compact the buffer past the last match.
    fn scan(&mut self) -> Vec<ResponseFrame> {
        let mut frames = Vec::new();
        let mut last_match_end = 0;
        let mut pos = 0;

        while pos + self.start_token.len() <= self.buf.len() {
            match self.try_match(pos) {
                Some((digits_start, digits_end, match_end)) => {
                    let key = self.encoding.decode(&self.buf[digits_start..digits_end]);
                    let text = self.encoding.decode(&self.buf[last_match_end..pos]);
                    frames.push(ResponseFrame { key, text });
                    last_match_end = match_end;
                    pos = match_end;
                }
                None => {
                    // A rejected start token must not be skipped over:
                    // scanning resumes at the very next byte so overlapping
                    // candidates are still seen.
                    pos += 1;
                }
            }
        }

        if last_match_end > 0 {
            self.buf.drain(..last_match_end);
        }
        frames
    }

    /// Attempt a full delimiter match at `pos`. On success returns the digit
    /// run bounds and the position just past the end token.
    fn try_match(&self, pos: usize) -> Option<(usize, usize, usize)> {
        if !self.buf[pos..].starts_with(&self.start_token) {
            return None;
        }
        let digits_start = pos + self.start_token.len();
        let mut digits_end = digits_start;
        while digits_end < self.buf.len() && self.buf[digits_end].is_ascii_digit() {
            digits_end += 1;
        }
        // Zero digits rejects the start-token match entirely.
        if digits_end == digits_start {
            return None;
        }
        if !self.buf[digits_end..].starts_with(&self.end_token) {
            return None;
        }
        Some((digits_start, digits_end, digits_end + self.end_token.len()))
    }
}

/// Pass-through decoder for the tool's stderr stream.
///
/// stderr carries no framing; each write from the process is one complete
/// error message. The framer only decodes and never buffers.
pub struct ErrorFramer {
    encoding: TextEncoding,
}

impl ErrorFramer {
    /// Create an error framer with the given encoding.
    pub fn new(encoding: TextEncoding) -> Self {
        Self { encoding }
    }

    /// Decode one stderr chunk. Empty chunks yield nothing.
    pub fn write(&self, chunk: &[u8]) -> Option<String> {
        if chunk.is_empty() {
            None
        } else {
            Some(self.encoding.decode(chunk))
        }
    }
}
