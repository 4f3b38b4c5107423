//! Wire protocol for ExifTool's `-stay_open` batch mode.
//!
//! In stay-open mode, ExifTool reads argument lines from stdin and runs one
//! logical command each time it sees an `-execute` line. Output for all
//! commands shares a single stdout stream, so each completed command is
//! terminated by a delimiter that carries the command's key back:
//!
//! ```text
//! libexiftool                        exiftool -stay_open True -@ -
//! ┌──────────────┐                   ┌─────────────┐
//! │ ExifTool     │──stdin (args + ──▶│             │
//! │              │   -executeN)      │             │
//! │              │◀─stdout (text + ──│             │
//! │              │   {readyN})       │             │
//! │              │◀─stderr (errors)──│             │
//! └──────────────┘                   └─────────────┘
//! ```
//!
//! # Input protocol
//!
//! - One argument per line, in order.
//! - A request that expects a response ends with `-execute<key>` (no space),
//!   where `<key>` is the decimal request key.
//! - Administrative commands (such as the shutdown toggle `-stay_open` /
//!   `False`) carry no `-execute` line and produce no tagged response.
//!
//! # Output protocol
//!
//! stdout is unframed text; the only structure is the delimiter
//! `{ready<key>}` followed by the platform line terminator. Everything
//! between two delimiters belongs to the command whose key is in the second
//! one. [`OutputFramer`] reassembles that stream. stderr has no framing at
//! all; each write is one complete error message ([`ErrorFramer`]).

mod framer;

pub use framer::{ErrorFramer, OutputFramer, ResponseFrame};

use std::fmt;

/// Start token of the response delimiter, as emitted by ExifTool.
pub const READY_TOKEN: &[u8] = b"{ready";

/// Line terminator the external tool uses on this platform. The delimiter is
/// matched byte-for-byte, so this must agree with the tool's own platform.
#[cfg(windows)]
pub const LINE_TERMINATOR: &str = "\r\n";
/// Line terminator the external tool uses on this platform. The delimiter is
/// matched byte-for-byte, so this must agree with the tool's own platform.
#[cfg(not(windows))]
pub const LINE_TERMINATOR: &str = "\n";

/// End token of the response delimiter: closing brace plus line terminator.
#[cfg(windows)]
pub const READY_TOKEN_END: &[u8] = b"}\r\n";
/// End token of the response delimiter: closing brace plus line terminator.
#[cfg(not(windows))]
pub const READY_TOKEN_END: &[u8] = b"}\n";

/// Prefix of the execute-marker line. The decimal key is appended directly,
/// with no space.
pub const EXECUTE_PREFIX: &str = "-execute";

/// The two-line administrative command that turns stay-open mode off.
pub const STAY_OPEN_OFF: [&str; 2] = ["-stay_open", "False"];

/// Text encoding used to decode the tool's stdout and stderr bytes.
///
/// ExifTool emits UTF-8 by default; older configurations may emit Latin-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TextEncoding {
    /// UTF-8, with invalid sequences replaced by U+FFFD.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    /// Decode a byte slice into text.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_consistent() {
        assert!(READY_TOKEN.starts_with(b"{"));
        assert!(READY_TOKEN_END.starts_with(b"}"));
        assert!(READY_TOKEN_END.ends_with(LINE_TERMINATOR.as_bytes()));
    }

    #[test]
    fn utf8_decoding_is_lossy() {
        let decoded = TextEncoding::Utf8.decode(&[b'o', b'k', 0xFF]);
        assert!(decoded.starts_with("ok"));
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn latin1_decoding_maps_bytes_directly() {
        assert_eq!(TextEncoding::Latin1.decode(&[0xE9]), "\u{e9}");
        assert_eq!(TextEncoding::Latin1.decode(b"plain"), "plain");
    }
}
