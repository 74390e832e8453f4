//! RESP frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP value. Bulk strings
//! use `Bytes` for reference-counted storage that avoids copies when
//! moving data between the parser, the command layer, and the AOF.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// Covers the RESP2 types: simple strings, errors, integers, bulk
/// strings (including the `$-1` null bulk), and arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string response, e.g. `+OK\r\n`.
    /// Used for short, non-binary status replies.
    Simple(String),

    /// Error response, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Null bulk string, `$-1\r\n`.
    Null,

    /// Ordered array of frames, e.g. `*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`.
    /// Client requests are always arrays of bulk strings.
    Array(Vec<Frame>),
}

impl Frame {
    /// Returns `true` if this frame is the null bulk.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Extracts a client command line from this frame.
    ///
    /// Requests arrive as a non-empty array of bulk strings (simple
    /// strings are tolerated for hand-typed input). Returns `None` for
    /// anything else.
    pub fn into_cmdline(self) -> Option<Vec<Bytes>> {
        let items = match self {
            Frame::Array(items) if !items.is_empty() => items,
            _ => return None,
        };
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Frame::Bulk(data) => args.push(data),
                Frame::Simple(s) => args.push(Bytes::from(s)),
                _ => return None,
            }
        }
        Some(args)
    }
}
