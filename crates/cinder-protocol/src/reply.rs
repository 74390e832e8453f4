//! Canonical reply values.
//!
//! The command layer speaks in these constructors so that wire strings
//! (error messages especially) are written down exactly once.

use bytes::Bytes;

use crate::types::Frame;

/// `+OK`
pub fn ok() -> Frame {
    Frame::Simple("OK".into())
}

/// `+PONG`
pub fn pong() -> Frame {
    Frame::Simple("PONG".into())
}

/// `:<n>`
pub fn integer(n: i64) -> Frame {
    Frame::Integer(n)
}

/// `$<len>` bulk string.
pub fn bulk(data: impl Into<Bytes>) -> Frame {
    Frame::Bulk(data.into())
}

/// `$-1` null bulk.
pub fn null() -> Frame {
    Frame::Null
}

/// `*0`
pub fn empty_array() -> Frame {
    Frame::Array(Vec::new())
}

/// Array of bulk strings.
pub fn bulk_array<I, B>(items: I) -> Frame
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    Frame::Array(items.into_iter().map(|b| Frame::Bulk(b.into())).collect())
}

/// Array of bulk strings where `None` slots become `$-1`.
pub fn multi_bulk<I>(items: I) -> Frame
where
    I: IntoIterator<Item = Option<Bytes>>,
{
    Frame::Array(
        items
            .into_iter()
            .map(|slot| match slot {
                Some(data) => Frame::Bulk(data),
                None => Frame::Null,
            })
            .collect(),
    )
}

/// SCAN-style reply: `[cursor, [member, ...]]`.
pub fn scan(cursor: i64, members: Vec<Bytes>) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from(cursor.to_string())),
        bulk_array(members),
    ])
}

/// Generic error reply.
pub fn error(msg: impl Into<String>) -> Frame {
    Frame::Error(msg.into())
}

/// Typed operation against an entity of a different type.
pub fn wrong_type() -> Frame {
    Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
}

/// Arity mismatch for a known command.
pub fn arg_num_err(cmd: &str) -> Frame {
    Frame::Error(format!("ERR wrong number of arguments for '{cmd}' command"))
}

/// Unrecognized command name.
pub fn unknown_command(cmd: &str) -> Frame {
    Frame::Error(format!("ERR unknown command '{cmd}'"))
}

/// `ERR no such key`
pub fn no_such_key() -> Frame {
    Frame::Error("ERR no such key".into())
}

/// Integer argument that failed to parse or overflowed.
pub fn not_integer() -> Frame {
    Frame::Error("value is not an integer or out of range".into())
}

/// Float argument that failed to parse.
pub fn not_float() -> Frame {
    Frame::Error("value is not a valid float".into())
}

/// `ERR syntax error`
pub fn syntax_err() -> Frame {
    Frame::Error("ERR syntax error".into())
}

/// Cluster redirection: `-MOVED <slot> <addr>`.
pub fn moved(slot: u32, addr: &str) -> Frame {
    Frame::Error(format!("MOVED {slot} {addr}"))
}

/// Returns `true` for error replies (MOVED included).
pub fn is_error(frame: &Frame) -> bool {
    matches!(frame, Frame::Error(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(frame: Frame) -> Vec<u8> {
        frame.to_bytes().to_vec()
    }

    #[test]
    fn wire_forms() {
        assert_eq!(wire(ok()), b"+OK\r\n");
        assert_eq!(wire(pong()), b"+PONG\r\n");
        assert_eq!(wire(integer(7)), b":7\r\n");
        assert_eq!(wire(null()), b"$-1\r\n");
        assert_eq!(wire(empty_array()), b"*0\r\n");
    }

    #[test]
    fn moved_wire_form() {
        let frame = moved(866, "127.0.0.1:7001");
        assert!(is_error(&frame));
        assert_eq!(wire(frame), b"-MOVED 866 127.0.0.1:7001\r\n");
    }

    #[test]
    fn multi_bulk_nil_slots() {
        let frame = multi_bulk(vec![Some(Bytes::from("a")), None]);
        assert_eq!(wire(frame), b"*2\r\n$1\r\na\r\n$-1\r\n");
    }

    #[test]
    fn scan_reply_shape() {
        let frame = scan(3, vec![Bytes::from("m1"), Bytes::from("m2")]);
        assert_eq!(wire(frame), b"*2\r\n$1\r\n3\r\n*2\r\n$2\r\nm1\r\n$2\r\nm2\r\n");
    }

    #[test]
    fn error_strings() {
        assert_eq!(
            wire(arg_num_err("get")),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        assert_eq!(wire(unknown_command("frob")), b"-ERR unknown command 'frob'\r\n");
        assert!(is_error(&wrong_type()));
        assert!(!is_error(&ok()));
    }
}
