//! Command registry and dispatch table.
//!
//! Each command family registers its handlers into a process-wide table
//! keyed by lowercased name. Arity follows the Redis convention and
//! counts the command token itself: positive means exact, negative means
//! at-least `abs(arity)`.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;

use cinder_protocol::Frame;

use crate::db::Db;

mod hash;
mod keys;
mod ping;
mod set;
mod strings;
mod zset;

/// A command implementation. Receives the active database and the
/// argument list with the command token already stripped.
pub type Handler = fn(&Db, &[Bytes]) -> Frame;

/// Table entry: handler plus arity contract.
pub struct CommandSpec {
    pub handler: Handler,
    pub arity: i32,
}

type Table = HashMap<&'static str, CommandSpec>;

static TABLE: LazyLock<Table> = LazyLock::new(|| {
    let mut table = Table::new();
    ping::register(&mut table);
    keys::register(&mut table);
    strings::register(&mut table);
    hash::register(&mut table);
    set::register(&mut table);
    zset::register(&mut table);
    table
});

fn insert(table: &mut Table, name: &'static str, handler: Handler, arity: i32) {
    debug_assert_eq!(name, name.to_lowercase());
    table.insert(name, CommandSpec { handler, arity });
}

/// Looks up a command by its lowercased name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    TABLE.get(name)
}

/// Validates `argc` (including the command token) against an arity.
pub fn arity_ok(arity: i32, argc: usize) -> bool {
    if arity >= 0 {
        argc == arity as usize
    } else {
        argc >= arity.unsigned_abs() as usize
    }
}

/// Returns `true` when the named command is registered.
pub fn is_registered(name: &str) -> bool {
    TABLE.contains_key(name)
}

// ---------------------------------------------------------------------------
// shared argument helpers
// ---------------------------------------------------------------------------

/// Decodes an argument as a string key/member/field.
pub(crate) fn arg_str(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

/// Rebuilds a full command line (name first) for the AOF.
pub(crate) fn aof_line(name: &'static str, args: &[Bytes]) -> Vec<Bytes> {
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::from_static(name.as_bytes()));
    line.extend_from_slice(args);
    line
}

/// Parses an integer argument.
pub(crate) fn parse_int(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.trim().parse().ok()
}

/// Parses a float argument. NaN is rejected — it has no place in a
/// score ordering.
pub(crate) fn parse_float(arg: &Bytes) -> Option<f64> {
    let value: f64 = std::str::from_utf8(arg).ok()?.trim().parse().ok()?;
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_positive_is_exact() {
        assert!(arity_ok(2, 2));
        assert!(!arity_ok(2, 1));
        assert!(!arity_ok(2, 3));
    }

    #[test]
    fn arity_negative_is_minimum() {
        assert!(arity_ok(-2, 2));
        assert!(arity_ok(-2, 7));
        assert!(!arity_ok(-2, 1));
    }

    #[test]
    fn lookup_is_lowercase_only() {
        assert!(lookup("get").is_some());
        assert!(lookup("GET").is_none());
        assert!(lookup("no-such-cmd").is_none());
    }

    #[test]
    fn full_surface_registered() {
        for name in [
            "ping", "del", "exists", "flushdb", "type", "rename", "renamenx", "keys", "get",
            "set", "setnx", "getset", "setex", "strlen", "hset", "hget", "hexists", "hdel",
            "hlen", "hgetall", "hkeys", "hvals", "hmget", "hmset", "hsetnx", "hencoding",
            "sadd", "srem", "sismember", "smembers", "scard", "spop", "srandmember", "smove",
            "sunion", "sinter", "sdiff", "sunionstore", "sinterstore", "sdiffstore", "sscan",
            "sencoding", "zadd", "zscore", "zcard", "zrange", "zrem", "zcount", "zrank",
            "ztype", "zremrangebyrank", "zremrangebyscore", "zrangebyscore",
        ] {
            assert!(is_registered(name), "{name} missing from command table");
        }
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_int(&Bytes::from("42")), Some(42));
        assert_eq!(parse_int(&Bytes::from("-7")), Some(-7));
        assert_eq!(parse_int(&Bytes::from("x")), None);
        assert_eq!(parse_float(&Bytes::from("2.5")), Some(2.5));
        assert_eq!(parse_float(&Bytes::from("inf")), Some(f64::INFINITY));
        assert_eq!(parse_float(&Bytes::from("nan")), None);
        assert_eq!(parse_float(&Bytes::from("abc")), None);
    }
}
