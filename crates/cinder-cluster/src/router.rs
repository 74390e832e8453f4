//! Cluster-mode command routing.
//!
//! Wraps a single-database [`Router`]: commands whose key this node owns
//! execute locally, everything else is answered with a
//! `-MOVED <slot> <addr>` redirection. The slot number is informational
//! (CRC32 mod 16384, Redis-compatible for clients); ownership truth is
//! the consistent-hash ring.

use bytes::Bytes;

use cinder_core::{Dispatch, Router, Session};
use cinder_protocol::{reply, Frame};

use crate::ring::Ring;

/// Advisory slot space, 0..16383.
pub const SLOT_COUNT: u32 = 16384;

/// The advisory slot for a key.
pub fn key_slot(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes()) % SLOT_COUNT
}

/// Where a command's keys live, per the extraction table.
enum Routing {
    /// No key (PING, KEYS, FLUSHDB, unknown commands): run locally.
    Local,
    /// Route by this key.
    Key(String),
    /// Two-key command whose keys land on different nodes.
    CrossNode,
}

/// The cluster-mode dispatcher.
pub struct ClusterRouter {
    self_addr: String,
    ring: Ring,
    local: Router,
}

impl ClusterRouter {
    /// Builds the routing layer for this node. Cluster mode always runs
    /// a single logical database.
    pub fn new(self_addr: String, peers: &[String]) -> Self {
        let mut nodes: Vec<String> = peers
            .iter()
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();
        nodes.push(self_addr.clone());
        nodes.sort();

        tracing::info!("cluster initialized: self={self_addr}, nodes={nodes:?}");

        Self {
            self_addr,
            ring: Ring::new(nodes),
            local: Router::new(1),
        }
    }

    /// The wrapped single-database router (the AOF hooks into this).
    pub fn local(&self) -> &Router {
        &self.local
    }

    /// Node that owns `key`.
    pub fn node_for(&self, key: &str) -> Option<&str> {
        self.ring.pick(key)
    }

    fn routing_for(&self, name: &str, cmdline: &[Bytes]) -> Routing {
        let arg = |i: usize| cmdline.get(i).map(|a| String::from_utf8_lossy(a).into_owned());

        match name {
            // single-key commands, key at argv[1]
            "get" | "set" | "setnx" | "getset" | "setex" | "strlen" | "type" | "hset"
            | "hget" | "hexists" | "hdel" | "hlen" | "hgetall" | "hkeys" | "hvals" | "hmget"
            | "hmset" | "hsetnx" | "hencoding" | "sadd" | "srem" | "sismember" | "smembers"
            | "scard" | "spop" | "srandmember" | "sscan" | "sencoding" | "zadd" | "zscore"
            | "zcard" | "zrange" | "zrem" | "zcount" | "zrank" | "ztype" | "zrangebyscore"
            | "zremrangebyrank" | "zremrangebyscore" => match arg(1) {
                Some(key) => Routing::Key(key),
                None => Routing::Local,
            },

            // multi-key commands route by their first key
            "del" | "exists" | "sunion" | "sinter" | "sdiff" | "sunionstore" | "sinterstore"
            | "sdiffstore" => match arg(1) {
                Some(key) => Routing::Key(key),
                None => Routing::Local,
            },

            // both keys must land on one node
            "rename" | "renamenx" | "smove" => {
                let (Some(src), Some(dst)) = (arg(1), arg(2)) else {
                    return Routing::Local;
                };
                if self.ring.pick(&src) != self.ring.pick(&dst) {
                    return Routing::CrossNode;
                }
                Routing::Key(src)
            }

            // keyless (PING, KEYS, FLUSHDB) and anything unknown: local,
            // where the command table produces the proper reply
            _ => Routing::Local,
        }
    }
}

impl Dispatch for ClusterRouter {
    fn dispatch(&self, session: &mut Session, cmdline: &[Bytes]) -> Frame {
        let Some(name_raw) = cmdline.first() else {
            return reply::error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name_raw).to_lowercase();

        if name == "select" {
            return reply::error("ERR SELECT is not allowed in cluster mode");
        }

        let key = match self.routing_for(&name, cmdline) {
            Routing::Local => return self.local.dispatch(session, cmdline),
            Routing::CrossNode => {
                return reply::error("ERR source and destination require the same node");
            }
            Routing::Key(key) => key,
        };

        match self.ring.pick(&key) {
            Some(node) if node == self.self_addr => self.local.dispatch(session, cmdline),
            Some(node) => reply::moved(key_slot(&key), node),
            None => self.local.dispatch(session, cmdline),
        }
    }
}
