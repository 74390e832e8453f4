//! One logical database: a keyspace dictionary, its key-lock manager,
//! and the glue that dispatches command lines to handlers.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use crate::commands;
use crate::dict::Dict;
use crate::locks::KeyLockManager;

/// Callback that hands a mutation `(db_index, cmd_line)` to the
/// persistence layer. Installed once after AOF replay; absent when
/// append-only mode is off.
pub type AofSink = Arc<dyn Fn(usize, &[Bytes]) + Send + Sync>;

/// A logical database addressed by a small integer index.
pub struct Db {
    index: usize,
    pub(crate) data: Dict,
    pub(crate) locks: KeyLockManager,
    aof: OnceLock<AofSink>,
}

impl Db {
    /// Creates an empty database with the given index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            data: Dict::new(),
            locks: KeyLockManager::new(),
            aof: OnceLock::new(),
        }
    }

    /// This database's index within the server.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wires in the persistence sink. A second install is ignored.
    pub fn install_aof(&self, sink: AofSink) {
        let _ = self.aof.set(sink);
    }

    /// Forwards a mutation record to the AOF, if one is attached.
    /// Handlers call this while still holding the key lock so per-key
    /// AOF order matches the semantic order.
    pub(crate) fn add_aof(&self, cmdline: &[Bytes]) {
        if let Some(sink) = self.aof.get() {
            sink(self.index, cmdline);
        }
    }

    /// Executes one command line against this database: name lookup,
    /// arity validation, handler dispatch.
    pub fn exec(&self, cmdline: &[Bytes]) -> Frame {
        let Some(name_raw) = cmdline.first() else {
            return reply::error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name_raw).to_lowercase();

        let Some(spec) = commands::lookup(&name) else {
            return reply::unknown_command(&name);
        };
        if !commands::arity_ok(spec.arity, cmdline.len()) {
            return reply::arg_num_err(&name);
        }
        (spec.handler)(self, &cmdline[1..])
    }

    /// Removes `key` from the keyspace and retires its lock entry.
    /// Callers must hold the key's write lock.
    pub(crate) fn remove_key(&self, key: &str) -> usize {
        let removed = self.data.remove(key);
        if removed > 0 {
            self.locks.mark_removed(key);
        }
        removed
    }

    /// Drops every key and lock entry (FLUSHDB).
    pub fn flush(&self) {
        self.data.clear();
        self.locks.clear();
    }

    /// Number of keys currently stored.
    pub fn key_count(&self) -> usize {
        self.data.len()
    }
}
