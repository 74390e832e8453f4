//! Multi-database router and per-connection session state.
//!
//! The router owns the N logical databases of a standalone server. It
//! special-cases SELECT (which mutates the session, not a database),
//! optionally enforces explicit selection, and catches handler panics at
//! the dispatch boundary so one bad command cannot take a connection
//! down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;

use cinder_protocol::{reply, Frame};

use crate::db::{AofSink, Db};

/// Per-connection command state: which database the connection operates
/// on, and whether it ever said so explicitly.
#[derive(Debug, Clone)]
pub struct Session {
    index: usize,
    selected: bool,
}

impl Session {
    /// Fresh session on database 0, nothing selected yet.
    pub fn new() -> Self {
        Self {
            index: 0,
            selected: false,
        }
    }

    /// Session that already counts as selected; the AOF replay driver
    /// uses this so journals that never switch databases replay cleanly.
    pub fn preselected(index: usize) -> Self {
        Self {
            index,
            selected: true,
        }
    }

    /// Index of the database this session operates on.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether SELECT was issued on this session.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    fn select(&mut self, index: usize) {
        self.index = index;
        self.selected = true;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can execute a command line on behalf of a session: the
/// standalone [`Router`] or the cluster redirection layer.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, session: &mut Session, cmdline: &[Bytes]) -> Frame;
}

/// Routes commands to one of N logical databases.
pub struct Router {
    dbs: Vec<Arc<Db>>,
    require_select: bool,
}

impl Router {
    /// Creates a router over `databases` logical DBs (a non-positive
    /// count falls back to the default of 16).
    pub fn new(databases: usize) -> Self {
        let databases = if databases == 0 { 16 } else { databases };
        Self {
            dbs: (0..databases).map(|i| Arc::new(Db::new(i))).collect(),
            require_select: false,
        }
    }

    /// Rejects database commands until the session has SELECTed. PING
    /// and SELECT itself stay exempt.
    pub fn with_require_select(mut self, require: bool) -> Self {
        self.require_select = require;
        self
    }

    /// Number of logical databases.
    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    /// Direct access to a database, mainly for tests and wiring.
    pub fn db(&self, index: usize) -> Option<&Arc<Db>> {
        self.dbs.get(index)
    }

    /// Installs the persistence sink on every database.
    pub fn install_aof(&self, sink: AofSink) {
        for db in &self.dbs {
            db.install_aof(sink.clone());
        }
    }

    fn exec(&self, session: &mut Session, cmdline: &[Bytes]) -> Frame {
        let Some(name_raw) = cmdline.first() else {
            return reply::error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name_raw).to_lowercase();

        if name == "select" {
            if cmdline.len() != 2 {
                return reply::arg_num_err("select");
            }
            return self.select(session, &cmdline[1]);
        }

        if self.require_select && !session.is_selected() && name != "ping" {
            return reply::error("NOSELECT select a database first");
        }

        match self.dbs.get(session.index()) {
            Some(db) => db.exec(cmdline),
            None => reply::error("ERR DB index is out of range"),
        }
    }

    fn select(&self, session: &mut Session, arg: &Bytes) -> Frame {
        let Ok(index) = String::from_utf8_lossy(arg).parse::<usize>() else {
            return reply::error("ERR invalid DB index");
        };
        if index >= self.dbs.len() {
            return reply::error("ERR DB index is out of range");
        }
        session.select(index);
        reply::ok()
    }
}

impl Dispatch for Router {
    /// Dispatch with a panic fence: a handler bug becomes an error reply
    /// and the connection lives on.
    fn dispatch(&self, session: &mut Session, cmdline: &[Bytes]) -> Frame {
        match catch_unwind(AssertUnwindSafe(|| self.exec(session, cmdline))) {
            Ok(frame) => frame,
            Err(panic) => {
                let msg = panic_message(&panic);
                tracing::error!("command handler panicked: {msg}");
                reply::error(format!("ERR internal error: {msg}"))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(parts: &[&str]) -> Vec<Bytes> {
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect()
    }

    #[test]
    fn select_scopes_keys_per_database() {
        let router = Router::new(16);
        let mut session = Session::new();

        assert_eq!(router.dispatch(&mut session, &line(&["SELECT", "1"])), reply::ok());
        assert_eq!(router.dispatch(&mut session, &line(&["SET", "a", "1"])), reply::ok());
        assert_eq!(router.dispatch(&mut session, &line(&["SELECT", "2"])), reply::ok());
        assert_eq!(router.dispatch(&mut session, &line(&["GET", "a"])), Frame::Null);
        assert_eq!(router.dispatch(&mut session, &line(&["SELECT", "1"])), reply::ok());
        assert_eq!(
            router.dispatch(&mut session, &line(&["GET", "a"])),
            Frame::Bulk(Bytes::from("1"))
        );
    }

    #[test]
    fn select_bounds_and_parse_errors() {
        let router = Router::new(4);
        let mut session = Session::new();

        assert_eq!(
            router.dispatch(&mut session, &line(&["SELECT", "4"])),
            Frame::Error("ERR DB index is out of range".into())
        );
        assert_eq!(
            router.dispatch(&mut session, &line(&["SELECT", "-1"])),
            Frame::Error("ERR invalid DB index".into())
        );
        assert_eq!(
            router.dispatch(&mut session, &line(&["SELECT", "abc"])),
            Frame::Error("ERR invalid DB index".into())
        );
        assert!(reply::is_error(
            &router.dispatch(&mut session, &line(&["SELECT"]))
        ));
        // failed selects leave the session on db 0
        assert_eq!(session.index(), 0);
        assert!(!session.is_selected());
    }

    #[test]
    fn zero_databases_defaults_to_sixteen() {
        let router = Router::new(0);
        assert_eq!(router.database_count(), 16);
    }

    #[test]
    fn require_select_gates_commands() {
        let router = Router::new(2).with_require_select(true);
        let mut session = Session::new();

        assert_eq!(
            router.dispatch(&mut session, &line(&["GET", "k"])),
            Frame::Error("NOSELECT select a database first".into())
        );
        // PING and SELECT stay exempt
        assert_eq!(
            router.dispatch(&mut session, &line(&["PING"])),
            Frame::Simple("PONG".into())
        );
        assert_eq!(router.dispatch(&mut session, &line(&["SELECT", "0"])), reply::ok());
        assert_eq!(router.dispatch(&mut session, &line(&["GET", "k"])), Frame::Null);
    }

    #[test]
    fn preselected_session_skips_gate() {
        let router = Router::new(2).with_require_select(true);
        let mut session = Session::preselected(1);
        assert_eq!(router.dispatch(&mut session, &line(&["SET", "k", "v"])), reply::ok());
        assert_eq!(router.db(1).unwrap().key_count(), 1);
        assert_eq!(router.db(0).unwrap().key_count(), 0);
    }

    #[test]
    fn empty_command_is_an_error() {
        let router = Router::new(1);
        let mut session = Session::new();
        assert!(reply::is_error(&router.dispatch(&mut session, &[])));
    }

    #[test]
    fn unknown_command_passes_through() {
        let router = Router::new(1);
        let mut session = Session::new();
        assert_eq!(
            router.dispatch(&mut session, &line(&["NOPE"])),
            Frame::Error("ERR unknown command 'nope'".into())
        );
    }
}
