//! cinder-core: the storage engine.
//!
//! Owns the keyspace dictionaries, the typed value containers with their
//! hybrid encodings, the per-key lock manager, and the command table that
//! maps RESP command lines onto all of the above. A server holds one
//! [`Router`] over N logical databases; each connection carries a
//! [`Session`] naming the database it operates on.

pub mod commands;
pub mod db;
pub mod dict;
pub mod entity;
pub mod locks;
pub mod pattern;
pub mod router;
pub mod skiplist;
pub mod types;

pub use db::{AofSink, Db};
pub use dict::Dict;
pub use entity::Entity;
pub use locks::KeyLockManager;
pub use router::{Dispatch, Router, Session};
pub use skiplist::SkipList;
pub use types::{Encoding, Hash, Set, SortedSet};
