//! cinder-persistence: append-only-file durability.
//!
//! Mutating commands stream through a bounded channel to a dedicated
//! writer thread that appends them to the AOF as RESP command frames;
//! on startup the file is replayed through the router to rebuild the
//! keyspace.

pub mod aof;

pub use aof::{replay, AofHandler, AofPayload};
