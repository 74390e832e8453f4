//! The tagged value cell stored at each key.

use bytes::Bytes;

use crate::types::{Hash, Set, SortedSet};

/// A value stored in the keyspace. Every key maps to exactly one entity;
/// running a typed command against the wrong variant is a WRONGTYPE
/// error, never a coercion.
#[derive(Debug)]
pub enum Entity {
    /// Plain byte string (SET/GET family).
    Bytes(Bytes),
    /// Field-value hash.
    Hash(Hash),
    /// Unordered unique-member set.
    Set(Set),
    /// Score-ordered sorted set.
    SortedSet(SortedSet),
}

impl Entity {
    /// The type name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::Bytes(_) => "string",
            Entity::Hash(_) => "hash",
            Entity::Set(_) => "set",
            Entity::SortedSet(_) => "zset",
        }
    }
}
