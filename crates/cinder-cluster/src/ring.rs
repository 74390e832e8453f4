//! Consistent-hash ring over node addresses.
//!
//! Node positions are CRC32 of the node id, kept sorted; a key belongs
//! to the first node at or past CRC32(key), wrapping to the start when
//! the key hashes beyond every node. Every node builds the ring from
//! the same sorted membership list, so all of them agree on ownership.

use std::collections::HashMap;

/// Static consistent-hash ring.
#[derive(Debug, Clone)]
pub struct Ring {
    positions: Vec<u32>,
    nodes: HashMap<u32, String>,
}

impl Ring {
    /// Builds a ring from node addresses. Blank entries are dropped.
    pub fn new(nodes: impl IntoIterator<Item = String>) -> Self {
        let mut positions = Vec::new();
        let mut by_position = HashMap::new();
        for node in nodes {
            let node = node.trim().to_owned();
            if node.is_empty() {
                continue;
            }
            let position = crc32fast::hash(node.as_bytes());
            if by_position.insert(position, node).is_none() {
                positions.push(position);
            }
        }
        positions.sort_unstable();
        Self {
            positions,
            nodes: by_position,
        }
    }

    /// Returns `true` when the ring holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of nodes on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// The node owning `key`: first ring position at or past the key's
    /// hash, wrapping around past the top.
    pub fn pick(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let hash = crc32fast::hash(key.as_bytes());
        let idx = match self.positions.binary_search(&hash) {
            Ok(i) => i,
            Err(i) if i == self.positions.len() => 0,
            Err(i) => i,
        };
        self.nodes.get(&self.positions[idx]).map(String::as_str)
    }
}
