//! Dual-representation hash value.
//!
//! Small hashes use a Vec of pairs for compact storage and cache-friendly
//! linear scans. A hash promotes to a HashMap on the first insert that
//! would either push it past 512 entries or store a field or value longer
//! than 64 bytes. Promotion is one-way.

use std::collections::HashMap;

use super::Encoding;

/// A hash stays compact while it has at most this many fields.
const MAX_COMPACT_ENTRIES: usize = 512;

/// A hash stays compact while every field and value is at most this long.
const MAX_COMPACT_LEN: usize = 64;

#[derive(Debug, Clone)]
enum Repr {
    Compact(Vec<(String, String)>),
    Expanded(HashMap<String, String>),
}

/// Field→value mapping over strings. Fields are unique.
#[derive(Debug, Clone)]
pub struct Hash {
    repr: Repr,
}

impl Hash {
    /// Creates an empty hash in compact encoding.
    pub fn new() -> Self {
        Self {
            repr: Repr::Compact(Vec::new()),
        }
    }

    /// Sets `field` to `value`. Returns 1 if the field is new, 0 if an
    /// existing field was updated.
    pub fn set(&mut self, field: &str, value: &str) -> i64 {
        if let Repr::Compact(pairs) = &self.repr {
            if pairs.len() >= MAX_COMPACT_ENTRIES
                || field.len() > MAX_COMPACT_LEN
                || value.len() > MAX_COMPACT_LEN
            {
                self.expand();
            }
        }

        match &mut self.repr {
            Repr::Compact(pairs) => {
                for pair in pairs.iter_mut() {
                    if pair.0 == field {
                        pair.1 = value.to_owned();
                        return 0;
                    }
                }
                pairs.push((field.to_owned(), value.to_owned()));
                1
            }
            Repr::Expanded(map) => {
                if map.insert(field.to_owned(), value.to_owned()).is_some() {
                    0
                } else {
                    1
                }
            }
        }
    }

    /// Returns the value stored at `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        match &self.repr {
            Repr::Compact(pairs) => pairs
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, v)| v.as_str()),
            Repr::Expanded(map) => map.get(field).map(String::as_str),
        }
    }

    /// Returns `true` if `field` is present.
    pub fn exists(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Removes `field`. Returns 1 if it was present, 0 otherwise.
    pub fn delete(&mut self, field: &str) -> i64 {
        match &mut self.repr {
            Repr::Compact(pairs) => {
                if let Some(pos) = pairs.iter().position(|(f, _)| f == field) {
                    // order is irrelevant for hashes, so a swap with the
                    // last entry avoids shifting the tail
                    pairs.swap_remove(pos);
                    1
                } else {
                    0
                }
            }
            Repr::Expanded(map) => {
                if map.remove(field).is_some() {
                    1
                } else {
                    0
                }
            }
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Compact(pairs) => pairs.len(),
            Repr::Expanded(map) => map.len(),
        }
    }

    /// Returns `true` if the hash has no fields.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All (field, value) pairs.
    pub fn get_all(&self) -> Vec<(String, String)> {
        match &self.repr {
            Repr::Compact(pairs) => pairs.clone(),
            Repr::Expanded(map) => map.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
        }
    }

    /// All field names.
    pub fn fields(&self) -> Vec<String> {
        match &self.repr {
            Repr::Compact(pairs) => pairs.iter().map(|(f, _)| f.clone()).collect(),
            Repr::Expanded(map) => map.keys().cloned().collect(),
        }
    }

    /// All values.
    pub fn values(&self) -> Vec<String> {
        match &self.repr {
            Repr::Compact(pairs) => pairs.iter().map(|(_, v)| v.clone()).collect(),
            Repr::Expanded(map) => map.values().cloned().collect(),
        }
    }

    /// Current storage encoding.
    pub fn encoding(&self) -> Encoding {
        match &self.repr {
            Repr::Compact(_) => Encoding::Compact,
            Repr::Expanded(_) => Encoding::Expanded,
        }
    }

    /// Removes every field and resets to the compact encoding.
    pub fn clear(&mut self) {
        self.repr = Repr::Compact(Vec::new());
    }

    fn expand(&mut self) {
        if let Repr::Compact(pairs) = &mut self.repr {
            let map = std::mem::take(pairs).into_iter().collect();
            self.repr = Repr::Expanded(map);
        }
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut h = Hash::new();
        assert_eq!(h.set("f", "v"), 1);
        assert_eq!(h.get("f"), Some("v"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn set_existing_updates() {
        let mut h = Hash::new();
        h.set("f", "old");
        assert_eq!(h.set("f", "new"), 0);
        assert_eq!(h.get("f"), Some("new"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn delete_field() {
        let mut h = Hash::new();
        h.set("a", "1");
        h.set("b", "2");
        assert_eq!(h.delete("a"), 1);
        assert_eq!(h.delete("a"), 0);
        assert_eq!(h.get("a"), None);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn exists_checks() {
        let mut h = Hash::new();
        h.set("here", "v");
        assert!(h.exists("here"));
        assert!(!h.exists("gone"));
    }

    #[test]
    fn upgrade_on_entry_count() {
        let mut h = Hash::new();
        for i in 0..MAX_COMPACT_ENTRIES {
            h.set(&format!("f{i}"), "v");
        }
        assert_eq!(h.encoding(), Encoding::Compact);
        assert_eq!(h.len(), 512);

        h.set("one-more", "v");
        assert_eq!(h.encoding(), Encoding::Expanded);
        assert_eq!(h.len(), 513);
        // everything survived the migration
        assert_eq!(h.get("f0"), Some("v"));
        assert_eq!(h.get("f511"), Some("v"));
    }

    #[test]
    fn upgrade_on_long_value() {
        let mut h = Hash::new();
        h.set("f", "short");
        assert_eq!(h.encoding(), Encoding::Compact);
        h.set("g", &"x".repeat(65));
        assert_eq!(h.encoding(), Encoding::Expanded);
    }

    #[test]
    fn upgrade_on_long_field() {
        let mut h = Hash::new();
        h.set(&"f".repeat(65), "v");
        assert_eq!(h.encoding(), Encoding::Expanded);
    }

    #[test]
    fn boundary_length_stays_compact() {
        let mut h = Hash::new();
        h.set(&"f".repeat(64), &"v".repeat(64));
        assert_eq!(h.encoding(), Encoding::Compact);
    }

    #[test]
    fn no_downgrade_after_upgrade() {
        let mut h = Hash::new();
        h.set("f", &"x".repeat(100));
        assert_eq!(h.encoding(), Encoding::Expanded);
        h.delete("f");
        assert!(h.is_empty());
        h.set("tiny", "v");
        assert_eq!(h.encoding(), Encoding::Expanded);
    }

    #[test]
    fn get_all_fields_values() {
        let mut h = Hash::new();
        h.set("a", "1");
        h.set("b", "2");

        let mut all = h.get_all();
        all.sort();
        assert_eq!(all, vec![("a".into(), "1".into()), ("b".into(), "2".into())]);

        let mut fields = h.fields();
        fields.sort();
        assert_eq!(fields, vec!["a", "b"]);

        let mut values = h.values();
        values.sort();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn clear_resets() {
        let mut h = Hash::new();
        h.set("f", "v");
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.encoding(), Encoding::Compact);
    }
}
