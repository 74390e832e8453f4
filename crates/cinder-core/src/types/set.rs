//! Dual-representation set value.
//!
//! Small sets are a linear Vec of members; past 128 members the set
//! promotes to a HashSet for O(1) membership. Promotion is one-way.

use std::collections::HashSet;

use rand::Rng;

use super::Encoding;

/// A set stays compact while it has at most this many members.
const MAX_COMPACT_ENTRIES: usize = 128;

#[derive(Debug, Clone)]
enum Repr {
    Compact(Vec<String>),
    Expanded(HashSet<String>),
}

/// Collection of unique string members.
#[derive(Debug, Clone)]
pub struct Set {
    repr: Repr,
}

impl Set {
    /// Creates an empty set in compact encoding.
    pub fn new() -> Self {
        Self {
            repr: Repr::Compact(Vec::new()),
        }
    }

    /// Adds a member. Returns `true` if it was not already present.
    pub fn add(&mut self, member: &str) -> bool {
        match &mut self.repr {
            Repr::Compact(items) => {
                if items.iter().any(|m| m == member) {
                    return false;
                }
                if items.len() >= MAX_COMPACT_ENTRIES {
                    self.expand();
                    if let Repr::Expanded(set) = &mut self.repr {
                        set.insert(member.to_owned());
                    }
                    return true;
                }
                items.push(member.to_owned());
                true
            }
            Repr::Expanded(set) => set.insert(member.to_owned()),
        }
    }

    /// Removes a member. Returns `true` if it was present.
    pub fn remove(&mut self, member: &str) -> bool {
        match &mut self.repr {
            Repr::Compact(items) => {
                if let Some(pos) = items.iter().position(|m| m == member) {
                    items.remove(pos);
                    true
                } else {
                    false
                }
            }
            Repr::Expanded(set) => set.remove(member),
        }
    }

    /// Membership test.
    pub fn contains(&self, member: &str) -> bool {
        match &self.repr {
            Repr::Compact(items) => items.iter().any(|m| m == member),
            Repr::Expanded(set) => set.contains(member),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Compact(items) => items.len(),
            Repr::Expanded(set) => set.len(),
        }
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All members.
    pub fn members(&self) -> Vec<String> {
        match &self.repr {
            Repr::Compact(items) => items.clone(),
            Repr::Expanded(set) => set.iter().cloned().collect(),
        }
    }

    /// One uniformly random member, or `None` when empty.
    pub fn random_member(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        match &self.repr {
            Repr::Compact(items) => Some(items[rng.gen_range(0..items.len())].clone()),
            Repr::Expanded(set) => {
                let idx = rng.gen_range(0..set.len());
                set.iter().nth(idx).cloned()
            }
        }
    }

    /// `count` random members, possibly repeating.
    pub fn random_with_replacement(&self, count: usize) -> Vec<String> {
        if self.is_empty() || count == 0 {
            return Vec::new();
        }
        let members = self.members();
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| members[rng.gen_range(0..members.len())].clone())
            .collect()
    }

    /// Up to `count` distinct random members (all of them when `count`
    /// covers the whole set). Partial Fisher-Yates on a copy.
    pub fn random_distinct(&self, count: usize) -> Vec<String> {
        let size = self.len();
        if size == 0 || count == 0 {
            return Vec::new();
        }
        if count >= size {
            return self.members();
        }
        let mut shuffled = self.members();
        let mut rng = rand::thread_rng();
        for i in 0..count {
            let j = i + rng.gen_range(0..size - i);
            shuffled.swap(i, j);
        }
        shuffled.truncate(count);
        shuffled
    }

    /// Removes and returns up to `count` random members. Popping the whole
    /// set empties it without changing the encoding.
    pub fn pop(&mut self, count: usize) -> Vec<String> {
        let size = self.len();
        if size == 0 || count == 0 {
            return Vec::new();
        }

        if count >= size {
            let all = self.members();
            match &mut self.repr {
                Repr::Compact(items) => items.clear(),
                Repr::Expanded(set) => set.clear(),
            }
            return all;
        }

        let mut rng = rand::thread_rng();
        let mut popped = Vec::with_capacity(count);
        match &mut self.repr {
            Repr::Compact(items) => {
                for _ in 0..count {
                    let idx = rng.gen_range(0..items.len());
                    popped.push(items.remove(idx));
                }
            }
            Repr::Expanded(set) => {
                for _ in 0..count {
                    let idx = rng.gen_range(0..set.len());
                    if let Some(member) = set.iter().nth(idx).cloned() {
                        set.remove(&member);
                        popped.push(member);
                    }
                }
            }
        }
        popped
    }

    /// Members of `self` or `other`, as a fresh set.
    pub fn union(&self, other: &Set) -> Set {
        let mut result = Set::new();
        for m in self.members() {
            result.add(&m);
        }
        for m in other.members() {
            result.add(&m);
        }
        result
    }

    /// Members of both `self` and `other`, as a fresh set. Iterates the
    /// smaller operand and probes the larger.
    pub fn intersect(&self, other: &Set) -> Set {
        if self.len() > other.len() {
            return other.intersect(self);
        }
        let mut result = Set::new();
        for m in self.members() {
            if other.contains(&m) {
                result.add(&m);
            }
        }
        result
    }

    /// Members of `self` that are not in `other`, as a fresh set.
    pub fn diff(&self, other: &Set) -> Set {
        let mut result = Set::new();
        for m in self.members() {
            if !other.contains(&m) {
                result.add(&m);
            }
        }
        result
    }

    /// Current storage encoding.
    pub fn encoding(&self) -> Encoding {
        match &self.repr {
            Repr::Compact(_) => Encoding::Compact,
            Repr::Expanded(_) => Encoding::Expanded,
        }
    }

    /// Removes every member and resets to the compact encoding.
    pub fn clear(&mut self) {
        self.repr = Repr::Compact(Vec::new());
    }

    fn expand(&mut self) {
        if let Repr::Compact(items) = &mut self.repr {
            let set = std::mem::take(items).into_iter().collect();
            self.repr = Repr::Expanded(set);
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(members: &[&str]) -> Set {
        let mut s = Set::new();
        for m in members {
            s.add(m);
        }
        s
    }

    #[test]
    fn add_remove_contains() {
        let mut s = Set::new();
        assert!(s.add("a"));
        assert!(!s.add("a"));
        assert!(s.contains("a"));
        assert!(s.remove("a"));
        assert!(!s.remove("a"));
        assert!(!s.contains("a"));
    }

    #[test]
    fn upgrade_past_threshold() {
        let mut s = Set::new();
        for i in 0..MAX_COMPACT_ENTRIES {
            s.add(&format!("m{i}"));
        }
        assert_eq!(s.encoding(), Encoding::Compact);
        s.add("straw");
        assert_eq!(s.encoding(), Encoding::Expanded);
        assert_eq!(s.len(), 129);
        assert!(s.contains("m0"));
        assert!(s.contains("straw"));
    }

    #[test]
    fn no_downgrade() {
        let mut s = Set::new();
        for i in 0..=MAX_COMPACT_ENTRIES {
            s.add(&format!("m{i}"));
        }
        assert_eq!(s.encoding(), Encoding::Expanded);
        for i in 0..=MAX_COMPACT_ENTRIES {
            s.remove(&format!("m{i}"));
        }
        assert!(s.is_empty());
        assert_eq!(s.encoding(), Encoding::Expanded);
    }

    #[test]
    fn random_member_from_empty() {
        let s = Set::new();
        assert_eq!(s.random_member(), None);
        assert!(s.random_with_replacement(3).is_empty());
        assert!(s.random_distinct(3).is_empty());
    }

    #[test]
    fn random_distinct_no_duplicates() {
        let s = set_of(&["a", "b", "c", "d", "e"]);
        let picked = s.random_distinct(3);
        assert_eq!(picked.len(), 3);
        let mut deduped = picked.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 3);
        for m in &picked {
            assert!(s.contains(m));
        }
    }

    #[test]
    fn random_distinct_caps_at_len() {
        let s = set_of(&["a", "b"]);
        let mut picked = s.random_distinct(10);
        picked.sort();
        assert_eq!(picked, vec!["a", "b"]);
    }

    #[test]
    fn random_with_replacement_length() {
        let s = set_of(&["only"]);
        let picked = s.random_with_replacement(4);
        assert_eq!(picked, vec!["only"; 4]);
    }

    #[test]
    fn pop_partial() {
        let mut s = set_of(&["a", "b", "c", "d"]);
        let popped = s.pop(2);
        assert_eq!(popped.len(), 2);
        assert_eq!(s.len(), 2);
        for m in &popped {
            assert!(!s.contains(m));
        }
    }

    #[test]
    fn pop_everything() {
        let mut s = set_of(&["a", "b"]);
        let mut popped = s.pop(5);
        popped.sort();
        assert_eq!(popped, vec!["a", "b"]);
        assert!(s.is_empty());
    }

    #[test]
    fn union_combines() {
        let a = set_of(&["1", "2"]);
        let b = set_of(&["2", "3"]);
        let mut u = a.union(&b).members();
        u.sort();
        assert_eq!(u, vec!["1", "2", "3"]);
    }

    #[test]
    fn intersect_commutes() {
        let small = set_of(&["b", "c"]);
        let big = set_of(&["a", "b", "c", "d"]);
        let mut lhs = small.intersect(&big).members();
        let mut rhs = big.intersect(&small).members();
        lhs.sort();
        rhs.sort();
        assert_eq!(lhs, vec!["b", "c"]);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn diff_subtracts() {
        let a = set_of(&["1", "2", "3"]);
        let b = set_of(&["2"]);
        let mut d = a.diff(&b).members();
        d.sort();
        assert_eq!(d, vec!["1", "3"]);
        assert!(b.diff(&a).is_empty());
    }

    #[test]
    fn clear_resets_encoding() {
        let mut s = Set::new();
        for i in 0..200 {
            s.add(&format!("m{i}"));
        }
        assert_eq!(s.encoding(), Encoding::Expanded);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.encoding(), Encoding::Compact);
    }
}
