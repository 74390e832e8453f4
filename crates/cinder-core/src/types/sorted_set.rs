//! Dual-representation sorted set.
//!
//! Small sorted sets hold `(member, score-string)` pairs in a Vec and
//! sort on demand. Past 128 members the set promotes to a
//! HashMap<member, score> paired with a span skip list ordered by
//! (score, member). In expanded form the map and the skip list always
//! agree on exactly the same members and scores.

use std::collections::HashMap;

use super::{normalize_range, Encoding};
use crate::skiplist::SkipList;

/// A sorted set stays compact while it has at most this many members.
const MAX_COMPACT_ENTRIES: usize = 128;

#[derive(Debug)]
enum Repr {
    Compact(Vec<(String, String)>),
    Expanded {
        scores: HashMap<String, f64>,
        index: SkipList,
    },
}

/// Member→score mapping with a secondary (score, member) order.
#[derive(Debug)]
pub struct SortedSet {
    repr: Repr,
}

/// Shortest round-trip decimal form; what ZSCORE and WITHSCORES print.
pub fn format_score(score: f64) -> String {
    format!("{score}")
}

fn parse_score(s: &str) -> Option<f64> {
    s.parse().ok()
}

impl SortedSet {
    /// Creates an empty sorted set in compact encoding.
    pub fn new() -> Self {
        Self {
            repr: Repr::Compact(Vec::new()),
        }
    }

    /// Adds `member` with `score`, or updates its score when it differs
    /// (the member is repositioned; an equal score is a no-op). Returns
    /// `true` when the member was newly added, not when it was modified.
    pub fn add(&mut self, member: &str, score: f64) -> bool {
        match &mut self.repr {
            Repr::Compact(pairs) => {
                for pair in pairs.iter_mut() {
                    if pair.0 == member {
                        pair.1 = format_score(score);
                        return false;
                    }
                }
                pairs.push((member.to_owned(), format_score(score)));
                if pairs.len() > MAX_COMPACT_ENTRIES {
                    self.expand();
                }
                true
            }
            Repr::Expanded { scores, index } => match scores.get(member) {
                Some(&existing) => {
                    if existing != score {
                        index.remove(member, existing);
                        index.insert(member, score);
                        scores.insert(member.to_owned(), score);
                    }
                    false
                }
                None => {
                    scores.insert(member.to_owned(), score);
                    index.insert(member, score);
                    true
                }
            },
        }
    }

    /// Removes a member. Returns `true` if it was present.
    pub fn remove(&mut self, member: &str) -> bool {
        match &mut self.repr {
            Repr::Compact(pairs) => {
                if let Some(pos) = pairs.iter().position(|(m, _)| m == member) {
                    pairs.remove(pos);
                    true
                } else {
                    false
                }
            }
            Repr::Expanded { scores, index } => match scores.remove(member) {
                Some(score) => {
                    index.remove(member, score);
                    true
                }
                None => false,
            },
        }
    }

    /// The member's score, if present.
    pub fn score(&self, member: &str) -> Option<f64> {
        match &self.repr {
            Repr::Compact(pairs) => pairs
                .iter()
                .find(|(m, _)| m == member)
                .and_then(|(_, s)| parse_score(s)),
            Repr::Expanded { scores, .. } => scores.get(member).copied(),
        }
    }

    /// Membership test.
    pub fn exists(&self, member: &str) -> bool {
        match &self.repr {
            Repr::Compact(pairs) => pairs.iter().any(|(m, _)| m == member),
            Repr::Expanded { scores, .. } => scores.contains_key(member),
        }
    }

    /// Number of members with `min <= score <= max`.
    pub fn count(&self, min: f64, max: f64) -> usize {
        match &self.repr {
            Repr::Compact(pairs) => pairs
                .iter()
                .filter_map(|(_, s)| parse_score(s))
                .filter(|s| *s >= min && *s <= max)
                .count(),
            Repr::Expanded { index, .. } => index.count_in_range(min, max),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Compact(pairs) => pairs.len(),
            Repr::Expanded { scores, .. } => scores.len(),
        }
    }

    /// Returns `true` if the sorted set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members with `min <= score <= max` in (score, member) order,
    /// skipping `offset` and yielding at most `count` (unbounded when
    /// `count <= 0`).
    pub fn range_by_score(&self, min: f64, max: f64, offset: i64, count: i64) -> Vec<String> {
        match &self.repr {
            Repr::Compact(pairs) => {
                let mut matches: Vec<(f64, &str)> = pairs
                    .iter()
                    .filter_map(|(m, s)| parse_score(s).map(|s| (s, m.as_str())))
                    .filter(|(s, _)| *s >= min && *s <= max)
                    .collect();
                matches.sort_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.1.cmp(b.1))
                });

                let skip = if offset > 0 { offset as usize } else { 0 };
                let take = if count > 0 {
                    count as usize
                } else {
                    matches.len()
                };
                matches
                    .into_iter()
                    .skip(skip)
                    .take(take)
                    .map(|(_, m)| m.to_owned())
                    .collect()
            }
            Repr::Expanded { index, .. } => index.range_by_score(min, max, offset, count),
        }
    }

    /// Members between `start` and `stop` ranks inclusive, with the
    /// negative-index convention (-1 = last).
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<String> {
        match &self.repr {
            Repr::Compact(pairs) => {
                let sorted = Self::sorted_members(pairs);
                let Some((start, stop)) = normalize_range(start, stop, sorted.len() as i64) else {
                    return Vec::new();
                };
                sorted[start..=stop].iter().map(|m| (*m).to_owned()).collect()
            }
            Repr::Expanded { index, .. } => index.range_by_rank(start, stop),
        }
    }

    /// 0-based ascending rank of a member.
    pub fn rank(&self, member: &str) -> Option<usize> {
        match &self.repr {
            Repr::Compact(pairs) => Self::sorted_members(pairs)
                .iter()
                .position(|m| *m == member),
            Repr::Expanded { scores, index } => {
                let score = scores.get(member)?;
                index.rank(member, *score)
            }
        }
    }

    /// Removes members in the given rank range. Returns how many went.
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let members = self.range_by_rank(start, stop);
        let mut removed = 0;
        for member in members {
            if self.remove(&member) {
                removed += 1;
            }
        }
        removed
    }

    /// Removes members with `min <= score <= max`. Returns how many went.
    pub fn remove_range_by_score(&mut self, min: f64, max: f64) -> usize {
        let members = self.range_by_score(min, max, 0, -1);
        let mut removed = 0;
        for member in members {
            if self.remove(&member) {
                removed += 1;
            }
        }
        removed
    }

    /// Current storage encoding.
    pub fn encoding(&self) -> Encoding {
        match &self.repr {
            Repr::Compact(_) => Encoding::Compact,
            Repr::Expanded { .. } => Encoding::Expanded,
        }
    }

    /// Removes every member and resets to the compact encoding.
    pub fn clear(&mut self) {
        self.repr = Repr::Compact(Vec::new());
    }

    /// Member names in (score, member) order for the compact encoding.
    fn sorted_members(pairs: &[(String, String)]) -> Vec<&str> {
        let mut entries: Vec<(f64, &str)> = pairs
            .iter()
            .filter_map(|(m, s)| parse_score(s).map(|s| (s, m.as_str())))
            .collect();
        entries.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        entries.into_iter().map(|(_, m)| m).collect()
    }

    fn expand(&mut self) {
        if let Repr::Compact(pairs) = &mut self.repr {
            let mut scores = HashMap::with_capacity(pairs.len());
            let mut index = SkipList::new();
            for (member, score_str) in pairs.drain(..) {
                if let Some(score) = parse_score(&score_str) {
                    scores.insert(member.clone(), score);
                    index.insert(&member, score);
                }
            }
            self.repr = Repr::Expanded { scores, index };
        }
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}
