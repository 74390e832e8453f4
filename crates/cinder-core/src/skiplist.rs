//! Span skip list: the ordered index behind large sorted sets.
//!
//! A randomized multi-level forward list ordered by (score ASC, member
//! ASC). Every forward link carries a span — the number of base-level
//! steps it covers — which makes rank queries O(log n). A member→node
//! side index gives O(1) membership.
//!
//! Nodes live in an index arena (`Vec<Node>` plus a free list) so the
//! whole structure is safe Rust; `NIL` is the null link.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::normalize_range;

/// Hard cap on node height.
const MAX_LEVEL: usize = 16;

/// Probability of promoting a node one more level.
const PROMOTE_P: f64 = 0.25;

/// Arena index of the head sentinel.
const HEAD: usize = 0;

/// Null arena index.
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct Link {
    forward: usize,
    /// Base-level steps from this node to `forward`. For the last node on
    /// a level (`forward == NIL`) this is the distance to the end of the
    /// list, which keeps the arithmetic uniform across splices.
    span: usize,
}

const EMPTY_LINK: Link = Link {
    forward: NIL,
    span: 0,
};

#[derive(Debug)]
struct Node {
    member: String,
    score: OrderedFloat<f64>,
    links: Vec<Link>,
}

/// Ordered (score, member) index with O(log n) rank and range queries.
#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    level: usize,
    length: usize,
    tail: usize,
    index: HashMap<String, usize>,
    rng: StdRng,
}

impl SkipList {
    /// Creates an empty skip list.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub(crate) fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let head = Node {
            member: String::new(),
            score: OrderedFloat(0.0),
            links: vec![EMPTY_LINK; MAX_LEVEL],
        };
        Self {
            nodes: vec![head],
            free: Vec::new(),
            level: 1,
            length: 0,
            tail: NIL,
            index: HashMap::new(),
            rng,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the list has no members.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the score stored for `member`.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.index.get(member).map(|&idx| self.nodes[idx].score.0)
    }

    /// Inserts `(member, score)`. A member already present with the same
    /// score is a no-op; with a different score it is deleted and
    /// reinserted so its position updates. Returns `true` when the member
    /// was not present before.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        if let Some(&idx) = self.index.get(member) {
            if self.nodes[idx].score == OrderedFloat(score) {
                return false;
            }
            let old = self.nodes[idx].score.0;
            self.remove(member, old);
            self.insert_node(member, score);
            return false;
        }
        self.insert_node(member, score);
        true
    }

    fn insert_node(&mut self, member: &str, score: f64) {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let link = self.nodes[x].links[i];
                if link.forward == NIL || !self.precedes(link.forward, score, member) {
                    break;
                }
                rank[i] += link.span;
                x = link.forward;
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].links[i].span = self.length;
            }
            self.level = level;
        }

        let new = self.alloc(member, score, level);
        for i in 0..level {
            let pred = update[i];
            let pred_link = self.nodes[pred].links[i];
            self.nodes[new].links[i] = Link {
                forward: pred_link.forward,
                span: pred_link.span - (rank[0] - rank[i]),
            };
            self.nodes[pred].links[i] = Link {
                forward: new,
                span: (rank[0] - rank[i]) + 1,
            };
        }
        for i in level..self.level {
            self.nodes[update[i]].links[i].span += 1;
        }

        if self.nodes[new].links[0].forward == NIL {
            self.tail = new;
        }
        self.length += 1;
        self.index.insert(member.to_owned(), new);
    }

    /// Removes `(member, score)`. Returns `false` when the member is
    /// absent or stored with a different score.
    pub fn remove(&mut self, member: &str, score: f64) -> bool {
        let target = match self.index.get(member) {
            Some(&idx) if self.nodes[idx].score == OrderedFloat(score) => idx,
            _ => return false,
        };

        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let link = self.nodes[x].links[i];
                if link.forward == NIL || !self.precedes(link.forward, score, member) {
                    break;
                }
                x = link.forward;
            }
            update[i] = x;
        }

        debug_assert_eq!(self.nodes[update[0]].links[0].forward, target);

        for i in 0..self.level {
            let pred = update[i];
            if self.nodes[pred].links[i].forward == target {
                let target_link = self.nodes[target].links[i];
                let link = &mut self.nodes[pred].links[i];
                link.span += target_link.span - 1;
                link.forward = target_link.forward;
            } else {
                self.nodes[pred].links[i].span -= 1;
            }
        }

        if target == self.tail {
            self.tail = if update[0] == HEAD { NIL } else { update[0] };
        }
        while self.level > 1 && self.nodes[HEAD].links[self.level - 1].forward == NIL {
            self.level -= 1;
        }

        self.length -= 1;
        self.index.remove(member);
        self.release(target);
        true
    }

    /// 0-based rank of `(member, score)` in ascending order, computed by
    /// accumulating spans on the way down. `None` when absent.
    pub fn rank(&self, member: &str, score: f64) -> Option<usize> {
        let mut rank = 0usize;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let link = self.nodes[x].links[i];
                if link.forward == NIL {
                    break;
                }
                let next = &self.nodes[link.forward];
                // move onto nodes at or before the target so the target's
                // own step is counted
                let at_or_before = next.score.0 < score
                    || (next.score.0 == score && next.member.as_str() <= member);
                if !at_or_before {
                    break;
                }
                rank += link.span;
                x = link.forward;
            }
        }
        if x != HEAD && self.nodes[x].score.0 == score && self.nodes[x].member == member {
            Some(rank - 1)
        } else {
            None
        }
    }

    /// Number of members with `min <= score <= max`.
    pub fn count_in_range(&self, min: f64, max: f64) -> usize {
        let mut x = self.seek_score(min);
        let mut count = 0;
        while x != NIL && self.nodes[x].score.0 <= max {
            count += 1;
            x = self.nodes[x].links[0].forward;
        }
        count
    }

    /// Members with `min <= score <= max` in order, skipping `offset` and
    /// yielding at most `count` (unbounded when `count <= 0`).
    pub fn range_by_score(&self, min: f64, max: f64, offset: i64, count: i64) -> Vec<String> {
        let mut out = Vec::new();
        let mut x = self.seek_score(min);
        let mut skipped = 0;
        while x != NIL && self.nodes[x].score.0 <= max {
            if offset < 0 || skipped >= offset {
                out.push(self.nodes[x].member.clone());
                if count > 0 && out.len() as i64 >= count {
                    break;
                }
            } else {
                skipped += 1;
            }
            x = self.nodes[x].links[0].forward;
        }
        out
    }

    /// Members between `start` and `stop` ranks inclusive, with the
    /// negative-index convention (-1 = last).
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<String> {
        let Some((start, stop)) = normalize_range(start, stop, self.length as i64) else {
            return Vec::new();
        };

        let mut x = self.nodes[HEAD].links[0].forward;
        for _ in 0..start {
            if x == NIL {
                return Vec::new();
            }
            x = self.nodes[x].links[0].forward;
        }

        let mut out = Vec::with_capacity(stop - start + 1);
        for _ in start..=stop {
            if x == NIL {
                break;
            }
            out.push(self.nodes[x].member.clone());
            x = self.nodes[x].links[0].forward;
        }
        out
    }

    /// Descends to the first node with `score >= min`.
    fn seek_score(&self, min: f64) -> usize {
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            loop {
                let link = self.nodes[x].links[i];
                if link.forward == NIL || self.nodes[link.forward].score.0 >= min {
                    break;
                }
                x = link.forward;
            }
        }
        self.nodes[x].links[0].forward
    }

    /// Ordering predicate: does `node` sort strictly before `(score, member)`?
    fn precedes(&self, node: usize, score: f64, member: &str) -> bool {
        let n = &self.nodes[node];
        n.score.0 < score || (n.score.0 == score && n.member.as_str() < member)
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < PROMOTE_P {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, member: &str, score: f64, level: usize) -> usize {
        let node = Node {
            member: member.to_owned(),
            score: OrderedFloat(score),
            links: vec![EMPTY_LINK; level],
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx].member.clear();
        self.nodes[idx].links.clear();
        self.free.push(idx);
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}
