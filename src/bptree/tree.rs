// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Order-statistic B+ tree: `O(log n)` insert, delete, rank, and
//! range-by-rank over `(score, member)` keys.
//!
//! Internal nodes carry a per-child subtree count alongside the usual
//! separator keys, so rank and range queries never need to walk the leaf
//! chain from the start. Nodes are stored in a flat arena and referred to by
//! index; there are no parent pointers. Instead, every descent records the
//! `(node index, chosen child index)` pairs it passed through on a stack;
//! splits and count updates walk that stack back up instead of following
//! stored parent links. This sidesteps the ownership problems a pointer-based
//! B+ tree runs into in Rust without resorting to `Rc<RefCell<_>>` or raw
//! pointers.
//!
//! Under-full nodes after deletion are tolerated — merging/borrowing is not
//! implemented, matching the source behaviour this tree generalises, since
//! rank and range-by-rank stay correct regardless of fill factor.

use super::node::{InternalNode, LeafNode, Node};
pub use super::node::Key;

/// Minimum branching factor; anything lower defeats the point of a B+ tree.
pub const MIN_BRANCHING_FACTOR: usize = 4;

/// A descent step: the internal node visited and the child index chosen.
type DescentPath = Vec<(usize, usize)>;

/// An in-memory, order-statistic B+ tree over `(score, member)` keys.
pub struct OrderStatTree {
    arena: Vec<Node>,
    root: usize,
    size: usize,
    branching_factor: usize,
}

impl OrderStatTree {
    /// Creates an empty tree. `branching_factor` is clamped up to
    /// [`MIN_BRANCHING_FACTOR`].
    pub fn new(branching_factor: usize) -> Self {
        let branching_factor = branching_factor.max(MIN_BRANCHING_FACTOR);
        Self {
            arena: vec![Node::Leaf(LeafNode { keys: Vec::new(), next: None, prev: None })],
            root: 0,
            size: 0,
            branching_factor,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Descends from the root to the leaf that would contain `key`,
    /// recording the path taken. Returns the leaf's arena index.
    fn descend(&self, key: &Key) -> (usize, DescentPath) {
        let mut path = DescentPath::new();
        let mut idx = self.root;
        loop {
            match &self.arena[idx] {
                Node::Leaf(_) => return (idx, path),
                Node::Internal(internal) => {
                    let child_idx = internal.seps.partition_point(|s| s < key);
                    path.push((idx, child_idx));
                    idx = internal.children[child_idx];
                }
            }
        }
    }

    fn adjust_counts(&mut self, path: &DescentPath, delta: isize) {
        for &(node_idx, child_idx) in path {
            let internal = self.arena[node_idx].as_internal_mut();
            if delta >= 0 {
                internal.counts[child_idx] += delta as usize;
            } else {
                internal.counts[child_idx] -= (-delta) as usize;
            }
        }
    }

    /// Inserts `key`. Returns `true` if it was newly inserted, `false` if an
    /// equal `(score, member)` pair was already present (no mutation).
    pub fn insert(&mut self, key: Key) -> bool {
        let (leaf_idx, path) = self.descend(&key);
        let leaf = self.arena[leaf_idx].as_leaf();
        let pos = match leaf.keys.binary_search(&key) {
            Ok(_) => return false,
            Err(pos) => pos,
        };

        self.arena[leaf_idx].as_leaf_mut().keys.insert(pos, key);
        self.size += 1;
        self.adjust_counts(&path, 1);

        if self.arena[leaf_idx].as_leaf().keys.len() > self.branching_factor {
            self.split_leaf(leaf_idx, path);
        }
        true
    }

    fn split_leaf(&mut self, leaf_idx: usize, path: DescentPath) {
        let (right_keys, old_next) = {
            let leaf = self.arena[leaf_idx].as_leaf_mut();
            let mid = leaf.keys.len() / 2;
            (leaf.keys.split_off(mid), leaf.next)
        };
        let right_idx = self.arena.len();
        self.arena.push(Node::Leaf(LeafNode {
            keys: right_keys,
            next: old_next,
            prev: Some(leaf_idx),
        }));
        if let Some(next_idx) = old_next {
            self.arena[next_idx].as_leaf_mut().prev = Some(right_idx);
        }
        self.arena[leaf_idx].as_leaf_mut().next = Some(right_idx);

        let separator = self.arena[right_idx].as_leaf().keys[0].clone();
        let left_count = self.arena[leaf_idx].as_leaf().keys.len();
        let right_count = self.arena[right_idx].as_leaf().keys.len();

        self.insert_into_parent(path, leaf_idx, separator, right_idx, left_count, right_count);
    }

    /// Attaches a freshly split-off right sibling to the parent recorded at
    /// the top of `path`, or creates a new root if `left_idx` was the root.
    fn insert_into_parent(
        &mut self,
        mut path: DescentPath,
        left_idx: usize,
        separator: Key,
        right_idx: usize,
        left_count: usize,
        right_count: usize,
    ) {
        let Some((parent_idx, child_idx)) = path.pop() else {
            let new_root = Node::Internal(InternalNode {
                seps: vec![separator],
                children: vec![left_idx, right_idx],
                counts: vec![left_count, right_count],
            });
            let new_root_idx = self.arena.len();
            self.arena.push(new_root);
            self.root = new_root_idx;
            return;
        };

        {
            let parent = self.arena[parent_idx].as_internal_mut();
            parent.children.insert(child_idx + 1, right_idx);
            parent.seps.insert(child_idx, separator);
            parent.counts[child_idx] = left_count;
            parent.counts.insert(child_idx + 1, right_count);
        }

        if self.arena[parent_idx].as_internal().children.len() > self.branching_factor {
            self.split_internal(parent_idx, path);
        }
    }

    fn split_internal(&mut self, node_idx: usize, path: DescentPath) {
        let (promoted, right_children, right_seps, right_counts, left_sum, right_sum) = {
            let node = self.arena[node_idx].as_internal_mut();
            let total = node.children.len();
            let mid = total / 2;
            let promoted = node.seps[mid - 1].clone();
            let right_children = node.children.split_off(mid);
            let right_counts = node.counts.split_off(mid);
            let right_seps = node.seps.split_off(mid);
            node.seps.truncate(mid - 1);
            let left_sum: usize = node.counts.iter().sum();
            let right_sum: usize = right_counts.iter().sum();
            (promoted, right_children, right_seps, right_counts, left_sum, right_sum)
        };

        let right_idx = self.arena.len();
        self.arena.push(Node::Internal(InternalNode {
            seps: right_seps,
            children: right_children,
            counts: right_counts,
        }));

        self.insert_into_parent(path, node_idx, promoted, right_idx, left_sum, right_sum);
    }

    /// Removes `key`. Returns `true` iff it was present.
    pub fn delete(&mut self, key: &Key) -> bool {
        let (leaf_idx, path) = self.descend(key);
        let leaf = self.arena[leaf_idx].as_leaf();
        let pos = match leaf.keys.binary_search(key) {
            Ok(pos) => pos,
            Err(_) => return false,
        };
        self.arena[leaf_idx].as_leaf_mut().keys.remove(pos);
        self.size -= 1;
        self.adjust_counts(&path, -1);
        true
    }

    /// 0-based rank of `key`, or `None` if absent.
    pub fn rank(&self, key: &Key) -> Option<usize> {
        let mut rank = 0usize;
        let mut idx = self.root;
        loop {
            match &self.arena[idx] {
                Node::Leaf(leaf) => {
                    return leaf.keys.binary_search(key).ok().map(|pos| rank + pos);
                }
                Node::Internal(internal) => {
                    let child_idx = internal.seps.partition_point(|s| s < key);
                    rank += internal.counts[..child_idx].iter().sum::<usize>();
                    idx = internal.children[child_idx];
                }
            }
        }
    }

    /// Returns keys in ascending order for the inclusive rank range
    /// `[start, stop]`, clamped per the negative-index convention: negative
    /// indices count from the end (`n + idx`), `start` clamps up to `0`,
    /// `stop` clamps down to `n - 1`. Returns an empty vector if, after
    /// clamping, `start > stop`.
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<Key> {
        let n = self.size as i64;
        if n == 0 {
            return Vec::new();
        }
        let mut start = if start < 0 { start + n } else { start };
        let mut stop = if stop < 0 { stop + n } else { stop };
        if start < 0 {
            start = 0;
        }
        if stop >= n {
            stop = n - 1;
        }
        if start > stop {
            return Vec::new();
        }

        let need = (stop - start + 1) as usize;
        let mut target = start as usize;
        let mut idx = self.root;
        loop {
            match &self.arena[idx] {
                Node::Leaf(_) => break,
                Node::Internal(internal) => {
                    let mut cumulative = 0usize;
                    let mut chosen = internal.children.len() - 1;
                    for (i, &count) in internal.counts.iter().enumerate() {
                        if cumulative + count > target {
                            chosen = i;
                            break;
                        }
                        cumulative += count;
                    }
                    target -= cumulative;
                    idx = internal.children[chosen];
                }
            }
        }

        let mut result = Vec::with_capacity(need);
        let mut cursor = Some(idx);
        let mut local = target;
        while let Some(leaf_idx) = cursor {
            if result.len() >= need {
                break;
            }
            let leaf = self.arena[leaf_idx].as_leaf();
            while local < leaf.keys.len() && result.len() < need {
                result.push(leaf.keys[local].clone());
                local += 1;
            }
            cursor = leaf.next;
            local = 0;
        }
        result
    }
}
