//! Addressable min-heap over search nodes, ordered by `f` with a
//! position-based tie-break so the order is total and deterministic.
//!
//! The teacher's searches (`search/astar.rs`, `search/mod.rs::SearchNode`) get
//! away with a plain `std::collections::BinaryHeap` with a reversed `Ord`
//! because they never need to move an existing entry — a cheaper `f` for an
//! already-open node is handled by pushing a second, stale entry and
//! filtering it out on pop. Spec.md's `decreaseKey(handle)` contract needs an
//! entry to move in place, which `BinaryHeap` cannot do, so this module
//! implements a pairing heap (the source comment in spec.md §4.3 calls out
//! "O(log n) amortized pairing-heap acceptable").

use ordered_float::OrderedFloat;
use std::cmp::Ordering;

/// Opaque reference to a node inside a [`PairingHeap`]. `null` is represented
/// as `Option<Handle>` at call sites, matching spec.md's per-direction
/// "open-heap handles (each `null` when not in that frontier)".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// Total-order sort key: `f`-cost first, then voxel position, so that ties in
/// `f` are broken deterministically by `(x, y, z)` per spec.md §4.3/§9.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchKey {
    pub f: f64,
    pub pos: (i64, i64, i64),
}

impl Eq for SearchKey {}

impl PartialOrd for SearchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.f)
            .cmp(&OrderedFloat(other.f))
            .then_with(|| self.pos.0.cmp(&other.pos.0))
            .then_with(|| self.pos.1.cmp(&other.pos.1))
            .then_with(|| self.pos.2.cmp(&other.pos.2))
    }
}

struct Node<K, V> {
    key: K,
    value: V,
    parent: Option<usize>,
    child: Option<usize>,
    /// Circular doubly linked sibling list anchored at the parent's `child`.
    next: usize,
    prev: usize,
}

/// An addressable pairing heap: `insert` returns a [`Handle`] that remains
/// valid (and can be used with `decrease_key`) until the entry is popped.
pub struct PairingHeap<K: Ord, V> {
    nodes: Vec<Option<Node<K, V>>>,
    root: Option<usize>,
    len: usize,
}

impl<K: Ord + Clone, V> PairingHeap<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, i: usize) -> &Node<K, V> {
        self.nodes[i].as_ref().expect("heap node slot already popped")
    }

    fn node_mut(&mut self, i: usize) -> &mut Node<K, V> {
        self.nodes[i].as_mut().expect("heap node slot already popped")
    }

    pub fn peek(&self) -> Option<(&K, &V)> {
        self.root.map(|r| (&self.node(r).key, &self.node(r).value))
    }

    pub fn insert(&mut self, key: K, value: V) -> Handle {
        let idx = self.nodes.len();
        self.nodes.push(Some(Node {
            key,
            value,
            parent: None,
            child: None,
            next: idx,
            prev: idx,
        }));
        self.root = Some(match self.root {
            Some(r) => self.meld(r, idx),
            None => idx,
        });
        self.len += 1;
        Handle(idx)
    }

    /// Detach `idx` from its parent's child list. `idx` becomes a standalone
    /// root candidate with an empty sibling ring of its own.
    fn detach(&mut self, idx: usize) {
        let (next, prev) = (self.node(idx).next, self.node(idx).prev);
        let parent = self.node(idx).parent;
        if next == idx {
            if let Some(p) = parent {
                self.node_mut(p).child = None;
            }
        } else {
            self.node_mut(next).prev = prev;
            self.node_mut(prev).next = next;
            if let Some(p) = parent {
                if self.node(p).child == Some(idx) {
                    self.node_mut(p).child = Some(next);
                }
            }
        }
        self.node_mut(idx).next = idx;
        self.node_mut(idx).prev = idx;
        self.node_mut(idx).parent = None;
    }

    /// Merge two heap-ordered trees (each already the root of its own
    /// sibling ring), returning the new root index.
    fn meld(&mut self, a: usize, b: usize) -> usize {
        let (winner, loser) = if self.node(a).key <= self.node(b).key {
            (a, b)
        } else {
            (b, a)
        };
        match self.node(winner).child {
            None => {
                self.node_mut(winner).child = Some(loser);
                self.node_mut(loser).parent = Some(winner);
                self.node_mut(loser).next = loser;
                self.node_mut(loser).prev = loser;
            }
            Some(c) => {
                let prev_of_c = self.node(c).prev;
                self.node_mut(loser).next = c;
                self.node_mut(loser).prev = prev_of_c;
                self.node_mut(prev_of_c).next = loser;
                self.node_mut(c).prev = loser;
                self.node_mut(loser).parent = Some(winner);
            }
        }
        winner
    }

    /// Strictly decrease the key of `handle`. Caller is responsible for only
    /// calling this with a key `<=` the current one (spec.md's `f(existing) >
    /// f'` guard lives at the search-engine call site, not here).
    pub fn decrease_key(&mut self, handle: Handle, new_key: K) {
        let idx = handle.0;
        self.node_mut(idx).key = new_key;
        if self.root == Some(idx) {
            return;
        }
        self.detach(idx);
        self.root = Some(match self.root {
            Some(r) => self.meld(r, idx),
            None => idx,
        });
    }

    pub fn delete_min(&mut self) -> Option<(K, V)> {
        let root = self.root?;
        self.len -= 1;

        // Collect root's children, then two-pass merge (pair left-to-right,
        // then fold the resulting list right-to-left) — the standard
        // pairing-heap delete-min merge strategy.
        let mut children = Vec::new();
        if let Some(first) = self.node(root).child {
            let mut cur = first;
            loop {
                let next = self.node(cur).next;
                self.node_mut(cur).parent = None;
                children.push(cur);
                if next == first {
                    break;
                }
                cur = next;
            }
        }
        for c in &children {
            self.node_mut(*c).next = *c;
            self.node_mut(*c).prev = *c;
        }

        let mut merged_pairs = Vec::new();
        let mut i = 0;
        while i < children.len() {
            if i + 1 < children.len() {
                merged_pairs.push(self.meld(children[i], children[i + 1]));
                i += 2;
            } else {
                merged_pairs.push(children[i]);
                i += 1;
            }
        }
        self.root = merged_pairs
            .into_iter()
            .rev()
            .reduce(|a, b| self.meld(a, b));

        let node = self.nodes[root].take().expect("root slot always populated");
        Some((node.key, node.value))
    }
}

impl<K: Ord + Clone, V> Default for PairingHeap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
