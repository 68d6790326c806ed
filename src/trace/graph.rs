//! Rooted directed acyclic graph of traced vertices (spec.md §3/§4.9).
//!
//! Grounded on `queue::PairingHeap`'s own tombstone-slot arena: a `Vec<Option<T>>`
//! indexed by stable `usize` so pruning can delete leaves one at a time without
//! invalidating every other vertex's index. Parent/children are carried
//! alongside the slots rather than as in-vertex fields so [`Graph::remove_leaf`]
//! can update both ends of an edge without borrowing a vertex mutably and its
//! neighbor at the same time.

use crate::volume::{Spacing, Volume};

/// SWC node-type codes (spec.md's glossary): 0 undefined, 1 soma, 2 axon,
/// 3 basal dendrite, 4 apical dendrite, 5 fork point, 6 end point, 7 custom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SwcType {
    #[default]
    Undefined,
    Soma,
    Axon,
    BasalDendrite,
    ApicalDendrite,
    ForkPoint,
    EndPoint,
    Custom,
}

impl SwcType {
    pub fn code(self) -> u8 {
        match self {
            SwcType::Undefined => 0,
            SwcType::Soma => 1,
            SwcType::Axon => 2,
            SwcType::BasalDendrite => 3,
            SwcType::ApicalDendrite => 4,
            SwcType::ForkPoint => 5,
            SwcType::EndPoint => 6,
            SwcType::Custom => 7,
        }
    }
}

/// One reconstructed vertex: its voxel, its physical position (voxel scaled
/// by spacing), an estimated radius (physical units, 0 until
/// `trace::radius` runs), intensity at capture time, and its SWC type.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub voxel: (i64, i64, i64),
    pub pos: (f64, f64, f64),
    pub radius: f64,
    pub intensity: f64,
    pub swc_type: SwcType,
}

impl Vertex {
    pub fn new(voxel: (i64, i64, i64), spacing: Spacing, intensity: f64) -> Self {
        Self {
            voxel,
            pos: (
                voxel.0 as f64 * spacing.sx,
                voxel.1 as f64 * spacing.sy,
                voxel.2 as f64 * spacing.sz,
            ),
            radius: 0.0,
            intensity,
            swc_type: SwcType::Undefined,
        }
    }
}

/// Tombstone-slot arena of [`Vertex`]. `slots[i] == None` means index `i` was
/// removed and must never be reused (stable indices for the lifetime of the
/// graph, matching `PairingHeap`'s own removal idiom).
#[derive(Clone, Debug)]
pub struct Graph {
    slots: Vec<Option<Vertex>>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    root: usize,
    alive_count: usize,
}

impl Graph {
    /// Starts a new graph with `root` as vertex 0.
    pub fn with_root(root: Vertex) -> Self {
        Self {
            slots: vec![Some(root)],
            parent: vec![None],
            children: vec![Vec::new()],
            root: 0,
            alive_count: 1,
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn is_alive(&self, idx: usize) -> bool {
        idx < self.slots.len() && self.slots[idx].is_some()
    }

    pub fn get(&self, idx: usize) -> Option<&Vertex> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Vertex> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    pub fn parent_of(&self, idx: usize) -> Option<usize> {
        self.parent.get(idx).copied().flatten()
    }

    pub fn children_of(&self, idx: usize) -> &[usize] {
        self.children.get(idx).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub fn is_leaf(&self, idx: usize) -> bool {
        self.is_alive(idx) && self.children_of(idx).is_empty()
    }

    /// Appends `vertex` as a new child of `parent_idx`, returning its index.
    pub fn add_child(&mut self, parent_idx: usize, vertex: Vertex) -> usize {
        let idx = self.slots.len();
        self.slots.push(Some(vertex));
        self.parent.push(Some(parent_idx));
        self.children.push(Vec::new());
        self.children[parent_idx].push(idx);
        self.alive_count += 1;
        idx
    }

    /// Removes a leaf vertex. Panics if `idx` still has live children — every
    /// caller must remove a subtree bottom-up (see [`Graph::remove_subtree`]).
    pub fn remove_leaf(&mut self, idx: usize) {
        assert!(
            self.children_of(idx).iter().all(|&c| !self.is_alive(c)),
            "remove_leaf called on a vertex with live children"
        );
        assert_ne!(idx, self.root, "cannot remove the graph root");
        if let Some(parent_idx) = self.parent[idx] {
            self.children[parent_idx].retain(|&c| c != idx);
        }
        self.slots[idx] = None;
        self.alive_count -= 1;
    }

    /// Removes `idx` and its entire subtree, deepest first.
    pub fn remove_subtree(&mut self, idx: usize) {
        if idx == self.root {
            return;
        }
        let children: Vec<usize> = self.children_of(idx).to_vec();
        for child in children {
            if self.is_alive(child) {
                self.remove_subtree(child);
            }
        }
        if self.is_alive(idx) {
            self.remove_leaf(idx);
        }
    }

    /// Removes `idx`, reattaching each of its children directly to its
    /// former parent (resampling's "rewire a dropped point's parent edge to
    /// each of its children", spec.md §4.14). Panics on the root.
    pub fn splice_out(&mut self, idx: usize) {
        assert_ne!(idx, self.root, "cannot splice out the graph root");
        let parent_idx = self.parent[idx].expect("non-root vertex must have a parent");
        let children: Vec<usize> = self.children[idx].clone();
        self.children[parent_idx].retain(|&c| c != idx);
        for &child in &children {
            self.parent[child] = Some(parent_idx);
            self.children[parent_idx].push(child);
        }
        self.slots[idx] = None;
        self.children[idx].clear();
        self.alive_count -= 1;
    }

    /// Removes `idx`, unlinking it from its parent's children list and
    /// orphaning (parent-less) each of its own children rather than
    /// reattaching them — spec.md §4.16's soma deletion, which may remove an
    /// internal, multi-child vertex and let each surviving branch become the
    /// root of its own component. Returns the now-orphaned children.
    pub fn detach(&mut self, idx: usize) -> Vec<usize> {
        if let Some(parent_idx) = self.parent[idx] {
            if self.is_alive(parent_idx) {
                self.children[parent_idx].retain(|&c| c != idx);
            }
        }
        let children = std::mem::take(&mut self.children[idx]);
        for &c in &children {
            self.parent[c] = None;
        }
        self.slots[idx] = None;
        self.alive_count -= 1;
        children
    }

    /// Vertices from `leaf` upward to (but excluding) the nearest branch
    /// point or the root, in leaf-to-root order. Shared by pruning's
    /// dark-segment/short-terminal phases, smoothing, and resampling —
    /// every one of them operates on exactly this "leaf run" shape.
    pub fn leaf_segment(&self, leaf: usize) -> Vec<usize> {
        let mut seg = Vec::new();
        let mut cur = leaf;
        loop {
            seg.push(cur);
            if cur == self.root {
                break;
            }
            let parent = self.parent_of(cur).unwrap();
            if parent == self.root || self.children_of(parent).len() > 1 {
                break;
            }
            cur = parent;
        }
        seg
    }

    /// Samples `volume` at every alive vertex's voxel and writes it as that
    /// vertex's intensity. Vertices created by
    /// [`crate::trace::storage::StorageBackend::build_graph`] start with a
    /// placeholder intensity of `0.0`; this runs once, right after the graph
    /// is built, before any intensity-dependent pruning.
    pub fn sample_intensities(&mut self, volume: &dyn Volume) {
        for slot in self.slots.iter_mut() {
            if let Some(v) = slot {
                v.intensity = volume.get(v.voxel.0, v.voxel.1, v.voxel.2);
            }
        }
    }

    /// Physical length of the edge from `idx` to its parent, or `0.0` at the
    /// root.
    pub fn edge_weight(&self, idx: usize) -> f64 {
        let Some(parent_idx) = self.parent_of(idx) else {
            return 0.0;
        };
        let a = self.get(idx).unwrap().pos;
        let b = self.get(parent_idx).unwrap().pos;
        let dx = a.0 - b.0;
        let dy = a.1 - b.1;
        let dz = a.2 - b.2;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Iterates every currently-alive vertex index, in slot order (root
    /// first, since it always occupies slot 0).
    pub fn iter_alive(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.slots.len()).filter(move |&i| self.is_alive(i))
    }

    /// Assigns `EndPoint`/`ForkPoint` to true leaves and branch vertices
    /// respectively; leaves the root and internal single-child vertices
    /// untouched (the root's type is set by whoever seeded the trace).
    pub fn assign_topology_types(&mut self) {
        let root = self.root;
        for idx in 0..self.slots.len() {
            if idx == root || !self.is_alive(idx) {
                continue;
            }
            let child_count = self.children[idx].len();
            let swc_type = if child_count == 0 {
                Some(SwcType::EndPoint)
            } else if child_count > 1 {
                Some(SwcType::ForkPoint)
            } else {
                None
            };
            if let Some(swc_type) = swc_type {
                self.slots[idx].as_mut().unwrap().swc_type = swc_type;
            }
        }
    }
}

/// One materialized root-to-leaf-or-branch run: points/radii/types in
/// root-ward-to-leaf-ward order, plus the index of the path it branches from
/// (`None` for the segment containing the graph root) and the physical
/// position it branches at. `branch_point` is a copied coordinate rather than
/// an index into `parent_path`'s own point list, so resampling `parent_path`
/// never has to rewrite this reference (spec.md §9's "no back-pointer" rule).
#[derive(Clone, Debug, Default)]
pub struct Path {
    pub points: Vec<(f64, f64, f64)>,
    pub radii: Vec<f64>,
    pub swc_types: Vec<SwcType>,
    pub parent_path: Option<usize>,
    pub branch_point: Option<(f64, f64, f64)>,
}

/// A materialized tree: segment-ordered `Path`s, root-first.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    pub paths: Vec<Path>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i64, y: i64, z: i64) -> Vertex {
        Vertex::new((x, y, z), Spacing::isotropic(1.0), 1.0)
    }

    #[test]
    fn remove_leaf_detaches_from_parent() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        assert!(g.is_leaf(a));
        g.remove_leaf(a);
        assert!(!g.is_alive(a));
        assert!(g.children_of(g.root()).is_empty());
        assert_eq!(g.alive_count(), 1);
    }

    #[test]
    #[should_panic]
    fn remove_leaf_panics_on_internal_vertex() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        g.add_child(a, v(2, 0, 0));
        g.remove_leaf(a);
    }

    #[test]
    fn remove_subtree_removes_every_descendant() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        let b = g.add_child(a, v(2, 0, 0));
        g.add_child(b, v(3, 0, 0));
        assert_eq!(g.alive_count(), 4);
        g.remove_subtree(a);
        assert_eq!(g.alive_count(), 1);
        assert!(g.children_of(g.root()).is_empty());
    }

    #[test]
    fn indices_stay_stable_after_removal() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        let b = g.add_child(g.root(), v(2, 0, 0));
        g.remove_leaf(a);
        assert!(g.is_alive(b));
        assert_eq!(g.get(b).unwrap().voxel, (2, 0, 0));
    }

    #[test]
    fn splice_out_rewires_children_to_grandparent() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        let b = g.add_child(a, v(2, 0, 0));
        g.splice_out(a);
        assert!(!g.is_alive(a));
        assert_eq!(g.parent_of(b), Some(g.root()));
        assert_eq!(g.children_of(g.root()), &[b]);
    }

    #[test]
    fn detach_orphans_children_instead_of_regrafting() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        let b = g.add_child(a, v(2, 0, 0));
        let c = g.add_child(a, v(2, 1, 0));
        let orphans = g.detach(a);
        assert!(!g.is_alive(a));
        assert_eq!(orphans.len(), 2);
        assert!(g.parent_of(b).is_none());
        assert!(g.parent_of(c).is_none());
        assert!(g.children_of(g.root()).is_empty());
    }

    #[test]
    fn leaf_segment_stops_before_branch_point() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        let b = g.add_child(a, v(2, 0, 0));
        g.add_child(a, v(2, 1, 0)); // makes `a` a branch point
        let seg = g.leaf_segment(b);
        assert_eq!(seg, vec![b]);
    }

    #[test]
    fn assign_topology_types_tags_leaves_and_forks() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let a = g.add_child(g.root(), v(1, 0, 0));
        g.add_child(a, v(2, 0, 0));
        g.add_child(a, v(2, 1, 0));
        g.assign_topology_types();
        assert_eq!(g.get(a).unwrap().swc_type, SwcType::ForkPoint);
    }
}
