//! Owning-leaf assignment and segment-ordered tree materialization
//! (spec.md §4.15): turns the pruned, smoothed, resampled `Graph` into the
//! ordered `Tree` of `Path`s a human tracer's output resembles.
//!
//! Grounded directly on spec.md §4.15 and §3's "segment ownership structure"
//! data model; the root-ward BFS distance accumulation reuses
//! `trace::connectivity`'s BFS shape, generalized from reachability to a
//! per-leaf intensity-weighted distance.

use crate::trace::graph::{Graph, Path, Tree};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// For every vertex, the leaf whose intensity-normalized path through it is
/// longest (ties favor the farther leaf, spec.md's "i.e. `>=`"), plus that
/// leaf's distance to the vertex. Index `i` of the returned vectors is
/// meaningless for a dead slot.
pub fn assign_owners(graph: &Graph, max_intensity: f64) -> (Vec<Option<usize>>, Vec<f64>) {
    let n = graph.capacity();
    let mut owner: Vec<Option<usize>> = vec![None; n];
    let mut dist_to_leaf = vec![f64::NEG_INFINITY; n];

    let leaves: Vec<usize> = graph.iter_alive().filter(|&i| graph.is_leaf(i)).collect();
    for &leaf in &leaves {
        let mut acc = 0.0;
        let mut cur = leaf;
        loop {
            acc += graph.get(cur).unwrap().intensity / max_intensity;
            if acc >= dist_to_leaf[cur] {
                dist_to_leaf[cur] = acc;
                owner[cur] = Some(leaf);
            }
            match graph.parent_of(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
    }
    (owner, dist_to_leaf)
}

struct Segment {
    nodes: Vec<usize>, // segment-root-ward to leaf-ward order
    length: f64,
}

#[derive(PartialEq)]
struct Ready {
    length: f64,
    idx: usize,
}
impl Eq for Ready {}
impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        ordered_float::OrderedFloat(self.length).cmp(&ordered_float::OrderedFloat(other.length))
    }
}
impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the segment-ordered `Tree`: assigns an owning leaf to every
/// vertex, groups each leaf's contiguous owned run into one `Segment`, then
/// emits segments longest-first subject to a segment only being emitted
/// once its parent segment already has been.
pub fn materialize_tree(graph: &Graph, max_intensity: f64) -> Tree {
    let (owner, _dist) = assign_owners(graph, max_intensity);
    let leaves: Vec<usize> = graph.iter_alive().filter(|&i| graph.is_leaf(i)).collect();

    let mut segments: Vec<Segment> = Vec::new();
    let mut leaf_to_seg: ahash::AHashMap<usize, usize> = ahash::AHashMap::default();

    for &leaf in &leaves {
        let mut nodes = vec![leaf];
        let mut cur = leaf;
        loop {
            match graph.parent_of(cur) {
                Some(p) if owner[p] == Some(leaf) => {
                    nodes.push(p);
                    cur = p;
                }
                _ => break,
            }
        }
        let length: f64 = nodes.iter().map(|&i| graph.get(i).unwrap().intensity / max_intensity).sum();
        nodes.reverse(); // segment-root-ward .. leaf-ward
        leaf_to_seg.insert(leaf, segments.len());
        segments.push(Segment { nodes, length });
    }

    let mut parent_seg: Vec<Option<usize>> = vec![None; segments.len()];
    let mut connection: Vec<Option<usize>> = vec![None; segments.len()];
    let mut children_of_seg: Vec<Vec<usize>> = vec![Vec::new(); segments.len()];

    for i in 0..segments.len() {
        let segment_root = segments[i].nodes[0];
        if let Some(p) = graph.parent_of(segment_root) {
            if let Some(owner_leaf) = owner[p] {
                if let Some(&pseg) = leaf_to_seg.get(&owner_leaf) {
                    parent_seg[i] = Some(pseg);
                    connection[i] = Some(p);
                    children_of_seg[pseg].push(i);
                }
            }
        }
    }

    let mut heap = BinaryHeap::new();
    for (i, seg) in segments.iter().enumerate() {
        if parent_seg[i].is_none() {
            heap.push(Ready { length: seg.length, idx: i });
        }
    }

    let mut emitted_path_idx: Vec<Option<usize>> = vec![None; segments.len()];
    let mut tree = Tree::default();

    while let Some(Ready { idx, .. }) = heap.pop() {
        let seg = &segments[idx];
        let points: Vec<(f64, f64, f64)> = seg.nodes.iter().map(|&n| graph.get(n).unwrap().pos).collect();
        let radii: Vec<f64> = seg.nodes.iter().map(|&n| graph.get(n).unwrap().radius).collect();
        let swc_types = seg.nodes.iter().map(|&n| graph.get(n).unwrap().swc_type).collect();
        let parent_path = parent_seg[idx].and_then(|p| emitted_path_idx[p]);
        let branch_point = connection[idx].map(|v| graph.get(v).unwrap().pos);

        tree.paths.push(Path {
            points,
            radii,
            swc_types,
            parent_path,
            branch_point,
        });
        emitted_path_idx[idx] = Some(tree.paths.len() - 1);

        for &child in &children_of_seg[idx] {
            heap.push(Ready {
                length: segments[child].length,
                idx: child,
            });
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::graph::Vertex;
    use crate::volume::Spacing;

    fn v(x: i64, y: i64, z: i64, intensity: f64) -> Vertex {
        Vertex::new((x, y, z), Spacing::isotropic(1.0), intensity)
    }

    #[test]
    fn single_trunk_becomes_one_path() {
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        let mut cur = g.root();
        for i in 1..=5 {
            cur = g.add_child(cur, v(i, 0, 0, 200.0));
        }
        g.assign_topology_types();
        let tree = materialize_tree(&g, 200.0);
        assert_eq!(tree.paths.len(), 1);
        assert_eq!(tree.paths[0].points.len(), 6);
        assert!(tree.paths[0].parent_path.is_none());
        let _ = cur;
    }

    #[test]
    fn y_shape_with_two_arms_produces_two_linked_segments() {
        // A two-leaf tree (one trunk forking into two arms) has exactly two
        // owning leaves, hence exactly two segments: the trunk is absorbed
        // into whichever arm's leaf wins the tie on the shared trunk nodes.
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        let mut trunk = g.root();
        for i in 1..=10 {
            trunk = g.add_child(trunk, v(i, 0, 0, 200.0));
        }
        for i in 1..=3 {
            trunk = g.add_child(trunk, v(10 + i, 1, 0, 200.0));
        }
        // re-fetch the fork point (the last pure-trunk node) to grow the
        // second arm from it, not from the first arm's tip.
        let fork = {
            let mut cur = g.root();
            for _ in 1..10 {
                cur = g.children_of(cur)[0];
            }
            cur
        };
        let mut arm_b = fork;
        for i in 1..=3 {
            arm_b = g.add_child(arm_b, v(20 + i, -1, 0, 200.0));
        }
        g.assign_topology_types();
        let tree = materialize_tree(&g, 200.0);

        assert_eq!(tree.paths.len(), 2);
        let root_segments: Vec<_> = tree.paths.iter().filter(|p| p.parent_path.is_none()).collect();
        assert_eq!(root_segments.len(), 1, "exactly one segment must anchor the whole tree");
        let child_segment = tree.paths.iter().find(|p| p.parent_path.is_some()).unwrap();
        assert!(child_segment.branch_point.is_some());
        let total_points: usize = tree.paths.iter().map(|p| p.points.len()).sum();
        assert_eq!(total_points, g.alive_count());
        let _ = trunk;
    }
}
