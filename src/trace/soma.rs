//! Soma-ROI strategies (spec.md §4.16): given a 2-D circular area (optionally
//! pinned to one z-plane), split or collapse the reconstructed tree at its
//! boundary according to one of five strategies.
//!
//! Grounded on `trace::graph::Graph::detach` (a soma vertex is typically
//! internal and multi-child, unlike the leaf/single-child removals pruning
//! and resampling perform) and on `trace::segment::materialize_tree` for
//! turning each surviving component into a `Tree`. `CONTAINED` is not
//! defined by spec.md's own §4.16 bullets; DESIGN.md resolves it as a
//! stricter `EDGE` that discards any exit whose neurite re-enters the ROI
//! further downstream.

use crate::trace::graph::{Graph, SwcType, Tree, Vertex};
use crate::trace::segment;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SomaStrategy {
    #[default]
    Unset,
    Edge,
    Centroid,
    CentroidWeighted,
    Contained,
}

/// A circular region of interest in the XY plane, physical units, optionally
/// restricted to a single z-plane within `z_tolerance`.
#[derive(Clone, Copy, Debug)]
pub struct SomaRoi {
    pub center: (f64, f64),
    pub radius: f64,
    pub z_plane: Option<f64>,
    pub z_tolerance: f64,
    pub strategy: SomaStrategy,
}

impl Default for SomaRoi {
    fn default() -> Self {
        Self {
            center: (0.0, 0.0),
            radius: 0.0,
            z_plane: None,
            z_tolerance: f64::INFINITY,
            strategy: SomaStrategy::Unset,
        }
    }
}

impl SomaRoi {
    pub fn contains(&self, pos: (f64, f64, f64)) -> bool {
        let dx = pos.0 - self.center.0;
        let dy = pos.1 - self.center.1;
        if dx * dx + dy * dy > self.radius * self.radius {
            return false;
        }
        if let Some(z0) = self.z_plane {
            if (pos.2 - z0).abs() > self.z_tolerance {
                return false;
            }
        }
        true
    }
}

fn dist2(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    let dz = a.2 - b.2;
    dx * dx + dy * dy + dz * dz
}

/// Copies the subtree rooted at `start` (following only still-alive
/// vertices) into a fresh, independently-indexed `Graph`.
fn extract_subgraph(graph: &Graph, start: usize) -> Graph {
    let mut dest = Graph::with_root(graph.get(start).unwrap().clone());
    graft_children(&mut dest, dest.root(), graph, start);
    dest
}

fn graft_children(dest: &mut Graph, dest_parent: usize, src: &Graph, src_node: usize) {
    for &child in src.children_of(src_node) {
        if src.is_alive(child) {
            let new_idx = dest.add_child(dest_parent, src.get(child).unwrap().clone());
            graft_children(dest, new_idx, src, child);
        }
    }
}

/// Grafts `src_node` and its surviving descendants as a new child of
/// `dest_parent` in `dest`.
fn graft(dest: &mut Graph, dest_parent: usize, src: &Graph, src_node: usize) {
    let new_idx = dest.add_child(dest_parent, src.get(src_node).unwrap().clone());
    graft_children(dest, new_idx, src, src_node);
}

/// `true` if any alive descendant of `start` in the *original* (pre-removal)
/// graph lies inside `roi`. `start` itself is known to be outside the ROI by
/// construction and is not tested.
fn subtree_touches_roi(graph: &Graph, start: usize, roi: &SomaRoi) -> bool {
    let mut stack: Vec<usize> = graph.children_of(start).to_vec();
    while let Some(idx) = stack.pop() {
        if !graph.is_alive(idx) {
            continue;
        }
        if roi.contains(graph.get(idx).unwrap().pos) {
            return true;
        }
        stack.extend(graph.children_of(idx));
    }
    false
}

/// Shared `EDGE`/`CONTAINED` implementation: mark every vertex inside `roi`
/// as soma, detach all of them, then materialize one `Tree` per surviving
/// parentless component (the original root, if it stayed alive, plus every
/// vertex whose parent was just detached). `reject_reentrant` additionally
/// discards a component whose *original* subtree dipped back into the ROI
/// further out.
fn split_into_trees(graph: &Graph, roi: &SomaRoi, max_intensity: f64, reject_reentrant: bool) -> Vec<Tree> {
    let mut clone = graph.clone();
    let soma: Vec<usize> = clone.iter_alive().filter(|&i| roi.contains(clone.get(i).unwrap().pos)).collect();
    if soma.is_empty() {
        return vec![segment::materialize_tree(graph, max_intensity)];
    }
    for &idx in &soma {
        clone.detach(idx);
    }

    let mut roots: Vec<usize> = clone.iter_alive().filter(|&i| clone.parent_of(i).is_none()).collect();
    roots.sort_unstable();

    let mut trees = Vec::new();
    for r in roots.drain(..) {
        if reject_reentrant && subtree_touches_roi(graph, r, roi) {
            continue;
        }
        let sub = extract_subgraph(&clone, r);
        trees.push(segment::materialize_tree(&sub, max_intensity));
    }
    trees
}

fn nearest_voxel(graph: &Graph, candidates: &[usize], pos: (f64, f64, f64)) -> (i64, i64, i64) {
    candidates
        .iter()
        .map(|&i| graph.get(i).unwrap())
        .min_by(|a, b| dist2(a.pos, pos).partial_cmp(&dist2(b.pos, pos)).unwrap())
        .map(|v| v.voxel)
        .unwrap_or((0, 0, 0))
}

/// `CENTROID`/`CENTROID_WEIGHTED`: every soma vertex is replaced by a single
/// new root at either the ROI's geometric centroid or the arithmetic mean of
/// the soma vertices' own coordinates, and every neurite's entry point is
/// reattached directly under it.
fn centroid_collapse(graph: &Graph, roi: &SomaRoi, max_intensity: f64, weighted: bool) -> Tree {
    let mut clone = graph.clone();
    let soma: Vec<usize> = clone.iter_alive().filter(|&i| roi.contains(clone.get(i).unwrap().pos)).collect();
    if soma.is_empty() {
        return segment::materialize_tree(graph, max_intensity);
    }

    let n = soma.len() as f64;
    let mean_intensity = soma.iter().map(|&i| clone.get(i).unwrap().intensity).sum::<f64>() / n;
    let mean_radius = soma.iter().map(|&i| clone.get(i).unwrap().radius).sum::<f64>() / n;

    let pos = if weighted {
        let sum = soma.iter().fold((0.0, 0.0, 0.0), |acc, &i| {
            let p = clone.get(i).unwrap().pos;
            (acc.0 + p.0, acc.1 + p.1, acc.2 + p.2)
        });
        (sum.0 / n, sum.1 / n, sum.2 / n)
    } else {
        let mean_z = soma.iter().map(|&i| clone.get(i).unwrap().pos.2).sum::<f64>() / n;
        (roi.center.0, roi.center.1, roi.z_plane.unwrap_or(mean_z))
    };
    let voxel = nearest_voxel(&clone, &soma, pos);

    let soma_set: ahash::AHashSet<usize> = soma.iter().copied().collect();
    let entry_points: Vec<usize> = clone
        .iter_alive()
        .filter(|i| !soma_set.contains(i))
        .filter(|&i| clone.parent_of(i).map_or(false, |p| soma_set.contains(&p)))
        .collect();

    for &idx in &soma {
        clone.detach(idx);
    }

    let centroid_vertex = Vertex {
        voxel,
        pos,
        radius: mean_radius,
        intensity: mean_intensity,
        swc_type: SwcType::Soma,
    };
    let mut dest = Graph::with_root(centroid_vertex);
    let dest_root = dest.root();
    for &e in &entry_points {
        graft(&mut dest, dest_root, &clone, e);
    }
    segment::materialize_tree(&dest, max_intensity)
}

/// Applies `roi.strategy` to `graph`, returning one `Tree` (`UNSET` /
/// `CENTROID` / `CENTROID_WEIGHTED`) or several (`EDGE` / `CONTAINED`).
pub fn apply(graph: &Graph, roi: &SomaRoi, max_intensity: f64) -> Vec<Tree> {
    match roi.strategy {
        SomaStrategy::Unset => vec![segment::materialize_tree(graph, max_intensity)],
        SomaStrategy::Edge => split_into_trees(graph, roi, max_intensity, false),
        SomaStrategy::Contained => split_into_trees(graph, roi, max_intensity, true),
        SomaStrategy::Centroid => vec![centroid_collapse(graph, roi, max_intensity, false)],
        SomaStrategy::CentroidWeighted => vec![centroid_collapse(graph, roi, max_intensity, true)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Spacing;

    fn v(x: i64, y: i64, z: i64, intensity: f64) -> Vertex {
        Vertex::new((x, y, z), Spacing::isotropic(1.0), intensity)
    }

    /// spec.md §8 scenario 4/6: three arms of a Y meeting at the junction,
    /// extending toward `(8,32)`, `(56,8)`, `(56,56)` from `(32,32)`.
    fn y_shaped_graph() -> Graph {
        let mut g = Graph::with_root(v(32, 32, 0, 255.0));
        let arms = [(8i64, 32i64), (56, 8), (56, 56)];
        for &(tx, ty) in &arms {
            let steps = 8;
            let mut cur = g.root();
            for s in 1..=steps {
                let x = 32 + (tx - 32) * s / steps;
                let y = 32 + (ty - 32) * s / steps;
                cur = g.add_child(cur, v(x, y, 0, 255.0));
            }
        }
        g
    }

    #[test]
    fn unset_strategy_is_a_pass_through() {
        let g = y_shaped_graph();
        let roi = SomaRoi::default();
        let trees = apply(&g, &roi, 255.0);
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn edge_split_of_a_y_produces_three_trees() {
        let g = y_shaped_graph();
        let roi = SomaRoi {
            center: (32.0, 32.0),
            radius: 6.0,
            z_plane: None,
            z_tolerance: f64::INFINITY,
            strategy: SomaStrategy::Edge,
        };
        let trees = apply(&g, &roi, 255.0);
        assert_eq!(trees.len(), 3, "one tree per arm once the junction soma is excised");
        for t in &trees {
            assert_eq!(t.paths.iter().filter(|p| p.parent_path.is_none()).count(), 1);
        }
    }

    #[test]
    fn contained_rejects_a_branch_that_dips_back_into_the_roi() {
        let mut g = y_shaped_graph();
        // bend one arm's tip back toward the junction, so its path re-enters
        // the ROI a second time further out.
        let arm_tip = {
            let mut cur = g.root();
            loop {
                let children = g.children_of(cur);
                if children.is_empty() || g.get(cur).unwrap().voxel == (8, 32, 0) {
                    break cur;
                }
                cur = children[0];
            }
        };
        g.add_child(arm_tip, v(30, 32, 0, 255.0)); // back inside radius 6 of (32,32)

        let roi_edge = SomaRoi {
            center: (32.0, 32.0),
            radius: 6.0,
            z_plane: None,
            z_tolerance: f64::INFINITY,
            strategy: SomaStrategy::Edge,
        };
        let edge_trees = apply(&g, &roi_edge, 255.0);
        assert_eq!(edge_trees.len(), 3, "EDGE keeps every exit regardless of re-entry");

        let roi_contained = SomaRoi { strategy: SomaStrategy::Contained, ..roi_edge };
        let contained_trees = apply(&g, &roi_contained, 255.0);
        assert_eq!(contained_trees.len(), 2, "CONTAINED discards the re-entrant arm");
    }

    #[test]
    fn centroid_collapse_leaves_a_single_rooted_tree() {
        let g = y_shaped_graph();
        let roi = SomaRoi {
            center: (32.0, 32.0),
            radius: 6.0,
            z_plane: None,
            z_tolerance: f64::INFINITY,
            strategy: SomaStrategy::Centroid,
        };
        let trees = apply(&g, &roi, 255.0);
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].paths.iter().filter(|p| p.parent_path.is_none()).count(), 1);
    }

    #[test]
    fn centroid_weighted_uses_the_mean_of_soma_vertices() {
        let g = y_shaped_graph();
        let roi = SomaRoi {
            center: (32.0, 32.0),
            radius: 6.0,
            z_plane: None,
            z_tolerance: f64::INFINITY,
            strategy: SomaStrategy::CentroidWeighted,
        };
        let trees = apply(&g, &roi, 255.0);
        assert_eq!(trees.len(), 1);
        // the junction is symmetric so the weighted mean should stay close
        // to the plain centroid.
        let root_pos = trees[0].paths[0].points[0];
        assert!((root_pos.0 - 32.0).abs() < 3.0);
        assert!((root_pos.1 - 32.0).abs() < 3.0);
    }
}
