//! Hierarchical pruning (spec.md §4.11): five phases that reduce an
//! over-reconstructed fast-marching tree to a clean skeleton.
//!
//! No teacher equivalent — grounded directly on spec.md §4.11. The
//! iterate-to-fixed-point shape of phases A/B/D/E mirrors
//! `search/focalsearch.rs`'s "keep passing until nothing changes" lower-bound
//! refinement loop. The coverage mask (phase C) and count mask (phase D's
//! joint-leaf pass) are grounded on `domains/hashedgrid.rs`'s
//! `HashSet`-of-touched-cells shape, generalized to `ahash` sets/maps keyed
//! by voxel coordinate rather than a single packed 2-D index.

use crate::trace::graph::{Graph, Vertex};
use crate::volume::Volume;
use std::collections::VecDeque;

/// Tunables for the five phases, all defaulted per spec.md §4.11.
#[derive(Clone, Debug)]
pub struct PruningParams {
    /// Background/foreground cutoff; overridden per-trace before pruning
    /// runs (usually the same threshold GWDT used).
    pub theta: f64,
    /// Maximum image intensity, used to normalize path lengths.
    pub max_intensity: f64,
    pub l_thresh: f64,
    pub sr_ratio: f64,
    pub sphere_overlap_threshold: f64,
    pub leaf_prune_overlap: f64,
    pub leaf_prune_enabled: bool,
}

impl Default for PruningParams {
    fn default() -> Self {
        Self {
            theta: 0.0,
            max_intensity: 255.0,
            l_thresh: 5.0,
            sr_ratio: 1.0 / 9.0,
            sphere_overlap_threshold: 0.10,
            leaf_prune_overlap: 0.9,
            leaf_prune_enabled: true,
        }
    }
}

/// Runs phases A through E in order, mutating `graph` in place.
pub fn prune(graph: &mut Graph, volume: &dyn Volume, params: &PruningParams) {
    phase_a_dark_leaf_trim(graph, params.theta);
    phase_b_dark_segment_removal(graph, params.theta);
    phase_c_coverage_prune(graph, volume, params);
    if params.leaf_prune_enabled {
        phase_d_leaf_prune(graph, volume, params);
        phase_d_joint_leaf_prune(graph, volume);
    }
    phase_e_short_dark_terminal_prune(graph, params);
}

/// Phase A: iteratively drop any leaf whose own voxel intensity is `<=
/// theta`, until a full pass removes nothing.
pub fn phase_a_dark_leaf_trim(graph: &mut Graph, theta: f64) {
    loop {
        let dark_leaves: Vec<usize> = graph
            .iter_alive()
            .filter(|&i| i != graph.root() && graph.is_leaf(i))
            .filter(|&i| graph.get(i).unwrap().intensity <= theta)
            .collect();
        if dark_leaves.is_empty() {
            break;
        }
        for idx in dark_leaves {
            if graph.is_alive(idx) && graph.is_leaf(idx) {
                graph.remove_leaf(idx);
            }
        }
    }
}

fn segment_stats(graph: &Graph, seg: &[usize], theta: f64) -> (f64, f64) {
    let n = seg.len() as f64;
    let avg = seg.iter().map(|&i| graph.get(i).unwrap().intensity).sum::<f64>() / n;
    let dark = seg.iter().filter(|&&i| graph.get(i).unwrap().intensity <= theta).count() as f64 / n;
    (avg, dark)
}

/// Phase B: for every leaf, walk its run up to the nearest branch point or
/// root; drop the whole run (branch point excluded) if its average
/// intensity is at or below `theta`, or a fifth of its voxels are.
pub fn phase_b_dark_segment_removal(graph: &mut Graph, theta: f64) {
    loop {
        let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != graph.root() && graph.is_leaf(i)).collect();
        let mut removed_any = false;
        for leaf in leaves {
            if !graph.is_alive(leaf) {
                continue;
            }
            let seg = graph.leaf_segment(leaf);
            let (avg, dark_fraction) = segment_stats(graph, &seg, theta);
            if avg <= theta || dark_fraction >= 0.20 {
                for idx in seg {
                    if graph.is_alive(idx) {
                        graph.remove_leaf(idx);
                    }
                }
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}

/// Sparse boolean mask over voxel coordinates, grounded on
/// `domains/hashedgrid.rs`'s touched-cell `HashSet`.
struct CoverageMask {
    covered: ahash::AHashSet<(i64, i64, i64)>,
}

impl CoverageMask {
    fn new() -> Self {
        Self {
            covered: ahash::AHashSet::default(),
        }
    }

    fn is_covered(&self, p: (i64, i64, i64)) -> bool {
        self.covered.contains(&p)
    }

    fn stamp(&mut self, voxels: &[(i64, i64, i64)]) {
        self.covered.extend(voxels.iter().copied());
    }

    fn overlap_fraction(&self, voxels: &[(i64, i64, i64)]) -> f64 {
        if voxels.is_empty() {
            return 0.0;
        }
        let covered = voxels.iter().filter(|v| self.covered.contains(v)).count();
        covered as f64 / voxels.len() as f64
    }
}

/// Every voxel within Euclidean radius `r` of `center`, restricted to a
/// single z-plane for a thin-Z (2-D) volume — spec.md §4.10's "spherical in
/// 3-D, annular in thin-Z" shape reused here for "sphere" stamps/overlaps.
fn sphere_voxels(center: (i64, i64, i64), r: i64, is_2d: bool) -> Vec<(i64, i64, i64)> {
    let mut out = Vec::new();
    let r = r.max(0);
    let z_range: Vec<i64> = if is_2d { vec![0] } else { (-r..=r).collect() };
    for dz in z_range {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy + dz * dz <= r * r {
                    out.push((center.0 + dx, center.1 + dy, center.2 + dz));
                }
            }
        }
    }
    out
}

/// Converts a vertex's physical-unit radius (spec.md §4.10) back to an
/// integer voxel radius, assuming isotropic XY the way radius estimation
/// itself does.
fn voxel_radius(v: &Vertex, volume: &dyn Volume) -> i64 {
    let sp = volume.spacing();
    let max_axis = sp.sx.max(sp.sy).max(sp.sz).max(1e-9);
    ((v.radius / max_axis).round() as i64).max(1)
}

fn bfs_normalized_distance(graph: &Graph, max_intensity: f64) -> Vec<f64> {
    let mut d = vec![0.0; graph.capacity()];
    let mut queue = VecDeque::new();
    queue.push_back(graph.root());
    while let Some(idx) = queue.pop_front() {
        for &child in graph.children_of(idx) {
            if graph.is_alive(child) {
                d[child] = d[idx] + graph.get(child).unwrap().intensity / max_intensity;
                queue.push_back(child);
            }
        }
    }
    d
}

/// Phase C: coverage-based hierarchical prune. The root is seeded as
/// already-claimed (its sphere is the mask's initial content), so every
/// leaf's walk toward the root is guaranteed to hit an already-claimed
/// vertex — spec.md's "if no claimed vertex is reached, defer" branch is
/// therefore unreachable here and is not modeled as a separate retry queue.
/// This relies on every leaf's walk passing through the root, i.e. a single
/// connected tree with no vertex unreachable from root at this point in the
/// pipeline; it is not a general substitute for the defer/retry loop if that
/// invariant is ever relaxed upstream.
pub fn phase_c_coverage_prune(graph: &mut Graph, volume: &dyn Volume, params: &PruningParams) {
    let is_2d = volume.is_2d();
    let root = graph.root();

    let mut mask = CoverageMask::new();
    let root_voxel = graph.get(root).unwrap().voxel;
    let root_radius = voxel_radius(graph.get(root).unwrap(), volume).max(5);
    mask.stamp(&sphere_voxels(root_voxel, root_radius, is_2d));

    let mut claimed = vec![false; graph.capacity()];
    claimed[root] = true;
    let mut marked_removal = vec![false; graph.capacity()];

    let d = bfs_normalized_distance(graph, params.max_intensity);
    let mut leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != root && graph.is_leaf(i)).collect();
    leaves.sort_by(|&a, &b| d[b].partial_cmp(&d[a]).unwrap());

    for leaf in leaves {
        let mut path_nodes = Vec::new();
        let mut cur = leaf;
        while !claimed[cur] {
            path_nodes.push(cur);
            cur = graph.parent_of(cur).expect("walk toward root must reach the claimed root");
        }
        if path_nodes.is_empty() {
            continue;
        }

        let path_length: f64 = path_nodes.iter().map(|&i| graph.get(i).unwrap().intensity / params.max_intensity).sum();
        if path_length < params.l_thresh {
            for &i in &path_nodes {
                marked_removal[i] = true;
            }
            continue;
        }

        let mut sum_signal = 0.0;
        let mut sum_redundant = 0.0;
        for &i in &path_nodes {
            let v = graph.get(i).unwrap();
            let r = voxel_radius(v, volume);
            let voxels = sphere_voxels(v.voxel, r, is_2d);
            let redundant = mask.is_covered(v.voxel) || mask.overlap_fraction(&voxels) > params.sphere_overlap_threshold;
            if redundant {
                sum_redundant += v.intensity;
            } else {
                sum_signal += v.intensity;
            }
        }

        let keep = sum_redundant == 0.0 || (sum_signal / sum_redundant >= params.sr_ratio && sum_signal >= 256.0);
        if keep {
            for &i in &path_nodes {
                claimed[i] = true;
                let v = graph.get(i).unwrap();
                let r = voxel_radius(v, volume);
                mask.stamp(&sphere_voxels(v.voxel, r, is_2d));
            }
        } else {
            for &i in &path_nodes {
                marked_removal[i] = true;
            }
        }
    }

    loop {
        let to_remove: Vec<usize> = graph.iter_alive().filter(|&i| marked_removal[i] && graph.is_leaf(i)).collect();
        if to_remove.is_empty() {
            break;
        }
        for idx in to_remove {
            graph.remove_leaf(idx);
        }
    }
}

/// Sum of image intensity over `voxels` that fall in-bounds, split into
/// (total, the portion also satisfying `predicate`).
fn intensity_split(volume: &dyn Volume, voxels: &[(i64, i64, i64)], predicate: impl Fn((i64, i64, i64)) -> bool) -> (f64, f64) {
    let mut total = 0.0;
    let mut matched = 0.0;
    for &p in voxels {
        if !volume.contains(p.0, p.1, p.2) {
            continue;
        }
        let i = volume.get(p.0, p.1, p.2);
        total += i;
        if predicate(p) {
            matched += i;
        }
    }
    (total, matched)
}

/// Phase D (leaf half): drop any true leaf whose sphere is intensity-weighted
/// `>= leaf_prune_overlap` contained within its parent's sphere.
pub fn phase_d_leaf_prune(graph: &mut Graph, volume: &dyn Volume, params: &PruningParams) {
    let is_2d = volume.is_2d();
    loop {
        let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != graph.root() && graph.is_leaf(i)).collect();
        let mut removed_any = false;
        for leaf in leaves {
            if !graph.is_alive(leaf) {
                continue;
            }
            let Some(parent) = graph.parent_of(leaf) else { continue };
            let leaf_v = graph.get(leaf).unwrap().clone();
            let parent_v = graph.get(parent).unwrap().clone();
            let r_leaf = voxel_radius(&leaf_v, volume);
            let r_parent = voxel_radius(&parent_v, volume);
            let voxels = sphere_voxels(leaf_v.voxel, r_leaf, is_2d);
            let (total, inside_parent) = intensity_split(volume, &voxels, |p| {
                let dx = p.0 - parent_v.voxel.0;
                let dy = p.1 - parent_v.voxel.1;
                let dz = p.2 - parent_v.voxel.2;
                dx * dx + dy * dy + dz * dz <= r_parent * r_parent
            });
            let overlap = if total > 0.0 { inside_parent / total } else { 0.0 };
            if overlap >= params.leaf_prune_overlap {
                graph.remove_leaf(leaf);
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}

/// Phase D (joint-leaf half): an integer count mask tracks how many
/// vertices' spheres cover each voxel; leaves whose sphere is mostly
/// multiply-covered are redundant and pruned, decrementing only voxels that
/// still have other coverage so the mask never underflows.
pub fn phase_d_joint_leaf_prune(graph: &mut Graph, volume: &dyn Volume) {
    let is_2d = volume.is_2d();
    let mut count: ahash::AHashMap<(i64, i64, i64), u32> = ahash::AHashMap::default();
    for idx in graph.iter_alive().collect::<Vec<_>>() {
        let v = graph.get(idx).unwrap().clone();
        let r = voxel_radius(&v, volume);
        for p in sphere_voxels(v.voxel, r, is_2d) {
            *count.entry(p).or_insert(0) += 1;
        }
    }

    loop {
        let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != graph.root() && graph.is_leaf(i)).collect();
        let mut removed_any = false;
        for leaf in leaves {
            if !graph.is_alive(leaf) {
                continue;
            }
            let v = graph.get(leaf).unwrap().clone();
            let r = voxel_radius(&v, volume);
            let voxels = sphere_voxels(v.voxel, r, is_2d);
            let (total, multi) = intensity_split(volume, &voxels, |p| count.get(&p).copied().unwrap_or(0) > 1);
            let fraction = if total > 0.0 { multi / total } else { 0.0 };
            if fraction >= 0.9 {
                for p in &voxels {
                    if let Some(c) = count.get_mut(p) {
                        if *c > 1 {
                            *c -= 1;
                        }
                    }
                }
                graph.remove_leaf(leaf);
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}

/// Phase E: iteratively drop any leaf run whose intensity-normalized length
/// is short, or whose intensity statistics look like background, exactly
/// like phase B but gated on path length rather than a fixed 20% rule alone.
pub fn phase_e_short_dark_terminal_prune(graph: &mut Graph, params: &PruningParams) {
    loop {
        let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != graph.root() && graph.is_leaf(i)).collect();
        let mut removed_any = false;
        for leaf in leaves {
            if !graph.is_alive(leaf) {
                continue;
            }
            let seg = graph.leaf_segment(leaf);
            let norm_length: f64 = seg.iter().map(|&i| graph.get(i).unwrap().intensity / params.max_intensity).sum();
            let (avg, dark_fraction) = segment_stats(graph, &seg, params.theta);
            if norm_length < params.l_thresh || avg <= params.theta || dark_fraction > 0.20 {
                for idx in seg {
                    if graph.is_alive(idx) {
                        graph.remove_leaf(idx);
                    }
                }
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{DenseVolume, Spacing};

    fn v(x: i64, y: i64, z: i64, intensity: f64) -> Vertex {
        let mut vx = Vertex::new((x, y, z), Spacing::isotropic(1.0), intensity);
        vx.radius = 1.0;
        vx
    }

    #[test]
    fn phase_a_removes_dark_leaf_but_keeps_bright_trunk() {
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        let a = g.add_child(g.root(), v(1, 0, 0, 200.0));
        g.add_child(a, v(2, 0, 0, 5.0));
        phase_a_dark_leaf_trim(&mut g, 10.0);
        assert_eq!(g.alive_count(), 2);
        assert!(g.is_leaf(a));
    }

    #[test]
    fn phase_b_removes_whole_dark_spur() {
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        let trunk = g.add_child(g.root(), v(1, 0, 0, 200.0));
        // branch point
        let spur1 = g.add_child(trunk, v(2, 0, 0, 5.0));
        g.add_child(spur1, v(3, 0, 0, 5.0));
        g.add_child(trunk, v(2, 1, 0, 200.0));
        phase_b_dark_segment_removal(&mut g, 10.0);
        assert!(!g.is_alive(spur1));
        assert!(g.is_alive(trunk));
    }

    #[test]
    fn phase_c_keeps_the_main_trunk_reaching_a_distant_leaf() {
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        let mut cur = g.root();
        for i in 1..=20 {
            cur = g.add_child(cur, v(i, 0, 0, 200.0));
        }
        let volume = DenseVolume::new(25, 5, 1, Spacing::isotropic(1.0));
        let params = PruningParams {
            theta: 0.0,
            max_intensity: 200.0,
            ..Default::default()
        };
        phase_c_coverage_prune(&mut g, &volume, &params);
        assert!(g.is_alive(cur), "the long bright trunk should survive coverage pruning");
    }

    #[test]
    fn joint_leaf_prune_never_removes_the_only_covering_leaf() {
        let mut g = Graph::with_root(v(0, 0, 0, 200.0));
        g.add_child(g.root(), v(1, 0, 0, 200.0));
        let volume = DenseVolume::new(5, 5, 1, Spacing::isotropic(1.0));
        phase_d_joint_leaf_prune(&mut g, &volume);
        assert_eq!(g.alive_count(), 2);
    }
}
