//! Arclength resampling (spec.md §4.14): within each leaf-to-branch-point
//! run, keep a point only once the accumulated physical arc length since the
//! last kept point reaches `step * avgSpacing`; branch points and the leaf
//! tip are always kept. Dropping a point rewires its parent edge to each of
//! its children via [`Graph::splice_out`], written defensively even though a
//! run's interior points have exactly one child by construction.

use crate::trace::graph::Graph;

#[derive(Clone, Copy, Debug)]
pub struct ResampleParams {
    pub step: f64,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self { step: 2.0 }
    }
}

fn euclidean(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    let dz = a.2 - b.2;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Mean of the three axis spacings, the "avgSpacing" spec.md's step formula
/// scales by.
pub fn average_spacing(spacing: crate::volume::Spacing) -> f64 {
    (spacing.sx + spacing.sy + spacing.sz) / 3.0
}

/// Resamples every leaf-to-branch run in `graph`, walking from the pinned
/// branch/root anchor outward to the leaf tip so arc length always
/// accumulates away from the fixed end.
pub fn resample(graph: &mut Graph, avg_spacing: f64, params: &ResampleParams) {
    let target = (params.step * avg_spacing).max(1e-9);
    let root = graph.root();
    let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != root && graph.is_leaf(i)).collect();

    for leaf in leaves {
        if !graph.is_alive(leaf) {
            continue;
        }
        let seg = graph.leaf_segment(leaf); // [leaf, ..., nearest-to-anchor]
        if seg.is_empty() {
            continue;
        }
        let Some(anchor) = graph.parent_of(*seg.last().unwrap()) else {
            continue;
        };

        // `prev_pos` always advances to the current point regardless of
        // whether it is kept, so `acc` sums actual edge lengths along the
        // path rather than chord distance from the last kept point.
        let mut prev_pos = graph.get(anchor).unwrap().pos;
        let mut acc = 0.0;
        for (i, &idx) in seg.iter().enumerate().rev() {
            let pos = graph.get(idx).unwrap().pos;
            acc += euclidean(prev_pos, pos);
            prev_pos = pos;
            let is_leaf_tip = i == 0;
            if acc >= target || is_leaf_tip {
                acc = 0.0;
            } else {
                graph.splice_out(idx);
            }
        }
    }
}
