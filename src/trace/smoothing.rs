//! Triangular moving-average smoothing (spec.md §4.13): each leaf-to-branch
//! run gets its interior points' `(x, y, z, radius)` blended with a
//! triangular window, leaf and branch-point endpoints pinned.
//!
//! Grounded on `util/matrix.rs::gaussian_kernal`/`convolve2d_with_resolution`'s
//! weighted-window idiom, specialized from a 2-D image kernel to a 1-D
//! triangular window over a path.

use crate::trace::graph::Graph;

#[derive(Clone, Copy, Debug)]
pub struct SmoothingParams {
    /// Full window size; half-window `h = window_size / 2` (integer
    /// division, per spec.md §4.13).
    pub window_size: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { window_size: 5 }
    }
}

/// Triangular weight for offset `j` (`0..=h`) from the window center,
/// spec.md's "center weight `1+h`; a neighbor at offset `j` gets weight
/// `1+h-j`".
fn weight(h: i64, j: i64) -> f64 {
    (1 + h - j.abs()) as f64
}

/// Smooths every leaf-to-branch-point (or leaf-to-root) run in `graph`.
/// Smoothing reads from a per-segment snapshot of the original coordinates
/// so a vertex's update never sees an already-smoothed neighbor — spec.md's
/// "smoothing of consecutive nodes does not cascade".
pub fn smooth(graph: &mut Graph, params: &SmoothingParams) {
    let h = (params.window_size / 2) as i64;
    if h == 0 {
        return;
    }
    let root = graph.root();
    let leaves: Vec<usize> = graph.iter_alive().filter(|&i| i != root && graph.is_leaf(i)).collect();

    for leaf in leaves {
        // leaf-to-anchor run, anchor (nearest branch point or root) appended
        // and pinned as the run's far endpoint.
        let mut seg = graph.leaf_segment(leaf);
        let anchor = graph.parent_of(*seg.last().unwrap());
        if let Some(anchor) = anchor {
            seg.push(anchor);
        }
        let n = seg.len();
        if n < 3 {
            continue; // nothing interior to smooth
        }

        let snapshot: Vec<(f64, f64, f64, f64)> = seg
            .iter()
            .map(|&i| {
                let v = graph.get(i).unwrap();
                (v.pos.0, v.pos.1, v.pos.2, v.radius)
            })
            .collect();

        for idx in 1..n - 1 {
            let mut acc = (0.0, 0.0, 0.0, 0.0);
            let mut wsum = 0.0;
            for j in -h..=h {
                let k = idx as i64 + j;
                if k < 0 || k >= n as i64 {
                    continue;
                }
                let w = weight(h, j);
                let p = snapshot[k as usize];
                acc.0 += w * p.0;
                acc.1 += w * p.1;
                acc.2 += w * p.2;
                acc.3 += w * p.3;
                wsum += w;
            }
            let vertex = graph.get_mut(seg[idx]).unwrap();
            vertex.pos = (acc.0 / wsum, acc.1 / wsum, acc.2 / wsum);
            vertex.radius = acc.3 / wsum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::graph::Vertex;
    use crate::volume::Spacing;

    fn v(x: i64, y: i64, z: i64) -> Vertex {
        Vertex::new((x, y, z), Spacing::isotropic(1.0), 1.0)
    }

    #[test]
    fn endpoints_never_move() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let mut cur = g.root();
        for i in 1..=6 {
            cur = g.add_child(cur, v(i, 0, 0));
        }
        let root_pos_before = g.get(g.root()).unwrap().pos;
        let leaf_pos_before = g.get(cur).unwrap().pos;
        smooth(&mut g, &SmoothingParams { window_size: 3 });
        assert_eq!(g.get(g.root()).unwrap().pos, root_pos_before);
        assert_eq!(g.get(cur).unwrap().pos, leaf_pos_before);
    }

    #[test]
    fn smoothing_a_straight_line_does_not_move_interior_points() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let mut cur = g.root();
        let mut mid = cur;
        for i in 1..=6 {
            cur = g.add_child(cur, v(i, 0, 0));
            if i == 3 {
                mid = cur;
            }
        }
        let before = g.get(mid).unwrap().pos;
        smooth(&mut g, &SmoothingParams { window_size: 3 });
        let after = g.get(mid).unwrap().pos;
        assert!((before.0 - after.0).abs() < 1e-9);
    }

    #[test]
    fn branch_points_never_move() {
        let mut g = Graph::with_root(v(0, 0, 0));
        let trunk = g.add_child(g.root(), v(1, 0, 0));
        let arm_a = g.add_child(trunk, v(2, 0, 0));
        g.add_child(arm_a, v(3, 0, 0));
        let arm_b = g.add_child(trunk, v(2, 1, 0));
        g.add_child(arm_b, v(3, 1, 0));
        let trunk_pos = g.get(trunk).unwrap().pos;
        smooth(&mut g, &SmoothingParams { window_size: 3 });
        assert_eq!(g.get(trunk).unwrap().pos, trunk_pos);
    }
}
