//! BFS connectivity sweep (spec.md §4.12): after pruning, drops any vertex
//! unreachable from the root. Grounded directly on `search/uninformed.rs`'s
//! `Bfs` frontier shape, walking parent-to-child edges instead of a grid's
//! neighbor offsets.

use crate::trace::graph::Graph;
use std::collections::VecDeque;

/// Removes every vertex not reachable from the root via parent/child edges.
/// With [`Graph::remove_leaf`] as the only removal primitive, a
/// well-formed `Graph` can never actually become disconnected — this sweep
/// exists as the defensive check spec.md calls for, and should always find
/// nothing to do.
pub fn sweep(graph: &mut Graph) {
    let root = graph.root();
    let mut reached = vec![false; graph.capacity()];
    reached[root] = true;
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(idx) = queue.pop_front() {
        for &child in graph.children_of(idx) {
            if graph.is_alive(child) && !reached[child] {
                reached[child] = true;
                queue.push_back(child);
            }
        }
    }

    let unreached_roots: Vec<usize> = graph
        .iter_alive()
        .filter(|&idx| !reached[idx])
        .filter(|&idx| graph.parent_of(idx).map_or(true, |p| reached[p]))
        .collect();
    for idx in unreached_roots {
        if graph.is_alive(idx) {
            graph.remove_subtree(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::graph::Vertex;
    use crate::volume::Spacing;

    #[test]
    fn well_formed_graph_is_left_untouched() {
        let mut g = Graph::with_root(Vertex::new((0, 0, 0), Spacing::isotropic(1.0), 1.0));
        g.add_child(g.root(), Vertex::new((1, 0, 0), Spacing::isotropic(1.0), 1.0));
        let before = g.alive_count();
        sweep(&mut g);
        assert_eq!(g.alive_count(), before);
    }
}
