//! Dijkstra (heuristic = 0) / A* unidirectional search engine.
//!
//! Bookkeeping follows `search/astar.rs` in the teacher almost exactly: pop
//! min from open, mark closed, expand neighbors, and on a cheaper `f` either
//! `decrease_key` (still open) or re-insert (already closed — spec.md §4.4
//! explicitly retains this re-open branch for inconsistent heuristics). The
//! teacher does this with a stale-entry-filtered `BinaryHeap`; here we use
//! the addressable [`crate::queue::PairingHeap`] so the closed case can be
//! told apart from "never seen" without scanning.

use crate::cost::{Cost, Heuristic};
use crate::grid::{NodeStatus, SearchNodeGrid, UniSearchNode};
use crate::queue::{PairingHeap, SearchKey};
use crate::search::{
    reconstruct_path, ExitReason, PollClock, ProgressCallback, SearchConfig, SearchStats, CNN_26,
};
use crate::volume::Volume;

/// Outcome of a unidirectional search: the voxel path (if the goal predicate
/// was satisfied) and statistics including the exit reason.
pub struct SearchResult {
    pub path: Option<Vec<(i64, i64, i64)>>,
    pub cost: f64,
    pub stats: SearchStats,
}

/// Runs Dijkstra/A* from `start` toward `goal` until `is_goal` is satisfied
/// or the open heap is exhausted. `goal` feeds §4.4's `h' =
/// heuristic(n, goal)·minStepCost`; pass [`crate::cost::ZeroHeuristic`] (which
/// ignores it) for Dijkstra, or any point the `is_goal` predicate itself
/// doesn't reduce to when searching for something other than a single voxel.
pub fn search(
    volume: &dyn Volume,
    cost: &dyn Cost,
    heuristic: &dyn Heuristic,
    start: (i64, i64, i64),
    goal: (i64, i64, i64),
    is_goal: impl Fn((i64, i64, i64)) -> bool,
    cfg: &SearchConfig,
    progress: &mut dyn ProgressCallback,
) -> SearchResult {
    let mut grid: SearchNodeGrid<UniSearchNode> =
        SearchNodeGrid::new(volume.x_range(), volume.y_range());
    let mut heap: PairingHeap<SearchKey, (i64, i64, i64)> = PairingHeap::new();
    let min_step = cost.min_step_cost();

    {
        let node = grid.get_or_insert_with(start, || UniSearchNode::new(start));
        node.g = 0.0;
        node.h = heuristic.estimate(start, goal) * min_step;
        node.status = NodeStatus::OpenFromStart;
        node.handle = Some(heap.insert(
            SearchKey {
                f: node.f(),
                pos: start,
            },
            start,
        ));
    }

    let mut clock = PollClock::new();
    let mut closed_count = 0usize;
    let mut reached_goal: Option<(i64, i64, i64)> = None;

    let exit_reason = loop {
        let Some((_, pos)) = heap.delete_min() else {
            break ExitReason::PointsExhausted;
        };

        {
            let node = grid.get_mut(pos).expect("popped position must exist");
            if node.status == NodeStatus::ClosedFromStart {
                // Stale entry left behind by a prior decrease-key on an
                // already-closed node — see the re-open comment above.
                continue;
            }
            node.status = NodeStatus::ClosedFromStart;
            node.handle = None;
        }
        closed_count += 1;

        if is_goal(pos) {
            reached_goal = Some(pos);
            break ExitReason::Success;
        }

        let g_pos = grid.get(pos).unwrap().g;

        for (dx, dy, dz) in CNN_26 {
            let n = (pos.0 + dx, pos.1 + dy, pos.2 + dz);
            if !volume.contains(n.0, n.1, n.2) {
                continue;
            }
            let step_cost = volume.spacing().physical_distance(pos, n)
                * cost.cost_moving_to(volume.get(n.0, n.1, n.2)).max(min_step);
            let tentative_g = g_pos + step_cost;
            let tentative_h = heuristic.estimate(n, goal) * min_step;
            let tentative_f = tentative_g + tentative_h;

            let existing = grid.get(n).map(|node| (node.status, node.f()));
            match existing {
                None => {
                    let node = grid.get_or_insert_with(n, || UniSearchNode::new(n));
                    node.g = tentative_g;
                    node.h = tentative_h;
                    node.predecessor = Some(pos);
                    node.status = NodeStatus::OpenFromStart;
                    node.handle = Some(heap.insert(
                        SearchKey {
                            f: tentative_f,
                            pos: n,
                        },
                        n,
                    ));
                }
                Some((status, existing_f)) if tentative_f < existing_f => {
                    let reopen = status == NodeStatus::ClosedFromStart;
                    let node = grid.get_mut(n).unwrap();
                    node.g = tentative_g;
                    node.h = tentative_h;
                    node.predecessor = Some(pos);
                    node.status = NodeStatus::OpenFromStart;
                    let new_key = SearchKey {
                        f: tentative_f,
                        pos: n,
                    };
                    if reopen {
                        node.handle = Some(heap.insert(new_key, n));
                    } else if let Some(handle) = node.handle {
                        heap.decrease_key(handle, new_key);
                    }
                }
                _ => {}
            }
        }

        if clock.tick() {
            if let Some(reason) = clock.should_stop(cfg) {
                break reason;
            }
        }
        clock.maybe_report(cfg, progress, heap.len(), closed_count);
    };

    progress.finished(exit_reason == ExitReason::Success);

    let (path, total_cost) = match reached_goal {
        Some(goal_pos) => {
            let path = reconstruct_path(
                |p| grid.get(p).and_then(|n| n.predecessor),
                goal_pos,
            );
            let cost = grid.get(goal_pos).unwrap().g;
            (Some(path), cost)
        }
        None => (None, f64::INFINITY),
    };

    SearchResult {
        path,
        cost: total_cost,
        stats: SearchStats {
            open_count: heap.len(),
            closed_count,
            iterations: clock.iterations,
            exit_reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{ReciprocalCost, ZeroHeuristic};
    use crate::search::NullProgress;
    use crate::volume::{DenseVolume, Spacing};

    /// Scenario 1 in spec.md §8: a 20x1x1 bright line, Dijkstra end to end.
    #[test]
    fn straight_bright_line_dijkstra() {
        let mut volume = DenseVolume::new(20, 1, 1, Spacing::isotropic(1.0));
        for x in 0..20 {
            volume.set(x, 0, 0, 255.0);
        }
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let heuristic = ZeroHeuristic;
        let cfg = SearchConfig::unbounded();
        let mut progress = NullProgress;
        let result = search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (19, 0, 0),
            |p| p == (19, 0, 0),
            &cfg,
            &mut progress,
        );
        let path = result.path.expect("path must be found");
        assert_eq!(path.len(), 20);
        assert_eq!(path[0], (0, 0, 0));
        assert_eq!(path[19], (19, 0, 0));
        assert_eq!(result.stats.exit_reason, ExitReason::Success);
        assert!((result.cost - 19.0 * cost.min_step_cost()).abs() < 1e-9);
    }

    /// A* with the real (non-zero) Euclidean heuristic must reach the same
    /// optimal cost as Dijkstra but close strictly fewer nodes on a uniform
    /// open field, proving `goal` actually reaches `heuristic.estimate` in
    /// the neighbor-expansion loop rather than collapsing to `h' = 0`.
    #[test]
    fn astar_with_euclidean_heuristic_closes_fewer_nodes_than_dijkstra() {
        use crate::cost::EuclideanHeuristic;

        let mut volume = DenseVolume::new(20, 20, 1, Spacing::isotropic(1.0));
        for x in 0..20 {
            for y in 0..20 {
                volume.set(x, y, 0, 255.0);
            }
        }
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let cfg = SearchConfig::unbounded();

        let mut p_dij = NullProgress;
        let dijkstra = search(
            &volume,
            &cost,
            &ZeroHeuristic,
            (0, 0, 0),
            (19, 19, 0),
            |p| p == (19, 19, 0),
            &cfg,
            &mut p_dij,
        );

        let mut p_astar = NullProgress;
        let heuristic = EuclideanHeuristic {
            sx: 1.0,
            sy: 1.0,
            sz: 1.0,
        };
        let astar = search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (19, 19, 0),
            |p| p == (19, 19, 0),
            &cfg,
            &mut p_astar,
        );

        assert_eq!(dijkstra.stats.exit_reason, ExitReason::Success);
        assert_eq!(astar.stats.exit_reason, ExitReason::Success);
        assert!((dijkstra.cost - astar.cost).abs() < 1e-6);
        assert!(
            astar.stats.closed_count < dijkstra.stats.closed_count,
            "astar closed {} nodes, dijkstra closed {} — heuristic is not guiding the search",
            astar.stats.closed_count,
            dijkstra.stats.closed_count
        );
    }

    #[test]
    fn unreachable_goal_exhausts_points() {
        let volume = DenseVolume::new(3, 3, 1, Spacing::isotropic(1.0));
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let heuristic = ZeroHeuristic;
        let cfg = SearchConfig::unbounded();
        let mut progress = NullProgress;
        let result = search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (100, 100, 0),
            |p| p == (100, 100, 0),
            &cfg,
            &mut progress,
        );
        assert!(result.path.is_none());
        assert_eq!(result.stats.exit_reason, ExitReason::PointsExhausted);
    }
}
