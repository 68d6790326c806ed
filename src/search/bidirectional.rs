//! Bidirectional A* with the Pijls-Post meeting criterion.
//!
//! Grounded on `examples/other_examples/...ch_bidirectional_dijkstra.rs.rs`
//! (`fknop-hermes`)'s forward/backward heap + `NodeData` + "best meeting
//! node" shape — the teacher repo has no bidirectional search to draw on, so
//! this module's control flow comes from that reference file instead, while
//! its doc-comment density and heap/grid plumbing matches the rest of this
//! crate's `search` module.

use crate::cost::{Cost, Heuristic};
use crate::grid::{BiSearchNode, DirState, SearchNodeGrid};
use crate::queue::{PairingHeap, SearchKey};
use crate::search::{
    reconstruct_path, ExitReason, PollClock, ProgressCallback, SearchConfig, SearchStats, CNN_26,
};
use crate::volume::Volume;

pub struct SearchResult {
    pub path: Option<Vec<(i64, i64, i64)>>,
    pub cost: f64,
    pub stats: SearchStats,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Start,
    Goal,
}

/// Runs Pijls-Post bidirectional A* between `start` and `goal`. Unlike the
/// unidirectional engine, the goal here is a single voxel (not a predicate)
/// because the reverse frontier must expand from a concrete point.
pub fn search(
    volume: &dyn Volume,
    cost: &dyn Cost,
    heuristic: &dyn Heuristic,
    start: (i64, i64, i64),
    goal: (i64, i64, i64),
    cfg: &SearchConfig,
    progress: &mut dyn ProgressCallback,
) -> SearchResult {
    let mut grid: SearchNodeGrid<BiSearchNode> =
        SearchNodeGrid::new(volume.x_range(), volume.y_range());
    let mut open_start: PairingHeap<SearchKey, (i64, i64, i64)> = PairingHeap::new();
    let mut open_goal: PairingHeap<SearchKey, (i64, i64, i64)> = PairingHeap::new();
    let min_step = cost.min_step_cost();

    {
        let n = grid.get_or_insert_with(start, || BiSearchNode::new(start));
        n.g_from_start = 0.0;
        n.f_from_start = heuristic.estimate(start, goal) * min_step;
        n.state_from_start = DirState::Open;
        n.handle_from_start = Some(open_start.insert(
            SearchKey {
                f: n.f_from_start,
                pos: start,
            },
            start,
        ));
    }
    {
        let n = grid.get_or_insert_with(goal, || BiSearchNode::new(goal));
        n.g_from_goal = 0.0;
        n.f_from_goal = heuristic.estimate(goal, start) * min_step;
        n.state_from_goal = DirState::Open;
        n.handle_from_goal = Some(open_goal.insert(
            SearchKey {
                f: n.f_from_goal,
                pos: goal,
            },
            goal,
        ));
    }

    let mut best_path_length = f64::INFINITY;
    let mut touch_node: Option<(i64, i64, i64)> = None;
    let mut clock = PollClock::new();
    let mut closed_count = 0usize;

    let exit_reason = loop {
        if open_start.is_empty() || open_goal.is_empty() {
            break if touch_node.is_some() {
                ExitReason::Success
            } else {
                ExitReason::PointsExhausted
            };
        }

        // Expand the frontier of smaller size; ties favor from-start.
        let direction = if open_start.len() <= open_goal.len() {
            Direction::Start
        } else {
            Direction::Goal
        };

        let (_, pos) = match direction {
            Direction::Start => open_start.delete_min().unwrap(),
            Direction::Goal => open_goal.delete_min().unwrap(),
        };

        let already_closed = {
            let n = grid.get(pos).unwrap();
            match direction {
                Direction::Start => n.state_from_start == DirState::Closed,
                Direction::Goal => n.state_from_goal == DirState::Closed,
            }
        };
        if already_closed {
            continue;
        }

        // Pijls-Post rejection test: skip expansion (but the node is still
        // marked closed) if either inequality holds.
        let (g_p, f_p, other_endpoint, same_endpoint) = {
            let n = grid.get(pos).unwrap();
            match direction {
                Direction::Start => (n.g_from_start, n.f_from_start, goal, start),
                Direction::Goal => (n.g_from_goal, n.f_from_goal, start, goal),
            }
        };
        let other_open_best_f = match direction {
            Direction::Start => open_goal.peek().map(|(k, _)| k.f),
            Direction::Goal => open_start.peek().map(|(k, _)| k.f),
        };

        {
            let n = grid.get_mut(pos).unwrap();
            match direction {
                Direction::Start => {
                    n.state_from_start = DirState::Closed;
                    n.handle_from_start = None;
                }
                Direction::Goal => {
                    n.state_from_goal = DirState::Closed;
                    n.handle_from_goal = None;
                }
            }
        }
        closed_count += 1;

        let reject = {
            let test_a = g_p + heuristic.estimate(pos, other_endpoint) * min_step >= best_path_length;
            let test_b = match other_open_best_f {
                Some(best_f_other) => {
                    g_p + best_f_other - heuristic.estimate(pos, same_endpoint) * min_step
                        >= best_path_length
                }
                None => false,
            };
            test_a || test_b
        };

        if !reject {
            for (dx, dy, dz) in CNN_26 {
                let nb = (pos.0 + dx, pos.1 + dy, pos.2 + dz);
                if !volume.contains(nb.0, nb.1, nb.2) {
                    continue;
                }
                let step_cost = volume.spacing().physical_distance(pos, nb)
                    * cost.cost_moving_to(volume.get(nb.0, nb.1, nb.2)).max(min_step);
                let tentative_g = g_p + step_cost;

                let (existing_state, existing_f, opposite_g) = {
                    let n = grid.get(nb);
                    match (direction, n) {
                        (Direction::Start, Some(n)) => {
                            (n.state_from_start, n.f_from_start, n.g_from_goal)
                        }
                        (Direction::Goal, Some(n)) => {
                            (n.state_from_goal, n.f_from_goal, n.g_from_start)
                        }
                        (_, None) => (DirState::Free, f64::INFINITY, f64::INFINITY),
                    }
                };

                let tentative_h = heuristic.estimate(nb, other_endpoint) * min_step;
                let tentative_f = tentative_g + tentative_h;

                if existing_state == DirState::Free || tentative_f < existing_f {
                    let reopen = existing_state == DirState::Closed;
                    let n = grid.get_or_insert_with(nb, || BiSearchNode::new(nb));
                    let new_key = SearchKey {
                        f: tentative_f,
                        pos: nb,
                    };
                    match direction {
                        Direction::Start => {
                            n.g_from_start = tentative_g;
                            n.f_from_start = tentative_f;
                            n.pred_from_start = Some(pos);
                            n.state_from_start = DirState::Open;
                            if reopen || n.handle_from_start.is_none() {
                                n.handle_from_start = Some(open_start.insert(new_key, nb));
                            } else if let Some(h) = n.handle_from_start {
                                open_start.decrease_key(h, new_key);
                            }
                        }
                        Direction::Goal => {
                            n.g_from_goal = tentative_g;
                            n.f_from_goal = tentative_f;
                            n.pred_from_goal = Some(pos);
                            n.state_from_goal = DirState::Open;
                            if reopen || n.handle_from_goal.is_none() {
                                n.handle_from_goal = Some(open_goal.insert(new_key, nb));
                            } else if let Some(h) = n.handle_from_goal {
                                open_goal.decrease_key(h, new_key);
                            }
                        }
                    }

                    // Meeting-cost check uses the post-update g of both
                    // directions, per spec.md §4.5 / §9's open question.
                    if opposite_g.is_finite() {
                        let meeting_cost = tentative_g + opposite_g;
                        if meeting_cost < best_path_length {
                            best_path_length = meeting_cost;
                            touch_node = Some(nb);
                        }
                    }
                }
            }
        }

        if clock.tick() {
            if let Some(reason) = clock.should_stop(cfg) {
                break reason;
            }
        }
        clock.maybe_report(
            cfg,
            progress,
            open_start.len() + open_goal.len(),
            closed_count,
        );
    };

    progress.finished(exit_reason == ExitReason::Success && touch_node.is_some());

    let (path, total_cost) = match touch_node {
        Some(touch) if exit_reason == ExitReason::Success => {
            let forward = reconstruct_path(|p| grid.get(p).and_then(|n| n.pred_from_start), touch);
            let mut backward =
                reconstruct_path(|p| grid.get(p).and_then(|n| n.pred_from_goal), touch);
            backward.reverse();
            let mut full = forward;
            full.extend(backward.into_iter().skip(1));
            (Some(full), best_path_length)
        }
        _ => (None, f64::INFINITY),
    };

    SearchResult {
        path,
        cost: total_cost,
        stats: SearchStats {
            open_count: open_start.len() + open_goal.len(),
            closed_count,
            iterations: clock.iterations,
            exit_reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{EuclideanHeuristic, ReciprocalCost};
    use crate::search::unidirectional;
    use crate::search::NullProgress;
    use crate::volume::{DenseVolume, Spacing};

    /// Scenario 2 in spec.md §8: bidirectional and unidirectional A* agree on
    /// total cost for the same inputs.
    #[test]
    fn bidirectional_matches_unidirectional_cost() {
        let mut volume = DenseVolume::new(10, 10, 10, Spacing::isotropic(1.0));
        for x in 0..10 {
            for y in 0..10 {
                for z in 0..10 {
                    volume.set(x, y, z, 200.0);
                }
            }
        }
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let heuristic = EuclideanHeuristic {
            sx: 1.0,
            sy: 1.0,
            sz: 1.0,
        };
        let cfg = SearchConfig::unbounded();
        let mut p1 = NullProgress;
        let mut p2 = NullProgress;

        let bi = search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (9, 9, 9),
            &cfg,
            &mut p1,
        );
        let uni = unidirectional::search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (9, 9, 9),
            |p| p == (9, 9, 9),
            &cfg,
            &mut p2,
        );

        assert_eq!(bi.stats.exit_reason, ExitReason::Success);
        assert_eq!(uni.stats.exit_reason, ExitReason::Success);
        assert!((bi.cost - uni.cost).abs() < 1e-6, "{} vs {}", bi.cost, uni.cost);
    }

    #[test]
    fn no_path_when_goal_is_out_of_bounds_of_both_frontiers() {
        let volume = DenseVolume::new(3, 3, 1, Spacing::isotropic(1.0));
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let heuristic = EuclideanHeuristic {
            sx: 1.0,
            sy: 1.0,
            sz: 1.0,
        };
        let cfg = SearchConfig::unbounded();
        let mut progress = NullProgress;
        let result = search(
            &volume,
            &cost,
            &heuristic,
            (0, 0, 0),
            (2, 2, 0),
            &cfg,
            &mut progress,
        );
        assert_eq!(result.stats.exit_reason, ExitReason::Success);
        assert!(result.path.is_some());
    }
}
