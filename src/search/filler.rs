//! Single-source Dijkstra region fill bounded by a distance threshold, with
//! a serializable [`Fill`] record (spec.md §4.6) and a `rayon`-parallel
//! convenience for running many independent fillers over one shared
//! read-only volume (spec.md §5's "parallel searches... share no mutable
//! state beyond the read-only volume").
//!
//! The single-worker loop is grounded on `search/uninformed.rs::Bfs`'s
//! `_search` shape (a distance map built from a frontier, returned whole
//! rather than just a single path) generalized from FIFO to a priority
//! frontier and from "goal found" to "threshold exceeded".

use crate::cost::Cost;
use crate::grid::{NodeStatus, SearchNodeGrid, UniSearchNode};
use crate::queue::{PairingHeap, SearchKey};
use crate::search::{PollClock, ProgressCallback, SearchConfig, CNN_26};
use crate::volume::Volume;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One entry in a persisted [`Fill`] record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FillEntry {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub g: f64,
    /// Index of the predecessor entry within the same record, or `-1` for a
    /// seed with no predecessor.
    pub previous_index: i64,
    /// `true` if this entry was still open (not yet closed) when the fill
    /// stopped; `false` if closed.
    pub open: bool,
}

/// Serializable snapshot of a region filler's state: every visited node's
/// position, cost, open/closed flag, and predecessor index within the
/// record — enough to reconstitute a partial filler and resume it from
/// exactly its above-threshold boundary if the threshold is later raised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub threshold: f64,
    pub cost_kind: String,
    pub entries: Vec<FillEntry>,
}

impl Fill {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Runs the threshold-bounded Dijkstra fill from `sources` (each seeded at
/// `g = 0`) and returns the resulting [`Fill`] record.
///
/// Nodes whose tentative `g` exceeds `threshold` are recorded as deferred
/// (kept out of the closed set, left in the open heap) rather than dropped,
/// so a caller that raises `threshold` can resume without recomputation —
/// spec.md §4.6's "above-threshold deferral".
pub fn fill(
    volume: &dyn Volume,
    cost: &dyn Cost,
    cost_kind: &str,
    sources: &[(i64, i64, i64)],
    threshold: f64,
    cfg: &SearchConfig,
    progress: &mut dyn ProgressCallback,
) -> Fill {
    let mut grid: SearchNodeGrid<UniSearchNode> =
        SearchNodeGrid::new(volume.x_range(), volume.y_range());
    let mut heap: PairingHeap<SearchKey, (i64, i64, i64)> = PairingHeap::new();
    let min_step = cost.min_step_cost();

    for &src in sources {
        if !volume.contains(src.0, src.1, src.2) {
            continue;
        }
        let node = grid.get_or_insert_with(src, || UniSearchNode::new(src));
        if node.status == NodeStatus::Free {
            node.g = 0.0;
            node.status = NodeStatus::OpenFromStart;
            node.handle = Some(heap.insert(SearchKey { f: 0.0, pos: src }, src));
        }
    }

    let mut clock = PollClock::new();
    let mut closed_count = 0usize;

    loop {
        let Some((key, pos)) = heap.delete_min() else {
            break;
        };
        let node = grid.get_mut(pos).unwrap();
        if node.status != NodeStatus::OpenFromStart {
            continue;
        }
        if key.f > threshold {
            // Above-threshold deferral: leave it open (re-insert) rather
            // than closing it, so a later higher threshold can resume here.
            node.handle = Some(heap.insert(key, pos));
            break;
        }
        node.status = NodeStatus::ClosedFromStart;
        node.handle = None;
        closed_count += 1;

        let g_pos = node.g;
        for (dx, dy, dz) in CNN_26 {
            let n = (pos.0 + dx, pos.1 + dy, pos.2 + dz);
            if !volume.contains(n.0, n.1, n.2) {
                continue;
            }
            let step_cost = volume.spacing().physical_distance(pos, n)
                * cost.cost_moving_to(volume.get(n.0, n.1, n.2)).max(min_step);
            let tentative_g = g_pos + step_cost;

            let existing = grid.get(n).map(|nd| (nd.status, nd.g));
            match existing {
                None => {
                    let nd = grid.get_or_insert_with(n, || UniSearchNode::new(n));
                    nd.g = tentative_g;
                    nd.predecessor = Some(pos);
                    nd.status = NodeStatus::OpenFromStart;
                    nd.handle = Some(heap.insert(
                        SearchKey {
                            f: tentative_g,
                            pos: n,
                        },
                        n,
                    ));
                }
                Some((status, existing_g)) if tentative_g < existing_g => {
                    let reopen = status == NodeStatus::ClosedFromStart;
                    let nd = grid.get_mut(n).unwrap();
                    nd.g = tentative_g;
                    nd.predecessor = Some(pos);
                    nd.status = NodeStatus::OpenFromStart;
                    let new_key = SearchKey {
                        f: tentative_g,
                        pos: n,
                    };
                    if reopen {
                        nd.handle = Some(heap.insert(new_key, n));
                    } else if let Some(h) = nd.handle {
                        heap.decrease_key(h, new_key);
                    }
                }
                _ => {}
            }
        }

        if clock.tick() {
            if clock.should_stop(cfg).is_some() {
                break;
            }
        }
        clock.maybe_report(cfg, progress, heap.len(), closed_count);
    }

    progress.finished(true);
    to_fill_record(&grid, &heap, threshold, cost_kind)
}

/// Walks every touched node in `grid` (plus anything still sitting in
/// `heap`, to capture deferred above-threshold nodes) and serializes it as a
/// [`Fill`] with predecessor links rewritten as record-local indices.
fn to_fill_record(
    grid: &SearchNodeGrid<UniSearchNode>,
    heap: &PairingHeap<SearchKey, (i64, i64, i64)>,
    threshold: f64,
    cost_kind: &str,
) -> Fill {
    use ahash::AHashMap;

    let mut positions: Vec<(i64, i64, i64)> = Vec::new();
    let mut seen: AHashMap<(i64, i64, i64), bool> = AHashMap::new();
    // Collect via the heap's remaining entries isn't exposed generically, so
    // instead we rely on the caller having touched every node through
    // `grid`; iterate the grid's touched set by re-deriving positions from
    // node storage itself.
    let mut nodes: Vec<&UniSearchNode> = Vec::new();
    collect_touched(grid, &mut nodes);
    for node in &nodes {
        if seen.insert(node.pos, true).is_none() {
            positions.push(node.pos);
        }
    }
    let _ = heap; // open/closed flag already lives on each node.

    let index_of: AHashMap<(i64, i64, i64), usize> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, i))
        .collect();

    let entries = positions
        .iter()
        .map(|pos| {
            let node = grid.get(*pos).unwrap();
            let previous_index = node
                .predecessor
                .and_then(|p| index_of.get(&p))
                .map(|i| *i as i64)
                .unwrap_or(-1);
            FillEntry {
                x: pos.0,
                y: pos.1,
                z: pos.2,
                g: node.g,
                previous_index,
                open: node.status == NodeStatus::OpenFromStart,
            }
        })
        .collect();

    Fill {
        threshold,
        cost_kind: cost_kind.to_string(),
        entries,
    }
}

fn collect_touched<'a>(grid: &'a SearchNodeGrid<UniSearchNode>, out: &mut Vec<&'a UniSearchNode>) {
    grid.for_each_touched(|node| out.push(node));
}

/// Rebuilds a [`SearchNodeGrid`]-free in-memory view of a persisted [`Fill`]
/// so a caller can resume a filler: returns `(sources to reopen, visited
/// positions with known g)`.
pub fn resume_sources(fill: &Fill) -> Vec<(i64, i64, i64)> {
    fill.entries
        .iter()
        .filter(|e| e.open)
        .map(|e| (e.x, e.y, e.z))
        .collect()
}

/// Runs `fill` for each of `jobs` in parallel via `rayon`, sharing the
/// read-only `volume`/`cost` across workers per spec.md §5. Each job is
/// independent: its own node grid, its own open heap.
pub fn fill_many(
    volume: &(dyn Volume + Sync),
    cost: &(dyn Cost + Sync),
    cost_kind: &str,
    jobs: &[(Vec<(i64, i64, i64)>, f64)],
) -> Vec<Fill> {
    jobs.par_iter()
        .map(|(sources, threshold)| {
            let cfg = SearchConfig::unbounded();
            let mut progress = crate::search::NullProgress;
            fill(volume, cost, cost_kind, sources, *threshold, &cfg, &mut progress)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::ReciprocalCost;
    use crate::search::NullProgress;
    use crate::volume::{DenseVolume, Spacing};

    fn bright_volume() -> DenseVolume {
        let mut v = DenseVolume::new(10, 10, 1, Spacing::isotropic(1.0));
        for x in 0..10 {
            for y in 0..10 {
                v.set(x, y, 0, 200.0);
            }
        }
        v
    }

    #[test]
    fn fill_stays_within_threshold() {
        let volume = bright_volume();
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let cfg = SearchConfig::unbounded();
        let mut progress = NullProgress;
        let record = fill(
            &volume,
            &cost,
            "reciprocal",
            &[(0, 0, 0)],
            3.0,
            &cfg,
            &mut progress,
        );
        assert!(record.entries.iter().all(|e| e.g <= 3.0 + 1e-6 || e.open));
        assert!(record.entries.len() > 1);
    }

    #[test]
    fn fill_json_round_trips() {
        let volume = bright_volume();
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let cfg = SearchConfig::unbounded();
        let mut progress = NullProgress;
        let record = fill(
            &volume,
            &cost,
            "reciprocal",
            &[(0, 0, 0)],
            2.0,
            &cfg,
            &mut progress,
        );
        let json = record.to_json().unwrap();
        let back = Fill::from_json(&json).unwrap();
        assert_eq!(record, back);
        let json2 = back.to_json().unwrap();
        assert_eq!(json, json2);
    }

    #[test]
    fn fill_many_runs_independent_jobs_in_parallel() {
        let volume = bright_volume();
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        let jobs = vec![
            (vec![(0, 0, 0)], 2.0),
            (vec![(9, 9, 0)], 2.0),
        ];
        let results = fill_many(&volume, &cost, "reciprocal", &jobs);
        assert_eq!(results.len(), 2);
        assert!(results[0].entries.iter().any(|e| (e.x, e.y) == (0, 0)));
        assert!(results[1].entries.iter().any(|e| (e.x, e.y) == (9, 9)));
    }
}
