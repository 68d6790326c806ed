//! Seeded fast-marching tree (spec.md §4.8): grows a geodesic shortest-path
//! tree from one seed voxel using the GWDT to make brighter voxels cheaper to
//! cross (the APP2 edge-cost rule), writing parent pointers directly into the
//! storage backend that [`crate::trace::storage::StorageBackend::build_graph`]
//! later turns into a [`crate::trace::graph::Graph`].
//!
//! Same fast-marching shape as [`crate::trace::gwdt`]; the relaxation rule
//! itself is APP2-specific and has no teacher equivalent, implemented
//! directly from spec.md's formula.

use crate::trace::gwdt::neighbor_offsets;
use crate::trace::storage::{StorageBackend, VoxelState};
use crate::volume::Volume;
use log::debug;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(PartialEq)]
struct TrialEntry {
    distance: f64,
    voxel: (i64, i64, i64),
}

impl Eq for TrialEntry {}

impl Ord for TrialEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(other.distance).cmp(&OrderedFloat(self.distance))
    }
}

impl PartialOrd for TrialEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs the seeded fast-marching tree into `storage`, which must already
/// hold a completed GWDT pass (`max_gwdt` is that pass's
/// [`crate::trace::gwdt::GwdtSummary::max_gwdt`]). `theta` gates
/// foreground/background for the `allow_gap` rule: a step may cross exactly
/// one background voxel between two foreground voxels (bright -> dark ->
/// bright) when `allow_gap` is set, but never two background voxels in a row.
pub fn compute(
    volume: &dyn Volume,
    storage: &mut dyn StorageBackend,
    seed: (i64, i64, i64),
    max_gwdt: f64,
    theta: f64,
    cnn_type: u8,
    allow_gap: bool,
) {
    let offsets = neighbor_offsets(cnn_type);
    let mut heap: BinaryHeap<TrialEntry> = BinaryHeap::new();
    let max_gwdt = max_gwdt.max(1e-9);

    storage.set_distance(seed, 0.0);
    storage.set_parent(seed, seed);
    heap.push(TrialEntry {
        distance: 0.0,
        voxel: seed,
    });

    let mut alive_count = 0u64;

    while let Some(TrialEntry { distance, voxel }) = heap.pop() {
        if storage.state(voxel) == VoxelState::Alive {
            continue;
        }
        storage.set_state(voxel, VoxelState::Alive);
        alive_count += 1;
        let voxel_is_foreground = volume.get(voxel.0, voxel.1, voxel.2) > theta;

        for (dx, dy, dz) in &offsets {
            let n = (voxel.0 + dx, voxel.1 + dy, voxel.2 + dz);
            if !volume.contains(n.0, n.1, n.2) || storage.state(n) == VoxelState::Alive {
                continue;
            }
            let n_is_foreground = volume.get(n.0, n.1, n.2) > theta;
            if !n_is_foreground && !(allow_gap && voxel_is_foreground) {
                continue;
            }

            let step = volume.spacing().physical_distance(voxel, n);
            let edge_cost = step + (max_gwdt - storage.gwdt(n)) / max_gwdt;
            let candidate = distance + edge_cost;
            if candidate < storage.distance(n) {
                storage.set_distance(n, candidate);
                storage.set_parent(n, voxel);
                heap.push(TrialEntry {
                    distance: candidate,
                    voxel: n,
                });
            }
        }
    }

    debug!("fast marching complete: {} voxels alive from seed {:?}", alive_count, seed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::gwdt;
    use crate::trace::storage::dense::DenseStorage;
    use crate::volume::{AxisRange, DenseVolume, Spacing};

    #[test]
    fn straight_bar_builds_a_parent_chain_back_to_seed() {
        let mut volume = DenseVolume::new(1, 9, 1, Spacing::isotropic(1.0));
        for y in 0..9 {
            volume.set(0, y, 0, 200.0);
        }
        let mut storage = DenseStorage::new(AxisRange::new(0, 0), AxisRange::new(0, 8), AxisRange::new(0, 0));
        let summary = gwdt::compute(&volume, &mut storage, 0.0, 3);
        compute(&volume, &mut storage, (0, 0, 0), summary.max_gwdt, 0.0, 3, false);

        let mut cur = (0, 8, 0);
        let mut steps = 0;
        while cur != (0, 0, 0) {
            let parent = storage.parent(cur).expect("every non-seed voxel must have a parent");
            cur = parent;
            steps += 1;
            assert!(steps <= 9, "parent chain did not reach the seed");
        }
    }

    #[test]
    fn allow_gap_permits_a_single_dark_voxel_crossing() {
        let mut volume = DenseVolume::new(1, 5, 1, Spacing::isotropic(1.0));
        volume.set(0, 0, 0, 200.0);
        volume.set(0, 1, 0, 0.0); // single dark gap
        volume.set(0, 2, 0, 200.0);
        let mut storage = DenseStorage::new(AxisRange::new(0, 0), AxisRange::new(0, 4), AxisRange::new(0, 0));
        let summary = gwdt::compute(&volume, &mut storage, 0.0, 3);
        compute(&volume, &mut storage, (0, 0, 0), summary.max_gwdt, 0.0, 3, true);
        assert!(storage.parent((0, 2, 0)).is_some());
    }
}
