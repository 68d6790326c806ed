//! Pluggable per-voxel storage for the GWDT + fast-marching pipeline
//! (spec.md §9): every automatic trace owns one `StorageBackend` for its GWDT
//! array, distance array, parent-pointer array, and tri-state marching flag,
//! sized to whatever the volume's bounding box needs.
//!
//! Grounded on `domains/bitpackedgrid.rs` (dense flat-array backend) for
//! [`dense::DenseStorage`] and `domains/hashedgrid.rs` (`HashSet`-of-touched-
//! cells) for [`sparse::SparseStorage`]; [`disk::DiskStorage`] has no teacher
//! counterpart and is grounded on the page-cache-over-file shape in the pack's
//! closest storage-abstraction example (see DESIGN.md).

pub mod dense;
pub mod disk;
pub mod sparse;

use crate::trace::graph::{Graph, Vertex};
use crate::volume::{AxisRange, Spacing};

/// Fast-marching tri-state, shared by GWDT and the seeded tree pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VoxelState {
    #[default]
    Far,
    Trial,
    Alive,
}

/// Per-voxel GWDT/FM state, addressed by voxel coordinate. All accessors take
/// `&mut self` — `DiskStorage` needs mutation on read to maintain its page
/// cache, and a uniform signature keeps dense/sparse/disk interchangeable
/// without the caller knowing which one it holds.
pub trait StorageBackend {
    /// Resets all per-voxel state and resizes/reopens for `x/y/z_range`.
    fn initialize(&mut self, x_range: AxisRange, y_range: AxisRange, z_range: AxisRange);

    fn gwdt(&mut self, voxel: (i64, i64, i64)) -> f64;
    fn set_gwdt(&mut self, voxel: (i64, i64, i64), value: f64);

    fn distance(&mut self, voxel: (i64, i64, i64)) -> f64;
    fn set_distance(&mut self, voxel: (i64, i64, i64), value: f64);

    fn parent(&mut self, voxel: (i64, i64, i64)) -> Option<(i64, i64, i64)>;
    fn set_parent(&mut self, voxel: (i64, i64, i64), parent: (i64, i64, i64));

    fn state(&mut self, voxel: (i64, i64, i64)) -> VoxelState;
    fn set_state(&mut self, voxel: (i64, i64, i64), state: VoxelState);

    /// Every voxel ever marked `Alive`, in no particular order. Used only by
    /// [`StorageBackend::build_graph`]; backends that track this
    /// incrementally should override it rather than rescanning their whole
    /// extent.
    fn alive_voxels(&mut self) -> Vec<(i64, i64, i64)>;

    /// Rough resident-memory estimate in bytes, surfaced for the
    /// `memory_estimate` diagnostic in spec.md §9's resource-budget notes.
    fn memory_estimate_bytes(&self) -> usize;

    /// Releases any backing resources (scratch files, caches) early, before
    /// drop. A no-op for in-memory backends.
    fn dispose(&mut self) {}

    /// Builds a [`Graph`] from every alive voxel's parent pointer. Alive
    /// voxels are not guaranteed to arrive in parent-before-child order (a
    /// backend may report them in storage order), so this runs to a fixed
    /// point: repeated passes attach whichever alive voxels already have an
    /// attached parent, until a pass attaches nothing.
    fn build_graph(&mut self, seed: (i64, i64, i64), spacing: Spacing) -> Graph {
        let mut graph = Graph::with_root(Vertex::new(seed, spacing, 0.0));
        let mut index_of = ahash::AHashMap::new();
        index_of.insert(seed, graph.root());

        let mut pending: Vec<(i64, i64, i64)> = self
            .alive_voxels()
            .into_iter()
            .filter(|&v| v != seed)
            .collect();

        loop {
            let mut attached_any = false;
            let mut still_pending = Vec::with_capacity(pending.len());
            for voxel in pending {
                let Some(parent_voxel) = self.parent(voxel) else {
                    continue;
                };
                if let Some(&parent_idx) = index_of.get(&parent_voxel) {
                    let idx = graph.add_child(parent_idx, Vertex::new(voxel, spacing, 0.0));
                    index_of.insert(voxel, idx);
                    attached_any = true;
                } else {
                    still_pending.push(voxel);
                }
            }
            pending = still_pending;
            if !attached_any || pending.is_empty() {
                break;
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::dense::DenseStorage;
    use super::*;
    use crate::volume::Spacing;

    #[test]
    fn build_graph_attaches_voxels_out_of_order() {
        let mut storage = DenseStorage::new(AxisRange::new(0, 4), AxisRange::new(0, 0), AxisRange::new(0, 0));
        storage.set_parent((1, 0, 0), (0, 0, 0));
        storage.set_parent((2, 0, 0), (1, 0, 0));
        storage.set_state((0, 0, 0), VoxelState::Alive);
        storage.set_state((1, 0, 0), VoxelState::Alive);
        storage.set_state((2, 0, 0), VoxelState::Alive);

        let graph = storage.build_graph((0, 0, 0), Spacing::isotropic(1.0));
        assert_eq!(graph.alive_count(), 3);
    }
}
