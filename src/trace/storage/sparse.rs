//! `ahash`-map storage backend for volumes whose foreground is a small
//! fraction of a large bounding box. Grounded on `domains/hashedgrid.rs`'s
//! `HashSet<usize>`-of-touched-cells shape, generalized to a map of full
//! per-voxel records instead of a membership flag.

use super::{StorageBackend, VoxelState};
use crate::volume::AxisRange;
use ahash::AHashMap;

#[derive(Clone, Copy, Debug)]
struct Cell {
    gwdt: f64,
    distance: f64,
    parent: Option<(i64, i64, i64)>,
    state: VoxelState,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            gwdt: f64::INFINITY,
            distance: f64::INFINITY,
            parent: None,
            state: VoxelState::Far,
        }
    }
}

pub struct SparseStorage {
    x_range: AxisRange,
    y_range: AxisRange,
    z_range: AxisRange,
    cells: AHashMap<(i64, i64, i64), Cell>,
}

impl SparseStorage {
    pub fn new(x_range: AxisRange, y_range: AxisRange, z_range: AxisRange) -> Self {
        Self {
            x_range,
            y_range,
            z_range,
            cells: AHashMap::new(),
        }
    }
}

impl StorageBackend for SparseStorage {
    fn initialize(&mut self, x_range: AxisRange, y_range: AxisRange, z_range: AxisRange) {
        self.x_range = x_range;
        self.y_range = y_range;
        self.z_range = z_range;
        self.cells.clear();
    }

    fn gwdt(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.cells.get(&voxel).map(|c| c.gwdt).unwrap_or(f64::INFINITY)
    }

    fn set_gwdt(&mut self, voxel: (i64, i64, i64), value: f64) {
        self.cells.entry(voxel).or_default().gwdt = value;
    }

    fn distance(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.cells.get(&voxel).map(|c| c.distance).unwrap_or(f64::INFINITY)
    }

    fn set_distance(&mut self, voxel: (i64, i64, i64), value: f64) {
        self.cells.entry(voxel).or_default().distance = value;
    }

    fn parent(&mut self, voxel: (i64, i64, i64)) -> Option<(i64, i64, i64)> {
        self.cells.get(&voxel).and_then(|c| c.parent)
    }

    fn set_parent(&mut self, voxel: (i64, i64, i64), parent: (i64, i64, i64)) {
        self.cells.entry(voxel).or_default().parent = Some(parent);
    }

    fn state(&mut self, voxel: (i64, i64, i64)) -> VoxelState {
        self.cells.get(&voxel).map(|c| c.state).unwrap_or(VoxelState::Far)
    }

    fn set_state(&mut self, voxel: (i64, i64, i64), state: VoxelState) {
        self.cells.entry(voxel).or_default().state = state;
    }

    fn alive_voxels(&mut self) -> Vec<(i64, i64, i64)> {
        self.cells
            .iter()
            .filter(|(_, c)| c.state == VoxelState::Alive)
            .map(|(&voxel, _)| voxel)
            .collect()
    }

    fn memory_estimate_bytes(&self) -> usize {
        self.cells.len() * (std::mem::size_of::<(i64, i64, i64)>() + std::mem::size_of::<Cell>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_cells_read_as_defaults_without_allocating() {
        let mut s = SparseStorage::new(AxisRange::new(0, 1000), AxisRange::new(0, 1000), AxisRange::new(0, 0));
        assert_eq!(s.gwdt((500, 500, 0)), f64::INFINITY);
        assert_eq!(s.memory_estimate_bytes(), 0);
    }

    #[test]
    fn touched_cell_is_tracked() {
        let mut s = SparseStorage::new(AxisRange::new(0, 1000), AxisRange::new(0, 1000), AxisRange::new(0, 0));
        s.set_state((10, 10, 0), VoxelState::Alive);
        assert_eq!(s.alive_voxels(), vec![(10, 10, 0)]);
    }
}
