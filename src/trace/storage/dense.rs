//! Flat-array storage backend: one `Vec` per field, sized to the volume's
//! whole bounding box. Grounded on `domains/bitpackedgrid.rs`'s padded
//! `map_cells: Box<[usize]>` linear layout, generalized from packed bits to
//! four parallel per-voxel fields.

use super::{StorageBackend, VoxelState};
use crate::volume::AxisRange;

pub struct DenseStorage {
    x_range: AxisRange,
    y_range: AxisRange,
    z_range: AxisRange,
    gwdt: Vec<f64>,
    distance: Vec<f64>,
    parent: Vec<Option<(i64, i64, i64)>>,
    state: Vec<VoxelState>,
}

impl DenseStorage {
    pub fn new(x_range: AxisRange, y_range: AxisRange, z_range: AxisRange) -> Self {
        let len = x_range.len() * y_range.len() * z_range.len();
        Self {
            x_range,
            y_range,
            z_range,
            gwdt: vec![f64::INFINITY; len],
            distance: vec![f64::INFINITY; len],
            parent: vec![None; len],
            state: vec![VoxelState::Far; len],
        }
    }

    fn index(&self, voxel: (i64, i64, i64)) -> usize {
        let lx = (voxel.0 - self.x_range.min) as usize;
        let ly = (voxel.1 - self.y_range.min) as usize;
        let lz = (voxel.2 - self.z_range.min) as usize;
        lx + ly * self.x_range.len() + lz * self.x_range.len() * self.y_range.len()
    }
}

impl StorageBackend for DenseStorage {
    fn initialize(&mut self, x_range: AxisRange, y_range: AxisRange, z_range: AxisRange) {
        *self = DenseStorage::new(x_range, y_range, z_range);
    }

    fn gwdt(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.gwdt[self.index(voxel)]
    }

    fn set_gwdt(&mut self, voxel: (i64, i64, i64), value: f64) {
        let idx = self.index(voxel);
        self.gwdt[idx] = value;
    }

    fn distance(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.distance[self.index(voxel)]
    }

    fn set_distance(&mut self, voxel: (i64, i64, i64), value: f64) {
        let idx = self.index(voxel);
        self.distance[idx] = value;
    }

    fn parent(&mut self, voxel: (i64, i64, i64)) -> Option<(i64, i64, i64)> {
        self.parent[self.index(voxel)]
    }

    fn set_parent(&mut self, voxel: (i64, i64, i64), parent: (i64, i64, i64)) {
        let idx = self.index(voxel);
        self.parent[idx] = Some(parent);
    }

    fn state(&mut self, voxel: (i64, i64, i64)) -> VoxelState {
        self.state[self.index(voxel)]
    }

    fn set_state(&mut self, voxel: (i64, i64, i64), state: VoxelState) {
        let idx = self.index(voxel);
        self.state[idx] = state;
    }

    fn alive_voxels(&mut self) -> Vec<(i64, i64, i64)> {
        let mut out = Vec::new();
        for z in self.z_range.min..=self.z_range.max {
            for y in self.y_range.min..=self.y_range.max {
                for x in self.x_range.min..=self.x_range.max {
                    let voxel = (x, y, z);
                    if self.state[self.index(voxel)] == VoxelState::Alive {
                        out.push(voxel);
                    }
                }
            }
        }
        out
    }

    fn memory_estimate_bytes(&self) -> usize {
        let n = self.gwdt.len();
        n * (std::mem::size_of::<f64>() * 2
            + std::mem::size_of::<Option<(i64, i64, i64)>>()
            + std::mem::size_of::<VoxelState>())
    }
}
