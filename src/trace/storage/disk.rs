//! Scratch-file-backed storage for a volume too large to hold entirely in
//! memory: a bounded in-memory window over a flat scratch file, evicting the
//! least-recently-touched voxel to disk to make room. No teacher counterpart;
//! grounded on the pack's closest storage-abstraction example's page-cache-
//! over-file shape (see DESIGN.md) rather than `mmap`ing the whole volume.

use super::{StorageBackend, VoxelState};
use crate::volume::AxisRange;
use ahash::AHashMap;
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

#[derive(Clone, Copy, Debug)]
struct Record {
    gwdt: f64,
    distance: f64,
    parent_x: i64,
    parent_y: i64,
    parent_z: i64,
    has_parent: bool,
    state: VoxelState,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            gwdt: f64::INFINITY,
            distance: f64::INFINITY,
            parent_x: 0,
            parent_y: 0,
            parent_z: 0,
            has_parent: false,
            state: VoxelState::Far,
        }
    }
}

const RECORD_SIZE: usize = 8 + 8 + 8 + 8 + 8 + 1 + 1;

fn encode(r: &Record) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    buf[0..8].copy_from_slice(&r.gwdt.to_le_bytes());
    buf[8..16].copy_from_slice(&r.distance.to_le_bytes());
    buf[16..24].copy_from_slice(&r.parent_x.to_le_bytes());
    buf[24..32].copy_from_slice(&r.parent_y.to_le_bytes());
    buf[32..40].copy_from_slice(&r.parent_z.to_le_bytes());
    buf[40] = r.has_parent as u8;
    buf[41] = match r.state {
        VoxelState::Far => 0,
        VoxelState::Trial => 1,
        VoxelState::Alive => 2,
    };
    buf
}

fn decode(buf: &[u8; RECORD_SIZE]) -> Record {
    Record {
        gwdt: f64::from_le_bytes(buf[0..8].try_into().unwrap()),
        distance: f64::from_le_bytes(buf[8..16].try_into().unwrap()),
        parent_x: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
        parent_y: i64::from_le_bytes(buf[24..32].try_into().unwrap()),
        parent_z: i64::from_le_bytes(buf[32..40].try_into().unwrap()),
        has_parent: buf[40] != 0,
        state: match buf[41] {
            1 => VoxelState::Trial,
            2 => VoxelState::Alive,
            _ => VoxelState::Far,
        },
    }
}

pub struct DiskStorage {
    x_range: AxisRange,
    y_range: AxisRange,
    z_range: AxisRange,
    file: File,
    cache: AHashMap<(i64, i64, i64), Record>,
    touch_order: Vec<(i64, i64, i64)>,
    cache_limit: usize,
    alive_index: std::collections::HashSet<(i64, i64, i64)>,
}

impl DiskStorage {
    pub fn new(
        x_range: AxisRange,
        y_range: AxisRange,
        z_range: AxisRange,
        scratch_path: &str,
        cache_limit: usize,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(scratch_path)?;
        Ok(Self {
            x_range,
            y_range,
            z_range,
            file,
            cache: AHashMap::new(),
            touch_order: Vec::new(),
            cache_limit: cache_limit.max(1),
            alive_index: std::collections::HashSet::new(),
        })
    }

    fn linear_index(&self, voxel: (i64, i64, i64)) -> u64 {
        let lx = (voxel.0 - self.x_range.min) as u64;
        let ly = (voxel.1 - self.y_range.min) as u64;
        let lz = (voxel.2 - self.z_range.min) as u64;
        lx + ly * self.x_range.len() as u64 + lz * self.x_range.len() as u64 * self.y_range.len() as u64
    }

    fn load(&mut self, voxel: (i64, i64, i64)) -> Record {
        if let Some(r) = self.cache.get(&voxel) {
            return *r;
        }
        let offset = self.linear_index(voxel) * RECORD_SIZE as u64;
        let mut buf = [0u8; RECORD_SIZE];
        let record = if self.file.seek(SeekFrom::Start(offset)).is_ok() && self.file.read_exact(&mut buf).is_ok() {
            decode(&buf)
        } else {
            Record::default()
        };
        self.touch(voxel, record);
        record
    }

    fn store(&mut self, voxel: (i64, i64, i64), record: Record) {
        self.touch(voxel, record);
    }

    fn touch(&mut self, voxel: (i64, i64, i64), record: Record) {
        self.cache.insert(voxel, record);
        self.touch_order.retain(|&v| v != voxel);
        self.touch_order.push(voxel);
        if self.cache.len() > self.cache_limit {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if self.touch_order.is_empty() {
            return;
        }
        let victim = self.touch_order.remove(0);
        if let Some(record) = self.cache.remove(&victim) {
            let offset = self.linear_index(victim) * RECORD_SIZE as u64;
            let buf = encode(&record);
            if self.file.seek(SeekFrom::Start(offset)).is_err() || self.file.write_all(&buf).is_err() {
                warn!("disk storage backend failed to flush voxel {:?} on eviction", victim);
            }
        }
    }
}

impl StorageBackend for DiskStorage {
    fn initialize(&mut self, x_range: AxisRange, y_range: AxisRange, z_range: AxisRange) {
        self.x_range = x_range;
        self.y_range = y_range;
        self.z_range = z_range;
        self.cache.clear();
        self.touch_order.clear();
        self.alive_index.clear();
    }

    fn gwdt(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.load(voxel).gwdt
    }

    fn set_gwdt(&mut self, voxel: (i64, i64, i64), value: f64) {
        let mut r = self.load(voxel);
        r.gwdt = value;
        self.store(voxel, r);
    }

    fn distance(&mut self, voxel: (i64, i64, i64)) -> f64 {
        self.load(voxel).distance
    }

    fn set_distance(&mut self, voxel: (i64, i64, i64), value: f64) {
        let mut r = self.load(voxel);
        r.distance = value;
        self.store(voxel, r);
    }

    fn parent(&mut self, voxel: (i64, i64, i64)) -> Option<(i64, i64, i64)> {
        let r = self.load(voxel);
        r.has_parent.then_some((r.parent_x, r.parent_y, r.parent_z))
    }

    fn set_parent(&mut self, voxel: (i64, i64, i64), parent: (i64, i64, i64)) {
        let mut r = self.load(voxel);
        r.has_parent = true;
        r.parent_x = parent.0;
        r.parent_y = parent.1;
        r.parent_z = parent.2;
        self.store(voxel, r);
    }

    fn state(&mut self, voxel: (i64, i64, i64)) -> VoxelState {
        self.load(voxel).state
    }

    fn set_state(&mut self, voxel: (i64, i64, i64), state: VoxelState) {
        let mut r = self.load(voxel);
        r.state = state;
        self.store(voxel, r);
        if state == VoxelState::Alive {
            self.alive_index.insert(voxel);
        } else {
            self.alive_index.remove(&voxel);
        }
    }

    fn alive_voxels(&mut self) -> Vec<(i64, i64, i64)> {
        self.alive_index.iter().copied().collect()
    }

    fn memory_estimate_bytes(&self) -> usize {
        self.cache.len() * (std::mem::size_of::<(i64, i64, i64)>() + std::mem::size_of::<Record>())
    }

    fn dispose(&mut self) {
        self.cache.clear();
        self.touch_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn scratch_path(name: &str) -> String {
        temp_dir().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn values_survive_eviction_round_trip() {
        let path = scratch_path("neurotrace_disk_storage_test.bin");
        let mut s = DiskStorage::new(
            AxisRange::new(0, 3),
            AxisRange::new(0, 0),
            AxisRange::new(0, 0),
            &path,
            1,
        )
        .unwrap();
        s.set_gwdt((0, 0, 0), 1.0);
        s.set_gwdt((1, 0, 0), 2.0);
        s.set_gwdt((2, 0, 0), 3.0);
        assert_eq!(s.gwdt((0, 0, 0)), 1.0);
        assert_eq!(s.gwdt((1, 0, 0)), 2.0);
        assert_eq!(s.gwdt((2, 0, 0)), 3.0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn alive_index_tracks_state_transitions() {
        let path = scratch_path("neurotrace_disk_storage_test_alive.bin");
        let mut s = DiskStorage::new(
            AxisRange::new(0, 3),
            AxisRange::new(0, 0),
            AxisRange::new(0, 0),
            &path,
            8,
        )
        .unwrap();
        s.set_state((1, 0, 0), VoxelState::Alive);
        assert_eq!(s.alive_voxels(), vec![(1, 0, 0)]);
        s.set_state((1, 0, 0), VoxelState::Trial);
        assert!(s.alive_voxels().is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
