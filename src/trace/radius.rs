//! Concentric-shell radius estimation (spec.md §4.10): grows spherical (or,
//! for a thin-Z volume, annular) shells outward from each vertex and stops at
//! the first shell whose background fraction crosses a tolerance, so the
//! radius tracks local foreground thickness rather than a fixed intensity
//! cutoff.
//!
//! Grounded on `domains/mod.rs`'s neighbor/shell expansion idiom, generalized
//! from a single-ring lookup to repeated concentric rings; parallelized
//! per-vertex with `rayon` per spec.md §5's "independent per-item work may
//! run concurrently over a shared read-only volume."

use crate::trace::graph::Graph;
use crate::volume::Volume;
use rayon::prelude::*;

/// Estimates the radius (in voxels) of the sphere/annulus centered on
/// `voxel` that is at least `1 - background_tolerance` foreground, by
/// testing integer shell radii `1, 2, 3, ...` up to `max_radius_voxels` and
/// returning the last shell that still passed.
pub fn estimate_radius_voxels(
    volume: &dyn Volume,
    voxel: (i64, i64, i64),
    theta: f64,
    background_tolerance: f64,
    max_radius_voxels: i64,
) -> f64 {
    let is_2d = volume.is_2d();
    let mut best = 0.0;
    // spec.md §4.10: background cutoff for the shell walk is the brighter of
    // a fixed floor and the trace's own theta, not theta alone.
    let background_cutoff = theta.max(40.0);

    for r in 1..=max_radius_voxels {
        let mut total = 0usize;
        let mut background = 0usize;
        let r2 = r * r;
        let inner2 = (r - 1) * (r - 1);
        for dz in shell_z_range(r, is_2d) {
            for dy in -r..=r {
                for dx in -r..=r {
                    let d2 = dx * dx + dy * dy + dz * dz;
                    // Shell at radius `r`, not the filled ball: include only
                    // voxels strictly outside the previous radius's ball.
                    if d2 > r2 || d2 <= inner2 {
                        continue;
                    }
                    let p = (voxel.0 + dx, voxel.1 + dy, voxel.2 + dz);
                    if !volume.contains(p.0, p.1, p.2) {
                        // out-of-bounds counts as background: a shell that
                        // runs off the volume edge is treated as having hit
                        // the boundary of the object.
                        total += 1;
                        background += 1;
                        continue;
                    }
                    total += 1;
                    if volume.get(p.0, p.1, p.2) <= background_cutoff {
                        background += 1;
                    }
                }
            }
        }
        if total == 0 {
            break;
        }
        let background_fraction = background as f64 / total as f64;
        if background_fraction > background_tolerance {
            break;
        }
        best = r as f64;
    }

    best.max(1.0)
}

fn shell_z_range(r: i64, is_2d: bool) -> std::ops::RangeInclusive<i64> {
    if is_2d {
        0..=0
    } else {
        -r..=r
    }
}

/// Estimates every alive vertex's radius (in physical units) concurrently,
/// returning `(vertex_index, radius_physical)` pairs for the caller to apply
/// back onto `graph` — kept out-of-place because holding `&mut Graph` across
/// a `rayon` parallel map would require per-vertex interior mutability for no
/// benefit, since writes only ever touch disjoint vertices anyway.
pub fn estimate_all_radii(
    graph: &Graph,
    volume: &(dyn Volume + Sync),
    theta: f64,
    background_tolerance: f64,
    max_radius_voxels: i64,
) -> Vec<(usize, f64)> {
    let indices: Vec<usize> = graph.iter_alive().collect();
    let spacing = volume.spacing();
    indices
        .par_iter()
        .map(|&idx| {
            let voxel = graph.get(idx).unwrap().voxel;
            let radius_voxels =
                estimate_radius_voxels(volume, voxel, theta, background_tolerance, max_radius_voxels);
            // spec.md §4.10: "multiply by an axis spacing (isotropic-XY
            // assumption)" — use sx, the XY axis the assumption names.
            let radius_physical = radius_voxels * spacing.sx;
            (idx, radius_physical)
        })
        .collect()
}

/// Applies radii computed by [`estimate_all_radii`] back onto `graph`.
pub fn apply_radii(graph: &mut Graph, radii: &[(usize, f64)]) {
    for &(idx, radius) in radii {
        if let Some(v) = graph.get_mut(idx) {
            v.radius = radius;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::graph::{Graph, Vertex};
    use crate::volume::{DenseVolume, Spacing};

    fn disk_volume(radius: i64) -> DenseVolume {
        let size = (radius * 2 + 5) as usize;
        let mut v = DenseVolume::new(size, size, 1, Spacing::isotropic(1.0));
        let center = radius + 2;
        for x in 0..size as i64 {
            for y in 0..size as i64 {
                let dx = x - center;
                let dy = y - center;
                if dx * dx + dy * dy <= radius * radius {
                    v.set(x, y, 0, 255.0);
                }
            }
        }
        v
    }

    #[test]
    fn radius_tracks_disk_size() {
        let volume = disk_volume(4);
        let center = (6, 6, 0);
        let r = estimate_radius_voxels(&volume, center, 0.0, 0.1, 10);
        assert!(r >= 3.0 && r <= 5.0, "radius estimate {} out of expected band", r);
    }

    #[test]
    fn estimate_all_radii_covers_every_vertex() {
        let volume = disk_volume(4);
        let mut graph = Graph::with_root(Vertex::new((6, 6, 0), Spacing::isotropic(1.0), 255.0));
        graph.add_child(graph.root(), Vertex::new((7, 6, 0), Spacing::isotropic(1.0), 255.0));
        let radii = estimate_all_radii(&graph, &volume, 0.0, 0.1, 10);
        assert_eq!(radii.len(), 2);
        apply_radii(&mut graph, &radii);
        assert!(graph.get(graph.root()).unwrap().radius > 0.0);
    }
}
