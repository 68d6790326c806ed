//! Automatic whole-neuron reconstruction (spec.md §4.7–§4.16): seeds a
//! gray-weighted distance transform and fast-marching tree over a `Volume`,
//! materializes it as a `Graph`, then runs radius estimation, hierarchical
//! pruning, a connectivity sweep, smoothing, resampling, and finally
//! segment-ordered tree materialization (optionally split/collapsed at a
//! soma ROI).
//!
//! [`trace_neuron`] is the single entry point that wires every phase below in
//! order, the same role `search::unidirectional::search`/
//! `search::bidirectional::search` play for interactive search.

pub mod connectivity;
pub mod fastmarching;
pub mod graph;
pub mod gwdt;
pub mod pruning;
pub mod radius;
pub mod resample;
pub mod segment;
pub mod smoothing;
pub mod soma;
pub mod storage;

use crate::error::{Result, TraceError};
use crate::trace::graph::{SwcType, Tree};
use crate::trace::soma::SomaRoi;
use crate::trace::storage::StorageBackend;
use crate::volume::Volume;
use log::info;

/// Every tunable an automatic trace exposes (spec.md §6's "for GWDT
/// tracers" input list), bundled so a caller configures one value instead
/// of threading a dozen arguments through `trace_neuron`.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    pub seed: (i64, i64, i64),
    /// Background/foreground cutoff shared by GWDT, fast marching, and
    /// pruning. `None` means "auto": the volume's mean intensity.
    pub theta: Option<f64>,
    pub cnn_type: u8,
    pub allow_gap: bool,
    pub background_tolerance: f64,
    pub max_radius_voxels: i64,
    pub pruning: pruning::PruningParams,
    pub smoothing: smoothing::SmoothingParams,
    pub resample: resample::ResampleParams,
    pub soma: SomaRoi,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            seed: (0, 0, 0),
            theta: None,
            cnn_type: 3,
            allow_gap: true,
            background_tolerance: 0.001,
            max_radius_voxels: 20,
            pruning: pruning::PruningParams::default(),
            smoothing: smoothing::SmoothingParams::default(),
            resample: resample::ResampleParams::default(),
            soma: SomaRoi::default(),
        }
    }
}

fn mean_intensity(volume: &dyn Volume) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for z in volume.z_range().min..=volume.z_range().max {
        for y in volume.y_range().min..=volume.y_range().max {
            for x in volume.x_range().min..=volume.x_range().max {
                sum += volume.get(x, y, z);
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Runs the full pipeline (spec.md §4.7–§4.16) and returns one `Tree` per
/// surviving root (more than one only when `config.soma.strategy` is `EDGE`
/// or `CONTAINED`).
///
/// Validation performed before any work starts: non-positive spacing and a
/// seed outside the volume's bounds are [`TraceError`]s, matching spec.md
/// §7's "construction-time invalid input" propagation policy. Everything
/// past that point cannot fail — an automatic trace either finds the tree
/// the image supports, however sparse, or finds an empty one.
pub fn trace_neuron(volume: &(dyn Volume + Sync), storage: &mut dyn StorageBackend, config: &TraceConfig) -> Result<Vec<Tree>> {
    let spacing = volume.spacing();
    if spacing.sx <= 0.0 || spacing.sy <= 0.0 || spacing.sz <= 0.0 {
        return Err(TraceError::ZeroSpacing {
            sx: spacing.sx,
            sy: spacing.sy,
            sz: spacing.sz,
        });
    }
    if !volume.contains(config.seed.0, config.seed.1, config.seed.2) {
        return Err(TraceError::SeedOutOfBounds {
            x: config.seed.0,
            y: config.seed.1,
            z: config.seed.2,
        });
    }

    let theta = config.theta.unwrap_or_else(|| mean_intensity(volume));

    let gwdt_summary = gwdt::compute(volume, storage, theta, config.cnn_type);
    fastmarching::compute(volume, storage, config.seed, gwdt_summary.max_gwdt, theta, config.cnn_type, config.allow_gap);

    let mut g = storage.build_graph(config.seed, spacing);
    g.sample_intensities(volume);
    if let Some(v) = g.get_mut(g.root()) {
        v.swc_type = SwcType::Soma;
    }
    info!("trace: built graph with {} vertices before pruning", g.alive_count());

    let mut pruning_params = config.pruning.clone();
    pruning_params.theta = theta;
    pruning::prune(&mut g, volume, &pruning_params);
    connectivity::sweep(&mut g);
    g.assign_topology_types();
    info!("trace: {} vertices survive pruning", g.alive_count());

    let radii = radius::estimate_all_radii(&g, volume, theta, config.background_tolerance, config.max_radius_voxels);
    radius::apply_radii(&mut g, &radii);

    smoothing::smooth(&mut g, &config.smoothing);
    let avg_spacing = resample::average_spacing(spacing);
    resample::resample(&mut g, avg_spacing, &config.resample);
    g.assign_topology_types();

    let trees = soma::apply(&g, &config.soma, pruning_params.max_intensity);
    Ok(trees)
}
