mod cost;
mod error;
mod grid;
mod queue;
mod search;
mod trace;
mod volume;

use cost::{EuclideanHeuristic, ReciprocalCost};
use search::{NullProgress, SearchConfig};
use trace::storage::dense::DenseStorage;
use trace::TraceConfig;
use volume::{AxisRange, DenseVolume, Spacing};

/// Demo: a single bright bar, searched interactively end-to-end and then
/// traced automatically from its midpoint.
fn main() {
    env_logger::init();

    let mut image = DenseVolume::new(20, 1, 1, Spacing::isotropic(1.0));
    for x in 0..20 {
        image.set(x, 0, 0, 255.0);
    }

    let cost = ReciprocalCost { min: 0.0, max: 255.0 };
    let heuristic = EuclideanHeuristic { sx: 1.0, sy: 1.0, sz: 1.0 };
    let cfg = SearchConfig::unbounded();
    let result = search::unidirectional::search(
        &image,
        &cost,
        &heuristic,
        (0, 0, 0),
        (19, 0, 0),
        |p| p == (19, 0, 0),
        &cfg,
        &mut NullProgress,
    );
    match result.path {
        Some(path) => println!("search: {} points, cost {:.2}", path.len(), result.cost),
        None => println!("search: no path found ({:?})", result.stats.exit_reason),
    }

    let mut storage = DenseStorage::new(AxisRange::new(0, 19), AxisRange::new(0, 0), AxisRange::new(0, 0));
    let trace_config = TraceConfig {
        seed: (10, 0, 0),
        ..TraceConfig::default()
    };
    match trace::trace_neuron(&image, &mut storage, &trace_config) {
        Ok(trees) => {
            let points: usize = trees.iter().flat_map(|t| &t.paths).map(|p| p.points.len()).sum();
            println!("trace: {} tree(s), {} total points", trees.len(), points);
        }
        Err(e) => println!("trace failed: {e}"),
    }
}
