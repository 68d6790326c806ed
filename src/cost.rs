//! Edge-cost and goal-distance functors passed into searches.
//!
//! Mirrors the shape of `heuristics/distance.rs` in the teacher repo (free
//! functions computing a scalar from two points) but wraps the per-voxel
//! intensity cost behind a trait, the way `search/mod.rs::Search` wraps the
//! expander/goal closures, so concrete cost kinds can be swapped at runtime.

/// `costMovingTo(intensity) -> f64` plus a strictly positive lower bound used
/// to clamp per-voxel cost and to scale the heuristic so it stays admissible.
pub trait Cost {
    fn cost_moving_to(&self, intensity: f64) -> f64;

    /// Strictly positive lower bound on `cost_moving_to` over the whole range
    /// of representable intensities.
    fn min_step_cost(&self) -> f64;
}

/// `1 / normalized_intensity`, clamped away from zero.
#[derive(Clone, Copy, Debug)]
pub struct ReciprocalCost {
    pub min: f64,
    pub max: f64,
}

impl Cost for ReciprocalCost {
    fn cost_moving_to(&self, intensity: f64) -> f64 {
        let range = (self.max - self.min).max(1e-6);
        let normalized = ((intensity - self.min) / range).clamp(1e-6, 1.0);
        1.0 / normalized
    }

    fn min_step_cost(&self) -> f64 {
        1.0
    }
}

/// `max - intensity`, i.e. cheaper where intensity is high.
#[derive(Clone, Copy, Debug)]
pub struct DifferenceCost {
    pub max: f64,
}

impl Cost for DifferenceCost {
    fn cost_moving_to(&self, intensity: f64) -> f64 {
        (self.max - intensity).max(self.min_step_cost())
    }

    fn min_step_cost(&self) -> f64 {
        1e-3
    }
}

/// `(max - intensity)^2`.
#[derive(Clone, Copy, Debug)]
pub struct SquaredDifferenceCost {
    pub max: f64,
}

impl Cost for SquaredDifferenceCost {
    fn cost_moving_to(&self, intensity: f64) -> f64 {
        let d = self.max - intensity;
        (d * d).max(self.min_step_cost())
    }

    fn min_step_cost(&self) -> f64 {
        1e-3
    }
}

/// `1 - erf(normalized_intensity)`, a "probability this voxel is background"
/// cost. `erf` is implemented locally (Abramowitz & Stegun 7.1.26) since
/// neither the teacher nor the closest pack repos pull in a special-function
/// crate for this.
#[derive(Clone, Copy, Debug)]
pub struct ProbabilityCost {
    pub min: f64,
    pub max: f64,
}

impl Cost for ProbabilityCost {
    fn cost_moving_to(&self, intensity: f64) -> f64 {
        let range = (self.max - self.min).max(1e-6);
        let normalized = ((intensity - self.min) / range).clamp(0.0, 1.0);
        (1.0 - erf(normalized)).max(self.min_step_cost())
    }

    fn min_step_cost(&self) -> f64 {
        1e-3
    }
}

fn erf(x: f64) -> f64 {
    // Abramowitz & Stegun 7.1.26, max error ~1.5e-7.
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// `estimateCostToGoal(cur, goal) -> f64`. Must be non-negative; admissible
/// with respect to the paired `Cost` when used with A*.
pub trait Heuristic {
    fn estimate(&self, cur: (i64, i64, i64), goal: (i64, i64, i64)) -> f64;
}

/// Scaled Euclidean distance in physical units — the default heuristic.
#[derive(Clone, Copy, Debug)]
pub struct EuclideanHeuristic {
    pub sx: f64,
    pub sy: f64,
    pub sz: f64,
}

impl Heuristic for EuclideanHeuristic {
    fn estimate(&self, cur: (i64, i64, i64), goal: (i64, i64, i64)) -> f64 {
        let dx = (cur.0 - goal.0) as f64 * self.sx;
        let dy = (cur.1 - goal.1) as f64 * self.sy;
        let dz = (cur.2 - goal.2) as f64 * self.sz;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// `h = 0` everywhere — turns A* into Dijkstra. Used by the unidirectional
/// engine's Dijkstra mode and by the region filler.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroHeuristic;

impl Heuristic for ZeroHeuristic {
    fn estimate(&self, _cur: (i64, i64, i64), _goal: (i64, i64, i64)) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reciprocal_cost_is_cheap_for_bright_voxels() {
        let cost = ReciprocalCost {
            min: 0.0,
            max: 255.0,
        };
        assert!(cost.cost_moving_to(255.0) < cost.cost_moving_to(1.0));
        assert!(cost.min_step_cost() > 0.0);
    }

    #[test]
    fn difference_cost_never_below_min_step() {
        let cost = DifferenceCost { max: 255.0 };
        assert!(cost.cost_moving_to(255.0) >= cost.min_step_cost());
    }

    #[test]
    fn probability_cost_bounded_in_zero_one_ish_range() {
        let cost = ProbabilityCost { min: 0.0, max: 1.0 };
        let c0 = cost.cost_moving_to(0.0);
        let c1 = cost.cost_moving_to(1.0);
        assert!(c1 < c0);
    }

    #[test]
    fn euclidean_heuristic_matches_pythagoras() {
        let h = EuclideanHeuristic {
            sx: 1.0,
            sy: 1.0,
            sz: 1.0,
        };
        assert!((h.estimate((0, 0, 0), (3, 4, 0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_heuristic_is_always_zero() {
        let h = ZeroHeuristic;
        assert_eq!(h.estimate((0, 0, 0), (100, 100, 100)), 0.0);
    }
}
