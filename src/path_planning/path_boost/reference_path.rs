//! Reference path: smoothed curve, resampled states and corridor bounds
//!
//! The curve is fixed once smoothing is done. Its usable length can only be
//! shortened. Resampling produces the knots the path solver works on, and
//! every knot gets one [`CorridorBound`] computed against the obstacle map.

use std::f64::consts::FRAC_PI_2;

use log::{debug, error};

use crate::common::{ObstacleMap, PathBoostError, PathBoostResult, PathState, Point2D};
use crate::utils::geometry::frenet_to_cartesian;
use crate::utils::spline::Spline2D;

use super::config::PathBoostConfig;

/// Step of the lateral scan used when a knot lies inside an obstacle [m]
const LATERAL_SCAN_STEP: f64 = 0.1;
const GOLDEN_RATIO: f64 = 0.618_033_988_749_894_8;
const PROJECTION_TOLERANCE: f64 = 1e-6;

/// Signed lateral limits at one reference knot, positive to the left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorBound {
    /// Hard limits: the free region shrunk by half width and safety margin
    pub lower: f64,
    pub upper: f64,
    /// Soft limits from the expected safety margin, penalised through slack
    pub soft_lower: f64,
    pub soft_upper: f64,
}

impl CorridorBound {
    /// Bound from the free lateral interval `[free_lower, free_upper]`
    pub fn from_free_interval(
        free_lower: f64,
        free_upper: f64,
        half_width: f64,
        safety_margin: f64,
        expected_safety_margin: f64,
    ) -> Self {
        let lower = free_lower + half_width + safety_margin;
        let upper = free_upper - half_width - safety_margin;
        let extra = (expected_safety_margin - safety_margin).max(0.0);
        let (soft_lower, soft_upper) = if upper - lower < 2.0 * extra {
            let mid = 0.5 * (lower + upper);
            (mid, mid)
        } else {
            (lower + extra, upper - extra)
        };
        CorridorBound {
            lower,
            upper,
            soft_lower,
            soft_upper,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.lower <= self.upper
    }
}

#[derive(Debug, Clone)]
pub struct ReferencePath {
    spline: Spline2D,
    length: f64,
    reference_states: Vec<PathState>,
    bounds: Vec<CorridorBound>,
}

impl ReferencePath {
    pub fn new(spline: Spline2D) -> Self {
        let length = spline.length();
        ReferencePath {
            spline,
            length,
            reference_states: Vec::new(),
            bounds: Vec::new(),
        }
    }

    /// Interpolate `points` with a cubic spline
    pub fn from_points(points: &[Point2D]) -> PathBoostResult<Self> {
        Ok(Self::new(Spline2D::new(points)?))
    }

    pub fn spline(&self) -> &Spline2D {
        &self.spline
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Shorten the usable length. Extending past the current length is an error.
    pub fn set_length(&mut self, length: f64) -> PathBoostResult<()> {
        if !(length > 0.0) || length > self.length + PROJECTION_TOLERANCE {
            return Err(PathBoostError::InvalidParameter(format!(
                "reference length can only shrink within (0, {}], got {}",
                self.length, length
            )));
        }
        self.length = length.min(self.length);
        self.reference_states.clear();
        self.bounds.clear();
        Ok(())
    }

    pub fn reference_states(&self) -> &[PathState] {
        &self.reference_states
    }

    pub fn bounds(&self) -> &[CorridorBound] {
        &self.bounds
    }

    /// Curve sample at spline parameter `s` (chord length, close to
    /// arclength), clamped to the usable length
    pub fn state_at(&self, s: f64) -> PathState {
        self.spline.state(s.clamp(0.0, self.length))
    }

    /// Arclength of the curve point closest to `point`.
    ///
    /// Coarse sampling every `step` brackets the minimum, golden-section
    /// search refines it.
    pub fn project(&self, point: Point2D, step: f64) -> f64 {
        let distance = |s: f64| self.spline.position(s).distance(&point);
        let num_samples = (self.length / step).ceil().max(1.0) as usize;

        let mut best_s = 0.0;
        let mut best_d = distance(0.0);
        for i in 1..=num_samples {
            let s = (i as f64 * step).min(self.length);
            let d = distance(s);
            if d < best_d {
                best_s = s;
                best_d = d;
            }
        }

        let mut a = (best_s - step).max(0.0);
        let mut b = (best_s + step).min(self.length);
        let mut c = b - GOLDEN_RATIO * (b - a);
        let mut d = a + GOLDEN_RATIO * (b - a);
        while b - a > PROJECTION_TOLERANCE {
            if distance(c) < distance(d) {
                b = d;
            } else {
                a = c;
            }
            c = b - GOLDEN_RATIO * (b - a);
            d = a + GOLDEN_RATIO * (b - a);
        }
        0.5 * (a + b)
    }

    /// Resample the curve into reference states.
    ///
    /// The nominal step is `spacing`; with `dense_curvature` set, knots whose
    /// curvature magnitude exceeds it are followed by a half step. The loop
    /// is driven by arclength so it always terminates. The end of the usable
    /// length is always a knot.
    pub fn build_reference_from_spline(&mut self, spacing: f64, dense_curvature: Option<f64>, epsilon: f64) {
        let dense_spacing = 0.5 * spacing;
        let mut states = Vec::with_capacity((self.length / dense_spacing) as usize + 2);

        let mut s = 0.0;
        while s < self.length - epsilon {
            let state = self.spline.state(s);
            let step = match dense_curvature {
                Some(threshold) if state.k.abs() > threshold => dense_spacing,
                _ => spacing,
            };
            states.push(state);
            s += step;
        }
        states.push(self.spline.state(self.length));

        debug!(
            "Resampled reference path of length {:.2} m into {} states",
            self.length,
            states.len()
        );
        self.reference_states = states;
        self.bounds.clear();
    }

    /// Compute the corridor bound of every reference state.
    ///
    /// Fails with `BoundsInfeasible` naming every knot whose hard bounds cross.
    pub fn update_bounds<M: ObstacleMap + ?Sized>(&mut self, map: &M, config: &PathBoostConfig) -> PathBoostResult<()> {
        if self.reference_states.is_empty() {
            return Err(PathBoostError::InvalidParameter(
                "reference path must be resampled before computing bounds".to_string(),
            ));
        }
        let half_width = config.vehicle.half_width();
        let margin = config.vehicle.safety_margin;
        let expected_margin = config.optimization.expected_safety_margin;
        let range = config.optimization.corridor_search_range;

        self.bounds = self
            .reference_states
            .iter()
            .map(|state| {
                let (free_lower, free_upper) = free_interval(map, state, range);
                CorridorBound::from_free_interval(free_lower, free_upper, half_width, margin, expected_margin)
            })
            .collect();

        let infeasible: Vec<f64> = self
            .reference_states
            .iter()
            .zip(self.bounds.iter())
            .filter(|(_, bound)| !bound.is_feasible())
            .map(|(state, _)| state.s)
            .collect();
        if !infeasible.is_empty() {
            return Err(PathBoostError::BoundsInfeasible {
                arclengths: infeasible,
            });
        }
        Ok(())
    }

    /// Dump every knot and its bounds to the error log
    pub fn log_bounds_info(&self) {
        error!(
            "Reference path: length {:.3} m, {} states, {} bounds",
            self.length,
            self.reference_states.len(),
            self.bounds.len()
        );
        for (state, bound) in self.reference_states.iter().zip(self.bounds.iter()) {
            error!(
                "s {:8.3} | x {:9.3} y {:9.3} heading {:7.3} k {:7.4} | lb {:7.3} ub {:7.3} | soft lb {:7.3} ub {:7.3}{}",
                state.s,
                state.x,
                state.y,
                state.heading,
                state.k,
                bound.lower,
                bound.upper,
                bound.soft_lower,
                bound.soft_upper,
                if bound.is_feasible() { "" } else { " INFEASIBLE" }
            );
        }
    }
}

/// Free lateral interval around a reference state, capped at `range` on
/// each side. When the state itself is occupied, the nearest free lateral
/// offset is searched first; a fully blocked section yields `(0, 0)`.
fn free_interval<M: ObstacleMap + ?Sized>(map: &M, state: &PathState, range: f64) -> (f64, f64) {
    let left = state.heading + FRAC_PI_2;
    let right = state.heading - FRAC_PI_2;

    let center = match nearest_free_offset(map, state, range) {
        Some(offset) => offset,
        None => return (0.0, 0.0),
    };
    let origin = frenet_to_cartesian(state, center);
    let upper = center + map.distance_along_ray(origin, left, range);
    let lower = center - map.distance_along_ray(origin, right, range);
    (lower, upper)
}

fn nearest_free_offset<M: ObstacleMap + ?Sized>(map: &M, state: &PathState, range: f64) -> Option<f64> {
    let num_steps = (range / LATERAL_SCAN_STEP).floor() as usize;
    (0..=num_steps)
        .flat_map(|i| {
            let d = i as f64 * LATERAL_SCAN_STEP;
            if i == 0 {
                vec![0.0]
            } else {
                vec![d, -d]
            }
        })
        .find(|&offset| map.is_free(frenet_to_cartesian(state, offset)))
}
