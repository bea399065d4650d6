//! Reference path smoothing
//!
//! The raw route is cut at the vehicle, resampled, optionally shifted by the
//! lateral pre-search and then smoothed by a tension QP inside a rough
//! corridor. The smoothed points are interpolated by a cubic spline.
//!
//! Strategies are the closed set [`SmoothingMethod`]; each variant knows how
//! to build its QP and how to read points back from the solution.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;
use std::time::Instant;

use log::{debug, info};

use crate::common::{ObstacleMap, PathBoostError, PathBoostResult, PathState, Point2D, Pose2D};
use crate::optimization::{QpProblem, QpSolver};
use crate::utils::geometry::{
    cumulative_length, discrete_curvatures, discrete_headings, frenet_to_cartesian, normalize_angle,
    project_on_polyline,
};

use super::config::{PathBoostConfig, SmoothingMethod};
use super::reference_path::ReferencePath;
use super::search::LateralSearch;

/// Resampled route with its rough corridor `(lower, upper)` per point
#[derive(Debug, Clone)]
pub struct RoughPath {
    pub states: Vec<PathState>,
    pub corridor: Vec<(f64, f64)>,
}

impl RoughPath {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn points(&self) -> Vec<Point2D> {
        self.states.iter().map(|s| s.position()).collect()
    }

    fn segment_lengths(&self) -> Vec<f64> {
        self.states
            .windows(2)
            .map(|w| w[0].position().distance(&w[1].position()))
            .collect()
    }
}

pub struct ReferencePathSmoother<'a, M: ObstacleMap + ?Sized> {
    method: SmoothingMethod,
    config: &'a PathBoostConfig,
    map: &'a M,
    qp_solver: &'a dyn QpSolver,
}

impl<'a, M: ObstacleMap + ?Sized> ReferencePathSmoother<'a, M> {
    /// Smoother using the configured method
    pub fn new(config: &'a PathBoostConfig, map: &'a M, qp_solver: &'a dyn QpSolver) -> Self {
        ReferencePathSmoother {
            method: config.smoothing.method,
            config,
            map,
            qp_solver,
        }
    }

    /// Smoother for a method given by name (`"TENSION"`, `"TENSION2"`)
    pub fn create(
        method_name: &str,
        config: &'a PathBoostConfig,
        map: &'a M,
        qp_solver: &'a dyn QpSolver,
    ) -> PathBoostResult<Self> {
        let method = method_name.parse::<SmoothingMethod>()?;
        Ok(ReferencePathSmoother {
            method,
            ..Self::new(config, map, qp_solver)
        })
    }

    pub fn method(&self) -> SmoothingMethod {
        self.method
    }

    /// Smooth `waypoints` into a reference path starting at the projection
    /// of `start` onto the route
    pub fn smooth(&self, waypoints: &[Pose2D], start: &Pose2D) -> PathBoostResult<ReferencePath> {
        let timer = Instant::now();
        let rough = self.rough_path(waypoints, start)?;

        let points = if rough.len() < 3 {
            debug!("Only {} rough points, smoothing skipped", rough.len());
            rough.points()
        } else {
            let problem = self.method.build_problem(&rough, self.config);
            let solution = self
                .qp_solver
                .solve(&problem)
                .map_err(PathBoostError::SmoothingInfeasible)?;
            self.method.extract_points(&rough, &solution)
        };

        let points = dedup_points(&points, self.config.epsilon);
        if points.len() < 2 {
            return Err(PathBoostError::InputError(
                "smoothed route collapsed to a single point".to_string(),
            ));
        }
        let reference_path = ReferencePath::from_points(&points)?;
        info!(
            "{} smoothing: {} points, length {:.2} m, {:.1} ms",
            self.method,
            points.len(),
            reference_path.length(),
            timer.elapsed().as_secs_f64() * 1e3
        );
        Ok(reference_path)
    }

    /// Cut, resample and shift the route and attach its rough corridor
    pub fn rough_path(&self, waypoints: &[Pose2D], start: &Pose2D) -> PathBoostResult<RoughPath> {
        let smoothing = &self.config.smoothing;
        let route = prepare_route(waypoints, start, self.config.epsilon)?;
        let mut states = resample_polyline(&route, smoothing.search_longitudinal_spacing);

        if smoothing.enable_searching && states.len() > 1 {
            let offsets = LateralSearch::new(self.map, self.config).search(&states);
            let shifted: Vec<Point2D> = states
                .iter()
                .zip(offsets.iter())
                .map(|(state, &offset)| frenet_to_cartesian(state, offset))
                .collect();
            states = states_from_points(&dedup_points(&shifted, self.config.epsilon));
        }

        let corridor = rough_corridor(
            self.map,
            &states,
            self.config.vehicle.half_width(),
            smoothing.search_lateral_range,
        );
        Ok(RoughPath { states, corridor })
    }
}

impl SmoothingMethod {
    /// Smoothing QP over the rough path
    pub fn build_problem(&self, rough: &RoughPath, config: &PathBoostConfig) -> QpProblem {
        match self {
            SmoothingMethod::Tension => build_tension_problem(rough, config),
            SmoothingMethod::Tension2 => build_tension2_problem(rough, config),
        }
    }

    /// Smoothed points from a solution of [`SmoothingMethod::build_problem`]
    pub fn extract_points(&self, rough: &RoughPath, solution: &[f64]) -> Vec<Point2D> {
        let m = rough.len();
        match self {
            SmoothingMethod::Tension => rough
                .states
                .iter()
                .zip(solution.iter())
                .map(|(state, &d)| frenet_to_cartesian(state, d))
                .collect(),
            SmoothingMethod::Tension2 => (0..m)
                .map(|j| Point2D::new(solution[j], solution[m + j]))
                .collect(),
        }
    }
}

// Variables: lateral offset d_j of every rough point.
//
// The heading change at an interior point is linearised as
// alpha_j = c_j + (d_{j+1} - d_j) / h_j - (d_j - d_{j-1}) / h_{j-1}
// with c_j the heading change of the rough polyline.
fn build_tension_problem(rough: &RoughPath, config: &PathBoostConfig) -> QpProblem {
    let m = rough.len();
    let weights = &config.smoothing.tension;
    let h = rough.segment_lengths();
    let points = rough.points();
    let segment_heading: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1].y - w[0].y).atan2(w[1].x - w[0].x))
        .collect();

    let heading_change: Vec<(Vec<(usize, f64)>, f64)> = (1..m - 1)
        .map(|j| {
            let row = vec![
                (j - 1, 1.0 / h[j - 1]),
                (j, -1.0 / h[j] - 1.0 / h[j - 1]),
                (j + 1, 1.0 / h[j]),
            ];
            (row, normalize_angle(segment_heading[j] - segment_heading[j - 1]))
        })
        .collect();

    let mut qp = QpProblem::new(m);
    for (row, offset) in &heading_change {
        qp.add_squared_residual(row, *offset, weights.angle_diff);
    }
    for pair in heading_change.windows(2) {
        let (row0, c0) = &pair[0];
        let (row1, c1) = &pair[1];
        qp.add_squared_residual(&combine_rows(row1, 1.0, row0, -1.0), c1 - c0, weights.angle_diff_diff);
    }
    for j in 0..m {
        qp.add_squared_residual(&[(j, 1.0)], 0.0, weights.deviation);
    }

    qp.add_constraint(&[(0, 1.0)], 0.0, 0.0);
    for j in 1..m {
        let (lower, upper) = rough.corridor[j];
        qp.add_constraint(&[(j, 1.0)], lower, upper);
    }
    qp
}

// Variables: x_j at j, y_j at m + j.
fn build_tension2_problem(rough: &RoughPath, config: &PathBoostConfig) -> QpProblem {
    let m = rough.len();
    let weights = &config.smoothing.tension2;
    let h = rough.segment_lengths();
    let x = |j: usize| j;
    let y = |j: usize| m + j;

    let mut qp = QpProblem::new(2 * m);
    for (j, state) in rough.states.iter().enumerate() {
        qp.add_squared_residual(&[(x(j), 1.0)], -state.x, weights.deviation);
        qp.add_squared_residual(&[(y(j), 1.0)], -state.y, weights.deviation);
    }
    // same finite differences on the x block and the y block
    for &base in [0, m].iter() {
        for j in 1..m - 1 {
            let row = [(base + j - 1, 1.0), (base + j, -2.0), (base + j + 1, 1.0)];
            qp.add_squared_residual(&row, 0.0, weights.curvature);
        }
        for j in 1..m.saturating_sub(2) {
            let row = [
                (base + j - 1, -1.0),
                (base + j, 3.0),
                (base + j + 1, -3.0),
                (base + j + 2, 1.0),
            ];
            qp.add_squared_residual(&row, 0.0, weights.curvature_rate);
        }
    }

    let first = &rough.states[0];
    qp.add_constraint(&[(x(0), 1.0)], first.x, first.x);
    qp.add_constraint(&[(y(0), 1.0)], first.y, first.y);
    for j in 1..m {
        let state = &rough.states[j];
        let (sin, cos) = state.heading.sin_cos();
        let (lower, upper) = rough.corridor[j];

        // displacement along the normal stays in the corridor
        let normal_at_rough = -sin * state.x + cos * state.y;
        qp.add_constraint(
            &[(x(j), -sin), (y(j), cos)],
            normal_at_rough + lower,
            normal_at_rough + upper,
        );

        let local_spacing = if j + 1 < m { 0.5 * (h[j - 1] + h[j]) } else { h[j - 1] };
        let drift = 0.25 * local_spacing;
        let tangent_at_rough = cos * state.x + sin * state.y;
        qp.add_constraint(
            &[(x(j), cos), (y(j), sin)],
            tangent_at_rough - drift,
            tangent_at_rough + drift,
        );
    }
    qp
}

fn combine_rows(a: &[(usize, f64)], scale_a: f64, b: &[(usize, f64)], scale_b: f64) -> Vec<(usize, f64)> {
    let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
    for &(i, v) in a {
        *merged.entry(i).or_insert(0.0) += scale_a * v;
    }
    for &(i, v) in b {
        *merged.entry(i).or_insert(0.0) += scale_b * v;
    }
    merged.into_iter().collect()
}

/// Drop consecutive points closer than `epsilon`
pub fn dedup_points(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let mut result: Vec<Point2D> = Vec::with_capacity(points.len());
    for &p in points {
        if result.last().map_or(true, |last| last.distance(&p) > epsilon) {
            result.push(p);
        }
    }
    result
}

/// Distinct route points starting at the projection of `start`
pub fn prepare_route(waypoints: &[Pose2D], start: &Pose2D, epsilon: f64) -> PathBoostResult<Vec<Point2D>> {
    let positions: Vec<Point2D> = waypoints.iter().map(|w| w.position()).collect();
    let points = dedup_points(&positions, epsilon);
    if points.len() < 2 {
        return Err(PathBoostError::InputError(format!(
            "need at least 2 distinct waypoints, got {}",
            points.len()
        )));
    }

    let (segment, projection, _) = project_on_polyline(&points, start.position()).ok_or_else(|| {
        PathBoostError::InputError("cannot project the start pose onto the route".to_string())
    })?;
    let mut route = vec![projection];
    route.extend(
        points[segment + 1..]
            .iter()
            .filter(|p| p.distance(&projection) > epsilon),
    );
    if route.len() < 2 {
        return Err(PathBoostError::InputError(
            "route ends at the vehicle position".to_string(),
        ));
    }
    Ok(route)
}

/// Resample a polyline at uniform spacing no larger than `spacing`
pub fn resample_polyline(points: &[Point2D], spacing: f64) -> Vec<PathState> {
    let s = cumulative_length(points);
    let total = s.last().copied().unwrap_or(0.0);
    if points.len() < 2 || total <= 0.0 {
        return states_from_points(points);
    }
    let num_segments = (total / spacing).ceil().max(1.0) as usize;
    let step = total / num_segments as f64;

    let mut segment = 0;
    let samples: Vec<Point2D> = (0..=num_segments)
        .map(|i| {
            let target = (i as f64 * step).min(total);
            while segment + 2 < points.len() && s[segment + 1] < target {
                segment += 1;
            }
            let length = s[segment + 1] - s[segment];
            let t = if length > 0.0 {
                ((target - s[segment]) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Point2D::from(points[segment].to_vector() * (1.0 - t) + points[segment + 1].to_vector() * t)
        })
        .collect();
    states_from_points(&samples)
}

/// Path states with discrete heading, curvature and arclength
pub fn states_from_points(points: &[Point2D]) -> Vec<PathState> {
    let headings = discrete_headings(points);
    let curvatures = discrete_curvatures(points);
    let s = cumulative_length(points);
    points
        .iter()
        .enumerate()
        .map(|(i, p)| PathState::new(p.x, p.y, headings[i], s[i], curvatures[i]))
        .collect()
}

/// Free lateral interval minus half width at every state, clamped to contain
/// the route itself and capped at `range`. Points inside obstacles are pinned.
pub fn rough_corridor<M: ObstacleMap + ?Sized>(
    map: &M,
    states: &[PathState],
    half_width: f64,
    range: f64,
) -> Vec<(f64, f64)> {
    states
        .iter()
        .map(|state| {
            let center = state.position();
            if !map.is_free(center) {
                return (0.0, 0.0);
            }
            let left = map.distance_along_ray(center, state.heading + FRAC_PI_2, range);
            let right = map.distance_along_ray(center, state.heading - FRAC_PI_2, range);
            (
                -(right - half_width).max(0.0).min(range),
                (left - half_width).max(0.0).min(range),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::GridObstacleMap;
    use crate::optimization::{OsqpSolver, QpError};
    use crate::utils::geometry::three_point_curvature;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    struct FailingSolver;

    impl QpSolver for FailingSolver {
        fn solve(&self, _problem: &QpProblem) -> Result<Vec<f64>, QpError> {
            Err(QpError::PrimalInfeasible)
        }
    }

    fn open_map() -> GridObstacleMap {
        GridObstacleMap::new(-20.0, -40.0, 120.0, 40.0, 0.5).unwrap()
    }

    fn straight_waypoints() -> Vec<Pose2D> {
        (0..=10).map(|i| Pose2D::new(i as f64 * 10.0, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_prepare_route_cuts_at_vehicle() {
        let route = prepare_route(&straight_waypoints(), &Pose2D::new(25.0, 2.0, 0.0), 1e-6).unwrap();
        assert_abs_diff_eq!(route[0].x, 25.0, epsilon = 1e-12);
        assert_abs_diff_eq!(route[0].y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(route[1].x, 30.0, epsilon = 1e-12);
        assert_eq!(route.len(), 9);
    }

    #[test]
    fn test_prepare_route_degenerate() {
        let start = Pose2D::origin();
        assert!(matches!(prepare_route(&[], &start, 1e-6), Err(PathBoostError::InputError(_))));
        let repeated = vec![Pose2D::new(1.0, 1.0, 0.0); 5];
        assert!(matches!(prepare_route(&repeated, &start, 1e-6), Err(PathBoostError::InputError(_))));
        // vehicle past the end of the route
        let beyond = Pose2D::new(150.0, 0.0, 0.0);
        assert!(prepare_route(&straight_waypoints(), &beyond, 1e-6).is_err());
    }

    #[test]
    fn test_resample_polyline() {
        let points = vec![Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0), Point2D::new(10.0, 5.0)];
        let states = resample_polyline(&points, 1.5);
        assert_eq!(states.len(), 11);
        assert_abs_diff_eq!(states.last().unwrap().y, 5.0, epsilon = 1e-12);
        for w in states.windows(2) {
            assert!(w[1].s > w[0].s);
            assert!(w[0].position().distance(&w[1].position()) <= 1.5 + 1e-9);
        }
    }

    #[test]
    fn test_rough_corridor_contains_route() {
        let mut map = open_map();
        map.add_box(Point2D::new(20.0, 0.5), Point2D::new(30.0, 5.0));
        map.add_box(Point2D::new(50.0, -1.0), Point2D::new(52.0, 1.0));
        let states = resample_polyline(&[Point2D::new(0.0, 0.0), Point2D::new(100.0, 0.0)], 1.5);
        let corridor = rough_corridor(&map, &states, 1.0, 10.0);
        for (state, &(lower, upper)) in states.iter().zip(corridor.iter()) {
            assert!(lower <= 0.0 && upper >= 0.0);
            assert!(lower >= -10.0 && upper <= 10.0);
            if state.x > 50.0 && state.x < 52.0 {
                assert_eq!((lower, upper), (0.0, 0.0));
            }
            if state.x > 21.0 && state.x < 29.0 {
                assert_eq!(upper, 0.0);
            }
        }
    }

    #[test]
    fn test_smooth_straight_line() {
        let map = open_map();
        let config = PathBoostConfig::default();
        let solver = OsqpSolver::default();
        for name in ["TENSION", "TENSION2"].iter() {
            let smoother = ReferencePathSmoother::create(name, &config, &map, &solver).unwrap();
            let path = smoother.smooth(&straight_waypoints(), &Pose2D::origin()).unwrap();
            assert_abs_diff_eq!(path.length(), 100.0, epsilon = 0.05);
            for i in 0..100 {
                let state = path.state_at(i as f64);
                assert_abs_diff_eq!(state.y, 0.0, epsilon = 1e-2);
                assert_abs_diff_eq!(state.k, 0.0, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_smoothing_reduces_noise() {
        let map = open_map();
        let config = PathBoostConfig::default();
        let solver = OsqpSolver::default();
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.15).unwrap();
        let waypoints: Vec<Pose2D> = (0..=50)
            .map(|i| Pose2D::new(i as f64 * 2.0, noise.sample(&mut rng), 0.0))
            .collect();

        let max_curvature = |points: &[Point2D]| {
            points
                .windows(3)
                .map(|w| three_point_curvature(w[0], w[1], w[2]).abs())
                .fold(0.0, f64::max)
        };
        let rough: Vec<Point2D> = waypoints.iter().map(|w| w.position()).collect();
        for name in ["TENSION", "TENSION2"].iter() {
            let smoother = ReferencePathSmoother::create(name, &config, &map, &solver).unwrap();
            let path = smoother.smooth(&waypoints, &Pose2D::origin()).unwrap();
            let smoothed: Vec<Point2D> = (0..=50).map(|i| path.spline().position(i as f64 * 2.0)).collect();
            assert!(max_curvature(&smoothed) < 0.5 * max_curvature(&rough), "{}", name);
            assert!(smoothed.iter().all(|p| p.y.abs() < 0.6));
        }
    }

    #[test]
    fn test_smooth_around_obstacle_stays_free() {
        let mut map = open_map();
        map.add_box(Point2D::new(45.0, -1.5), Point2D::new(55.0, 2.0));
        let config = PathBoostConfig::default();
        let solver = OsqpSolver::default();
        let smoother = ReferencePathSmoother::new(&config, &map, &solver);
        let path = smoother.smooth(&straight_waypoints(), &Pose2D::origin()).unwrap();
        let length = path.length();
        let mut s = 0.0;
        while s < length {
            assert!(map.is_free(path.spline().position(s)), "occupied at s = {}", s);
            s += 0.25;
        }
    }

    #[test]
    fn test_unknown_method_and_solver_failure() {
        let map = open_map();
        let config = PathBoostConfig::default();
        let solver = OsqpSolver::default();
        assert!(matches!(
            ReferencePathSmoother::create("BSPLINE", &config, &map, &solver),
            Err(PathBoostError::InvalidParameter(_))
        ));

        let failing = FailingSolver;
        let smoother = ReferencePathSmoother::new(&config, &map, &failing);
        let result = smoother.smooth(&straight_waypoints(), &Pose2D::origin());
        assert!(matches!(
            result,
            Err(PathBoostError::SmoothingInfeasible(QpError::PrimalInfeasible))
        ));
    }

    #[test]
    fn test_short_route_skips_qp() {
        let map = open_map();
        let config = PathBoostConfig::default();
        let failing = FailingSolver;
        let smoother = ReferencePathSmoother::new(&config, &map, &failing);
        let waypoints = vec![Pose2D::new(0.0, 0.0, 0.0), Pose2D::new(1.0, 0.0, 0.0)];
        let path = smoother.smooth(&waypoints, &Pose2D::origin()).unwrap();
        assert_abs_diff_eq!(path.length(), 1.0, epsilon = 1e-9);
    }
}
