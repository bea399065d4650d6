//! Path optimization pipeline
//!
//! smooth -> initial error -> truncate -> resample -> bounds -> rough solve
//! -> refinement solve
//!
//! Each stage either succeeds or aborts the call; no partial path is ever
//! returned. Bounds and solver failures additionally dump the reference path
//! bounds to the error log.

use std::time::Instant;

use log::{debug, error, info, warn};

use crate::common::{ObstacleMap, PathBoostError, PathBoostResult, PathState, Pose2D};
use crate::mapping::CollisionChecker;
use crate::optimization::{OsqpSolver, QpSolver};
use crate::utils::geometry::global_to_local;

use super::config::PathBoostConfig;
use super::reference_path::ReferencePath;
use super::smoother::ReferencePathSmoother;
use super::solver::{PathSolver, SolvedPass};
use super::vehicle_state::VehicleState;

/// Everything produced by a successful planning call
#[derive(Debug, Clone)]
pub struct PlanningResult {
    /// Final path from the refinement pass
    pub path: Vec<PathState>,
    /// Path from the rough pass
    pub rough_path: Vec<PathState>,
    pub reference_path: ReferencePath,
    pub vehicle_state: VehicleState,
    pub rough_slack: Vec<f64>,
    pub refined_slack: Vec<f64>,
    /// Indices into `path` whose footprint touches an obstacle
    pub colliding_states: Vec<usize>,
}

/// Path optimizer over a read-only obstacle map
pub struct PathBoost<'a, M: ObstacleMap + ?Sized> {
    config: PathBoostConfig,
    map: &'a M,
    qp_solver: Box<dyn QpSolver + Send + Sync>,
    collision_checker: CollisionChecker,
}

impl<'a, M: ObstacleMap + ?Sized> PathBoost<'a, M> {
    /// Validate `config` and use the OSQP backend
    pub fn new(config: PathBoostConfig, map: &'a M) -> PathBoostResult<Self> {
        config.validate()?;
        let qp_solver = Box::new(OsqpSolver::new(config.qp.clone()));
        let collision_checker = CollisionChecker::new(
            config.vehicle.width,
            config.vehicle.rear_edge_to_center,
            config.vehicle.front_edge_to_center,
        );
        Ok(PathBoost {
            config,
            map,
            qp_solver,
            collision_checker,
        })
    }

    pub fn with_defaults(map: &'a M) -> Self {
        let config = PathBoostConfig::default();
        let collision_checker = CollisionChecker::new(
            config.vehicle.width,
            config.vehicle.rear_edge_to_center,
            config.vehicle.front_edge_to_center,
        );
        PathBoost {
            qp_solver: Box::new(OsqpSolver::new(config.qp.clone())),
            config,
            map,
            collision_checker,
        }
    }

    /// Replace the QP backend
    pub fn with_qp_solver(mut self, qp_solver: Box<dyn QpSolver + Send + Sync>) -> Self {
        self.qp_solver = qp_solver;
        self
    }

    pub fn config(&self) -> &PathBoostConfig {
        &self.config
    }

    /// Optimized path from `start` along `waypoints` towards `target`
    pub fn solve(&self, waypoints: &[Pose2D], start: &Pose2D, target: &Pose2D) -> PathBoostResult<Vec<PathState>> {
        self.plan(waypoints, start, target).map(|result| result.path)
    }

    /// Like [`PathBoost::solve`], keeping the intermediate products
    pub fn plan(&self, waypoints: &[Pose2D], start: &Pose2D, target: &Pose2D) -> PathBoostResult<PlanningResult> {
        let timer = Instant::now();
        let result = self.run_pipeline(waypoints, start, target);
        match &result {
            Ok(planned) => info!(
                "Path optimization succeeded: {} states, length {:.2} m, {:.1} ms",
                planned.path.len(),
                planned.path.last().map_or(0.0, |s| s.s),
                timer.elapsed().as_secs_f64() * 1e3
            ),
            Err(e) => error!("Path optimization failed: {}", e),
        }
        result
    }

    fn run_pipeline(&self, waypoints: &[Pose2D], start: &Pose2D, target: &Pose2D) -> PathBoostResult<PlanningResult> {
        let config = &self.config;
        let qp_solver: &dyn QpSolver = self.qp_solver.as_ref();

        let stage = Instant::now();
        let smoother = ReferencePathSmoother::new(config, self.map, qp_solver);
        let mut reference_path = smoother.smooth(waypoints, start)?;
        debug!("smoothing took {:.1} ms", elapsed_ms(stage));

        let mut vehicle_state = VehicleState::new(*start, *target);
        let (offset, heading_error) = vehicle_state.compute_initial_error(&reference_path.state_at(0.0))?;
        debug!(
            "initial offset {:.3} m, heading error {:.2} deg",
            offset,
            heading_error.to_degrees()
        );

        let stage = Instant::now();
        self.truncate(&mut reference_path, target)?;
        let dense_curvature = if config.enable_dynamic_segmentation {
            Some(config.dynamic_segmentation_curvature)
        } else {
            None
        };
        reference_path.build_reference_from_spline(config.output_spacing, dense_curvature, config.epsilon);
        if let Err(e) = reference_path.update_bounds(self.map, config) {
            reference_path.log_bounds_info();
            return Err(e);
        }
        debug!("segmentation and bounds took {:.1} ms", elapsed_ms(stage));

        let stage = Instant::now();
        let (rough_path, path, rough_slack, refined_slack) = {
            let mut solver = PathSolver::new(config, &reference_path, &vehicle_state, qp_solver);
            let outcome = match solver.solve() {
                Ok(rough_path) => solver
                    .update_problem_formulation_and_solve()
                    .map(|path| (rough_path, path)),
                Err(e) => Err(e),
            };
            let (rough_path, path) = match outcome {
                Ok(paths) => paths,
                Err(e) => {
                    reference_path.log_bounds_info();
                    return Err(e);
                }
            };
            let slack_of = |pass: Option<&SolvedPass>| pass.map(|p| p.slack.clone()).unwrap_or_default();
            (
                rough_path,
                path,
                slack_of(solver.rough_pass()),
                slack_of(solver.refined_pass()),
            )
        };
        debug!("path solver took {:.1} ms", elapsed_ms(stage));

        let colliding_states = self.collision_checker.colliding_states(self.map, &path);
        if !colliding_states.is_empty() {
            warn!(
                "{} of {} optimized states fail the footprint check, first at s = {:.2} m",
                colliding_states.len(),
                path.len(),
                path[colliding_states[0]].s
            );
        }

        Ok(PlanningResult {
            path,
            rough_path,
            reference_path,
            vehicle_state,
            rough_slack,
            refined_slack,
            colliding_states,
        })
    }

    /// Shorten the reference path to the target projection when the target
    /// lies behind the end of the path
    fn truncate(&self, reference_path: &mut ReferencePath, target: &Pose2D) -> PathBoostResult<()> {
        let end = reference_path.state_at(reference_path.length());
        if global_to_local(&end.pose(), target).x > 0.0 {
            return Ok(());
        }
        let s = reference_path.project(target.position(), self.config.output_spacing);
        if s <= self.config.epsilon {
            return Err(PathBoostError::InputError(
                "target projects onto the start of the reference path".to_string(),
            ));
        }
        if s < reference_path.length() {
            debug!(
                "truncating reference path from {:.3} m to {:.3} m",
                reference_path.length(),
                s
            );
            reference_path.set_length(s)?;
        }
        Ok(())
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1e3
}
