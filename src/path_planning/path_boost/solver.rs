//! Two-phase QP path solver
//!
//! Knot `i` of the reference path carries the state `(l, psi, k)`: lateral
//! offset, heading error and curvature of the driven path. Consecutive knots
//! are linked by the linearised Frenet bicycle model
//!
//! ```text
//! l_{i+1}   = l_i + ds_i * psi_i
//! psi_{i+1} = psi_i + ds_i * (k_i - kappa_i - kappa_i^2 * l_i)
//! ```
//!
//! where `kappa` is the reference curvature. Methods KP and KCP add the
//! curvature rate `dk_i = k_{i+1} - k_i` as an explicit control.
//!
//! Every knot carries two non-negative relaxations: a slack that softens the
//! expected-margin corridor, and a corridor violation `e_i` in
//! `lower - e_i <= l_i <= upper + e_i`. The violation is paid linearly and
//! quadratically with `corridor_violation_weight`, so it stays zero wherever
//! the hard corridor can be met. A start pose already inside the safety
//! margin therefore still yields a rough solution.
//!
//! [`PathSolver::solve`] runs the rough pass.
//! [`PathSolver::update_problem_formulation_and_solve`] then rebuilds the
//! problem with hard bounds narrowed around the rough offsets, slack capped at
//! its rough value and violation capped at the rough offsets' violation, so
//! neither can grow and the rough solution stays feasible.

use std::time::Instant;

use log::{debug, info};

use crate::common::{PathBoostError, PathBoostResult, PathState, SolvePass};
use crate::optimization::{QpError, QpProblem, QpSolver, QP_INFINITY};
use crate::utils::geometry::{frenet_to_cartesian, global_to_local, normalize_angle};

use super::config::{OptimizationMethod, PathBoostConfig};
use super::reference_path::ReferencePath;
use super::vehicle_state::VehicleState;

/// Allowance on the slack caps of the refinement pass, absorbs solver tolerance
const SLACK_TOLERANCE: f64 = 1e-4;

/// Index map of the QP variable vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    pub num_knots: usize,
    pub control_size: usize,
}

impl VariableLayout {
    pub fn new(num_knots: usize, method: OptimizationMethod) -> Self {
        let control_size = match method {
            OptimizationMethod::K => 0,
            OptimizationMethod::Kp | OptimizationMethod::Kcp => num_knots.saturating_sub(1),
        };
        VariableLayout {
            num_knots,
            control_size,
        }
    }

    pub fn offset(&self, i: usize) -> usize {
        i
    }

    pub fn heading_error(&self, i: usize) -> usize {
        self.num_knots + i
    }

    pub fn curvature(&self, i: usize) -> usize {
        2 * self.num_knots + i
    }

    pub fn curvature_rate(&self, i: usize) -> usize {
        3 * self.num_knots + i
    }

    pub fn slack(&self, i: usize) -> usize {
        3 * self.num_knots + self.control_size + i
    }

    pub fn corridor_violation(&self, i: usize) -> usize {
        4 * self.num_knots + self.control_size + i
    }

    pub fn num_vars(&self) -> usize {
        5 * self.num_knots + self.control_size
    }
}

/// Solution of one pass, per knot
#[derive(Debug, Clone)]
pub struct SolvedPass {
    pub offsets: Vec<f64>,
    pub heading_errors: Vec<f64>,
    pub curvatures: Vec<f64>,
    pub slack: Vec<f64>,
    /// Distance outside the hard corridor
    pub violations: Vec<f64>,
    /// Cartesian path with strictly increasing arclength
    pub path: Vec<PathState>,
}

impl SolvedPass {
    pub fn total_slack(&self) -> f64 {
        self.slack.iter().sum()
    }

    pub fn total_violation(&self) -> f64 {
        self.violations.iter().sum()
    }
}

pub struct PathSolver<'a> {
    config: &'a PathBoostConfig,
    reference_path: &'a ReferencePath,
    vehicle_state: &'a VehicleState,
    qp_solver: &'a dyn QpSolver,
    rough: Option<SolvedPass>,
    refined: Option<SolvedPass>,
}

impl<'a> PathSolver<'a> {
    pub fn new(
        config: &'a PathBoostConfig,
        reference_path: &'a ReferencePath,
        vehicle_state: &'a VehicleState,
        qp_solver: &'a dyn QpSolver,
    ) -> Self {
        PathSolver {
            config,
            reference_path,
            vehicle_state,
            qp_solver,
            rough: None,
            refined: None,
        }
    }

    /// Rough pass over the current reference states and bounds
    pub fn solve(&mut self) -> PathBoostResult<Vec<PathState>> {
        let pass = self.run_pass(SolvePass::Rough, None)?;
        let path = pass.path.clone();
        self.rough = Some(pass);
        self.refined = None;
        Ok(path)
    }

    /// Refinement pass around the rough result
    pub fn update_problem_formulation_and_solve(&mut self) -> PathBoostResult<Vec<PathState>> {
        let rough = self.rough.as_ref().ok_or_else(|| {
            PathBoostError::InvalidParameter("the rough pass must be solved before refinement".to_string())
        })?;
        let pass = self.run_pass(SolvePass::Refinement, Some(rough))?;
        let path = pass.path.clone();
        self.refined = Some(pass);
        Ok(path)
    }

    pub fn rough_pass(&self) -> Option<&SolvedPass> {
        self.rough.as_ref()
    }

    pub fn refined_pass(&self) -> Option<&SolvedPass> {
        self.refined.as_ref()
    }

    pub fn layout(&self) -> VariableLayout {
        VariableLayout::new(
            self.reference_path.reference_states().len(),
            self.config.optimization.method,
        )
    }

    fn run_pass(&self, pass: SolvePass, previous: Option<&SolvedPass>) -> PathBoostResult<SolvedPass> {
        let timer = Instant::now();
        let problem = self.build_problem(previous)?;
        let solution = self
            .qp_solver
            .solve(&problem)
            .map_err(|source| PathBoostError::SolveInfeasible { pass, source })?;
        if solution.len() != problem.num_vars() {
            return Err(PathBoostError::SolveInfeasible {
                pass,
                source: QpError::Numerical(format!(
                    "solution has {} entries, expected {}",
                    solution.len(),
                    problem.num_vars()
                )),
            });
        }
        let result = self.extract(&solution);
        info!(
            "{} pass: {} knots, total slack {:.4}, corridor violation {:.4}, max |k| {:.4}, {:.1} ms",
            pass,
            result.offsets.len(),
            result.total_slack(),
            result.total_violation(),
            result.curvatures.iter().fold(0.0_f64, |m, k| m.max(k.abs())),
            timer.elapsed().as_secs_f64() * 1e3
        );
        Ok(result)
    }

    /// Assemble the QP. `previous` is the rough result when building the
    /// refinement pass.
    pub fn build_problem(&self, previous: Option<&SolvedPass>) -> PathBoostResult<QpProblem> {
        let states = self.reference_path.reference_states();
        let bounds = self.reference_path.bounds();
        let n = states.len();
        if n < 2 || bounds.len() != n {
            return Err(PathBoostError::InvalidParameter(format!(
                "solver needs at least 2 reference states with bounds, got {} states and {} bounds",
                n,
                bounds.len()
            )));
        }
        if let Some(prev) = previous {
            if prev.offsets.len() != n || prev.slack.len() != n {
                return Err(PathBoostError::InvalidParameter(
                    "previous pass does not match the reference path".to_string(),
                ));
            }
        }

        let optimization = &self.config.optimization;
        let method = optimization.method;
        let weights = optimization.weights();
        let v = VariableLayout::new(n, method);
        let k_max = self.config.vehicle.max_curvature();
        let (initial_offset, initial_heading_error) = self.vehicle_state.initial_error();
        let mut qp = QpProblem::new(v.num_vars());

        // cost
        for i in 0..n {
            qp.add_squared_residual(&[(v.curvature(i), 1.0)], 0.0, weights.curvature);
            qp.add_squared_residual(&[(v.offset(i), 1.0)], 0.0, weights.deviation);
            qp.add_squared_residual(&[(v.slack(i), 1.0)], 0.0, weights.slack);
            qp.add_squared_residual(&[(v.corridor_violation(i), 1.0)], 0.0, optimization.corridor_violation_weight);
            qp.add_linear_cost(v.corridor_violation(i), optimization.corridor_violation_weight);
        }
        for i in 0..n - 1 {
            match method {
                OptimizationMethod::K => qp.add_squared_residual(
                    &[(v.curvature(i + 1), 1.0), (v.curvature(i), -1.0)],
                    0.0,
                    weights.curvature_rate,
                ),
                OptimizationMethod::Kp | OptimizationMethod::Kcp => {
                    qp.add_squared_residual(&[(v.curvature_rate(i), 1.0)], 0.0, weights.curvature_rate)
                }
            }
        }

        // kinematics
        for i in 0..n - 1 {
            let ds = states[i + 1].s - states[i].s;
            let kappa = states[i].k;
            qp.add_constraint(
                &[(v.offset(i + 1), 1.0), (v.offset(i), -1.0), (v.heading_error(i), -ds)],
                0.0,
                0.0,
            );
            qp.add_constraint(
                &[
                    (v.heading_error(i + 1), 1.0),
                    (v.heading_error(i), -1.0),
                    (v.curvature(i), -ds),
                    (v.offset(i), ds * kappa * kappa),
                ],
                -ds * kappa,
                -ds * kappa,
            );
            if v.control_size > 0 {
                qp.add_constraint(
                    &[(v.curvature(i + 1), 1.0), (v.curvature(i), -1.0), (v.curvature_rate(i), -1.0)],
                    0.0,
                    0.0,
                );
            }
        }

        // initial state
        qp.add_constraint(&[(v.offset(0), 1.0)], initial_offset, initial_offset);
        qp.add_constraint(&[(v.heading_error(0), 1.0)], initial_heading_error, initial_heading_error);

        // steering limits
        for i in 0..n {
            qp.add_constraint(&[(v.curvature(i), 1.0)], -k_max, k_max);
        }
        if method == OptimizationMethod::Kcp {
            for i in 0..n - 1 {
                let max_rate = optimization.max_curvature_rate * (states[i + 1].s - states[i].s);
                qp.add_constraint(&[(v.curvature_rate(i), 1.0)], -max_rate, max_rate);
            }
        }

        // corridor
        for i in 0..n {
            let bound = &bounds[i];
            let (lower, upper) = match previous {
                None if optimization.rough_constraints_far_away
                    && states[i].s > optimization.precise_planning_length =>
                {
                    (-QP_INFINITY, QP_INFINITY)
                }
                None => (bound.lower, bound.upper),
                Some(prev) => {
                    let radius = optimization.refinement_trust_region;
                    (
                        bound.lower.max(prev.offsets[i] - radius),
                        bound.upper.min(prev.offsets[i] + radius),
                    )
                }
            };
            let e = v.corridor_violation(i);
            qp.add_constraint(&[(v.offset(i), 1.0), (e, 1.0)], lower, QP_INFINITY);
            qp.add_constraint(&[(v.offset(i), 1.0), (e, -1.0)], -QP_INFINITY, upper);
            qp.add_constraint(&[(v.offset(i), 1.0), (v.slack(i), -1.0)], -QP_INFINITY, bound.soft_upper);
            qp.add_constraint(&[(v.offset(i), 1.0), (v.slack(i), 1.0)], bound.soft_lower, QP_INFINITY);

            let slack_cap = previous.map_or(QP_INFINITY, |prev| prev.slack[i] + SLACK_TOLERANCE);
            qp.add_constraint(&[(v.slack(i), 1.0)], 0.0, slack_cap);
            // measured against the full bounds, rows dropped far away included
            let violation_cap = previous.map_or(QP_INFINITY, |prev| {
                let l = prev.offsets[i];
                (bound.lower - l).max(l - bound.upper).max(0.0) + SLACK_TOLERANCE
            });
            qp.add_constraint(&[(e, 1.0)], 0.0, violation_cap);
        }

        // end state
        let end = &states[n - 1];
        let target = self.vehicle_state.target_pose();
        if optimization.constraint_end_heading {
            let end_heading_error = normalize_angle(target.heading - end.heading);
            qp.add_constraint(&[(v.heading_error(n - 1), 1.0)], end_heading_error, end_heading_error);
        }
        if optimization.exact_end_position {
            let end_offset = global_to_local(&end.pose(), target).y;
            qp.add_constraint(&[(v.offset(n - 1), 1.0)], end_offset, end_offset);
        }

        debug!(
            "{} path QP: {} variables, {} constraints",
            method,
            qp.num_vars(),
            qp.num_constraints()
        );
        Ok(qp)
    }

    /// Per-knot values and the Cartesian path of a solution vector
    fn extract(&self, solution: &[f64]) -> SolvedPass {
        let states = self.reference_path.reference_states();
        let n = states.len();
        let v = VariableLayout::new(n, self.config.optimization.method);
        let k_max = self.config.vehicle.max_curvature();
        let epsilon = self.config.epsilon;

        let offsets: Vec<f64> = (0..n).map(|i| solution[v.offset(i)]).collect();
        let heading_errors: Vec<f64> = (0..n).map(|i| solution[v.heading_error(i)]).collect();
        let curvatures: Vec<f64> = (0..n)
            .map(|i| solution[v.curvature(i)].clamp(-k_max, k_max))
            .collect();
        let slack: Vec<f64> = (0..n).map(|i| solution[v.slack(i)].max(0.0)).collect();
        let violations: Vec<f64> = (0..n)
            .map(|i| solution[v.corridor_violation(i)].max(0.0))
            .collect();

        let mut path: Vec<PathState> = Vec::with_capacity(n);
        for i in 0..n {
            let position = frenet_to_cartesian(&states[i], offsets[i]);
            let s = match path.last() {
                None => 0.0,
                Some(last) => {
                    let step = last.position().distance(&position);
                    if step <= epsilon {
                        continue;
                    }
                    last.s + step
                }
            };
            let mut state = PathState::new(
                position.x,
                position.y,
                normalize_angle(states[i].heading + heading_errors[i]),
                s,
                curvatures[i],
            );
            state.l = offsets[i];
            path.push(state);
        }

        SolvedPass {
            offsets,
            heading_errors,
            curvatures,
            slack,
            violations,
            path,
        }
    }
}
