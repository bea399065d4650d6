//! Quadratic program service
//!
//! Problems have the OSQP form
//!
//! ```text
//! minimize    1/2 x^T P x + q^T x
//! subject to  l <= A x <= u
//! ```
//!
//! Pipeline code only talks to the [`QpSolver`] trait; [`OsqpSolver`] is the
//! default backend.

use log::{debug, warn};
use osqp::{Problem, Settings, Status};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sparse::TripletMatrix;

/// Bound magnitude treated as infinite (OSQP_INFTY)
pub const QP_INFINITY: f64 = 1.0e30;

/// Failure reported by a QP backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QpError {
    #[error("problem data rejected: {0}")]
    Setup(String),

    #[error("problem is primal infeasible")]
    PrimalInfeasible,

    #[error("problem is dual infeasible (unbounded)")]
    DualInfeasible,

    #[error("solver did not converge: {0}")]
    Numerical(String),
}

/// A QP instance in solver-neutral form
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Hessian P; only the upper triangle is read
    pub hessian: TripletMatrix,
    /// Gradient q
    pub gradient: Vec<f64>,
    /// Linear constraint matrix A
    pub constraints: TripletMatrix,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
}

impl QpProblem {
    /// Empty problem over `num_vars` variables
    pub fn new(num_vars: usize) -> Self {
        Self {
            hessian: TripletMatrix::new(num_vars, num_vars),
            gradient: vec![0.0; num_vars],
            constraints: TripletMatrix::new(0, num_vars),
            lower_bound: Vec::new(),
            upper_bound: Vec::new(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.gradient.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.lower_bound.len()
    }

    /// Append the constraint `lower <= row . x <= upper`
    pub fn add_constraint(&mut self, row: &[(usize, f64)], lower: f64, upper: f64) -> usize {
        self.lower_bound.push(lower);
        self.upper_bound.push(upper);
        self.constraints.push_row(row)
    }

    /// Add `weight * (row . x + offset)^2` to the objective
    pub fn add_squared_residual(&mut self, row: &[(usize, f64)], offset: f64, weight: f64) {
        self.hessian.add_outer_product_upper(row, 2.0 * weight);
        for &(i, v) in row {
            self.gradient[i] += 2.0 * weight * offset * v;
        }
    }

    /// Add `weight * x[index]` to the objective
    pub fn add_linear_cost(&mut self, index: usize, weight: f64) {
        self.gradient[index] += weight;
    }

    /// Check dimensions and bound ordering
    pub fn validate(&self) -> Result<(), QpError> {
        let n = self.num_vars();
        let m = self.num_constraints();
        if self.hessian.ncols() != n || self.hessian.nrows() != n {
            return Err(QpError::Setup(format!(
                "hessian is {}x{}, expected {}x{}",
                self.hessian.nrows(),
                self.hessian.ncols(),
                n,
                n
            )));
        }
        if self.constraints.ncols() != n || self.constraints.nrows() != m || self.upper_bound.len() != m {
            return Err(QpError::Setup(format!(
                "constraint matrix is {}x{} with {} lower / {} upper bounds, expected {} columns",
                self.constraints.nrows(),
                self.constraints.ncols(),
                m,
                self.upper_bound.len(),
                n
            )));
        }
        if let Some(row) = (0..m).find(|&i| !(self.lower_bound[i] <= self.upper_bound[i])) {
            return Err(QpError::Setup(format!(
                "row {} has lower bound {} above upper bound {}",
                row, self.lower_bound[row], self.upper_bound[row]
            )));
        }
        Ok(())
    }
}

/// Black-box sparse QP solve primitive
pub trait QpSolver {
    /// Return the primal solution or the reason there is none
    fn solve(&self, problem: &QpProblem) -> Result<Vec<f64>, QpError>;
}

/// OSQP tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QpSettings {
    pub eps_abs: f64,
    pub eps_rel: f64,
    pub max_iter: u32,
    pub polish: bool,
    pub verbose: bool,
}

impl Default for QpSettings {
    fn default() -> Self {
        Self {
            eps_abs: 1e-5,
            eps_rel: 1e-5,
            max_iter: 20000,
            polish: true,
            verbose: false,
        }
    }
}

/// [`QpSolver`] backed by OSQP
#[derive(Debug, Clone, Default)]
pub struct OsqpSolver {
    settings: QpSettings,
}

impl OsqpSolver {
    pub fn new(settings: QpSettings) -> Self {
        Self { settings }
    }

    fn osqp_settings(&self) -> Settings {
        Settings::default()
            .eps_abs(self.settings.eps_abs)
            .eps_rel(self.settings.eps_rel)
            .max_iter(self.settings.max_iter)
            .polish(self.settings.polish)
            .verbose(self.settings.verbose)
    }
}

impl QpSolver for OsqpSolver {
    fn solve(&self, problem: &QpProblem) -> Result<Vec<f64>, QpError> {
        problem.validate()?;
        debug!(
            "OSQP solve: {} variables, {} constraints, {} hessian / {} constraint non-zeros",
            problem.num_vars(),
            problem.num_constraints(),
            problem.hessian.nnz(),
            problem.constraints.nnz()
        );

        let p = problem.hessian.to_csc().into_upper_tri();
        let a = problem.constraints.to_csc();
        let mut osqp_problem = Problem::new(
            p,
            &problem.gradient,
            a,
            &problem.lower_bound,
            &problem.upper_bound,
            &self.osqp_settings(),
        )
        .map_err(|e| QpError::Setup(format!("{:?}", e)))?;

        match osqp_problem.solve() {
            Status::Solved(solution) => Ok(solution.x().to_vec()),
            Status::SolvedInaccurate(solution) => {
                warn!("OSQP returned an inaccurate solution");
                Ok(solution.x().to_vec())
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                Err(QpError::PrimalInfeasible)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                Err(QpError::DualInfeasible)
            }
            Status::MaxIterationsReached(_) => {
                Err(QpError::Numerical("maximum iterations reached".to_string()))
            }
            Status::TimeLimitReached(_) => {
                Err(QpError::Numerical("time limit reached".to_string()))
            }
            _ => Err(QpError::Numerical("unexpected solver status".to_string())),
        }
    }
}
