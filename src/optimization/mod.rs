//! Sparse quadratic programming service consumed by the smoother and solver

pub mod sparse;
pub mod qp;

pub use sparse::TripletMatrix;
pub use qp::{OsqpSolver, QpError, QpProblem, QpSettings, QpSolver, QP_INFINITY};
