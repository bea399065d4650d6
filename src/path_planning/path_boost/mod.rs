//! Path optimization for car-like vehicles
//!
//! A coarse route is turned into a drivable path in four stages: the route is
//! smoothed into a reference spline, the spline is resampled and given a
//! collision-free lateral corridor, and a two-pass QP places the path inside
//! that corridor under vehicle kinematics and curvature limits.
//!
//! [`PathBoost`] runs the whole pipeline.

pub mod config;
pub mod planner;
pub mod reference_path;
pub mod search;
pub mod smoother;
pub mod solver;
pub mod vehicle_state;

pub use config::{
    OptimizationConfig, OptimizationMethod, PathBoostConfig, SmoothingConfig, SmoothingMethod, Tension2Weights,
    TensionWeights, VehicleConfig, WeightSet,
};
pub use planner::{PathBoost, PlanningResult};
pub use reference_path::{CorridorBound, ReferencePath};
pub use search::LateralSearch;
pub use smoother::{ReferencePathSmoother, RoughPath};
pub use solver::{PathSolver, SolvedPass, VariableLayout};
pub use vehicle_state::{VehicleState, MAX_INITIAL_HEADING_ERROR};
