//! path_boost - optimization-based path planning for car-like vehicles
//!
//! This crate turns a coarse route through an obstacle map into a smooth,
//! collision-aware and kinematically feasible path.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod mapping;
pub mod optimization;
pub mod path_planning;

// Re-export common types for convenience
pub use common::{Obstacles, PathState, Point2D, Pose2D};
pub use common::ObstacleMap;
pub use common::{PathBoostError, PathBoostResult, SolvePass};
pub use mapping::{CollisionChecker, GridObstacleMap};
pub use path_planning::{PathBoost, PathBoostConfig, PlanningResult};
