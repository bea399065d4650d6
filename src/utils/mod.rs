//! Utility modules for path_boost

pub mod geometry;
pub mod logger;
pub mod spline;
pub mod visualization;

pub use geometry::*;
pub use spline::{CubicSpline1D, Spline2D};
pub use visualization::{colors, PathStyle, PointStyle, Visualizer};
