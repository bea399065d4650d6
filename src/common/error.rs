//! Error types for path_boost

use std::fmt;

use thiserror::Error;

use crate::optimization::QpError;

/// Which of the two solver passes produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePass {
    /// First pass with permissive, slack-penalised bounds
    Rough,
    /// Second pass with bounds tightened around the rough result
    Refinement,
}

impl fmt::Display for SolvePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePass::Rough => write!(f, "rough"),
            SolvePass::Refinement => write!(f, "refinement"),
        }
    }
}

/// Main error type for the path optimization pipeline
#[derive(Debug, Error)]
pub enum PathBoostError {
    /// Empty or degenerate waypoint input
    #[error("Input error: {0}")]
    InputError(String),

    /// Reference path heading diverges too much from the vehicle heading
    #[error(
        "Geometry divergence: initial heading error {:.1} deg exceeds {:.1} deg",
        degrees(.heading_error),
        degrees(.limit)
    )]
    GeometryDivergence { heading_error: f64, limit: f64 },

    /// The smoothing QP could not be solved
    #[error("Reference smoothing failed: {0}")]
    SmoothingInfeasible(#[source] QpError),

    /// At least one corridor point has no drivable width
    #[error("No drivable width at s = {arclengths:?}")]
    BoundsInfeasible { arclengths: Vec<f64> },

    /// One of the path QP passes could not be solved
    #[error("Path solve ({pass} pass) failed: {source}")]
    SolveInfeasible {
        pass: SolvePass,
        #[source]
        source: QpError,
    },

    /// Invalid parameter or misuse of the API
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Config file could not be read
    #[error("Cannot read the config file: {0}")]
    ConfigRead(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Cannot parse the config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

fn degrees(radians: &f64) -> f64 {
    radians.to_degrees()
}

/// Result type alias for path_boost operations
pub type PathBoostResult<T> = Result<T, PathBoostError>;
