//! Start/target poses and the vehicle's initial error against the reference

use crate::common::{PathBoostError, PathBoostResult, PathState, Pose2D};
use crate::utils::geometry::{cartesian_to_frenet, normalize_angle};

/// Largest heading error between vehicle and reference start [rad]
pub const MAX_INITIAL_HEADING_ERROR: f64 = 75.0 * std::f64::consts::PI / 180.0;

#[derive(Debug, Clone)]
pub struct VehicleState {
    start: Pose2D,
    target: Pose2D,
    initial_offset: f64,
    initial_heading_error: f64,
}

impl VehicleState {
    pub fn new(start: Pose2D, target: Pose2D) -> Self {
        VehicleState {
            start,
            target,
            initial_offset: 0.0,
            initial_heading_error: 0.0,
        }
    }

    pub fn start_pose(&self) -> &Pose2D {
        &self.start
    }

    pub fn target_pose(&self) -> &Pose2D {
        &self.target
    }

    /// `(lateral offset, heading error)` of the start pose
    pub fn initial_error(&self) -> (f64, f64) {
        (self.initial_offset, self.initial_heading_error)
    }

    pub fn set_initial_error(&mut self, offset: f64, heading_error: f64) {
        self.initial_offset = offset;
        self.initial_heading_error = heading_error;
    }

    /// Measure the start pose against the first reference state and store it.
    ///
    /// The offset magnitude is the distance to that state, its sign the side
    /// the vehicle is on. Fails with `GeometryDivergence` when the heading
    /// error exceeds [`MAX_INITIAL_HEADING_ERROR`].
    pub fn compute_initial_error(&mut self, first: &PathState) -> PathBoostResult<(f64, f64)> {
        let (_, lateral) = cartesian_to_frenet(first, self.start.position());
        let distance = first.position().distance(&self.start.position());
        let offset = if lateral < 0.0 { -distance } else { distance };
        let heading_error = normalize_angle(self.start.heading - first.heading);

        if heading_error.abs() > MAX_INITIAL_HEADING_ERROR {
            return Err(PathBoostError::GeometryDivergence {
                heading_error,
                limit: MAX_INITIAL_HEADING_ERROR,
            });
        }
        self.set_initial_error(offset, heading_error);
        Ok((offset, heading_error))
    }
}
