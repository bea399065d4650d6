//! Common types used throughout path_boost

use nalgebra::{Vector2, Vector3};

use crate::utils::geometry::normalize_angle;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Point reached by travelling `distance` from here along `direction` [rad]
    pub fn offset(&self, direction: f64, distance: f64) -> Point2D {
        Point2D::new(
            self.x + distance * direction.cos(),
            self.y + distance * direction.sin(),
        )
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// 2D pose (position + heading). Used for start, target and raw waypoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, heading: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn distance(&self, other: &Pose2D) -> f64 {
        self.position().distance(&other.position())
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.heading)
    }

    /// Normalize heading to (-pi, pi]
    pub fn normalize_heading(&mut self) {
        self.heading = normalize_angle(self.heading);
    }
}

impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Self { x: v[0], y: v[1], heading: v[2] }
    }
}

/// One sample of a working path.
///
/// `s` is the arclength from the first sample, `k` the signed curvature
/// (positive turning left) and `l` the lateral offset from the reference path
/// the sample was derived from (zero for reference samples themselves).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathState {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub s: f64,
    pub k: f64,
    pub l: f64,
}

impl PathState {
    pub fn new(x: f64, y: f64, heading: f64, s: f64, k: f64) -> Self {
        Self { x, y, heading, s, k, l: 0.0 }
    }

    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.heading)
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// Obstacle representation
#[derive(Debug, Clone)]
pub struct Obstacles {
    pub points: Vec<Point2D>,
}

impl Obstacles {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn from_xy(x: &[f64], y: &[f64]) -> Self {
        let points = x.iter().zip(y.iter())
            .map(|(&x, &y)| Point2D::new(x, y))
            .collect();
        Self { points }
    }

    pub fn push(&mut self, point: Point2D) {
        self.points.push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn x_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn y_coords(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }
}

impl Default for Obstacles {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_point2d_offset() {
        let p = Point2D::new(1.0, 1.0).offset(PI / 2.0, 2.0);
        assert!((p.x - 1.0).abs() < 1e-10);
        assert!((p.y - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_pose2d_normalize_heading() {
        let mut pose = Pose2D::new(0.0, 0.0, 4.0);
        pose.normalize_heading();
        assert!(pose.heading > -PI && pose.heading <= PI);
        assert!((pose.heading - (4.0 - 2.0 * PI)).abs() < 1e-10);
    }

    #[test]
    fn test_path_state_pose() {
        let state = PathState::new(1.0, 2.0, 0.5, 3.0, 0.1);
        assert_eq!(state.pose(), Pose2D::new(1.0, 2.0, 0.5));
        assert_eq!(state.l, 0.0);
    }

    #[test]
    fn test_obstacles_from_xy() {
        let obstacles = Obstacles::from_xy(&[0.0, 1.0], &[2.0, 3.0]);
        assert_eq!(obstacles.x_coords(), vec![0.0, 1.0]);
        assert_eq!(obstacles.y_coords(), vec![2.0, 3.0]);
    }
}
