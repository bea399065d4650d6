//! Vehicle footprint collision check
//!
//! The body is covered by three equal circles spaced along its length, from
//! the rear edge to the front edge. A circle collides when its center is
//! occupied or any of eight rays around it hits an obstacle within its radius.

use std::f64::consts::PI;

use crate::common::{ObstacleMap, PathState, Point2D, Pose2D};
use crate::utils::geometry::local_to_global;

const NUM_CIRCLES: usize = 3;
const NUM_RAYS: usize = 8;

#[derive(Debug, Clone)]
pub struct CollisionChecker {
    /// Longitudinal circle centers measured from the reference point
    offsets: [f64; NUM_CIRCLES],
    radius: f64,
}

impl CollisionChecker {
    /// `rear_edge` and `front_edge` are signed longitudinal distances of the
    /// body edges from the pose reference point (rear axle)
    pub fn new(width: f64, rear_edge: f64, front_edge: f64) -> Self {
        let length = front_edge - rear_edge;
        let segment = length / NUM_CIRCLES as f64;
        let mut offsets = [0.0; NUM_CIRCLES];
        for (i, offset) in offsets.iter_mut().enumerate() {
            *offset = rear_edge + segment * (i as f64 + 0.5);
        }
        let radius = (0.25 * segment * segment + 0.25 * width * width).sqrt();
        CollisionChecker { offsets, radius }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Circle centers for a pose
    pub fn circle_centers(&self, pose: &Pose2D) -> Vec<Point2D> {
        self.offsets
            .iter()
            .map(|&d| local_to_global(pose, &Pose2D::new(d, 0.0, 0.0)).position())
            .collect()
    }

    pub fn is_pose_free<M: ObstacleMap + ?Sized>(&self, map: &M, pose: &Pose2D) -> bool {
        self.circle_centers(pose).into_iter().all(|center| {
            map.is_free(center)
                && (0..NUM_RAYS).all(|i| {
                    let direction = pose.heading + 2.0 * PI * i as f64 / NUM_RAYS as f64;
                    map.distance_along_ray(center, direction, self.radius) >= self.radius
                })
        })
    }

    /// Indices of the states whose footprint collides
    pub fn colliding_states<M: ObstacleMap + ?Sized>(&self, map: &M, path: &[PathState]) -> Vec<usize> {
        path.iter()
            .enumerate()
            .filter(|(_, state)| !self.is_pose_free(map, &state.pose()))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::GridObstacleMap;

    fn checker() -> CollisionChecker {
        CollisionChecker::new(2.0, -1.0, 3.9)
    }

    #[test]
    fn test_circle_layout() {
        let c = checker();
        let centers = c.circle_centers(&Pose2D::origin());
        assert_eq!(centers.len(), 3);
        assert!((centers[0].x - (-1.0 + 4.9 / 6.0)).abs() < 1e-12);
        assert!((centers[1].x - 1.45).abs() < 1e-12);
        assert!((centers[2].x - (3.9 - 4.9 / 6.0)).abs() < 1e-12);
        // circles reach the body corners
        let corner = Point2D::new(-1.0, 1.0);
        assert!(corner.distance(&centers[0]) <= c.radius() + 1e-12);
    }

    #[test]
    fn test_pose_against_wall() {
        let mut map = GridObstacleMap::new(-10.0, -10.0, 20.0, 10.0, 0.1).unwrap();
        map.add_box(Point2D::new(-10.0, 3.0), Point2D::new(20.0, 4.0));
        let c = checker();
        assert!(c.is_pose_free(&map, &Pose2D::new(0.0, 0.0, 0.0)));
        assert!(!c.is_pose_free(&map, &Pose2D::new(0.0, 2.5, 0.0)));

        let path: Vec<PathState> = (0..5)
            .map(|i| PathState::new(i as f64, 0.6 * i as f64, 0.0, i as f64, 0.0))
            .collect();
        assert_eq!(c.colliding_states(&map, &path), vec![3, 4]);
    }
}
