//! Common traits defining the interfaces the pipeline consumes

use crate::common::types::*;

/// Read-only obstacle map query service.
///
/// Implementors must not change while a planning call borrows them; sharing a
/// single map between concurrent planning calls only needs `&` access.
pub trait ObstacleMap {
    /// Whether the point lies in drivable space
    fn is_free(&self, point: Point2D) -> bool;

    /// Free distance from `origin` along `direction` [rad] before the first
    /// obstruction, capped at `max_range`. Returns 0 when `origin` itself is
    /// occupied.
    fn distance_along_ray(&self, origin: Point2D, direction: f64, max_range: f64) -> f64;
}

impl<M: ObstacleMap + ?Sized> ObstacleMap for &M {
    fn is_free(&self, point: Point2D) -> bool {
        (**self).is_free(point)
    }

    fn distance_along_ray(&self, origin: Point2D, direction: f64, max_range: f64) -> f64 {
        (**self).distance_along_ray(origin, direction, max_range)
    }
}
