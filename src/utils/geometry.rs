//! Geometry and frame helpers
//!
//! Angle normalization, Cartesian/local frame transforms, Frenet projection
//! onto a single reference state, and heading/curvature estimation on
//! discretized curves.

use std::f64::consts::PI;

use itertools::Itertools;
use nalgebra::{Rotation2, Vector2};

use crate::common::{PathState, Point2D, Pose2D};

/// Normalize angle to (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a - 2.0 * PI
    } else {
        a
    }
}

/// Express `target` in the local frame of `origin`.
///
/// The returned pose's x axis points along `origin.heading`, its heading is the
/// normalized heading difference.
pub fn global_to_local(origin: &Pose2D, target: &Pose2D) -> Pose2D {
    let rotation = Rotation2::new(-origin.heading);
    let local = rotation * Vector2::new(target.x - origin.x, target.y - origin.y);
    Pose2D::new(
        local[0],
        local[1],
        normalize_angle(target.heading - origin.heading),
    )
}

/// Inverse of [`global_to_local`]
pub fn local_to_global(origin: &Pose2D, local: &Pose2D) -> Pose2D {
    let rotation = Rotation2::new(origin.heading);
    let global = rotation * Vector2::new(local.x, local.y);
    Pose2D::new(
        origin.x + global[0],
        origin.y + global[1],
        normalize_angle(origin.heading + local.heading),
    )
}

/// Point at lateral offset `l` (positive to the left) from a reference sample
pub fn frenet_to_cartesian(reference: &PathState, l: f64) -> Point2D {
    Point2D::new(
        reference.x - l * reference.heading.sin(),
        reference.y + l * reference.heading.cos(),
    )
}

/// Arclength and lateral offset of `point` relative to a single reference
/// sample, using the sample's tangent as the local s axis.
pub fn cartesian_to_frenet(reference: &PathState, point: Point2D) -> (f64, f64) {
    let local = global_to_local(&reference.pose(), &Pose2D::new(point.x, point.y, 0.0));
    (reference.s + local.x, local.y)
}

/// Menger curvature through three points, positive for a left turn
pub fn three_point_curvature(p0: Point2D, p1: Point2D, p2: Point2D) -> f64 {
    let a = p0.distance(&p1);
    let b = p1.distance(&p2);
    let c = p0.distance(&p2);
    let denom = a * b * c;
    if denom < 1e-12 {
        return 0.0;
    }
    let cross = (p1.x - p0.x) * (p2.y - p0.y) - (p1.y - p0.y) * (p2.x - p0.x);
    2.0 * cross / denom
}

/// Headings of a discretized curve: central differences inside, one-sided at the ends
pub fn discrete_headings(points: &[Point2D]) -> Vec<f64> {
    let n = points.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let prev = points[i.saturating_sub(1)];
            let next = points[(i + 1).min(n - 1)];
            (next.y - prev.y).atan2(next.x - prev.x)
        })
        .collect()
}

/// Curvatures of a discretized curve; end points copy their neighbour
pub fn discrete_curvatures(points: &[Point2D]) -> Vec<f64> {
    let n = points.len();
    if n < 3 {
        return vec![0.0; n];
    }
    let mut k: Vec<f64> = Vec::with_capacity(n);
    k.push(0.0);
    k.extend(
        points
            .iter()
            .tuple_windows()
            .map(|(&p0, &p1, &p2)| three_point_curvature(p0, p1, p2)),
    );
    k.push(k[n - 2]);
    k[0] = k[1];
    k
}

/// Cumulative chord length of a polyline, starting at 0
pub fn cumulative_length(points: &[Point2D]) -> Vec<f64> {
    let mut s = Vec::with_capacity(points.len());
    let mut acc = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            acc += points[i - 1].distance(p);
        }
        s.push(acc);
    }
    s
}

/// Closest point of a polyline to `query`.
///
/// Returns the index of the segment start, the projected point and its
/// arclength along the polyline. `None` for an empty polyline.
pub fn project_on_polyline(points: &[Point2D], query: Point2D) -> Option<(usize, Point2D, f64)> {
    if points.is_empty() {
        return None;
    }
    if points.len() == 1 {
        return Some((0, points[0], 0.0));
    }

    let mut best: Option<(usize, Point2D, f64, f64)> = None;
    let mut s_start = 0.0;
    for (i, (a, b)) in points.iter().tuple_windows().enumerate() {
        let seg = b.to_vector() - a.to_vector();
        let len_sq = seg.norm_squared();
        let t = if len_sq > 0.0 {
            ((query.to_vector() - a.to_vector()).dot(&seg) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let proj = Point2D::from(a.to_vector() + seg * t);
        let dist = proj.distance(&query);
        if best.map_or(true, |(_, _, _, d)| dist < d) {
            best = Some((i, proj, s_start + t * len_sq.sqrt(), dist));
        }
        s_start += len_sq.sqrt();
    }
    best.map(|(i, p, s, _)| (i, p, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalize_angle() {
        assert_abs_diff_eq!(normalize_angle(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI).abs(), PI, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_angle(-PI / 2.0 - 2.0 * PI), -PI / 2.0, epsilon = 1e-9);
        assert!(normalize_angle(-3.0 * PI) > -PI);
    }

    #[test]
    fn test_global_local_roundtrip() {
        let origin = Pose2D::new(1.0, 2.0, PI / 2.0);
        let target = Pose2D::new(1.0, 5.0, PI / 2.0);
        let local = global_to_local(&origin, &target);
        assert_abs_diff_eq!(local.x, 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(local.y, 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(local.heading, 0.0, epsilon = 1e-10);

        let back = local_to_global(&origin, &local);
        assert_abs_diff_eq!(back.x, target.x, epsilon = 1e-10);
        assert_abs_diff_eq!(back.y, target.y, epsilon = 1e-10);
    }

    #[test]
    fn test_left_is_positive() {
        let reference = PathState::new(0.0, 0.0, 0.0, 10.0, 0.0);
        let p = frenet_to_cartesian(&reference, 1.5);
        assert_abs_diff_eq!(p.y, 1.5, epsilon = 1e-12);
        let (s, l) = cartesian_to_frenet(&reference, Point2D::new(0.5, -2.0));
        assert_abs_diff_eq!(s, 10.5, epsilon = 1e-12);
        assert_abs_diff_eq!(l, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_three_point_curvature_circle() {
        let r = 5.0;
        let pts: Vec<Point2D> = [0.0_f64, 0.2, 0.4]
            .iter()
            .map(|&a| Point2D::new(r * a.cos(), r * a.sin()))
            .collect();
        // counter-clockwise arc turns left
        assert_abs_diff_eq!(three_point_curvature(pts[0], pts[1], pts[2]), 1.0 / r, epsilon = 1e-9);
        assert_abs_diff_eq!(three_point_curvature(pts[2], pts[1], pts[0]), -1.0 / r, epsilon = 1e-9);
    }

    #[test]
    fn test_discrete_headings_and_curvatures() {
        let pts: Vec<Point2D> = (0..5).map(|i| Point2D::new(i as f64, i as f64)).collect();
        let headings = discrete_headings(&pts);
        assert_eq!(headings.len(), 5);
        for h in headings {
            assert_abs_diff_eq!(h, PI / 4.0, epsilon = 1e-12);
        }
        for k in discrete_curvatures(&pts) {
            assert_abs_diff_eq!(k, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_project_on_polyline() {
        let pts = vec![Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0), Point2D::new(10.0, 10.0)];
        let (i, p, s) = project_on_polyline(&pts, Point2D::new(4.0, -3.0)).unwrap();
        assert_eq!(i, 0);
        assert_abs_diff_eq!(p.x, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s, 4.0, epsilon = 1e-12);

        let (i, _, s) = project_on_polyline(&pts, Point2D::new(12.0, 6.0)).unwrap();
        assert_eq!(i, 1);
        assert_abs_diff_eq!(s, 16.0, epsilon = 1e-12);
        assert_eq!(cumulative_length(&pts), vec![0.0, 10.0, 20.0]);
    }
}
