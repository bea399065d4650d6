// Cubic spline over cumulative chord length
// based on the PythonRobotics / CppRobotics cubic spline planner
//
// Author: Atsushi Sakai(@Atsushi_twi)
//         TAI Lei
//         Ryohei Sasaki(@rsasaki0109)

use crate::common::{PathBoostError, PathBoostResult, PathState, Point2D};
use crate::utils::geometry::cumulative_length;

/// Natural cubic spline y(x) over strictly increasing knots
#[derive(Debug, Clone)]
pub struct CubicSpline1D {
    x: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline1D {
    pub fn new(x: &[f64], y: &[f64]) -> PathBoostResult<Self> {
        let n = x.len();
        if n < 2 || y.len() != n {
            return Err(PathBoostError::InvalidParameter(format!(
                "spline needs at least 2 knots with matching values, got {} knots and {} values",
                n,
                y.len()
            )));
        }
        let h: Vec<f64> = (0..n - 1).map(|i| x[i + 1] - x[i]).collect();
        if h.iter().any(|&hi| !(hi > 0.0)) {
            return Err(PathBoostError::InvalidParameter(
                "spline knots must be strictly increasing".to_string(),
            ));
        }

        let a = y.to_vec();
        let mut b = vec![0.0; n];
        let mut c = vec![0.0; n];
        let mut d = vec![0.0; n];

        // Build tridiagonal system
        let mut alpha = vec![0.0; n];
        for i in 1..n - 1 {
            alpha[i] = 3.0 / h[i] * (a[i + 1] - a[i]) - 3.0 / h[i - 1] * (a[i] - a[i - 1]);
        }

        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];

        for i in 1..n - 1 {
            l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (a[j + 1] - a[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }

        Ok(CubicSpline1D {
            x: x.to_vec(),
            a,
            b,
            c,
            d,
        })
    }

    pub fn calc(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        self.a[i] + self.b[i] * dx + self.c[i] * dx.powi(2) + self.d[i] * dx.powi(3)
    }

    pub fn calc_d(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        self.b[i] + 2.0 * self.c[i] * dx + 3.0 * self.d[i] * dx.powi(2)
    }

    pub fn calc_dd(&self, t: f64) -> f64 {
        let i = self.search_index(t);
        let dx = t - self.x[i];
        2.0 * self.c[i] + 6.0 * self.d[i] * dx
    }

    fn search_index(&self, t: f64) -> usize {
        let upper = self.x.partition_point(|&xi| xi <= t);
        upper.saturating_sub(1).min(self.x.len() - 2)
    }
}

/// 2D curve x(s), y(s) parameterized by cumulative chord length.
///
/// The parameter only approximates true arclength: it undershoots by the
/// chord-to-arc difference between knots, which is negligible at the knot
/// spacing the smoother produces. Output arclength is measured separately
/// along the optimized polyline.
#[derive(Debug, Clone)]
pub struct Spline2D {
    s: Vec<f64>,
    sx: CubicSpline1D,
    sy: CubicSpline1D,
}

impl Spline2D {
    pub fn new(points: &[Point2D]) -> PathBoostResult<Self> {
        let s = cumulative_length(points);
        let x: Vec<f64> = points.iter().map(|p| p.x).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y).collect();
        let sx = CubicSpline1D::new(&s, &x)?;
        let sy = CubicSpline1D::new(&s, &y)?;
        Ok(Spline2D { s, sx, sy })
    }

    /// Parameter value of the last knot
    pub fn length(&self) -> f64 {
        self.s.last().copied().unwrap_or(0.0)
    }

    fn clamp(&self, s: f64) -> f64 {
        s.clamp(0.0, self.length())
    }

    pub fn x(&self, s: f64) -> f64 {
        self.sx.calc(self.clamp(s))
    }

    pub fn y(&self, s: f64) -> f64 {
        self.sy.calc(self.clamp(s))
    }

    pub fn position(&self, s: f64) -> Point2D {
        Point2D::new(self.x(s), self.y(s))
    }

    pub fn heading(&self, s: f64) -> f64 {
        let s = self.clamp(s);
        self.sy.calc_d(s).atan2(self.sx.calc_d(s))
    }

    pub fn curvature(&self, s: f64) -> f64 {
        let s = self.clamp(s);
        let dx = self.sx.calc_d(s);
        let ddx = self.sx.calc_dd(s);
        let dy = self.sy.calc_d(s);
        let ddy = self.sy.calc_dd(s);
        let denom = (dx.powi(2) + dy.powi(2)).powf(1.5);
        if denom < 1e-12 {
            return 0.0;
        }
        (ddy * dx - ddx * dy) / denom
    }

    /// Full path sample at parameter `s`
    pub fn state(&self, s: f64) -> PathState {
        let p = self.position(s);
        PathState::new(p.x, p.y, self.heading(s), self.clamp(s), self.curvature(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_spline1d_interpolates_knots() {
        let x = [0.0, 1.0, 2.5, 4.0];
        let y = [1.0, -2.0, 0.5, 3.0];
        let sp = CubicSpline1D::new(&x, &y).unwrap();
        for (&xi, &yi) in x.iter().zip(y.iter()) {
            assert_abs_diff_eq!(sp.calc(xi), yi, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_spline1d_two_knots_is_linear() {
        let sp = CubicSpline1D::new(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert_abs_diff_eq!(sp.calc(1.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sp.calc_d(0.5), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sp.calc_dd(0.5), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spline1d_rejects_bad_knots() {
        assert!(CubicSpline1D::new(&[0.0], &[1.0]).is_err());
        assert!(CubicSpline1D::new(&[0.0, 0.0, 1.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_spline2d_straight_line() {
        let points: Vec<Point2D> = (0..=10).map(|i| Point2D::new(i as f64 * 10.0, 0.0)).collect();
        let sp = Spline2D::new(&points).unwrap();
        assert_abs_diff_eq!(sp.length(), 100.0, epsilon = 1e-9);
        for i in 0..100 {
            let s = i as f64;
            assert_abs_diff_eq!(sp.y(s), 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(sp.heading(s), 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(sp.curvature(s), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_spline2d_circle_curvature() {
        let r = 10.0;
        let points: Vec<Point2D> = (0..=40)
            .map(|i| {
                let a = i as f64 * 0.05;
                Point2D::new(r * a.sin(), r * (1.0 - a.cos()))
            })
            .collect();
        let sp = Spline2D::new(&points).unwrap();
        let mid = sp.length() / 2.0;
        assert_abs_diff_eq!(sp.curvature(mid), 1.0 / r, epsilon = 1e-3);
        assert!(sp.heading(mid) > 0.0);
    }
}
