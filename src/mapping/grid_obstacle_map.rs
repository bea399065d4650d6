// Occupancy grid obstacle map
//
// Binary grid over a rectangular area. Cells outside the grid count as
// occupied so rays never run off the known map.

use nalgebra::DMatrix;

use crate::common::{Obstacles, ObstacleMap, PathBoostError, PathBoostResult, Point2D};

const FREE: u8 = 0;
const OCCUPIED: u8 = 1;

/// Binary occupancy grid implementing [`ObstacleMap`]
#[derive(Debug, Clone)]
pub struct GridObstacleMap {
    data: DMatrix<u8>,
    pub min_x: f64,
    pub min_y: f64,
    pub resolution: f64,
    pub x_width: usize,
    pub y_width: usize,
}

impl GridObstacleMap {
    /// Empty (all free) grid covering `[min_x, max_x] x [min_y, max_y]`
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, resolution: f64) -> PathBoostResult<Self> {
        if !(resolution > 0.0) {
            return Err(PathBoostError::InvalidParameter(format!(
                "grid resolution must be positive, got {}",
                resolution
            )));
        }
        if !(max_x > min_x && max_y > min_y) {
            return Err(PathBoostError::InvalidParameter(format!(
                "empty grid area [{}, {}] x [{}, {}]",
                min_x, max_x, min_y, max_y
            )));
        }
        let x_width = ((max_x - min_x) / resolution).ceil() as usize;
        let y_width = ((max_y - min_y) / resolution).ceil() as usize;

        Ok(GridObstacleMap {
            data: DMatrix::from_element(x_width, y_width, FREE),
            min_x,
            min_y,
            resolution,
            x_width,
            y_width,
        })
    }

    /// Grid enclosing `obstacles` plus `extend_area` on every side, with
    /// each obstacle point marking its cell
    pub fn from_obstacles(obstacles: &Obstacles, resolution: f64, extend_area: f64) -> PathBoostResult<Self> {
        if obstacles.is_empty() {
            return Err(PathBoostError::InputError(
                "cannot size a grid from an empty obstacle set".to_string(),
            ));
        }
        let ox = obstacles.x_coords();
        let oy = obstacles.y_coords();
        let min_x = ox.iter().cloned().fold(f64::INFINITY, f64::min) - extend_area;
        let min_y = oy.iter().cloned().fold(f64::INFINITY, f64::min) - extend_area;
        let max_x = ox.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + extend_area;
        let max_y = oy.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + extend_area;

        let mut map = Self::new(min_x, min_y, max_x.max(min_x + resolution), max_y.max(min_y + resolution), resolution)?;
        for p in &obstacles.points {
            map.set_obstacle(p.x, p.y);
        }
        Ok(map)
    }

    /// Get grid index from world coordinates
    pub fn get_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let ix = ((x - self.min_x) / self.resolution).floor();
        let iy = ((y - self.min_y) / self.resolution).floor();

        if ix >= 0.0 && ix < self.x_width as f64 && iy >= 0.0 && iy < self.y_width as f64 {
            Some((ix as usize, iy as usize))
        } else {
            None
        }
    }

    /// World coordinates of a cell center
    pub fn cell_center(&self, ix: usize, iy: usize) -> Point2D {
        Point2D::new(
            self.min_x + (ix as f64 + 0.5) * self.resolution,
            self.min_y + (iy as f64 + 0.5) * self.resolution,
        )
    }

    pub fn is_occupied(&self, x: f64, y: f64) -> bool {
        self.get_index(x, y)
            .map_or(true, |(ix, iy)| self.data[(ix, iy)] == OCCUPIED)
    }

    /// Mark the cell containing `(x, y)`; points off the grid are ignored
    pub fn set_obstacle(&mut self, x: f64, y: f64) {
        if let Some((ix, iy)) = self.get_index(x, y) {
            self.data[(ix, iy)] = OCCUPIED;
        }
    }

    /// Mark every cell whose center lies in the axis-aligned box
    pub fn add_box(&mut self, corner_a: Point2D, corner_b: Point2D) {
        let lo = Point2D::new(corner_a.x.min(corner_b.x), corner_a.y.min(corner_b.y));
        let hi = Point2D::new(corner_a.x.max(corner_b.x), corner_a.y.max(corner_b.y));
        self.fill_cells(|c| c.x >= lo.x && c.x <= hi.x && c.y >= lo.y && c.y <= hi.y);
    }

    /// Mark every cell whose center lies in the disc
    pub fn add_circle(&mut self, center: Point2D, radius: f64) {
        self.fill_cells(|c| c.distance(&center) <= radius);
    }

    fn fill_cells<F: Fn(Point2D) -> bool>(&mut self, inside: F) {
        for ix in 0..self.x_width {
            for iy in 0..self.y_width {
                if inside(self.cell_center(ix, iy)) {
                    self.data[(ix, iy)] = OCCUPIED;
                }
            }
        }
    }

    /// Centers of all occupied cells, for plotting
    pub fn obstacle_points(&self) -> Obstacles {
        let mut obstacles = Obstacles::new();
        for ix in 0..self.x_width {
            for iy in 0..self.y_width {
                if self.data[(ix, iy)] == OCCUPIED {
                    obstacles.push(self.cell_center(ix, iy));
                }
            }
        }
        obstacles
    }
}

impl ObstacleMap for GridObstacleMap {
    fn is_free(&self, point: Point2D) -> bool {
        !self.is_occupied(point.x, point.y)
    }

    fn distance_along_ray(&self, origin: Point2D, direction: f64, max_range: f64) -> f64 {
        if !self.is_free(origin) || max_range <= 0.0 {
            return 0.0;
        }
        // march at half a cell so no cell is skipped
        let step = 0.5 * self.resolution;
        let num_steps = (max_range / step).ceil() as usize;
        let mut last_free = 0.0;
        for i in 1..=num_steps {
            let t = (i as f64 * step).min(max_range);
            if !self.is_free(origin.offset(direction, t)) {
                return last_free;
            }
            last_free = t;
        }
        max_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn open_map() -> GridObstacleMap {
        GridObstacleMap::new(-10.0, -10.0, 10.0, 10.0, 0.25).unwrap()
    }

    #[test]
    fn test_grid_dimensions() {
        let map = open_map();
        assert_eq!(map.x_width, 80);
        assert_eq!(map.y_width, 80);
        assert_eq!(map.get_index(-10.0, -10.0), Some((0, 0)));
        assert_eq!(map.get_index(10.5, 0.0), None);
    }

    #[test]
    fn test_invalid_grid() {
        assert!(GridObstacleMap::new(0.0, 0.0, 1.0, 1.0, 0.0).is_err());
        assert!(GridObstacleMap::new(0.0, 0.0, 0.0, 1.0, 0.1).is_err());
    }

    #[test]
    fn test_outside_is_occupied() {
        let map = open_map();
        assert!(map.is_free(Point2D::origin()));
        assert!(!map.is_free(Point2D::new(20.0, 0.0)));
        // ray stops at the grid edge
        let d = map.distance_along_ray(Point2D::origin(), 0.0, 50.0);
        assert!(d > 9.8 && d <= 10.0);
    }

    #[test]
    fn test_ray_hits_box() {
        let mut map = open_map();
        map.add_box(Point2D::new(-5.0, 3.0), Point2D::new(5.0, 4.0));
        let up = map.distance_along_ray(Point2D::origin(), FRAC_PI_2, 8.0);
        assert!(up > 2.85 && up < 3.05, "up = {}", up);
        let down = map.distance_along_ray(Point2D::origin(), -FRAC_PI_2, 8.0);
        assert_eq!(down, 8.0);
        assert_eq!(map.distance_along_ray(Point2D::new(0.0, 3.5), PI, 5.0), 0.0);
    }

    #[test]
    fn test_circle_and_obstacle_points() {
        let mut map = open_map();
        map.add_circle(Point2D::new(2.0, 2.0), 0.5);
        assert!(!map.is_free(Point2D::new(2.0, 2.0)));
        assert!(map.is_free(Point2D::new(2.0, 2.7)));
        let points = map.obstacle_points();
        assert!(!points.is_empty());
        assert!(points.points.iter().all(|p| p.distance(&Point2D::new(2.0, 2.0)) <= 0.5));
    }

    #[test]
    fn test_from_obstacles() {
        let obstacles = Obstacles::from_xy(&[0.0, 10.0], &[0.0, 5.0]);
        let map = GridObstacleMap::from_obstacles(&obstacles, 0.5, 2.0).unwrap();
        assert!(!map.is_free(Point2D::new(0.1, 0.1)));
        assert!(!map.is_free(Point2D::new(10.1, 5.1)));
        assert!(map.is_free(Point2D::new(5.0, 2.0)));
        assert!(GridObstacleMap::from_obstacles(&Obstacles::new(), 0.5, 2.0).is_err());
    }
}
