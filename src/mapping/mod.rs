// Obstacle map implementations and footprint checks

pub mod collision_checker;
pub mod grid_obstacle_map;

pub use collision_checker::CollisionChecker;
pub use grid_obstacle_map::GridObstacleMap;
