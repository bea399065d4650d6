// Path optimization demo
//
// Plans along a straight route that runs through a parked box and past a
// round obstacle inside a walled lane, then plots the reference path, the
// corridor and the optimized path to ./img/path_boost.png.
//
// usage: path_boost [config.toml]
use std::env;
use std::process;

use log::{error, info, warn, LevelFilter};

use path_boost::utils::logger::logger_init;
use path_boost::utils::{colors, PathStyle, PointStyle, Visualizer};
use path_boost::{GridObstacleMap, PathBoost, PathBoostConfig, Point2D, Pose2D};

fn main() {
    if let Err(e) = logger_init(LevelFilter::Info) {
        eprintln!("{}", e);
    }

    let config = match env::args().nth(1) {
        Some(path) => match PathBoostConfig::load(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => PathBoostConfig::default(),
    };

    let mut map = GridObstacleMap::new(-10.0, -20.0, 110.0, 20.0, 0.2).unwrap();
    map.add_box(Point2D::new(-10.0, 8.0), Point2D::new(110.0, 9.0));
    map.add_box(Point2D::new(-10.0, -9.0), Point2D::new(110.0, -8.0));
    map.add_box(Point2D::new(30.0, -3.0), Point2D::new(36.0, 1.0));
    map.add_circle(Point2D::new(65.0, 2.5), 2.0);

    let waypoints: Vec<Pose2D> = (0..=10).map(|i| Pose2D::new(i as f64 * 10.0, 0.0, 0.0)).collect();
    let start = Pose2D::new(0.0, 0.5, 0.1);
    let target = Pose2D::new(100.0, 0.0, 0.0);

    let planner = match PathBoost::new(config, &map) {
        Ok(planner) => planner,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let result = match planner.plan(&waypoints, &start, &target) {
        Ok(result) => result,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if !result.colliding_states.is_empty() {
        warn!("{} states touch an obstacle", result.colliding_states.len());
    }

    let reference = result.reference_path.reference_states();
    let corridor: Vec<(f64, f64)> = result
        .reference_path
        .bounds()
        .iter()
        .map(|b| (b.lower, b.upper))
        .collect();
    let waypoint_positions: Vec<Point2D> = waypoints.iter().map(|p| p.position()).collect();

    let mut vis = Visualizer::new();
    vis.set_title("Path Boost")
        .set_x_range(-10.0, 110.0)
        .set_y_range(-20.0, 20.0)
        .plot_obstacles(&map.obstacle_points())
        .plot_points(&waypoint_positions, &PointStyle::new(colors::WAYPOINTS, "Waypoints"))
        .plot_states(reference, &PathStyle::new(colors::REFERENCE, "Reference").with_line_width(1.0))
        .plot_corridor(reference, &corridor)
        .plot_states(&result.path, &PathStyle::default())
        .plot_start(&start)
        .plot_goal(&target);

    if let Err(e) = std::fs::create_dir_all("./img") {
        error!("{}", e);
        process::exit(1);
    }
    match vis.save_png("./img/path_boost.png", 1200, 500) {
        Ok(()) => info!("Plot saved to ./img/path_boost.png"),
        Err(e) => error!("Failed to save plot: {}", e),
    }
}
