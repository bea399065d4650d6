//! Lateral pre-search over the rough route
//!
//! Every rough point is a layer of candidate lateral offsets. Dynamic
//! programming picks one offset per layer, trading deviation from the route
//! against clearance to obstacles, with the lateral jump between layers
//! limited by their longitudinal spacing.

use std::f64::consts::FRAC_PI_2;

use log::debug;
use ordered_float::OrderedFloat;

use crate::common::{ObstacleMap, PathState};
use crate::utils::geometry::frenet_to_cartesian;

use super::config::PathBoostConfig;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    offset: f64,
    node_cost: f64,
}

/// One layer of the search graph
#[derive(Debug, Clone)]
struct Layer {
    candidates: Vec<Candidate>,
    /// No admissible candidate was found; transitions through it are free
    degraded: bool,
}

pub struct LateralSearch<'a, M: ObstacleMap + ?Sized> {
    map: &'a M,
    range: f64,
    spacing: f64,
    obstacle_cost: f64,
    deviation_cost: f64,
    min_clearance: f64,
}

impl<'a, M: ObstacleMap + ?Sized> LateralSearch<'a, M> {
    pub fn new(map: &'a M, config: &PathBoostConfig) -> Self {
        let smoothing = &config.smoothing;
        LateralSearch {
            map,
            range: smoothing.search_lateral_range,
            spacing: smoothing.search_lateral_spacing,
            obstacle_cost: smoothing.search_obstacle_cost,
            deviation_cost: smoothing.search_deviation_cost,
            min_clearance: config.vehicle.half_width() + config.vehicle.safety_margin,
        }
    }

    /// Lowest-cost lateral offset for every layer; the first is always 0
    pub fn search(&self, layers: &[PathState]) -> Vec<f64> {
        if layers.is_empty() {
            return Vec::new();
        }
        let graph: Vec<Layer> = layers
            .iter()
            .enumerate()
            .map(|(i, state)| {
                if i == 0 {
                    Layer {
                        candidates: vec![Candidate {
                            offset: 0.0,
                            node_cost: 0.0,
                        }],
                        degraded: false,
                    }
                } else {
                    self.build_layer(state)
                }
            })
            .collect();

        // cost[i][j]: best cost reaching candidate j of layer i
        let mut cost: Vec<Vec<f64>> = vec![vec![0.0]];
        let mut parent: Vec<Vec<usize>> = vec![vec![0]];
        for i in 1..graph.len() {
            let max_jump = layers[i].s - layers[i - 1].s;
            let unrestricted = graph[i].degraded || graph[i - 1].degraded;
            let mut layer_cost = self.relax(&graph[i - 1], &cost[i - 1], &graph[i], max_jump, unrestricted);
            if layer_cost.iter().all(|(c, _)| c.is_infinite()) {
                debug!("Lateral search: no admissible transition into layer {}, lifting the jump limit", i);
                layer_cost = self.relax(&graph[i - 1], &cost[i - 1], &graph[i], max_jump, true);
            }
            let (c, p): (Vec<f64>, Vec<usize>) = layer_cost.into_iter().unzip();
            cost.push(c);
            parent.push(p);
        }

        // backtrack from the cheapest final candidate
        let last = graph.len() - 1;
        let mut j = cost[last]
            .iter()
            .enumerate()
            .min_by_key(|(_, &c)| OrderedFloat(c))
            .map(|(j, _)| j)
            .unwrap_or(0);
        let mut offsets = vec![0.0; graph.len()];
        for i in (0..graph.len()).rev() {
            offsets[i] = graph[i].candidates[j].offset;
            j = parent[i][j];
        }
        offsets
    }

    fn relax(
        &self,
        previous: &Layer,
        previous_cost: &[f64],
        current: &Layer,
        max_jump: f64,
        unrestricted: bool,
    ) -> Vec<(f64, usize)> {
        current
            .candidates
            .iter()
            .map(|to| {
                previous
                    .candidates
                    .iter()
                    .zip(previous_cost.iter())
                    .enumerate()
                    .filter(|(_, (from, _))| unrestricted || (to.offset - from.offset).abs() <= max_jump + 1e-9)
                    .map(|(k, (from, &c))| {
                        (c + self.deviation_cost * (to.offset - from.offset).abs() + to.node_cost, k)
                    })
                    .min_by_key(|&(c, _)| OrderedFloat(c))
                    .unwrap_or((f64::INFINITY, 0))
            })
            .collect()
    }

    fn build_layer(&self, state: &PathState) -> Layer {
        let count = (self.range / self.spacing).floor() as i64;
        let candidates: Vec<Candidate> = (-count..=count)
            .filter_map(|j| {
                let offset = j as f64 * self.spacing;
                let point = frenet_to_cartesian(state, offset);
                if !self.map.is_free(point) {
                    return None;
                }
                let left = self.map.distance_along_ray(point, state.heading + FRAC_PI_2, self.range);
                let right = self.map.distance_along_ray(point, state.heading - FRAC_PI_2, self.range);
                let clearance = left.min(right);
                if clearance < self.min_clearance {
                    return None;
                }
                Some(Candidate {
                    offset,
                    node_cost: self.deviation_cost * offset.abs() + self.obstacle_cost / clearance,
                })
            })
            .collect();

        if candidates.is_empty() {
            Layer {
                candidates: vec![Candidate {
                    offset: 0.0,
                    node_cost: 0.0,
                }],
                degraded: true,
            }
        } else {
            Layer {
                candidates,
                degraded: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Point2D;
    use crate::mapping::GridObstacleMap;

    fn straight_layers(n: usize, spacing: f64) -> Vec<PathState> {
        (0..n)
            .map(|i| {
                let s = i as f64 * spacing;
                PathState::new(s, 0.0, 0.0, s, 0.0)
            })
            .collect()
    }

    #[test]
    fn test_open_map_keeps_route() {
        let map = GridObstacleMap::new(-10.0, -30.0, 60.0, 30.0, 0.25).unwrap();
        let config = PathBoostConfig::default();
        let offsets = LateralSearch::new(&map, &config).search(&straight_layers(20, 1.5));
        assert_eq!(offsets.len(), 20);
        assert!(offsets.iter().all(|o| o.abs() < 1e-12));
    }

    #[test]
    fn test_detours_around_obstacle() {
        let mut map = GridObstacleMap::new(-10.0, -30.0, 60.0, 30.0, 0.25).unwrap();
        // block on the route, passable on both sides
        map.add_box(Point2D::new(14.0, -1.0), Point2D::new(16.0, 1.5));
        let config = PathBoostConfig::default();
        let layers = straight_layers(25, 1.5);
        let offsets = LateralSearch::new(&map, &config).search(&layers);

        assert_eq!(offsets[0], 0.0);
        let at_block = layers.iter().position(|s| (s.s - 15.0).abs() < 1e-9).unwrap();
        assert!(offsets[at_block] < -2.0, "offset {}", offsets[at_block]);
        for (i, w) in offsets.windows(2).enumerate() {
            assert!((w[1] - w[0]).abs() <= layers[i + 1].s - layers[i].s + 1e-9);
        }
        for (state, &offset) in layers.iter().zip(offsets.iter()) {
            assert!(map.is_free(frenet_to_cartesian(state, offset)));
        }
    }

    #[test]
    fn test_blocked_layer_degrades_to_route() {
        let mut map = GridObstacleMap::new(-10.0, -30.0, 60.0, 30.0, 0.25).unwrap();
        map.add_box(Point2D::new(14.5, -30.0), Point2D::new(15.5, 30.0));
        let config = PathBoostConfig::default();
        let layers = straight_layers(20, 1.5);
        let offsets = LateralSearch::new(&map, &config).search(&layers);
        let at_wall = layers.iter().position(|s| (s.s - 15.0).abs() < 1e-9).unwrap();
        assert_eq!(offsets[at_wall], 0.0);
        assert_eq!(offsets.len(), layers.len());
    }
}
