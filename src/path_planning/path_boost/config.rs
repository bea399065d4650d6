//! Configuration for the path optimization pipeline
//!
//! One immutable [`PathBoostConfig`] is built per process (or per planning
//! call) and threaded into the smoother, the solver and the orchestrator.
//! Every section deserializes from TOML with missing keys taking the
//! defaults below.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{PathBoostError, PathBoostResult};
use crate::optimization::QpSettings;

/// Reference smoothing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SmoothingMethod {
    /// Lateral offsets of the rough points, heading-change energy
    Tension,
    /// Free Cartesian points, finite-difference energy
    Tension2,
}

/// Path solver state/control formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizationMethod {
    /// Curvature is the control
    K,
    /// Curvature rate is the control
    Kp,
    /// Curvature rate is the control and is bounded
    Kcp,
}

impl FromStr for SmoothingMethod {
    type Err = PathBoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TENSION" => Ok(SmoothingMethod::Tension),
            "TENSION2" => Ok(SmoothingMethod::Tension2),
            other => Err(PathBoostError::InvalidParameter(format!(
                "unknown smoothing method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmoothingMethod::Tension => write!(f, "TENSION"),
            SmoothingMethod::Tension2 => write!(f, "TENSION2"),
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = PathBoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "K" => Ok(OptimizationMethod::K),
            "KP" => Ok(OptimizationMethod::Kp),
            "KCP" => Ok(OptimizationMethod::Kcp),
            other => Err(PathBoostError::InvalidParameter(format!(
                "unknown optimization method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationMethod::K => write!(f, "K"),
            OptimizationMethod::Kp => write!(f, "KP"),
            OptimizationMethod::Kcp => write!(f, "KCP"),
        }
    }
}

/// Vehicle geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Body width [m]
    pub width: f64,
    /// Body length [m]
    pub length: f64,
    /// Distance between axles [m]
    pub wheelbase: f64,
    /// Signed distance from the rear axle to the rear edge [m]
    pub rear_edge_to_center: f64,
    /// Signed distance from the rear axle to the front edge [m]
    pub front_edge_to_center: f64,
    /// Maximum front wheel angle [rad]
    pub max_steer_angle: f64,
    /// Clearance kept between the body and obstacles [m]
    pub safety_margin: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            width: 2.0,
            length: 4.9,
            wheelbase: 2.5,
            rear_edge_to_center: -1.0,
            front_edge_to_center: 3.9,
            max_steer_angle: 35.0_f64.to_radians(),
            safety_margin: 0.3,
        }
    }
}

impl VehicleConfig {
    pub fn half_width(&self) -> f64 {
        0.5 * self.width
    }

    /// Largest curvature reachable at full steering lock [1/m]
    pub fn max_curvature(&self) -> f64 {
        self.max_steer_angle.tan() / self.wheelbase
    }
}

/// Weights of the TENSION smoother
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensionWeights {
    pub angle_diff: f64,
    pub angle_diff_diff: f64,
    pub deviation: f64,
}

impl Default for TensionWeights {
    fn default() -> Self {
        Self {
            angle_diff: 1500.0,
            angle_diff_diff: 200.0,
            deviation: 15.0,
        }
    }
}

/// Weights of the TENSION2 smoother
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tension2Weights {
    pub deviation: f64,
    pub curvature: f64,
    pub curvature_rate: f64,
}

impl Default for Tension2Weights {
    fn default() -> Self {
        Self {
            deviation: 0.005,
            curvature: 1.0,
            curvature_rate: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub method: SmoothingMethod,
    /// Run the lateral pre-search before smoothing
    pub enable_searching: bool,
    /// Lateral extent of the pre-search and of the rough corridor [m]
    pub search_lateral_range: f64,
    pub search_longitudinal_spacing: f64,
    pub search_lateral_spacing: f64,
    pub search_obstacle_cost: f64,
    pub search_deviation_cost: f64,
    pub tension: TensionWeights,
    pub tension2: Tension2Weights,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::Tension2,
            enable_searching: true,
            search_lateral_range: 10.0,
            search_longitudinal_spacing: 1.5,
            search_lateral_spacing: 0.6,
            search_obstacle_cost: 0.4,
            search_deviation_cost: 0.4,
            tension: TensionWeights::default(),
            tension2: Tension2Weights::default(),
        }
    }
}

/// Cost weights of the path solver. A weight table given in a config file
/// must name all four weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub curvature: f64,
    pub curvature_rate: f64,
    pub deviation: f64,
    pub slack: f64,
}

impl WeightSet {
    fn k_defaults() -> Self {
        Self {
            curvature: 50.0,
            curvature_rate: 200.0,
            deviation: 0.0,
            slack: 3.0,
        }
    }

    fn kp_defaults() -> Self {
        Self {
            curvature: 10.0,
            curvature_rate: 200.0,
            deviation: 0.0,
            slack: 3.0,
        }
    }

    fn is_valid(&self) -> bool {
        [self.curvature, self.curvature_rate, self.deviation, self.slack]
            .iter()
            .all(|w| *w >= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub method: OptimizationMethod,
    /// Weights used by method K
    pub k_weights: WeightSet,
    /// Weights used by methods KP and KCP
    pub kp_weights: WeightSet,
    /// Larger margin defining the soft corridor [m]
    pub expected_safety_margin: f64,
    /// Lateral extent of the corridor search [m]
    pub corridor_search_range: f64,
    /// Curvature rate limit of KCP [1/m^2]
    pub max_curvature_rate: f64,
    pub constraint_end_heading: bool,
    pub exact_end_position: bool,
    /// Drop hard corridor rows beyond `precise_planning_length` in the rough pass
    pub rough_constraints_far_away: bool,
    pub precise_planning_length: f64,
    /// Half width of the band kept around the rough result [m]
    pub refinement_trust_region: f64,
    /// Linear and quadratic penalty on leaving the hard corridor
    pub corridor_violation_weight: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            method: OptimizationMethod::Kp,
            k_weights: WeightSet::k_defaults(),
            kp_weights: WeightSet::kp_defaults(),
            expected_safety_margin: 0.6,
            corridor_search_range: 10.0,
            max_curvature_rate: 0.2,
            constraint_end_heading: true,
            exact_end_position: false,
            rough_constraints_far_away: false,
            precise_planning_length: 30.0,
            refinement_trust_region: 1.0,
            corridor_violation_weight: 1000.0,
        }
    }
}

impl OptimizationConfig {
    /// Weight set matching the configured method
    pub fn weights(&self) -> &WeightSet {
        match self.method {
            OptimizationMethod::K => &self.k_weights,
            OptimizationMethod::Kp | OptimizationMethod::Kcp => &self.kp_weights,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathBoostConfig {
    pub vehicle: VehicleConfig,
    pub smoothing: SmoothingConfig,
    pub optimization: OptimizationConfig,
    pub qp: QpSettings,
    /// Nominal spacing of the output path [m]
    pub output_spacing: f64,
    /// Halve the spacing where the reference curvature is high
    pub enable_dynamic_segmentation: bool,
    /// Curvature above which dense spacing is used [1/m]
    pub dynamic_segmentation_curvature: f64,
    /// Tolerance for floating point comparisons
    pub epsilon: f64,
}

impl Default for PathBoostConfig {
    fn default() -> Self {
        Self {
            vehicle: VehicleConfig::default(),
            smoothing: SmoothingConfig::default(),
            optimization: OptimizationConfig::default(),
            qp: QpSettings::default(),
            output_spacing: 0.3,
            enable_dynamic_segmentation: true,
            dynamic_segmentation_curvature: 0.08,
            epsilon: 1e-6,
        }
    }
}

impl PathBoostConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> PathBoostResult<Self> {
        let config: PathBoostConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> PathBoostResult<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> PathBoostResult<()> {
        let positive = [
            ("vehicle.width", self.vehicle.width),
            ("vehicle.length", self.vehicle.length),
            ("vehicle.wheelbase", self.vehicle.wheelbase),
            ("smoothing.search_lateral_range", self.smoothing.search_lateral_range),
            ("smoothing.search_longitudinal_spacing", self.smoothing.search_longitudinal_spacing),
            ("smoothing.search_lateral_spacing", self.smoothing.search_lateral_spacing),
            ("optimization.corridor_search_range", self.optimization.corridor_search_range),
            ("optimization.max_curvature_rate", self.optimization.max_curvature_rate),
            ("optimization.precise_planning_length", self.optimization.precise_planning_length),
            ("optimization.refinement_trust_region", self.optimization.refinement_trust_region),
            ("optimization.corridor_violation_weight", self.optimization.corridor_violation_weight),
            ("output_spacing", self.output_spacing),
            ("dynamic_segmentation_curvature", self.dynamic_segmentation_curvature),
            ("epsilon", self.epsilon),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(PathBoostError::InvalidParameter(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }

        let steer = self.vehicle.max_steer_angle;
        if !(steer > 0.0 && steer < std::f64::consts::FRAC_PI_2) {
            return Err(PathBoostError::InvalidParameter(format!(
                "vehicle.max_steer_angle must lie in (0, pi/2), got {}",
                steer
            )));
        }
        if self.vehicle.front_edge_to_center <= self.vehicle.rear_edge_to_center {
            return Err(PathBoostError::InvalidParameter(
                "vehicle front edge must lie ahead of the rear edge".to_string(),
            ));
        }
        if self.vehicle.safety_margin < 0.0
            || self.optimization.expected_safety_margin < self.vehicle.safety_margin
        {
            return Err(PathBoostError::InvalidParameter(format!(
                "need 0 <= safety_margin ({}) <= expected_safety_margin ({})",
                self.vehicle.safety_margin, self.optimization.expected_safety_margin
            )));
        }

        let s = &self.smoothing;
        let smoothing_weights = [
            s.search_obstacle_cost,
            s.search_deviation_cost,
            s.tension.angle_diff,
            s.tension.angle_diff_diff,
            s.tension.deviation,
            s.tension2.deviation,
            s.tension2.curvature,
            s.tension2.curvature_rate,
        ];
        if smoothing_weights.iter().any(|w| !(*w >= 0.0))
            || !self.optimization.k_weights.is_valid()
            || !self.optimization.kp_weights.is_valid()
        {
            return Err(PathBoostError::InvalidParameter(
                "weights and costs must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PathBoostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.smoothing.method, SmoothingMethod::Tension2);
        assert_eq!(config.optimization.method, OptimizationMethod::Kp);
        assert_eq!(config.optimization.weights().curvature, 10.0);
        assert_eq!(config.optimization.k_weights.curvature, 50.0);
    }

    #[test]
    fn test_max_curvature() {
        let vehicle = VehicleConfig::default();
        let expected = 35.0_f64.to_radians().tan() / 2.5;
        assert!((vehicle.max_curvature() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_method_names() {
        assert_eq!("TENSION".parse::<SmoothingMethod>().unwrap(), SmoothingMethod::Tension);
        assert_eq!("TENSION2".parse::<SmoothingMethod>().unwrap(), SmoothingMethod::Tension2);
        assert_eq!("KCP".parse::<OptimizationMethod>().unwrap(), OptimizationMethod::Kcp);
        assert!("SPLINE".parse::<SmoothingMethod>().is_err());
        assert!(matches!(
            "kp".parse::<OptimizationMethod>(),
            Err(PathBoostError::InvalidParameter(_))
        ));
        assert_eq!(OptimizationMethod::Kp.to_string(), "KP");
    }

    #[test]
    fn test_from_toml_partial() {
        let config = PathBoostConfig::from_toml_str(
            r#"
            output_spacing = 0.5

            [vehicle]
            width = 1.8

            [smoothing]
            method = "TENSION"

            [optimization]
            method = "K"

            [optimization.k_weights]
            curvature = 40.0
            curvature_rate = 100.0
            deviation = 0.0
            slack = 10.0
            "#,
        )
        .unwrap();
        assert_eq!(config.output_spacing, 0.5);
        assert_eq!(config.vehicle.width, 1.8);
        assert_eq!(config.vehicle.wheelbase, 2.5);
        assert_eq!(config.smoothing.method, SmoothingMethod::Tension);
        assert_eq!(config.optimization.method, OptimizationMethod::K);
        assert_eq!(config.optimization.weights().slack, 10.0);
        assert_eq!(config.optimization.weights().curvature, 40.0);
        assert_eq!(config.optimization.kp_weights.curvature, 10.0);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(matches!(
            PathBoostConfig::from_toml_str("output_spacing = -1.0"),
            Err(PathBoostError::InvalidParameter(_))
        ));
        assert!(matches!(
            PathBoostConfig::from_toml_str("[smoothing]\nmethod = \"SPLINE\""),
            Err(PathBoostError::ConfigParse(_))
        ));
        assert!(matches!(
            PathBoostConfig::from_toml_str("[optimization.kp_weights]\nslack = 1.0"),
            Err(PathBoostError::ConfigParse(_))
        ));
        assert!(matches!(
            PathBoostConfig::from_toml_str("[vehicle]\nmax_steer_angle = 2.0"),
            Err(PathBoostError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PathBoostConfig::load("/nonexistent/path_boost.toml");
        assert!(matches!(result, Err(PathBoostError::ConfigRead(_))));
    }
}
