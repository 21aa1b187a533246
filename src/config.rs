// Demo configuration, loadable from JSON

use crate::display::ClickMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "Config io error: {}", msg),
            Self::Parse(msg) => write!(f, "Config parse error: {}", msg),
            Self::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub dt: f64,
    pub kp: f64,
    // Defaults to `sqrt(kp)` when absent.
    pub kv: Option<f64>,
    pub vmax: Option<f64>,
    pub damping: f64,

    pub avoid_threshold: f64,
    pub avoid_gain: f64,
    pub obstacle_xyz: [f64; 3],
    pub obstacle_radius: f64,
    pub on_click: ClickMode,
    // Scripted clicks as `(time, x, y)`.
    pub clicks: Vec<(f64, f64, f64)>,

    pub initial_target: [f64; 3],
    // Distance below which the target counts as reached.
    pub target_threshold: f64,
    // `[min, max]` per axis for resampled targets.
    pub target_bounds: [[f64; 2]; 3],
    pub seed: Option<u64>,

    // Emit a progress line every this many steps; 0 disables it.
    pub log_every: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            dt: 0.001,
            kp: 100.0,
            kv: None,
            vmax: Some(10.0),
            damping: 0.0,
            avoid_threshold: 1.0,
            avoid_gain: 0.02,
            obstacle_xyz: [0.0, 0.0, 0.0],
            obstacle_radius: 0.2,
            on_click: ClickMode::Obstacle,
            clicks: Vec::new(),
            initial_target: [0.0, 2.0, 0.0],
            target_threshold: 0.005,
            target_bounds: [[-1.0, 1.0], [0.0, 2.0], [0.0, 0.0]],
            seed: None,
            log_every: 1000,
        }
    }
}

impl DemoConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DemoConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn kv(&self) -> f64 {
        self.kv.unwrap_or_else(|| self.kp.sqrt())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("dt", self.dt),
            ("kp", self.kp),
            ("kv", self.kv()),
            ("avoid_threshold", self.avoid_threshold),
            ("obstacle_radius", self.obstacle_radius),
            ("target_threshold", self.target_threshold),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)));
            }
        }
        if let Some(vmax) = self.vmax {
            if !(vmax > 0.0 && vmax.is_finite()) {
                return Err(ConfigError::Invalid(format!("vmax must be positive, got {}", vmax)));
            }
        }
        for (name, value) in [("damping", self.damping), ("avoid_gain", self.avoid_gain)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!("{} must not be negative, got {}", name, value)));
            }
        }
        let points = [("obstacle_xyz", self.obstacle_xyz), ("initial_target", self.initial_target)];
        for (name, xyz) in points {
            if !xyz.iter().all(|v| v.is_finite()) {
                return Err(ConfigError::Invalid(format!("{} must be finite, got {:?}", name, xyz)));
            }
        }
        for (axis, [lo, hi]) in self.target_bounds.iter().enumerate() {
            if !(lo <= hi) {
                return Err(ConfigError::Invalid(format!(
                    "target bounds for axis {} are inverted: [{}, {}]",
                    axis, lo, hi
                )));
            }
        }
        Ok(())
    }
}
