//! Engine configuration: TOML file loading, environment overrides, validation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use okulo_signals::distance::DistanceConfig;
use okulo_signals::light::LightConfig;
use okulo_signals::pose::GestureThresholds;

use crate::staircase::StaircaseConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OkuloConfig {
    pub pose: PoseConfig,
    pub distance: DistanceConfig,
    pub light: LightConfig,
    pub staircase: StaircaseConfig,
    pub session: SessionConfig,
}

/// Gesture threshold sets for the two phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseConfig {
    pub practice: GestureThresholds,
    pub formal: GestureThresholds,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            practice: GestureThresholds::practice(),
            formal: GestureThresholds::formal(),
        }
    }
}

/// Session-level timing and alignment tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Listening window for one practice trial, microseconds.
    pub practice_window_us: u64,
    /// Listening window for one formal trial, microseconds.
    pub response_window_us: u64,
    /// Chromatic adaptation countdown before each trial block, microseconds.
    pub adaptation_us: u64,
    /// Minimum interval between hints of the same kind, microseconds.
    pub hint_cooldown_us: u64,
    /// Maximum absolute head roll during distance lock, degrees.
    pub roll_tolerance_deg: f32,
    /// Maximum vertical eye misalignment during distance lock, meters.
    pub eye_height_tolerance_m: f32,
    /// Samples required before the pupillary-distance mean is reported.
    pub pd_min_samples: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            practice_window_us: 4_000_000,
            response_window_us: 3_000_000,
            adaptation_us: 8_000_000,
            hint_cooldown_us: 3_000_000,
            roll_tolerance_deg: 8.0,
            eye_height_tolerance_m: 0.015,
            pd_min_samples: 10,
        }
    }
}

impl OkuloConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: OkuloConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `OKULO_*` environment variable overrides.
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    /// Example: `OKULO_DISTANCE_FAR_M=0.50`
    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        use std::env;

        fn parse<T: std::str::FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
            val.parse()
                .map_err(|_| ConfigError::Validation(format!("Invalid {}", name)))
        }

        if let Ok(val) = env::var("OKULO_DISTANCE_NEAR_M") {
            self.distance.near_m = parse("OKULO_DISTANCE_NEAR_M", val)?;
        }
        if let Ok(val) = env::var("OKULO_DISTANCE_FAR_M") {
            self.distance.far_m = parse("OKULO_DISTANCE_FAR_M", val)?;
        }
        if let Ok(val) = env::var("OKULO_LIGHT_MIN_LUX") {
            self.light.min_lux = parse("OKULO_LIGHT_MIN_LUX", val)?;
        }
        if let Ok(val) = env::var("OKULO_STAIRCASE_TARGET_DISTANCE_M") {
            self.staircase.target_distance_m = parse("OKULO_STAIRCASE_TARGET_DISTANCE_M", val)?;
        }
        if let Ok(val) = env::var("OKULO_SESSION_RESPONSE_WINDOW_US") {
            self.session.response_window_us = parse("OKULO_SESSION_RESPONSE_WINDOW_US", val)?;
        }
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pose.practice.is_valid() || !self.pose.formal.is_valid() {
            return Err(ConfigError::Validation(
                "pose thresholds must be signed toward their direction".to_string(),
            ));
        }

        if self.distance.near_m <= 0.0 || self.distance.near_m >= self.distance.far_m {
            return Err(ConfigError::Validation(
                "distance.near_m must be positive and < far_m".to_string(),
            ));
        }
        if self.distance.hysteresis_m <= 0.0
            || self.distance.hysteresis_m >= (self.distance.far_m - self.distance.near_m) / 2.0
        {
            return Err(ConfigError::Validation(
                "distance.hysteresis_m must be positive and smaller than half the Ok band"
                    .to_string(),
            ));
        }
        if self.distance.min_dwell_us == 0 || self.distance.min_samples == 0 {
            return Err(ConfigError::Validation(
                "distance lock requires a positive dwell and sample count".to_string(),
            ));
        }

        if self.light.smoothing <= 0.0 || self.light.smoothing > 1.0 {
            return Err(ConfigError::Validation(
                "light.smoothing must be in (0, 1]".to_string(),
            ));
        }
        if self.light.meter_k <= 0.0 || self.light.aperture_n <= 0.0 || self.light.reflectance <= 0.0
        {
            return Err(ConfigError::Validation(
                "light meter constants must be positive".to_string(),
            ));
        }
        if self.light.min_lux < 0.0 {
            return Err(ConfigError::Validation(
                "light.min_lux must be non-negative".to_string(),
            ));
        }

        if self.staircase.levels.is_empty() {
            return Err(ConfigError::Validation(
                "staircase.levels must not be empty".to_string(),
            ));
        }
        if self
            .staircase
            .levels
            .windows(2)
            .any(|w| w[0].acuity_score >= w[1].acuity_score)
        {
            return Err(ConfigError::Validation(
                "staircase.levels must be strictly ascending in difficulty".to_string(),
            ));
        }
        if self.staircase.distance_tolerance_m <= 0.0 || self.staircase.target_distance_m <= 0.0 {
            return Err(ConfigError::Validation(
                "staircase distance gate values must be positive".to_string(),
            ));
        }

        let s = &self.session;
        if s.practice_window_us == 0 || s.response_window_us == 0 {
            return Err(ConfigError::Validation(
                "session listening windows must be positive".to_string(),
            ));
        }
        if s.roll_tolerance_deg <= 0.0 || s.eye_height_tolerance_m <= 0.0 {
            return Err(ConfigError::Validation(
                "session alignment tolerances must be positive".to_string(),
            ));
        }
        if s.pd_min_samples == 0 {
            return Err(ConfigError::Validation(
                "session.pd_min_samples must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Export configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
