//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::controller::calibration::CALIBRATION_SETTLE_TICKS;
use crate::controller::RideMode;
use crate::error::{Result, TrainerError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub simulator: SimulatorConfig,
    pub session: SessionConfig,
    pub calibration: CalibrationConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Trainer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_weight_kg")]
    pub weight_kg: f64,

    #[serde(default = "default_initial_load_watts")]
    pub initial_load_watts: f64,

    #[serde(default = "default_initial_gradient")]
    pub initial_gradient: f64,
}

/// Simulated trainer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_cruise_speed_kmh")]
    pub cruise_speed_kmh: f64,

    #[serde(default = "default_acceleration_kmh_per_tick")]
    pub acceleration_kmh_per_tick: f64,

    #[serde(default = "default_calibration_reading")]
    pub calibration_reading: f64,
}

/// Polling session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_mode")]
    pub mode: RideMode,

    #[serde(default = "default_load_step_watts")]
    pub load_step_watts: f64,

    #[serde(default = "default_slope_step_percent")]
    pub slope_step_percent: f64,

    #[serde(default)]
    pub calibrate_on_start: bool,
}

/// Calibration configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_timeout_ticks")]
    pub timeout_ticks: u32,
}

/// Telemetry log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    /// Speed to power curve coefficients `[c0, c1, c2, c3]`, speed in km/h
    #[serde(default)]
    pub virtual_power: Option<[f64; 4]>,
}

/// Application log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a daily rolling file in this directory instead of stdout
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_weight_kg() -> f64 { 75.0 }
fn default_initial_load_watts() -> f64 { 100.0 }
fn default_initial_gradient() -> f64 { 0.0 }

fn default_cruise_speed_kmh() -> f64 { 30.0 }
fn default_acceleration_kmh_per_tick() -> f64 { 1.0 }
fn default_calibration_reading() -> f64 { 1200.0 }

fn default_poll_interval_ms() -> u64 { 100 }
fn default_mode() -> RideMode { RideMode::Ergo }
fn default_load_step_watts() -> f64 { 5.0 }
fn default_slope_step_percent() -> f64 { 0.1 }

fn default_timeout_ticks() -> u32 { 600 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

fn invalid(message: impl std::fmt::Display) -> TrainerError {
    TrainerError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fortius_control::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        check_range("weight_kg", self.device.weight_kg, 1.0, 200.0)?;
        check_range("initial_load_watts", self.device.initial_load_watts, 0.0, 2000.0)?;
        check_range("initial_gradient", self.device.initial_gradient, -20.0, 25.0)?;

        check_range("cruise_speed_kmh", self.simulator.cruise_speed_kmh, 1.0, 80.0)?;
        check_range(
            "acceleration_kmh_per_tick",
            self.simulator.acceleration_kmh_per_tick,
            0.01,
            20.0,
        )?;
        check_range("calibration_reading", self.simulator.calibration_reading, 0.0, 65535.0)?;

        if self.session.poll_interval_ms < 10 || self.session.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 10 and 1000"));
        }

        check_range("load_step_watts", self.session.load_step_watts, 1.0, 100.0)?;
        check_range("slope_step_percent", self.session.slope_step_percent, 0.01, 5.0)?;

        if self.session.mode == RideMode::Calibrate {
            return Err(invalid("session mode must be 'ergo' or 'slope'"));
        }

        // The settle phase alone needs CALIBRATION_SETTLE_TICKS + 1 ticks
        if self.calibration.timeout_ticks <= CALIBRATION_SETTLE_TICKS + 1 {
            return Err(invalid(format!(
                "timeout_ticks must be greater than {}",
                CALIBRATION_SETTLE_TICKS + 1
            )));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if let Some(coefficients) = self.telemetry.virtual_power {
            if !coefficients.iter().all(|c| c.is_finite()) {
                return Err(invalid("virtual_power coefficients must be finite"));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

/// Rejects NaN, infinities and values outside `min..=max`.
fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || !(min..=max).contains(&value) {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}
