//! # Simulated Trainer
//!
//! In-process stand-in for the trainer driver, used when no hardware is attached.
//!
//! The simulated rider accelerates steadily up to a cruise speed once the
//! trainer is started. Setpoints are clamped to the same ranges the real
//! head unit enforces, so callers see the effective values differ from the
//! requested ones at the extremes.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

use super::{ButtonMask, Device, DeviceMode, TelemetrySample};
use crate::config::SimulatorConfig;

/// Lowest load the brake can hold in ergo mode (watts).
pub const MIN_LOAD_WATTS: f64 = 50.0;
/// Highest load the brake can hold in ergo mode (watts).
pub const MAX_LOAD_WATTS: f64 = 1000.0;
/// Steepest descent the brake can simulate (percent).
pub const MIN_GRADIENT: f64 = -5.0;
/// Steepest climb the brake can simulate (percent).
pub const MAX_GRADIENT: f64 = 20.0;

/// Driver status code for a successful command.
const STATUS_OK: i32 = 0;
/// Driver status code for a command issued while stopped.
const STATUS_NOT_RUNNING: i32 = -1;

/// Gravity in m/s².
const GRAVITY: f64 = 9.81;
/// Rolling resistance coefficient for slope mode power.
const ROLLING_RESISTANCE: f64 = 0.005;

/// Deterministic trainer simulation implementing [`Device`].
#[derive(Debug)]
pub struct SimulatedTrainer {
    running: bool,
    paused: bool,
    mode: DeviceMode,
    load: f64,
    gradient: f64,
    weight_kg: f64,
    speed: f64,
    distance: f64,
    calibration_value: Option<f64>,
    pending_buttons: VecDeque<ButtonMask>,
    cruise_speed_kmh: f64,
    acceleration_kmh_per_tick: f64,
    calibration_reading: f64,
    tick_hours: f64,
}

impl SimulatedTrainer {
    /// Creates a stopped simulator.
    ///
    /// # Arguments
    ///
    /// * `config` - Rider and calibration behaviour
    /// * `poll_interval` - Time between polls, used to integrate distance
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use fortius_control::device::Device;
    /// use fortius_control::device::simulated::SimulatedTrainer;
    /// use fortius_control::config::SimulatorConfig;
    ///
    /// let config = SimulatorConfig {
    ///     cruise_speed_kmh: 30.0,
    ///     acceleration_kmh_per_tick: 1.0,
    ///     calibration_reading: 1200.0,
    /// };
    /// let mut trainer = SimulatedTrainer::new(&config, Duration::from_millis(100));
    /// assert!(!trainer.is_running());
    /// trainer.start();
    /// assert!(trainer.is_running());
    /// ```
    #[must_use]
    pub fn new(config: &SimulatorConfig, poll_interval: Duration) -> Self {
        Self {
            running: false,
            paused: false,
            mode: DeviceMode::Idle,
            load: 100.0,
            gradient: 0.0,
            weight_kg: 75.0,
            speed: 0.0,
            distance: 0.0,
            calibration_value: None,
            pending_buttons: VecDeque::new(),
            cruise_speed_kmh: config.cruise_speed_kmh,
            acceleration_kmh_per_tick: config.acceleration_kmh_per_tick,
            calibration_reading: config.calibration_reading,
            tick_hours: poll_interval.as_secs_f64() / 3600.0,
        }
    }

    /// Queues a button mask to be reported by the next poll.
    pub fn press(&mut self, buttons: ButtonMask) {
        self.pending_buttons.push_back(buttons);
    }

    /// Simulates the USB link dropping.
    pub fn disconnect(&mut self) {
        debug!("Simulated trainer disconnected");
        self.running = false;
    }

    /// Current operating mode.
    #[must_use]
    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Last committed calibration value, if any.
    #[must_use]
    pub fn calibration_value(&self) -> Option<f64> {
        self.calibration_value
    }

    fn advance_speed(&mut self) {
        if !self.running || self.paused {
            self.speed = (self.speed - self.acceleration_kmh_per_tick).max(0.0);
        } else {
            self.speed = (self.speed + self.acceleration_kmh_per_tick).min(self.cruise_speed_kmh);
        }
    }

    fn slope_power(&self) -> f64 {
        let speed_ms = self.speed / 3.6;
        let force = self.weight_kg * GRAVITY * (self.gradient / 100.0 + ROLLING_RESISTANCE);
        (force * speed_ms).max(0.0)
    }
}

impl Device for SimulatedTrainer {
    fn is_running(&self) -> bool {
        self.running
    }

    fn telemetry(&mut self) -> TelemetrySample {
        self.advance_speed();
        self.distance += self.speed * self.tick_hours;

        let (power, resistance) = match self.mode {
            DeviceMode::Idle => (0.0, 0.0),
            DeviceMode::Ergo if self.speed > 0.0 => (self.load, self.load),
            DeviceMode::Ergo => (0.0, self.load),
            DeviceMode::Spin => (self.slope_power(), self.gradient),
            DeviceMode::Calibrate => (0.0, self.calibration_reading),
        };

        let heart_rate = if self.speed > 0.0 {
            (90.0 + power / 5.0).min(190.0) as u16
        } else {
            0
        };

        TelemetrySample {
            power,
            resistance,
            heart_rate,
            cadence: self.speed * 3.0,
            speed: self.speed,
            distance: self.distance,
            buttons: self.pending_buttons.pop_front().unwrap_or_default(),
            steering: 0,
            status: if self.running { 1 } else { 0 },
        }
    }

    fn set_load(&mut self, watts: f64) {
        self.load = watts.clamp(MIN_LOAD_WATTS, MAX_LOAD_WATTS);
        debug!("Load requested {:.1}W, effective {:.1}W", watts, self.load);
    }

    fn load(&self) -> f64 {
        self.load
    }

    fn set_gradient(&mut self, grade: f64, _resistance_watts: f64) {
        self.gradient = grade.clamp(MIN_GRADIENT, MAX_GRADIENT);
        debug!("Gradient requested {:.1}%, effective {:.1}%", grade, self.gradient);
    }

    fn gradient(&self) -> f64 {
        self.gradient
    }

    fn set_mode(&mut self, mode: DeviceMode) {
        self.mode = mode;
    }

    fn set_calibration_value(&mut self, value: f64) {
        self.calibration_value = Some(value);
    }

    fn set_weight(&mut self, weight_kg: f64) {
        self.weight_kg = weight_kg;
    }

    fn start(&mut self) -> i32 {
        self.running = true;
        self.paused = false;
        STATUS_OK
    }

    fn restart(&mut self) -> i32 {
        if !self.running {
            return STATUS_NOT_RUNNING;
        }
        self.paused = false;
        STATUS_OK
    }

    fn pause(&mut self) -> i32 {
        if !self.running {
            return STATUS_NOT_RUNNING;
        }
        self.paused = true;
        STATUS_OK
    }

    fn stop(&mut self) -> i32 {
        self.running = false;
        self.mode = DeviceMode::Idle;
        STATUS_OK
    }

    fn find(&mut self) -> bool {
        true
    }
}
