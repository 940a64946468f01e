//! # Controller Module
//!
//! Per-device controllers sitting between the session host and a trainer driver.
//!
//! This module handles:
//! - The capability interface shared by every trainer family ([`TrainerController`])
//! - Relaying telemetry and head unit buttons to the session host
//! - Zero-offset calibration ([`calibration`])
//! - The Tacx Fortius implementation ([`fortius`])

pub mod calibration;
pub mod fortius;

use serde::Deserialize;

use crate::error::Result;
use crate::session::SessionHost;
use crate::telemetry::TelemetryRecord;
use calibration::CalibrationState;

/// Ride mode requested by the session host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideMode {
    /// Constant power.
    Ergo,
    /// Gradient simulation.
    Slope,
    /// Calibration in progress.
    Calibrate,
}

/// Calibration procedure a trainer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationType {
    /// Spin-down free zero-offset against a motor-driven roller.
    ZeroOffset,
}

/// Result of asking a controller to look for a specific device.
///
/// `Found` and `NotFound` are reported by controllers for trainer families
/// addressed by identifier (ANT+ or BLE device IDs). The Fortius sits on a
/// fixed USB product ID and always answers `Unsupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// A device with the identifier answered.
    Found,
    /// The search ran and nothing with the identifier answered.
    NotFound,
    /// The controller has no way to search for devices by identifier.
    Unsupported,
}

/// Capability set every trainer controller exposes to the session host.
pub trait TrainerController {
    /// Starts the driver. Returns the driver status code.
    fn start(&mut self) -> i32;

    /// Resumes after a pause. Returns the driver status code.
    fn restart(&mut self) -> i32;

    /// Pauses the driver. Returns the driver status code.
    fn pause(&mut self) -> i32;

    /// Stops the driver. Returns the driver status code.
    fn stop(&mut self) -> i32;

    /// Returns true if a trainer is attached.
    fn find(&mut self) -> bool;

    /// Looks for the device with the given identifier.
    fn discover(&mut self, identifier: &str) -> Discovery;

    /// Accepts telemetry computed elsewhere.
    fn does_push(&self) -> bool;

    /// Produces telemetry when polled.
    fn does_pull(&self) -> bool;

    /// Accepts load and gradient setpoints.
    fn does_load(&self) -> bool;

    /// Polls the trainer once and writes the result into `record`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionLost` if the trainer is not running.
    fn update_telemetry(
        &mut self,
        host: &mut dyn SessionHost,
        record: &mut TelemetryRecord,
    ) -> Result<()>;

    /// Forwards externally computed telemetry to the trainer.
    fn push_telemetry(&mut self, record: &TelemetryRecord);

    fn set_load(&mut self, watts: f64);

    fn set_gradient(&mut self, grade: f64, resistance_watts: f64);

    fn set_mode(&mut self, mode: RideMode);

    /// Sets rider plus bike weight in kg.
    fn set_weight(&mut self, weight_kg: f64);

    fn calibration_type(&self) -> CalibrationType;

    /// Roller speed in km/h the calibration is run at.
    fn calibration_target_speed(&self) -> f64;

    fn calibration_state(&self) -> CalibrationState;

    /// Starts a calibration.
    fn begin_calibration(&mut self);

    /// Advances the calibration by one tick and returns the zero offset.
    ///
    /// # Errors
    ///
    /// Returns `CalibrationTimeout` if the calibration does not finish in time.
    fn calibration_zero_offset(&mut self) -> Result<u16>;

    /// Abandons a running calibration.
    fn cancel_calibration(&mut self);

    /// Returns calibration to idle from any state.
    fn reset_calibration_state(&mut self);
}
