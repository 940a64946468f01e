//! # Fortius Controller
//!
//! [`TrainerController`] for the Tacx Fortius.
//!
//! ## Telemetry
//!
//! Each call to [`update_telemetry`](TrainerController::update_telemetry) polls
//! the trainer once and fills in the record:
//!
//! | Trainer | Record |
//! |---------|--------|
//! | power | `watts` |
//! | heart rate | `hr` |
//! | cadence | `cadence` |
//! | speed | `speed` |
//! | effective load | `load` |
//! | effective gradient | `slope` |
//!
//! Distance and steering are polled but not mapped.
//!
//! ## Head Unit Buttons
//!
//! | Button | Session action |
//! |--------|----------------|
//! | Plus | `higher()` |
//! | Minus | `lower()` |
//! | Enter | `new_lap()` |
//! | Cancel | `stop(Normal)` |
//!
//! Buttons are ignored while the session is calibrating.

use tracing::{debug, info, warn};

use super::calibration::{CalibrationState, CalibrationStateMachine};
use super::{CalibrationType, Discovery, RideMode, TrainerController};
use crate::device::{ButtonMask, Device, DeviceMode};
use crate::error::{Result, TrainerError};
use crate::session::{SessionHost, Severity, StopReason};
use crate::telemetry::{NoProcessing, RecordProcessor, TelemetryRecord};

/// Roller speed the Fortius motor calibrates at (km/h).
pub const FORTIUS_CALIBRATION_SPEED_KMH: f64 = 20.0;

/// Notification shown when the trainer stops responding.
const CONNECTION_LOST_MESSAGE: &str = "Cannot connect to Fortius";

/// Controller for a Fortius trainer driven through `D`.
///
/// Owns the driver exclusively for the length of the session.
pub struct FortiusController<D: Device> {
    device: D,
    calibration: CalibrationStateMachine,
    processor: Box<dyn RecordProcessor>,
}

impl<D: Device> std::fmt::Debug for FortiusController<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FortiusController")
            .field("calibration", &self.calibration)
            .finish_non_exhaustive()
    }
}

impl<D: Device> FortiusController<D> {
    /// Creates a controller with no telemetry post-processing.
    ///
    /// # Arguments
    ///
    /// * `device` - Trainer driver
    /// * `calibration_timeout_ticks` - Ticks a calibration may run before it fails
    #[must_use]
    pub fn new(device: D, calibration_timeout_ticks: u32) -> Self {
        Self {
            device,
            calibration: CalibrationStateMachine::new(calibration_timeout_ticks),
            processor: Box::new(NoProcessing),
        }
    }

    /// Replaces the post-processing step run on every record.
    #[must_use]
    pub fn with_processor(mut self, processor: Box<dyn RecordProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// The underlying driver.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    fn dispatch_buttons(host: &mut dyn SessionHost, buttons: ButtonMask) {
        if buttons.is_empty() {
            return;
        }
        debug!("Head unit buttons: 0x{:02X}", buttons.0);

        if buttons.contains(ButtonMask::PLUS) {
            host.higher();
        }
        if buttons.contains(ButtonMask::MINUS) {
            host.lower();
        }
        if buttons.contains(ButtonMask::ENTER) {
            host.new_lap();
        }
        if buttons.contains(ButtonMask::CANCEL) {
            host.stop(StopReason::Normal);
        }
    }
}

impl<D: Device> TrainerController for FortiusController<D> {
    fn start(&mut self) -> i32 {
        info!("Starting Fortius");
        self.device.start()
    }

    fn restart(&mut self) -> i32 {
        self.device.restart()
    }

    fn pause(&mut self) -> i32 {
        self.device.pause()
    }

    fn stop(&mut self) -> i32 {
        info!("Stopping Fortius");
        self.device.stop()
    }

    fn find(&mut self) -> bool {
        self.device.find()
    }

    fn discover(&mut self, identifier: &str) -> Discovery {
        debug!("Discovery by identifier not supported for Fortius ({})", identifier);
        Discovery::Unsupported
    }

    fn does_push(&self) -> bool {
        false
    }

    fn does_pull(&self) -> bool {
        true
    }

    fn does_load(&self) -> bool {
        true
    }

    fn update_telemetry(
        &mut self,
        host: &mut dyn SessionHost,
        record: &mut TelemetryRecord,
    ) -> Result<()> {
        if !self.device.is_running() {
            warn!("Fortius is not running");
            host.notify(CONNECTION_LOST_MESSAGE, Severity::Error);
            host.stop(StopReason::Error);
            return Err(TrainerError::ConnectionLost(
                "Fortius is not running".to_string(),
            ));
        }

        let sample = self.device.telemetry();

        record.watts = sample.power;
        record.hr = sample.heart_rate;
        record.cadence = sample.cadence;
        record.speed = sample.speed;

        self.processor.process(record);

        if !host.is_calibrating() {
            Self::dispatch_buttons(host, sample.buttons);
        }

        // The trainer clamps setpoints, so show what it actually applied
        record.load = self.device.load();
        record.slope = self.device.gradient();

        Ok(())
    }

    /// The Fortius does not accept telemetry from outside.
    fn push_telemetry(&mut self, _record: &TelemetryRecord) {}

    fn set_load(&mut self, watts: f64) {
        self.device.set_load(watts);
    }

    fn set_gradient(&mut self, grade: f64, resistance_watts: f64) {
        self.device.set_gradient(grade, resistance_watts);
    }

    fn set_mode(&mut self, mode: RideMode) {
        let device_mode = match mode {
            RideMode::Ergo => DeviceMode::Ergo,
            RideMode::Slope => DeviceMode::Spin,
            RideMode::Calibrate => DeviceMode::Idle,
        };
        debug!("Ride mode {:?} -> device mode {:?}", mode, device_mode);
        self.device.set_mode(device_mode);
    }

    fn set_weight(&mut self, weight_kg: f64) {
        self.device.set_weight(weight_kg);
    }

    fn calibration_type(&self) -> CalibrationType {
        CalibrationType::ZeroOffset
    }

    fn calibration_target_speed(&self) -> f64 {
        FORTIUS_CALIBRATION_SPEED_KMH
    }

    fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    fn begin_calibration(&mut self) {
        info!("Starting Fortius calibration");
        self.calibration.begin(&mut self.device);
    }

    /// Always `Ok(0)`: the Fortius commits its offset to the trainer itself.
    ///
    /// Watch [`calibration_state`](TrainerController::calibration_state) for progress.
    fn calibration_zero_offset(&mut self) -> Result<u16> {
        self.calibration.tick(&mut self.device)?;
        Ok(0)
    }

    fn cancel_calibration(&mut self) {
        info!("Cancelling Fortius calibration");
        self.calibration.cancel(&mut self.device);
    }

    fn reset_calibration_state(&mut self) {
        self.calibration.reset(&mut self.device);
    }
}
