//! # Device Module
//!
//! Abstraction over the trainer driver.
//!
//! The driver owns the byte-level protocol and the USB connection. This crate
//! only sees it through the [`Device`] trait:
//! - One atomic [`TelemetrySample`] per poll
//! - Load and gradient setpoints, which the driver may clamp
//! - Operating mode and calibration value commands

pub mod simulated;

/// Head unit button bits as reported in [`TelemetrySample::buttons`].
///
/// | Button | Bit | Action |
/// |--------|-----|--------|
/// | Enter | 0x01 | New lap |
/// | Minus | 0x02 | Lower load |
/// | Plus | 0x04 | Raise load |
/// | Cancel | 0x08 | Stop session |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonMask(pub u32);

impl ButtonMask {
    /// No buttons pressed.
    pub const NONE: ButtonMask = ButtonMask(0);
    /// Enter button.
    pub const ENTER: ButtonMask = ButtonMask(0x01);
    /// Minus button.
    pub const MINUS: ButtonMask = ButtonMask(0x02);
    /// Plus button.
    pub const PLUS: ButtonMask = ButtonMask(0x04);
    /// Cancel button.
    pub const CANCEL: ButtonMask = ButtonMask(0x08);

    /// Returns true if every bit of `other` is set in this mask.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortius_control::device::ButtonMask;
    ///
    /// let mask = ButtonMask::PLUS | ButtonMask::ENTER;
    /// assert!(mask.contains(ButtonMask::PLUS));
    /// assert!(!mask.contains(ButtonMask::CANCEL));
    /// ```
    #[must_use]
    pub fn contains(self, other: ButtonMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Returns true if no button bit is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ButtonMask {
    type Output = ButtonMask;

    fn bitor(self, rhs: ButtonMask) -> ButtonMask {
        ButtonMask(self.0 | rhs.0)
    }
}

/// Trainer operating mode, as understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Brake released, no resistance control.
    Idle,
    /// Constant power (load setpoint in watts).
    Ergo,
    /// Slope simulation (gradient setpoint).
    Spin,
    /// Motor drives the roller for zero-offset calibration.
    Calibrate,
}

/// One poll of the trainer.
///
/// Produced fresh on every call to [`Device::telemetry`] and owned by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    /// Power in watts.
    pub power: f64,
    /// Brake resistance. In calibrate mode this is the calibration reading.
    pub resistance: f64,
    /// Heart rate in bpm.
    pub heart_rate: u16,
    /// Cadence in rpm.
    pub cadence: f64,
    /// Speed in km/h.
    pub speed: f64,
    /// Distance in km.
    pub distance: f64,
    /// Head unit buttons.
    pub buttons: ButtonMask,
    /// Steering sensor value.
    pub steering: i32,
    /// Device-reported status word.
    pub status: i32,
}

/// Driver operations consumed by the controller.
///
/// Implementations own the connection lifecycle and may clamp any setpoint;
/// callers must read back [`Device::load`] and [`Device::gradient`] rather than
/// trusting the requested values.
#[cfg_attr(test, mockall::automock)]
pub trait Device {
    /// Returns true while the driver has a live connection to the trainer.
    fn is_running(&self) -> bool;

    /// Polls the latest telemetry as a single snapshot.
    fn telemetry(&mut self) -> TelemetrySample;

    /// Requests a load setpoint in watts.
    fn set_load(&mut self, watts: f64);

    /// Effective load setpoint after clamping.
    fn load(&self) -> f64;

    /// Requests a gradient setpoint in percent.
    fn set_gradient(&mut self, grade: f64, resistance_watts: f64);

    /// Effective gradient setpoint after clamping.
    fn gradient(&self) -> f64;

    /// Switches the operating mode.
    fn set_mode(&mut self, mode: DeviceMode);

    /// Commits a zero-offset calibration value.
    fn set_calibration_value(&mut self, value: f64);

    /// Sets rider plus bike weight in kg, used in slope mode.
    fn set_weight(&mut self, weight_kg: f64);

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
}
