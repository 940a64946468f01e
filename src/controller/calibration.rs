//! # Calibration Module
//!
//! Zero-offset calibration of the trainer brake.
//!
//! ## Procedure
//!
//! 1. The trainer is switched to calibrate mode and the motor spins the roller
//! 2. Once the roller reports speed, the resistance reading is polled every tick
//! 3. After [`CALIBRATION_SETTLE_TICKS`] ticks the last reading is committed to
//!    the trainer and the brake is released
//!
//! ## States
//!
//! ```text
//! Idle -> Pending -> Starting -> Started -> Success
//!                       |           |
//!                       +-----------+--> Failed(Timeout | Cancelled)
//! ```
//!
//! `Pending` is left within the same call that enters it. Any state returns to
//! `Idle` through [`CalibrationStateMachine::reset`].
//!
//! ## Usage
//!
//! ```
//! use std::time::Duration;
//! use fortius_control::config::SimulatorConfig;
//! use fortius_control::controller::calibration::{CalibrationState, CalibrationStateMachine};
//! use fortius_control::device::Device;
//! use fortius_control::device::simulated::SimulatedTrainer;
//!
//! let config = SimulatorConfig {
//!     cruise_speed_kmh: 20.0,
//!     acceleration_kmh_per_tick: 5.0,
//!     calibration_reading: 1100.0,
//! };
//! let mut trainer = SimulatedTrainer::new(&config, Duration::from_millis(100));
//! trainer.start();
//!
//! let mut calibration = CalibrationStateMachine::new(600);
//! calibration.begin(&mut trainer);
//! while calibration.state() != CalibrationState::Success {
//!     calibration.tick(&mut trainer)?;
//! }
//! assert_eq!(trainer.calibration_value(), Some(1100.0));
//! # Ok::<(), fortius_control::error::TrainerError>(())
//! ```

use tracing::{debug, info, warn};

use crate::device::{Device, DeviceMode};
use crate::error::{Result, TrainerError};

/// Ticks spent polling the reading in `Started` before it is committed.
pub const CALIBRATION_SETTLE_TICKS: u32 = 100;

/// Why a calibration ended without a committed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationFailure {
    /// The roller never spun up, or the reading never settled in time.
    Timeout,
    /// The session host abandoned the calibration.
    Cancelled,
}

/// Progress of a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Pending,
    Starting,
    Started,
    Success,
    Failed(CalibrationFailure),
}

impl CalibrationState {
    /// True for `Starting` and `Started`, where ticks do work.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, CalibrationState::Starting | CalibrationState::Started)
    }
}

/// Sequential zero-offset calibration driven one tick at a time.
///
/// All counters live on the machine and are cleared on every
/// [`begin`](Self::begin) and [`reset`](Self::reset), so nothing carries over
/// between calibrations.
#[derive(Debug)]
pub struct CalibrationStateMachine {
    state: CalibrationState,
    /// Ticks spent in `Started`.
    settle_ticks: u32,
    /// Ticks spent in `Starting` and `Started` combined.
    active_ticks: u32,
    timeout_ticks: u32,
    last_reading: f64,
}

impl CalibrationStateMachine {
    /// Creates an idle machine.
    ///
    /// # Arguments
    ///
    /// * `timeout_ticks` - Active ticks allowed before the calibration fails
    #[must_use]
    pub fn new(timeout_ticks: u32) -> Self {
        Self {
            state: CalibrationState::Idle,
            settle_ticks: 0,
            active_ticks: 0,
            timeout_ticks,
            last_reading: 0.0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Starts a calibration: puts the trainer in calibrate mode and waits for speed.
    pub fn begin<D: Device + ?Sized>(&mut self, device: &mut D) {
        self.settle_ticks = 0;
        self.active_ticks = 0;
        self.transition(CalibrationState::Pending);

        device.set_mode(DeviceMode::Calibrate);
        self.transition(CalibrationState::Starting);
    }

    /// Advances the calibration by one poll.
    ///
    /// Returns the state after the tick.
    ///
    /// # Errors
    ///
    /// Returns `CalibrationTimeout` on the tick that exhausts the timeout. The
    /// machine is then in `Failed(Timeout)` and later ticks return `Ok`.
    pub fn tick<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<CalibrationState> {
        match self.state {
            CalibrationState::Starting => {
                device.set_mode(DeviceMode::Calibrate);
                if device.telemetry().speed > 0.0 {
                    self.settle_ticks = 0;
                    self.transition(CalibrationState::Started);
                }
            }
            CalibrationState::Started => {
                self.last_reading = device.telemetry().resistance;
                self.settle_ticks += 1;
                if self.settle_ticks > CALIBRATION_SETTLE_TICKS {
                    self.transition(CalibrationState::Success);
                    device.set_mode(DeviceMode::Idle);
                    device.set_calibration_value(self.last_reading);
                    info!("Calibration value {:.1} committed", self.last_reading);
                    return Ok(self.state);
                }
            }
            _ => return Ok(self.state),
        }

        self.active_ticks += 1;
        if self.active_ticks >= self.timeout_ticks {
            warn!(
                "Calibration timed out in {:?} after {} ticks",
                self.state, self.active_ticks
            );
            self.transition(CalibrationState::Failed(CalibrationFailure::Timeout));
            device.set_mode(DeviceMode::Idle);
            return Err(TrainerError::CalibrationTimeout {
                ticks: self.active_ticks,
            });
        }

        Ok(self.state)
    }

    /// Abandons a running calibration and releases the brake.
    ///
    /// Has no effect unless the machine is `Starting` or `Started`.
    pub fn cancel<D: Device + ?Sized>(&mut self, device: &mut D) {
        if !self.state.is_active() {
            return;
        }
        self.transition(CalibrationState::Failed(CalibrationFailure::Cancelled));
        device.set_mode(DeviceMode::Idle);
    }

    /// Returns to `Idle` from any state and releases the brake.
    pub fn reset<D: Device + ?Sized>(&mut self, device: &mut D) {
        self.settle_ticks = 0;
        self.active_ticks = 0;
        self.transition(CalibrationState::Idle);
        device.set_mode(DeviceMode::Idle);
    }

    fn transition(&mut self, next: CalibrationState) {
        debug!("Calibration {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockDevice, TelemetrySample};
    use mockall::predicate::eq;

    fn sample(speed: f64, resistance: f64) -> TelemetrySample {
        TelemetrySample {
            speed,
            resistance,
            ..Default::default()
        }
    }

    /// Device that accepts any mode change and reports a fixed sample.
    fn permissive_device(speed: f64, resistance: f64) -> MockDevice {
        let mut device = MockDevice::new();
        device.expect_set_mode().return_const(());
        device
            .expect_telemetry()
            .returning(move || sample(speed, resistance));
        device.expect_set_calibration_value().return_const(());
        device
    }

    // ==================== Transition Tests ====================

    #[test]
    fn test_new_is_idle() {
        let machine = CalibrationStateMachine::new(600);
        assert_eq!(machine.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_begin_enters_starting_in_same_call() {
        let mut device = MockDevice::new();
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Calibrate))
            .times(1)
            .return_const(());

        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);
        assert_eq!(machine.state(), CalibrationState::Starting);
    }

    #[test]
    fn test_starting_waits_for_speed() {
        let mut device = permissive_device(0.0, 0.0);
        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);

        for _ in 0..10 {
            assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Starting);
        }
    }

    #[test]
    fn test_starting_reasserts_calibrate_mode() {
        let mut device = MockDevice::new();
        // begin + three ticks
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Calibrate))
            .times(4)
            .return_const(());
        device.expect_telemetry().returning(|| sample(0.0, 0.0));

        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);
        for _ in 0..3 {
            machine.tick(&mut device).unwrap();
        }
    }

    #[test]
    fn test_full_sequence_commits_once() {
        let mut device = MockDevice::new();
        let mut calls = 0;
        device.expect_telemetry().returning(move || {
            calls += 1;
            // Roller still on the first poll, spinning afterwards
            if calls == 1 {
                sample(0.0, 1250.0)
            } else {
                sample(20.0, 1250.0)
            }
        });
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Calibrate))
            .return_const(());
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Idle))
            .times(1)
            .return_const(());
        device
            .expect_set_calibration_value()
            .with(eq(1250.0))
            .times(1)
            .return_const(());

        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);

        assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Starting);
        assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Started);

        for _ in 0..CALIBRATION_SETTLE_TICKS {
            assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Started);
        }
        assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Success);

        // Terminal: further ticks do nothing
        for _ in 0..5 {
            assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Success);
        }
    }

    #[test]
    fn test_commits_last_reading() {
        let mut device = MockDevice::new();
        let mut reading = 1000.0;
        device.expect_telemetry().returning(move || {
            reading += 1.0;
            sample(15.0, reading)
        });
        device.expect_set_mode().return_const(());
        // One Starting poll and 101 Started polls
        device
            .expect_set_calibration_value()
            .with(eq(1102.0))
            .times(1)
            .return_const(());

        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);
        while machine.state() != CalibrationState::Success {
            machine.tick(&mut device).unwrap();
        }
    }

    #[test]
    fn test_idle_tick_touches_nothing() {
        let mut device = MockDevice::new();
        device.expect_telemetry().never();
        device.expect_set_mode().never();

        let mut machine = CalibrationStateMachine::new(600);
        assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Idle);
    }

    // ==================== Reset Tests ====================

    /// Machine driven into `target` on a device that accepts any call.
    fn machine_in(target: CalibrationState) -> (CalibrationStateMachine, MockDevice) {
        let speed = match target {
            CalibrationState::Failed(CalibrationFailure::Timeout) => 0.0,
            _ => 10.0,
        };
        let mut device = permissive_device(speed, 900.0);
        let mut machine = CalibrationStateMachine::new(CALIBRATION_SETTLE_TICKS + 2);
        if target == CalibrationState::Idle {
            return (machine, device);
        }

        machine.begin(&mut device);
        while machine.state() != target {
            if target == CalibrationState::Failed(CalibrationFailure::Cancelled) {
                machine.tick(&mut device).unwrap();
                machine.cancel(&mut device);
            } else {
                let _ = machine.tick(&mut device);
            }
        }
        (machine, device)
    }

    #[test]
    fn test_reset_from_every_state() {
        for state in [
            CalibrationState::Idle,
            CalibrationState::Starting,
            CalibrationState::Started,
            CalibrationState::Success,
            CalibrationState::Failed(CalibrationFailure::Timeout),
            CalibrationState::Failed(CalibrationFailure::Cancelled),
        ] {
            let (mut machine, mut device) = machine_in(state);
            assert_eq!(machine.state(), state);
            device.checkpoint();

            device
                .expect_set_mode()
                .with(eq(DeviceMode::Idle))
                .times(1)
                .return_const(());
            machine.reset(&mut device);
            assert_eq!(machine.state(), CalibrationState::Idle, "reset from {:?}", state);
        }
    }

    #[test]
    fn test_reset_after_timeout_allows_new_attempt() {
        let (mut machine, mut device) =
            machine_in(CalibrationState::Failed(CalibrationFailure::Timeout));
        machine.reset(&mut device);

        machine.begin(&mut device);
        assert_eq!(machine.state(), CalibrationState::Starting);
        // Counters were cleared, so the full timeout is available again
        for _ in 0..CALIBRATION_SETTLE_TICKS + 1 {
            assert!(machine.tick(&mut device).is_ok());
        }
        assert!(machine.tick(&mut device).is_err());
    }

    #[test]
    fn test_reset_when_idle_still_releases_brake() {
        let mut device = MockDevice::new();
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Idle))
            .times(1)
            .return_const(());

        let mut machine = CalibrationStateMachine::new(600);
        machine.reset(&mut device);
        assert_eq!(machine.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_settle_counter_does_not_survive_reset() {
        let mut device = permissive_device(10.0, 900.0);
        let mut machine = CalibrationStateMachine::new(600);

        machine.begin(&mut device);
        machine.tick(&mut device).unwrap(); // Started
        for _ in 0..50 {
            machine.tick(&mut device).unwrap();
        }
        machine.reset(&mut device);

        machine.begin(&mut device);
        machine.tick(&mut device).unwrap(); // Started
        for _ in 0..CALIBRATION_SETTLE_TICKS {
            assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Started);
        }
        assert_eq!(machine.tick(&mut device).unwrap(), CalibrationState::Success);
    }

    // ==================== Timeout and Cancel Tests ====================

    #[test]
    fn test_timeout_when_roller_never_spins() {
        let mut device = permissive_device(0.0, 0.0);
        let mut machine = CalibrationStateMachine::new(120);
        machine.begin(&mut device);

        for _ in 0..119 {
            assert!(machine.tick(&mut device).is_ok());
        }
        match machine.tick(&mut device) {
            Err(TrainerError::CalibrationTimeout { ticks }) => assert_eq!(ticks, 120),
            other => panic!("Expected CalibrationTimeout, got: {:?}", other),
        }
        assert_eq!(
            machine.state(),
            CalibrationState::Failed(CalibrationFailure::Timeout)
        );

        // Reported once only
        assert!(machine.tick(&mut device).is_ok());
    }

    #[test]
    fn test_timeout_releases_brake() {
        let mut device = MockDevice::new();
        device.expect_telemetry().returning(|| sample(0.0, 0.0));
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Calibrate))
            .return_const(());
        device
            .expect_set_mode()
            .with(eq(DeviceMode::Idle))
            .times(1)
            .return_const(());
        device.expect_set_calibration_value().never();

        let mut machine = CalibrationStateMachine::new(5);
        machine.begin(&mut device);
        while machine.state().is_active() {
            let _ = machine.tick(&mut device);
        }
    }

    #[test]
    fn test_cancel_while_started() {
        let mut device = permissive_device(10.0, 900.0);
        let mut machine = CalibrationStateMachine::new(600);
        machine.begin(&mut device);
        machine.tick(&mut device).unwrap();
        assert_eq!(machine.state(), CalibrationState::Started);

        machine.cancel(&mut device);
        assert_eq!(
            machine.state(),
            CalibrationState::Failed(CalibrationFailure::Cancelled)
        );
    }

    #[test]
    fn test_cancel_outside_calibration_is_noop() {
        let mut device = MockDevice::new();
        device.expect_set_mode().never();

        let mut machine = CalibrationStateMachine::new(600);
        machine.cancel(&mut device);
        assert_eq!(machine.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_is_active() {
        assert!(!CalibrationState::Idle.is_active());
        assert!(!CalibrationState::Pending.is_active());
        assert!(CalibrationState::Starting.is_active());
        assert!(CalibrationState::Started.is_active());
        assert!(!CalibrationState::Success.is_active());
        assert!(!CalibrationState::Failed(CalibrationFailure::Timeout).is_active());
    }
}
