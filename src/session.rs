//! # Session Module
//!
//! The session host owns the ride: laps, stopping, and load adjustment.
//!
//! The controller reports into it through [`SessionHost`]. Every callback is
//! fire-and-forget and must return without blocking on I/O.

use std::collections::VecDeque;

use tracing::{error, info, warn};

/// How prominently a notification should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Why the session is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Rider asked to stop.
    Normal,
    /// The session cannot continue.
    Error,
}

impl StopReason {
    /// Exit code reported to the surrounding application.
    ///
    /// # Examples
    ///
    /// ```
    /// use fortius_control::session::StopReason;
    ///
    /// assert_eq!(StopReason::Normal.code(), 0);
    /// assert_eq!(StopReason::Error.code(), 1);
    /// ```
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            StopReason::Normal => 0,
            StopReason::Error => 1,
        }
    }
}

/// Callbacks the controller invokes on the surrounding session.
#[cfg_attr(test, mockall::automock)]
pub trait SessionHost {
    /// Shows a message to the rider.
    fn notify(&mut self, message: &str, severity: Severity);

    /// Ends the session.
    fn stop(&mut self, reason: StopReason);

    /// Raises load (ergo) or gradient (slope) by one step.
    fn higher(&mut self);

    /// Lowers load (ergo) or gradient (slope) by one step.
    fn lower(&mut self);

    /// Starts a new lap or interval.
    fn new_lap(&mut self);

    /// True while a calibration is running; buttons are ignored then.
    fn is_calibrating(&self) -> bool;
}

/// Requests queued by [`ConsoleHost`] for the polling loop to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Higher,
    Lower,
    NewLap,
    Stop(StopReason),
}

/// Session host for the command line: logs notifications and queues actions.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    calibrating: bool,
    laps: u32,
    actions: VecDeque<HostAction>,
    stop_reason: Option<StopReason>,
}

impl ConsoleHost {
    /// Creates a host with no pending actions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks calibration as running or finished.
    pub fn set_calibrating(&mut self, calibrating: bool) {
        self.calibrating = calibrating;
    }

    /// Completed lap markers so far.
    #[must_use]
    pub fn laps(&self) -> u32 {
        self.laps
    }

    /// Reason for the first stop request, if one was made.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Takes all actions queued since the last drain, oldest first.
    pub fn drain_actions(&mut self) -> Vec<HostAction> {
        self.actions.drain(..).collect()
    }
}

impl SessionHost for ConsoleHost {
    fn notify(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }
    }

    fn stop(&mut self, reason: StopReason) {
        info!("Stop requested (code {})", reason.code());
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
        self.actions.push_back(HostAction::Stop(reason));
    }

    fn higher(&mut self) {
        self.actions.push_back(HostAction::Higher);
    }

    fn lower(&mut self) {
        self.actions.push_back(HostAction::Lower);
    }

    fn new_lap(&mut self) {
        self.laps += 1;
        info!("Lap {}", self.laps);
        self.actions.push_back(HostAction::NewLap);
    }

    fn is_calibrating(&self) -> bool {
        self.calibrating
    }
}
