//! Simulation time.
//!
//! Time is a floating-point count of milliseconds, matching what the
//! engine reports. The clock starts at zero and only moves forward.

use crate::error::ReplayError;

/// Simulation time in milliseconds.
pub type SimTime = f64;

/// Monotonic simulation clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimClock {
    now: SimTime,
}

impl SimClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self { now: 0.0 }
    }

    /// Returns the current time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Moves the clock to `time`.
    ///
    /// Fails without moving if `time` lies before the current time or is
    /// not a number.
    pub fn advance_to(&mut self, time: SimTime) -> Result<(), ReplayError> {
        if time.is_nan() || time < self.now {
            return Err(ReplayError::ClockRegression {
                now: self.now,
                due: time,
            });
        }
        self.now = time;
        Ok(())
    }
}
