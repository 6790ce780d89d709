//! Simulation time.
//!
//! Time is a monotonic microsecond tick count from the start of the run.
//! Slot durations and timeouts are configured in seconds and converted once
//! at load time, so the event loop only ever compares integer ticks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A point in simulated time, in microseconds since the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero, the start of the simulation.
    pub const ZERO: SimTime = SimTime(0);

    /// Create from a raw microsecond count.
    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros)
    }

    /// Create from seconds, rounding to the nearest microsecond.
    pub fn from_secs(secs: f64) -> Self {
        SimTime((secs * 1_000_000.0).round() as u64)
    }

    /// Microseconds since the start of the run.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Seconds since the start of the run.
    pub fn as_secs(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Saturating difference between two times.
    pub fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_round_trip() {
        let t = SimTime::from_secs(1.5);
        assert_eq!(t.as_micros(), 1_500_000);
        assert!((t.as_secs() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn ordering_and_arithmetic() {
        let a = SimTime::from_micros(100);
        let b = SimTime::from_micros(250);
        assert!(a < b);
        assert_eq!(b - a, SimTime::from_micros(150));
        assert_eq!(a + SimTime::from_micros(150), b);
        assert_eq!(a.saturating_sub(b), SimTime::ZERO);
    }
}
