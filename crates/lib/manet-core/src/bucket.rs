use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;

/// Simulated time in milliseconds. The engine clock and every configured instant use it.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct TimeMS(pub u64);

impl Display for TimeMS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TimeMS {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse::<u64>()?;
        Ok(Self(id))
    }
}

impl From<u64> for TimeMS {
    fn from(f: u64) -> Self {
        Self(f)
    }
}

impl From<i32> for TimeMS {
    fn from(f: i32) -> Self {
        Self(f.max(0) as u64)
    }
}

impl TimeMS {
    pub const SECOND: TimeMS = TimeMS(1000);

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Converts seconds into milliseconds, rounding to the closest millisecond.
    pub fn from_secs_f64(seconds: f64) -> Self {
        Self((seconds * 1000.0).round().max(0.0) as u64)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn is_multiple_of(&self, step: TimeMS) -> bool {
        step.0 != 0 && self.0 % step.0 == 0
    }
}

impl Mul for TimeMS {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0 * rhs.0)
    }
}

impl Div for TimeMS {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Self(self.0 / rhs.0)
    }
}

impl Add for TimeMS {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeMS {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for TimeMS {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// The shared medium handed to every application at each step. Anything common to all
/// nodes (positions, channel, routing, monitors, output writers) belongs to the type that
/// implements this trait.
///
/// The scheduler calls the hooks in this order at every step:
/// `before_apps`, stage one of all apps, `after_stage_one`, stage two of all apps (reverse
/// order), `after_apps`.
pub trait Bucket: Send {
    fn initialize(&mut self, step: TimeMS);
    fn before_apps(&mut self, step: TimeMS);
    fn after_stage_one(&mut self) {}
    fn after_apps(&mut self);
    /// Flushes and closes everything the bucket owns. Called exactly once when the
    /// engine stops. A fault recorded during the run is returned here.
    fn terminate(&mut self) -> Result<(), ExperimentError>;
}

#[cfg(test)]
mod tests {
    use super::TimeMS;

    #[test]
    fn seconds_round_to_nearest_millisecond() {
        assert_eq!(TimeMS::from_secs_f64(19.0), TimeMS::from(19000u64));
        assert_eq!(TimeMS::from_secs_f64(0.0104), TimeMS::from(10u64));
        assert_eq!(TimeMS::from(150000u64).as_secs_f64(), 150.0);
    }

    #[test]
    fn subtraction_saturates_at_zero() {
        let early = TimeMS::from(500u64);
        assert_eq!(early - TimeMS::SECOND, TimeMS::default());
        assert!(TimeMS::from(2000u64).is_multiple_of(TimeMS::from(10u64)));
        assert!(!TimeMS::from(2005u64).is_multiple_of(TimeMS::from(10u64)));
    }
}
