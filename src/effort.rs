use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// An amount of work effort with minute resolution.
///
/// Effort never goes negative: subtraction saturates at zero and scaling by a
/// negative or non-finite factor yields [`EffortDuration::ZERO`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EffortDuration {
    minutes: u32,
}

impl EffortDuration {
    pub const ZERO: Self = Self { minutes: 0 };

    pub const fn minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    /// Whole hours, saturating at the largest representable effort.
    pub const fn hours(hours: u32) -> Self {
        Self {
            minutes: hours.saturating_mul(60),
        }
    }

    /// Whole hours, or `None` when they do not fit in minutes.
    pub const fn checked_hours(hours: u32) -> Option<Self> {
        match hours.checked_mul(60) {
            Some(minutes) => Some(Self { minutes }),
            None => None,
        }
    }

    /// Converts fractional hours, rounding to the nearest minute. Returns
    /// `None` for negative or non-finite input.
    pub fn from_hours_f64(hours: f64) -> Option<Self> {
        if !hours.is_finite() || hours < 0.0 {
            return None;
        }
        let minutes = (hours * 60.0).round();
        if minutes > u32::MAX as f64 {
            return None;
        }
        Some(Self {
            minutes: minutes as u32,
        })
    }

    pub fn as_minutes(self) -> u32 {
        self.minutes
    }

    pub fn as_hours_f64(self) -> f64 {
        self.minutes as f64 / 60.0
    }

    /// Whole hours, truncating any remaining minutes.
    pub fn whole_hours(self) -> u32 {
        self.minutes / 60
    }

    pub fn is_zero(self) -> bool {
        self.minutes == 0
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            minutes: self.minutes.saturating_sub(other.minutes),
        }
    }

    /// Multiplies by `factor`, flooring to whole minutes.
    pub fn scale(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return Self::ZERO;
        }
        let scaled = (self.minutes as f64 * factor).floor();
        Self {
            minutes: scaled.min(u32::MAX as f64) as u32,
        }
    }
}

impl Add for EffortDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            minutes: self.minutes.saturating_add(rhs.minutes),
        }
    }
}

impl AddAssign for EffortDuration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for EffortDuration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a EffortDuration> for EffortDuration {
    fn sum<I: Iterator<Item = &'a EffortDuration>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for EffortDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_hours_round_to_minutes() {
        assert_eq!(
            EffortDuration::from_hours_f64(7.5),
            Some(EffortDuration::minutes(450))
        );
        assert_eq!(EffortDuration::from_hours_f64(-1.0), None);
        assert_eq!(EffortDuration::from_hours_f64(f64::NAN), None);
    }

    #[test]
    fn subtraction_saturates_and_scale_floors() {
        let eight = EffortDuration::hours(8);
        assert_eq!(
            EffortDuration::hours(2).saturating_sub(eight),
            EffortDuration::ZERO
        );
        assert_eq!(eight.scale(0.5), EffortDuration::hours(4));
        assert_eq!(EffortDuration::minutes(5).scale(0.5), EffortDuration::minutes(2));
        assert_eq!(eight.scale(-2.0), EffortDuration::ZERO);
    }

    #[test]
    fn hours_beyond_minute_range_do_not_overflow() {
        assert_eq!(EffortDuration::checked_hours(80_000_000), None);
        assert_eq!(
            EffortDuration::checked_hours(3),
            Some(EffortDuration::minutes(180))
        );
        assert_eq!(
            EffortDuration::hours(u32::MAX),
            EffortDuration::minutes(u32::MAX)
        );
    }

    #[test]
    fn display_uses_hours_and_minutes() {
        assert_eq!(EffortDuration::minutes(485).to_string(), "8:05");
    }
}
