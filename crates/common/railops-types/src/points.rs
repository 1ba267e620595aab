use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Assessment points held as signed tenths of a point.
///
/// Scored values are fixed to one decimal place everywhere they persist, so
/// the canonical representation is an integer count of tenths. Conversions
/// from `f64` round half away from zero and happen exactly once, at the
/// boundary where a value enters the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Points(i64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub fn from_tenths(tenths: i64) -> Self {
        Points(tenths)
    }

    pub fn from_f64(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() || value.abs() > 1_000_000.0 {
            return Err(DomainError::PointsOutOfRange(value));
        }
        Ok(Points(round_half_away(value * 10.0)))
    }

    pub fn tenths(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiply by `num/den` with a single half-away-from-zero rounding back
    /// to tenths. Exact integer arithmetic throughout.
    pub fn mul_ratio(&self, num: i64, den: i64) -> Points {
        debug_assert!(den > 0);
        let scaled = self.0 * num;
        let quotient = scaled / den;
        let remainder = scaled % den;
        let adjust = if remainder.abs() * 2 >= den {
            scaled.signum()
        } else {
            0
        };
        Points(quotient + adjust)
    }
}

fn round_half_away(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}

impl TryFrom<f64> for Points {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Points::from_f64(value)
    }
}

impl From<Points> for f64 {
    fn from(points: Points) -> Self {
        points.as_f64()
    }
}

impl Add for Points {
    type Output = Points;

    fn add(self, rhs: Points) -> Points {
        Points(self.0 + rhs.0)
    }
}

impl AddAssign for Points {
    fn add_assign(&mut self, rhs: Points) {
        self.0 += rhs.0;
    }
}

impl Neg for Points {
    type Output = Points;

    fn neg(self) -> Points {
        Points(-self.0)
    }
}

impl Sum for Points {
    fn sum<I: Iterator<Item = Points>>(iter: I) -> Points {
        iter.fold(Points::ZERO, Add::add)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{}", sign, abs / 10, abs % 10)
    }
}

/// Category-cumulative multiplier `1 + 0.5 × (rank − 1)`, held in halves so
/// the product with [`Points`] stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CumulativeMultiplier {
    halves: i64,
}

impl CumulativeMultiplier {
    pub const IDENTITY: CumulativeMultiplier = CumulativeMultiplier { halves: 2 };

    /// Multiplier for the record at 1-based `rank` within its
    /// `(employee, category, year)` group.
    pub fn for_rank(rank: u32) -> Self {
        debug_assert!(rank >= 1);
        CumulativeMultiplier {
            halves: 2 + (rank as i64 - 1),
        }
    }

    pub fn halves(&self) -> i64 {
        self.halves
    }

    pub fn as_f64(&self) -> f64 {
        self.halves as f64 / 2.0
    }

    pub fn apply(&self, points: Points) -> Points {
        points.mul_ratio(self.halves, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Points::from_f64(0.05).unwrap().tenths(), 1);
        assert_eq!(Points::from_f64(-0.05).unwrap().tenths(), -1);
        assert_eq!(Points::from_f64(2.04).unwrap().tenths(), 20);
        assert_eq!(Points::from_f64(-2.04).unwrap().tenths(), -20);
        assert!(Points::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn mul_ratio_rounds_half_away() {
        // -3 × 0.7 = -2.1 exactly
        assert_eq!(Points::from_tenths(-30).mul_ratio(7, 10).tenths(), -21);
        // -0.5 × 0.3 = -0.15 → -0.2
        assert_eq!(Points::from_tenths(-5).mul_ratio(3, 10).tenths(), -2);
        // 0.5 × 0.3 = 0.15 → 0.2
        assert_eq!(Points::from_tenths(5).mul_ratio(3, 10).tenths(), 2);
    }

    #[test]
    fn multiplier_sequence_matches_rank() {
        let base = Points::from_tenths(-20);
        let seq: Vec<f64> = (1..=3)
            .map(|rank| CumulativeMultiplier::for_rank(rank).apply(base).as_f64())
            .collect();
        assert_eq!(seq, vec![-2.0, -3.0, -4.0]);
    }

    #[test]
    fn displays_one_decimal() {
        assert_eq!(Points::from_tenths(-21).to_string(), "-2.1");
        assert_eq!(Points::from_tenths(5).to_string(), "0.5");
        assert_eq!(Points::from_tenths(30).to_string(), "3.0");
    }
}
