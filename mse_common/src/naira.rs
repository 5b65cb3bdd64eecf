use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const NAIRA_CURRENCY_CODE: &str = "NGN";
pub const KOBO_PER_NAIRA: i64 = 100;

//--------------------------------------       Naira         ---------------------------------------------------------
/// An amount of money, stored as an integer number of kobo (1/100 NGN).
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Naira(i64);

op!(binary Naira, Add, add);
op!(binary Naira, Sub, sub);
op!(inplace Naira, SubAssign, sub_assign, sub);
op!(inplace Naira, AddAssign, add_assign, add);
op!(unary Naira, Neg, neg);

impl Mul<i64> for Naira {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Naira {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in kobo: {0}")]
pub struct NairaConversionError(String);

impl From<i64> for Naira {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Naira {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Naira {}

impl TryFrom<u64> for Naira {
    type Error = NairaConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(NairaConversionError(format!("Value {} is too large to convert to Naira", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl FromStr for Naira {
    type Err = NairaConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self::from_kobo).map_err(|e| NairaConversionError(format!("{s}: {e}")))
    }
}

impl Display for Naira {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let naira = self.0 / KOBO_PER_NAIRA;
        let kobo = (self.0 % KOBO_PER_NAIRA).abs();
        write!(f, "₦{naira}.{kobo:02}")
    }
}

impl Naira {
    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_naira(naira: i64) -> Self {
        Self(naira * KOBO_PER_NAIRA)
    }

    pub const fn from_kobo(kobo: i64) -> Self {
        Self(kobo)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero. Returns the result and the amount that could not be subtracted.
    pub fn saturating_sub(&self, rhs: Naira) -> (Naira, Naira) {
        if rhs.0 > self.0 {
            (Naira(0), Naira(rhs.0 - self.0))
        } else {
            (Naira(self.0 - rhs.0), Naira(0))
        }
    }

    /// Applies a fractional rate (e.g. 0.15 for 15%) to this amount, rounding to the nearest kobo.
    pub fn apply_rate(&self, rate: f64) -> Naira {
        #[allow(clippy::cast_possible_truncation)]
        Naira((self.0 as f64 * rate).round() as i64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Naira::from_naira(100);
        let b = Naira::from_kobo(2_550);
        assert_eq!(a + b, Naira::from_kobo(12_550));
        assert_eq!(a - b, Naira::from_kobo(7_450));
        assert_eq!(-b, Naira::from_kobo(-2_550));
        let mut c = a;
        c -= b;
        assert_eq!(c, Naira::from_kobo(7_450));
        assert_eq!(b * 4, Naira::from_naira(102));
        let total: Naira = [a, b, b].into_iter().sum();
        assert_eq!(total, Naira::from_kobo(15_100));
    }

    #[test]
    fn saturating_sub_clamps() {
        let (rem, short) = Naira::from_naira(10).saturating_sub(Naira::from_naira(4));
        assert_eq!(rem, Naira::from_naira(6));
        assert!(short.is_zero());
        let (rem, short) = Naira::from_naira(4).saturating_sub(Naira::from_naira(10));
        assert!(rem.is_zero());
        assert_eq!(short, Naira::from_naira(6));
    }

    #[test]
    fn rates_round_to_nearest_kobo() {
        assert_eq!(Naira::from_kobo(1_000).apply_rate(0.15), Naira::from_kobo(150));
        assert_eq!(Naira::from_kobo(333).apply_rate(0.1), Naira::from_kobo(33));
        assert_eq!(Naira::from_kobo(335).apply_rate(0.1), Naira::from_kobo(34));
    }

    #[test]
    fn display_shows_naira_and_kobo() {
        assert_eq!(Naira::from_kobo(12_550).to_string(), "₦125.50");
        assert_eq!(Naira::from_naira(7).to_string(), "₦7.00");
    }
}
