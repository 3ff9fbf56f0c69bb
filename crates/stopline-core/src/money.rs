//! Exact decimal money type.
//!
//! Every price, quantity and balance in the system is a [`Money`]: a thin
//! wrapper over [`rust_decimal::Decimal`] that
//!
//! - can be built from strings and integers, but never from `f32`/`f64`
//!   (there is no `From<f64>`, and deserialization rejects JSON floats);
//! - exposes `+`, `-`, `*` as operators, while division is only available as
//!   [`Money::div`], which requires an explicit [`RoundingMode`] and fails with
//!   [`MoneyError::NotANumber`] instead of yielding an infinite value;
//! - rounds to exchange grids via [`Money::round_down_to_step`] and
//!   [`Money::round_to_step`].
//!
//! ```compile_fail
//! // Floats do not convert into money.
//! let _ = stopline_core::Money::from(0.1_f64);
//! ```

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MoneyError;

/// Number of decimal places kept by [`Money::div`] before the caller's
/// rounding mode is applied.
pub const DIV_SCALE: u32 = 18;

/// Rounding mode for division, grid rounding and fixed-point formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    /// Toward zero (truncate). Exchange quantities always round this way.
    Down,
    /// Away from zero.
    Up,
    /// Toward negative infinity.
    Floor,
    /// Toward positive infinity.
    Ceiling,
    /// Nearest, ties away from zero.
    HalfUp,
    /// Nearest, ties to even (banker's rounding).
    HalfEven,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Self::Down => RoundingStrategy::ToZero,
            Self::Up => RoundingStrategy::AwayFromZero,
            Self::Floor => RoundingStrategy::ToNegativeInfinity,
            Self::Ceiling => RoundingStrategy::ToPositiveInfinity,
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Arbitrary-precision decimal amount (price, quantity, balance, percentage).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);
    pub const HUNDRED: Money = Money(Decimal::ONE_HUNDRED);

    /// Build from an integer mantissa and a decimal scale (`new(125, 2)` is `1.25`).
    pub fn new(mantissa: i64, scale: u32) -> Result<Self, MoneyError> {
        Decimal::try_new(mantissa, scale)
            .map(Self)
            .map_err(|e| MoneyError::Parse { input: format!("{mantissa}e-{scale}"), reason: e.to_string() })
    }

    /// Wrap an existing decimal.
    pub const fn from_decimal(value: Decimal) -> Self {
        Self(value)
    }

    /// The underlying decimal.
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Strictly less than zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {self} + {rhs}")))
    }

    /// Sum of `values`, failing on overflow instead of panicking.
    pub fn checked_sum(values: impl IntoIterator<Item = Money>) -> Result<Money, MoneyError> {
        values.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    pub fn checked_sub(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {self} - {rhs}")))
    }

    pub fn checked_mul(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_mul(rhs.0)
            .map(Self)
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {self} * {rhs}")))
    }

    /// Divide, keeping [`DIV_SCALE`] decimal places rounded with `mode`.
    ///
    /// Division by zero and overflow fail with [`MoneyError::NotANumber`].
    pub fn div(self, rhs: Money, mode: RoundingMode) -> Result<Money, MoneyError> {
        if rhs.is_zero() {
            return Err(MoneyError::NotANumber(format!("division by zero: {self} / 0")));
        }
        let quotient = self
            .0
            .checked_div(rhs.0)
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {self} / {rhs}")))?;
        Ok(Self(quotient.round_dp_with_strategy(DIV_SCALE, mode.strategy()).normalize()))
    }

    /// `self × pct / 100`.
    pub fn percent(self, pct: Money) -> Result<Money, MoneyError> {
        self.checked_mul(pct)?.div(Self::HUNDRED, RoundingMode::HalfEven)
    }

    /// `self × (100 + pct) / 100`: the value moved up by `pct` percent.
    pub fn increase_by_percent(self, pct: Money) -> Result<Money, MoneyError> {
        self.checked_mul(Self::HUNDRED.checked_add(pct)?)?.div(Self::HUNDRED, RoundingMode::HalfEven)
    }

    /// `self × (100 - pct) / 100`: the value moved down by `pct` percent.
    pub fn decrease_by_percent(self, pct: Money) -> Result<Money, MoneyError> {
        self.checked_mul(Self::HUNDRED.checked_sub(pct)?)?.div(Self::HUNDRED, RoundingMode::HalfEven)
    }

    /// Round to `dp` decimal places.
    pub fn round_dp(self, dp: u32, mode: RoundingMode) -> Money {
        Self(self.0.round_dp_with_strategy(dp, mode.strategy()))
    }

    /// Largest multiple of `step` not greater in magnitude than `self`.
    ///
    /// A zero step leaves the value untouched.
    pub fn round_down_to_step(self, step: Money) -> Result<Money, MoneyError> {
        self.round_to_step(step, RoundingMode::Down)
    }

    /// Round to a multiple of `step` using `mode`. A zero step leaves the value untouched.
    pub fn round_to_step(self, step: Money, mode: RoundingMode) -> Result<Money, MoneyError> {
        if step.is_zero() {
            return Ok(self);
        }
        let units = self
            .0
            .checked_div(step.0)
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {self} / {step}")))?
            .round_dp_with_strategy(0, mode.strategy());
        units
            .checked_mul(step.0)
            .map(|v| Self(v.normalize()))
            .ok_or_else(|| MoneyError::NotANumber(format!("overflow in {units} * {step}")))
    }

    /// `true` when `self` is an exact multiple of `step` (always true for a zero step).
    pub fn is_multiple_of(&self, step: Money) -> bool {
        if step.is_zero() {
            return true;
        }
        self.0.checked_rem(step.0).is_some_and(|r| r.is_zero())
    }

    /// Fixed-point rendering with exactly `dp` decimal places.
    pub fn to_fixed(&self, dp: u32, mode: RoundingMode) -> String {
        let mut rounded = self.0.round_dp_with_strategy(dp, mode.strategy());
        rounded.rescale(dp);
        rounded.to_string()
    }

    /// Smallest value of a sequence, `None` when empty.
    pub fn min_of<I: IntoIterator<Item = Money>>(values: I) -> Option<Money> {
        values.into_iter().min()
    }

    /// Largest value of a sequence, `None` when empty.
    pub fn max_of<I: IntoIterator<Item = Money>>(values: I) -> Option<Money> {
        values.into_iter().max()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

macro_rules! money_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Money {
            fn from(value: $t) -> Self {
                Self(Decimal::from(value))
            }
        })*
    };
}

money_from_int!(i32, i64, u32, u64);

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str_exact(trimmed)
            .map(Self)
            .map_err(|e| MoneyError::Parse { input: s.to_string(), reason: e.to_string() })
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Money;

    fn mul(self, rhs: Money) -> Money {
        Self(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Self(-self.0)
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Serde: strings out, strings or integers in, floats rejected
// ---------------------------------------------------------------------------

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct MoneyVisitor;

impl Visitor<'_> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        Ok(Money::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        Ok(Money::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Err(E::custom(MoneyError::FloatRejected(v.to_string())))
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn decimal_addition_is_exact() {
        assert_eq!(m("0.1") + m("0.2"), m("0.3"));
        assert_eq!(m("1.10") - m("0.1"), m("1"));
    }

    #[test]
    fn stop_price_from_percentage_is_exact() {
        let stop = m("100").decrease_by_percent(m("15")).unwrap();
        assert_eq!(stop, m("85"));
        assert_eq!(stop.to_string(), "85");
    }

    #[test]
    fn checked_sum_reports_overflow() {
        assert_eq!(Money::checked_sum([m("0.1"), m("0.2"), m("0.3")]).unwrap(), m("0.6"));
        let max = m("79228162514264337593543950335");
        assert!(matches!(Money::checked_sum([max, Money::ONE]), Err(MoneyError::NotANumber(_))));
    }

    #[test]
    fn division_by_zero_is_not_a_number() {
        let err = m("1").div(Money::ZERO, RoundingMode::HalfEven).unwrap_err();
        assert!(matches!(err, MoneyError::NotANumber(_)));
    }

    #[test]
    fn division_applies_rounding_mode() {
        let down = m("2").div(m("3"), RoundingMode::Down).unwrap();
        let up = m("2").div(m("3"), RoundingMode::HalfUp).unwrap();
        assert_eq!(down.to_string(), "0.666666666666666666");
        assert_eq!(up.to_string(), "0.666666666666666667");
    }

    #[test]
    fn to_fixed_pads_and_rounds() {
        assert_eq!(m("1.5").to_fixed(3, RoundingMode::HalfUp), "1.500");
        assert_eq!(m("1.23456").to_fixed(2, RoundingMode::Down), "1.23");
        assert_eq!(m("2.345").to_fixed(2, RoundingMode::HalfEven), "2.34");
    }

    #[test]
    fn grid_rounding() {
        assert_eq!(m("1.23456").round_down_to_step(m("0.001")).unwrap(), m("1.234"));
        assert_eq!(m("1.2").round_down_to_step(Money::ZERO).unwrap(), m("1.2"));
        assert_eq!(m("10.26").round_to_step(m("0.05"), RoundingMode::HalfUp).unwrap(), m("10.25"));
        assert_eq!(m("10.275").round_to_step(m("0.05"), RoundingMode::HalfUp).unwrap(), m("10.3"));
        assert!(m("1.234").is_multiple_of(m("0.001")));
        assert!(!m("1.2345").is_multiple_of(m("0.001")));
    }

    #[test]
    fn sequence_helpers() {
        let values = vec![m("3"), m("1.5"), m("2")];
        assert_eq!(Money::min_of(values.clone()), Some(m("1.5")));
        assert_eq!(Money::max_of(values.clone()), Some(m("3")));
        assert_eq!(Money::checked_sum(values.iter().copied()).unwrap(), m("6.5"));
        assert_eq!(Money::min_of(Vec::new()), None);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("abc".parse::<Money>().is_err());
        assert!("NaN".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
    }

    #[test]
    fn serde_accepts_strings_and_integers_only() {
        let from_str: Money = serde_json::from_str("\"0.00012\"").unwrap();
        assert_eq!(from_str, m("0.00012"));
        let from_int: Money = serde_json::from_str("42").unwrap();
        assert_eq!(from_int, m("42"));

        let err = serde_json::from_str::<Money>("0.1").unwrap_err();
        assert!(err.to_string().contains("float value 0.1 rejected"));

        assert_eq!(serde_json::to_string(&m("1.500")).unwrap(), "\"1.5\"");
    }

    #[test]
    fn checked_ops_surface_overflow() {
        let huge = Money::from_decimal(Decimal::MAX);
        assert!(matches!(huge.checked_add(huge), Err(MoneyError::NotANumber(_))));
        assert!(matches!(huge.checked_mul(m("2")), Err(MoneyError::NotANumber(_))));
    }
}
