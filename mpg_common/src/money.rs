use std::{
    borrow::Cow,
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode,
    Encode,
    Sqlite,
    Type,
};
use thiserror::Error;

use crate::currency::Currency;

//--------------------------------------       Money       -----------------------------------------------------------
/// An exact monetary amount.
///
/// `Money` wraps an arbitrary-precision decimal. It carries no currency tag itself; currency lives alongside the
/// amount in requests and database rows, and cross-currency arithmetic is rejected at the API boundary where both
/// operands' currencies are known. Intermediate results keep full precision; rounding to a currency's display scale
/// only happens via [`Money::round_display`].
///
/// Amounts are stored as TEXT in SQLite so that no precision is lost on the round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl Money {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Rounds to the currency's display scale using banker's rounding. Internal arithmetic never calls this; it is
    /// for display and outbound reporting boundaries only.
    pub fn round_display(&self, currency: Currency) -> Self {
        Self(self.0.round_dp_with_strategy(currency.scale(), rust_decimal::RoundingStrategy::MidpointNearestEven))
    }

    /// Clamps the amount into `[min, max]`, where either bound may be absent.
    pub fn clamp_to(&self, min: Option<Money>, max: Option<Money>) -> Self {
        let mut v = *self;
        if let Some(lo) = min {
            if v < lo {
                v = lo;
            }
        }
        if let Some(hi) = max {
            if v > hi {
                v = hi;
            }
        }
        v
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Self).map_err(|e| MoneyConversionError(format!("{s}: {e}")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Type<Sqlite> for Money {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <&str as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Money {
    fn encode_by_ref(&self, args: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        args.push(SqliteArgumentValue::Text(Cow::Owned(self.0.to_string())));
        IsNull::No
    }
}

impl<'r> Decode<'r, Sqlite> for Money {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<Sqlite>>::decode(value)?;
        let value = Decimal::from_str(s)?;
        Ok(Money(value))
    }
}

//--------------------------------------        Rate       -----------------------------------------------------------
/// A percentage rate in percent units, i.e. `Rate::from(dec!(1.5))` is 1.5%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    pub fn new(percent: Decimal) -> Self {
        Self(percent)
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Applies the rate to an amount: `amount × rate / 100`, keeping full precision.
    pub fn apply(&self, amount: Money) -> Money {
        Money::new(amount.value() * self.0 / Decimal::ONE_HUNDRED)
    }
}

impl From<Decimal> for Rate {
    fn from(percent: Decimal) -> Self {
        Self(percent)
    }
}

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Type<Sqlite> for Rate {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <&str as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Rate {
    fn encode_by_ref(&self, args: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        args.push(SqliteArgumentValue::Text(Cow::Owned(self.0.to_string())));
        IsNull::No
    }
}

impl<'r> Decode<'r, Sqlite> for Rate {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<Sqlite>>::decode(value)?;
        let value = Decimal::from_str(s)?;
        Ok(Rate(value))
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn money_arithmetic_is_exact() {
        let a = Money::new(dec!(0.1));
        let b = Money::new(dec!(0.2));
        assert_eq!(a + b, Money::new(dec!(0.3)));
        assert_eq!(a - b, Money::new(dec!(-0.1)));
        assert_eq!(-(a - b), Money::new(dec!(0.1)));
    }

    #[test]
    fn money_round_trips_through_strings() {
        let m = Money::new(dec!(985.000000000000000001));
        let s = m.to_string();
        assert_eq!(s.parse::<Money>().unwrap(), m);
    }

    #[test]
    fn rate_applies_in_percent_units() {
        let rate = Rate::new(dec!(1.5));
        assert_eq!(rate.apply(Money::new(dec!(1000.00))), Money::new(dec!(15)));
        let rate = Rate::new(dec!(5));
        assert_eq!(rate.apply(Money::new(dec!(10))), Money::new(dec!(0.5)));
    }

    #[test]
    fn clamping_respects_partial_bounds() {
        let fee = Money::new(dec!(0.50));
        assert_eq!(fee.clamp_to(Some(Money::new(dec!(1))), Some(Money::new(dec!(10)))), Money::new(dec!(1)));
        let fee = Money::new(dec!(50));
        assert_eq!(fee.clamp_to(None, Some(Money::new(dec!(10)))), Money::new(dec!(10)));
        let fee = Money::new(dec!(5));
        assert_eq!(fee.clamp_to(None, None), fee);
    }

    #[test]
    fn display_rounding_is_bankers() {
        let m = Money::new(dec!(2.345));
        assert_eq!(m.round_display(Currency::USD), Money::new(dec!(2.34)));
        let m = Money::new(dec!(2.355));
        assert_eq!(m.round_display(Currency::USD), Money::new(dec!(2.36)));
        let m = Money::new(dec!(100.5));
        assert_eq!(m.round_display(Currency::JPY), Money::new(dec!(100)));
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;

    proptest! {
        #[test]
        fn addition_is_associative(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000, c in -1_000_000_000i64..1_000_000_000) {
            let (a, b, c) = (Money::new(Decimal::new(a, 4)), Money::new(Decimal::new(b, 4)), Money::new(Decimal::new(c, 4)));
            prop_assert_eq!((a + b) + c, a + (b + c));
        }

        #[test]
        fn subtraction_inverts_addition(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let (a, b) = (Money::new(Decimal::new(a, 6)), Money::new(Decimal::new(b, 6)));
            prop_assert_eq!(a + b - b, a);
        }

        #[test]
        fn clamped_value_is_within_bounds(v in -10_000i64..10_000, lo in -5_000i64..0, hi in 0i64..5_000) {
            let v = Money::from(v);
            let (lo, hi) = (Money::from(lo), Money::from(hi));
            let clamped = v.clamp_to(Some(lo), Some(hi));
            prop_assert!(clamped >= lo && clamped <= hi);
        }
    }
}
