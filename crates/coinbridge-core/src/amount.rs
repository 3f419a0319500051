//! Exact satoshi amounts.
//!
//! [`SatoshiAmount`] is the single money type used across the crate. It is a
//! newtype so the backing integer can change without touching callers; `u64`
//! covers Bitcoin's 21M BTC supply with room to spare.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use bitcoin::{Amount, Denomination};
use serde::{Deserialize, Serialize};

/// Satoshis per whole coin.
pub const SATS_PER_BTC: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("invalid BTC amount `{input}`: {reason}")]
    Parse { input: String, reason: String },

    #[error("{value} sat does not fit in {target}")]
    OutOfRange { value: u64, target: &'static str },

    #[error("{value} sat exceeds the 21M BTC supply")]
    AboveMaxMoney { value: u64 },
}

/// A non-negative, exact amount of satoshis.
///
/// Serialized as a bare integer. Never converted through floating point;
/// use [`SatoshiAmount::to_btc_string`] / [`SatoshiAmount::from_btc_str`]
/// for the 8-decimal BTC representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SatoshiAmount(u64);

impl SatoshiAmount {
    pub const ZERO: Self = Self(0);

    /// Total coin supply, the same bound as [`Amount::MAX_MONEY`].
    pub const MAX_MONEY: Self = Self(21_000_000 * SATS_PER_BTC);

    pub const fn from_sat(sats: u64) -> Self {
        Self(sats)
    }

    pub const fn to_sat(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Sum that reports `u64` overflow as `None`.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Whether the amount is at most [`SatoshiAmount::MAX_MONEY`].
    pub fn is_money_range(self) -> bool {
        self <= Self::MAX_MONEY
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Render as decimal BTC with exactly 8 fraction digits, e.g.
    /// `0.00005000`.
    pub fn to_btc_string(self) -> String {
        format!("{}.{:08}", self.0 / SATS_PER_BTC, self.0 % SATS_PER_BTC)
    }

    /// Parse a decimal BTC string. More than 8 fraction digits, negative
    /// values and exponents are rejected rather than rounded, and so is
    /// anything above the coin supply.
    pub fn from_btc_str(s: &str) -> Result<Self, AmountError> {
        let amount = Amount::from_str_in(s.trim(), Denomination::Bitcoin)
            .map(Self::from)
            .map_err(|e| AmountError::Parse {
                input: s.to_owned(),
                reason: e.to_string(),
            })?;
        if !amount.is_money_range() {
            return Err(AmountError::AboveMaxMoney { value: amount.0 });
        }
        Ok(amount)
    }

    /// Checked conversion into a narrower integer type. Fails instead of
    /// truncating.
    pub fn to_bounded<T>(self) -> Result<T, AmountError>
    where
        T: TryFrom<u64>,
    {
        T::try_from(self.0).map_err(|_| AmountError::OutOfRange {
            value: self.0,
            target: std::any::type_name::<T>(),
        })
    }
}

impl From<Amount> for SatoshiAmount {
    fn from(amount: Amount) -> Self {
        Self(amount.to_sat())
    }
}

impl From<SatoshiAmount> for Amount {
    fn from(amount: SatoshiAmount) -> Self {
        Amount::from_sat(amount.0)
    }
}

impl TryFrom<SatoshiAmount> for i64 {
    type Error = AmountError;

    fn try_from(amount: SatoshiAmount) -> Result<Self, Self::Error> {
        amount.to_bounded()
    }
}

impl TryFrom<SatoshiAmount> for u32 {
    type Error = AmountError;

    fn try_from(amount: SatoshiAmount) -> Result<Self, Self::Error> {
        amount.to_bounded()
    }
}

impl FromStr for SatoshiAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_btc_str(s)
    }
}

impl fmt::Display for SatoshiAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BTC", self.to_btc_string())
    }
}

// `+` and `Sum` saturate at `u64::MAX`. Arithmetic that has to balance
// (fee plans) goes through `checked_add` / `checked_sum` instead.
impl Add for SatoshiAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SatoshiAmount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for SatoshiAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a SatoshiAmount> for SatoshiAmount {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_string_has_eight_fraction_digits() {
        assert_eq!(SatoshiAmount::from_sat(5000).to_btc_string(), "0.00005000");
        assert_eq!(
            SatoshiAmount::from_sat(2_100_000_000_000_000).to_btc_string(),
            "21000000.00000000"
        );
        assert_eq!(SatoshiAmount::ZERO.to_btc_string(), "0.00000000");
    }

    #[test]
    fn btc_string_round_trips() {
        for sats in [0, 1, 546, 99_999_999, 100_000_000, 123_456_789_012] {
            let amount = SatoshiAmount::from_sat(sats);
            let parsed = SatoshiAmount::from_btc_str(&amount.to_btc_string()).expect("must parse");
            assert_eq!(parsed, amount);
        }
    }

    #[test]
    fn parse_accepts_short_fractions() {
        let amount: SatoshiAmount = "0.5".parse().expect("must parse");
        assert_eq!(amount.to_sat(), 50_000_000);
    }

    #[test]
    fn parse_rejects_sub_satoshi_precision() {
        let err = SatoshiAmount::from_btc_str("0.000000001").expect_err("must reject");
        assert!(matches!(err, AmountError::Parse { .. }));
    }

    #[test]
    fn parse_rejects_negative() {
        assert!(SatoshiAmount::from_btc_str("-1").is_err());
    }

    #[test]
    fn bounded_conversion_fails_instead_of_truncating() {
        let big = SatoshiAmount::from_sat(5_000_000_000);
        let err = u32::try_from(big).expect_err("must not fit in u32");
        assert_eq!(
            err,
            AmountError::OutOfRange {
                value: 5_000_000_000,
                target: "u32"
            }
        );
        assert_eq!(i64::try_from(big).expect("fits in i64"), 5_000_000_000);
        assert!(SatoshiAmount::from_sat(u64::MAX).to_bounded::<i64>().is_err());
    }

    #[test]
    fn checked_sub_reports_negative_as_none() {
        let a = SatoshiAmount::from_sat(100);
        assert_eq!(a.checked_sub(SatoshiAmount::from_sat(101)), None);
        assert_eq!(
            a.checked_sub(SatoshiAmount::from_sat(40)),
            Some(SatoshiAmount::from_sat(60))
        );
    }

    #[test]
    fn max_money_matches_bitcoin_supply() {
        assert_eq!(Amount::from(SatoshiAmount::MAX_MONEY), Amount::MAX_MONEY);
        assert!(SatoshiAmount::MAX_MONEY.is_money_range());
        assert!(!SatoshiAmount::from_sat(2_100_000_000_000_001).is_money_range());
    }

    #[test]
    fn parse_rejects_more_than_the_supply() {
        assert_eq!(
            SatoshiAmount::from_btc_str("21000000").expect("exactly the supply"),
            SatoshiAmount::MAX_MONEY
        );
        let err = SatoshiAmount::from_btc_str("21000000.00000001").expect_err("above supply");
        assert_eq!(
            err,
            AmountError::AboveMaxMoney {
                value: 2_100_000_000_000_001
            }
        );
    }

    #[test]
    fn checked_sum_reports_overflow() {
        let huge = [SatoshiAmount::from_sat(u64::MAX), SatoshiAmount::from_sat(1_000)];
        assert_eq!(SatoshiAmount::checked_sum(huge), None);
        assert_eq!(
            SatoshiAmount::checked_sum([1, 2, 3].map(SatoshiAmount::from_sat)),
            Some(SatoshiAmount::from_sat(6))
        );
        let saturated: SatoshiAmount = huge.iter().sum();
        assert_eq!(saturated, SatoshiAmount::from_sat(u64::MAX));
    }

    #[test]
    fn sums_by_value_and_reference() {
        let amounts = [1, 2, 3].map(SatoshiAmount::from_sat);
        let by_ref: SatoshiAmount = amounts.iter().sum();
        let by_val: SatoshiAmount = amounts.into_iter().sum();
        assert_eq!(by_ref, SatoshiAmount::from_sat(6));
        assert_eq!(by_val, by_ref);
    }
}
