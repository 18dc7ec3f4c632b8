//! Rupiah amounts
//!
//! Amounts are whole rupiah held as `i64`. In storage they keep the text
//! form the application has always shown (`Rp 1.500.000`), so older rows
//! written as free text remain readable.

use crate::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A whole-rupiah amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(rupiah: i64) -> Self {
        Self(rupiah)
    }

    pub fn rupiah(&self) -> i64 {
        self.0
    }

    /// Parse caller input. Blank or malformed text is rejected.
    ///
    /// Accepts `1500000`, `1.500.000`, `Rp 1.500.000`, `Rp 1.500.000,50`
    /// and `1500000.0`. A `.` followed by exactly three digits groups
    /// thousands; otherwise it is a decimal point.
    pub fn parse(input: &str) -> Result<Self> {
        parse_amount(input).ok_or_else(|| Error::validation(format!("Invalid rupiah amount: '{}'", input)))
    }

    /// Parse a stored value. Blank reads as zero.
    pub fn parse_stored(input: &str) -> Option<Self> {
        if input.trim().is_empty() {
            return Some(Money::ZERO);
        }
        parse_amount(input)
    }

    /// `self × quantity`, rounded half away from zero to whole rupiah
    pub fn times(&self, quantity: f64) -> Money {
        Money((self.0 as f64 * quantity).round() as i64)
    }
}

fn parse_amount(input: &str) -> Option<Money> {
    let mut s = input.trim();
    // both `Rp -25.000` and `-Rp 25.000` occur
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_prefix("Rp").or_else(|| s.strip_prefix("rp")).or_else(|| s.strip_prefix("RP")) {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_prefix('-') {
        if negative {
            return None;
        }
        negative = true;
        s = rest.trim_start();
    }

    let (whole, fraction) = if let Some((whole, fraction)) = s.rsplit_once(',') {
        (whole.replace('.', ""), fraction.to_string())
    } else if let Some((whole, fraction)) = s.rsplit_once('.') {
        if fraction.len() == 3 {
            (s.replace('.', ""), String::new())
        } else {
            (whole.replace('.', ""), fraction.to_string())
        }
    } else {
        (s.to_string(), String::new())
    };

    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut value: i64 = whole.parse().ok()?;
    if fraction.chars().next().is_some_and(|c| c >= '5') {
        value = value.checked_add(1)?;
    }
    Some(Money(if negative { -value } else { value }))
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Money::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "Rp {}{}", sign, grouped)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Money::ZERO),
            ValueRef::Integer(i) => Ok(Money(i)),
            ValueRef::Real(r) => Ok(Money(r.round() as i64)),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Money::parse_stored(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unreadable rupiah amount '{}'", text).into())
                })
            }
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::new(1_500_000).to_string(), "Rp 1.500.000");
        assert_eq!(Money::new(999).to_string(), "Rp 999");
        assert_eq!(Money::new(0).to_string(), "Rp 0");
        assert_eq!(Money::new(-25_000).to_string(), "Rp -25.000");
    }

    #[test]
    fn test_parse_accepted_forms() {
        assert_eq!(Money::parse("1500000").unwrap(), Money::new(1_500_000));
        assert_eq!(Money::parse("1.500.000").unwrap(), Money::new(1_500_000));
        assert_eq!(Money::parse("Rp 1.500.000").unwrap(), Money::new(1_500_000));
        assert_eq!(Money::parse("Rp1.500.000,50").unwrap(), Money::new(1_500_001));
        assert_eq!(Money::parse("1500000.0").unwrap(), Money::new(1_500_000));
        assert_eq!(Money::parse("  250000  ").unwrap(), Money::new(250_000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Money::parse(""), Err(Error::Validation(_))));
        assert!(Money::parse("Rp").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("12a00").is_err());
    }

    #[test]
    fn test_negative_amounts_read_back() {
        let refund = Money::parse("-25000").unwrap();
        assert_eq!(Money::parse_stored(&refund.to_string()), Some(refund));
        assert_eq!(Money::parse_stored("-Rp 25.000"), Some(refund));
        assert_eq!(Money::parse("Rp -1.500.000").unwrap(), Money::new(-1_500_000));
        assert!(Money::parse("--5").is_err());
        assert!(Money::parse("-Rp -5").is_err());
    }

    #[test]
    fn test_rounding_overflow_rejected() {
        assert_eq!(Money::parse_stored("9223372036854775807,9"), None);
        assert_eq!(Money::parse("9223372036854775807").unwrap(), Money::new(i64::MAX));
    }

    #[test]
    fn test_stored_blank_is_zero() {
        assert_eq!(Money::parse_stored(""), Some(Money::ZERO));
        assert_eq!(Money::parse_stored("oops"), None);
    }

    #[test]
    fn test_times_rounds() {
        assert_eq!(Money::new(15_000).times(2.5), Money::new(37_500));
        assert_eq!(Money::new(3).times(0.5), Money::new(2));
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::new(1), Money::new(2), Money::new(3)].into_iter().sum();
        assert_eq!(total, Money::new(6));
    }
}
