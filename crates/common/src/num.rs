//! # Fixed-Point Numbers
//!
//! Governance thresholds, equity-like shares and vote weights are fractional
//! values that every node must compute bit-for-bit identically. Floating point
//! is therefore never used; instead [`Decimal`] stores a signed integer scaled
//! by `10^18`.
//!
//! | Item | Purpose |
//! |------|---------|
//! | `Decimal` | Signed fixed-point value, 18 fractional digits |
//! | `mul_div_floor` | `floor(a * b / c)` with a 256-bit intermediate |
//! | `Decimal::mul_ceil_u128` | Threshold helper: `ceil(v * self)` for token counts |
//!
//! Token balances stay plain `u128`. Mixing the two only happens through the
//! explicit helpers below, so there is never an implicit rounding step.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of fractional digits carried by [`Decimal`].
pub const DECIMAL_PLACES: u32 = 18;

const SCALE: i128 = 1_000_000_000_000_000_000;
const SCALE_U: u128 = SCALE as u128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalParseError {
    #[error("empty decimal string")]
    Empty,
    #[error("invalid decimal digit in {0:?}")]
    InvalidDigit(String),
    #[error("too many fractional digits in {0:?}, at most 18 are supported")]
    TooPrecise(String),
    #[error("decimal {0:?} is out of range")]
    Overflow(String),
}

// ════════════════════════════════════════════════════════════════════════════
// WIDE ARITHMETIC
// ════════════════════════════════════════════════════════════════════════════

/// Full 256-bit product of two `u128`, returned as `(hi, lo)`.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let mask = u64::MAX as u128;
    let (a_lo, a_hi) = (a & mask, a >> 64);
    let (b_lo, b_hi) = (b & mask, b >> 64);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & mask) + (hl & mask);
    let lo = (ll & mask) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Computes `floor(a * b / c)` without intermediate overflow.
///
/// Returns the quotient and whether the division left a remainder, or `None`
/// when `c == 0` or the quotient does not fit in a `u128`.
pub fn mul_div_floor(a: u128, b: u128, c: u128) -> Option<(u128, bool)> {
    if c == 0 {
        return None;
    }
    let (hi, lo) = mul_wide(a, b);
    if hi >= c {
        return None;
    }

    // schoolbook long division of (hi:lo) by c, hi < c keeps the quotient in range
    let mut rem = hi;
    let mut quot: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quot |= 1;
        }
    }
    Some((quot, rem != 0))
}

// ════════════════════════════════════════════════════════════════════════════
// DECIMAL
// ════════════════════════════════════════════════════════════════════════════

/// Signed fixed-point decimal with 18 fractional digits.
///
/// Ordering and equality are those of the underlying scaled integer, so two
/// values compare exactly as their decimal representations do.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(i128);

impl Decimal {
    pub const ZERO: Decimal = Decimal(0);
    pub const ONE: Decimal = Decimal(SCALE);
    pub const MAX: Decimal = Decimal(i128::MAX);

    /// Builds `mantissa * 10^-exp`. `exp` must not exceed 18.
    pub const fn new(mantissa: i64, exp: u32) -> Self {
        assert!(exp <= DECIMAL_PLACES, "decimal exponent out of range");
        Decimal(mantissa as i128 * 10i128.pow(DECIMAL_PLACES - exp))
    }

    pub const fn from_raw(raw: i128) -> Self {
        Decimal(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn from_i64(v: i64) -> Self {
        Decimal(v as i128 * SCALE)
    }

    /// Integer conversion, `None` when the value does not fit.
    pub fn from_u128(v: u128) -> Option<Self> {
        let v = i128::try_from(v).ok()?;
        v.checked_mul(SCALE).map(Decimal)
    }

    /// `num / den` rounded toward zero; zero when `den` is zero.
    ///
    /// Used for vote weights, where `num <= den` and the result lies in `[0, 1]`.
    pub fn from_ratio(num: u128, den: u128) -> Self {
        match mul_div_floor(num, SCALE_U, den) {
            Some((q, _)) => Decimal(i128::try_from(q).unwrap_or(i128::MAX)),
            None if den == 0 => Decimal::ZERO,
            None => Decimal::MAX,
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Decimal) -> Option<Decimal> {
        self.0.checked_add(other.0).map(Decimal)
    }

    pub fn checked_sub(self, other: Decimal) -> Option<Decimal> {
        self.0.checked_sub(other.0).map(Decimal)
    }

    pub fn saturating_add(self, other: Decimal) -> Decimal {
        Decimal(self.0.saturating_add(other.0))
    }

    /// Product rounded toward zero.
    pub fn checked_mul(self, other: Decimal) -> Option<Decimal> {
        let negative = self.is_negative() != other.is_negative();
        let (q, _) = mul_div_floor(self.0.unsigned_abs(), other.0.unsigned_abs(), SCALE_U)?;
        let q = i128::try_from(q).ok()?;
        Some(Decimal(if negative { -q } else { q }))
    }

    /// Product saturating at the representable bounds.
    pub fn saturating_mul(self, other: Decimal) -> Decimal {
        self.checked_mul(other).unwrap_or_else(|| {
            if self.is_negative() != other.is_negative() {
                Decimal(i128::MIN)
            } else {
                Decimal::MAX
            }
        })
    }

    /// `ceil(v * self)` as an integer amount.
    ///
    /// A non-positive decimal yields zero. Saturates at `u128::MAX`, which can
    /// only happen for factors above one.
    pub fn mul_ceil_u128(self, v: u128) -> u128 {
        if self.0 <= 0 {
            return 0;
        }
        match mul_div_floor(v, self.0 as u128, SCALE_U) {
            Some((q, rem)) => q.saturating_add(rem as u128),
            None => u128::MAX,
        }
    }

    /// Compares an integer amount with this decimal without converting the
    /// amount (which may not fit once scaled).
    pub fn cmp_u128(self, v: u128) -> Ordering {
        if self.0 < 0 {
            return Ordering::Less;
        }
        let int = self.0 as u128 / SCALE_U;
        let frac = self.0 as u128 % SCALE_U;
        match int.cmp(&v) {
            Ordering::Equal if frac > 0 => Ordering::Greater,
            other => other,
        }
    }

    /// Truncates to the integer part.
    pub fn trunc_i128(self) -> i128 {
        self.0 / SCALE
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs / SCALE_U;
        let frac = abs % SCALE_U;
        if frac == 0 {
            return write!(f, "{}{}", sign, int);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}{}.{}", sign, int, digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self)
    }
}

impl FromStr for Decimal {
    type Err = DecimalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DecimalParseError::Empty);
        }
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalParseError::InvalidDigit(s.to_string()));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DecimalParseError::InvalidDigit(s.to_string()));
        }
        if frac_part.len() > DECIMAL_PLACES as usize {
            return Err(DecimalParseError::TooPrecise(s.to_string()));
        }

        let overflow = || DecimalParseError::Overflow(s.to_string());
        let int: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let mut frac: i128 = 0;
        if !frac_part.is_empty() {
            frac = frac_part.parse().map_err(|_| overflow())?;
            frac *= 10i128.pow(DECIMAL_PLACES - frac_part.len() as u32);
        }
        let raw = int
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(overflow)?;
        Ok(Decimal(if negative { -raw } else { raw }))
    }
}

// Decimals travel as strings so the encoding is the same for JSON network
// parameters and for binary snapshots.
impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(DecimalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("valid decimal")
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("0.66").to_string(), "0.66");
        assert_eq!(dec("-1.5").to_string(), "-1.5");
        assert_eq!(dec("42").to_string(), "42");
        assert_eq!(dec(".5"), Decimal::new(5, 1));
        assert_eq!(dec("0.00001"), Decimal::new(1, 5));
        assert_eq!(dec("1000000"), Decimal::from_i64(1_000_000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<Decimal>(), Err(DecimalParseError::Empty));
        assert!(matches!("1.2.3".parse::<Decimal>(), Err(DecimalParseError::InvalidDigit(_))));
        assert!(matches!("abc".parse::<Decimal>(), Err(DecimalParseError::InvalidDigit(_))));
        assert!(matches!(
            "0.0000000000000000001".parse::<Decimal>(),
            Err(DecimalParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_mul_div_floor_wide() {
        // 10^27 * 10^18 overflows u128 but the quotient does not
        let a = 1_000_000_000_000_000_000_000_000_000u128;
        let (q, rem) = mul_div_floor(a, SCALE_U, 3 * a).unwrap();
        assert_eq!(q, 333_333_333_333_333_333);
        assert!(rem);
        assert_eq!(mul_div_floor(7, 3, 0), None);
        assert_eq!(mul_div_floor(u128::MAX, u128::MAX, 1), None);
        assert_eq!(mul_div_floor(u128::MAX, 2, 2), Some((u128::MAX, false)));
    }

    #[test]
    fn test_mul_ceil_u128() {
        assert_eq!(dec("0.66").mul_ceil_u128(8), 6); // 5.28 -> 6
        assert_eq!(dec("0.5").mul_ceil_u128(8), 4);
        assert_eq!(dec("0.00001").mul_ceil_u128(9), 1);
        assert_eq!(Decimal::ZERO.mul_ceil_u128(9), 0);
        assert_eq!(dec("-1").mul_ceil_u128(9), 0);
    }

    #[test]
    fn test_from_ratio() {
        assert_eq!(Decimal::from_ratio(1, 8), dec("0.125"));
        assert_eq!(Decimal::from_ratio(7, 8), dec("0.875"));
        assert_eq!(Decimal::from_ratio(5, 0), Decimal::ZERO);
    }

    #[test]
    fn test_checked_mul_signs() {
        assert_eq!(dec("-2").checked_mul(dec("0.5")), Some(dec("-1")));
        assert_eq!(dec("1.5").checked_mul(dec("1.5")), Some(dec("2.25")));
        assert_eq!(Decimal::MAX.checked_mul(dec("2")), None);
    }

    #[test]
    fn test_cmp_u128() {
        assert_eq!(dec("2.5").cmp_u128(2), Ordering::Greater);
        assert_eq!(dec("2").cmp_u128(2), Ordering::Equal);
        assert_eq!(dec("1.9").cmp_u128(2), Ordering::Less);
        assert_eq!(dec("-1").cmp_u128(0), Ordering::Less);
    }

    #[test]
    fn test_serde_as_string() {
        let d = dec("0.125");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"0.125\"");
        let back: Decimal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);

        let bytes = bincode::serialize(&d).unwrap();
        let back: Decimal = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, d);
    }
}
