//! 64.64 signed fixed-point numbers
//!
//! Fractional time conversions go through [`Int64x64`] rather than `f64`, so
//! converting a value back and forth between units does not pile up rounding
//! error. The representation is a single `i128` whose low 64 bits are the
//! fraction.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

const FRAC_BITS: u32 = 64;
const LOW_MASK: u128 = u64::MAX as u128;
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Signed fixed-point number with a 64-bit integer part and a 64-bit fraction
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Int64x64(i128);

impl Int64x64 {
    pub const ZERO: Int64x64 = Int64x64(0);
    pub const ONE: Int64x64 = Int64x64(1 << FRAC_BITS);
    pub const MIN: Int64x64 = Int64x64(i128::MIN);
    pub const MAX: Int64x64 = Int64x64(i128::MAX);

    #[inline]
    pub const fn raw(self) -> i128 {
        self.0
    }

    #[inline]
    pub const fn from_int(value: i64) -> Self {
        Int64x64((value as i128) << FRAC_BITS)
    }

    /// Convert from a double. Scaling by 2^64 is exact, so the only loss is
    /// the final rounding to the nearest representable fraction.
    pub fn from_f64(value: f64) -> Self {
        Int64x64((value * TWO_POW_64).round() as i128)
    }

    pub fn to_f64(self) -> f64 {
        self.high() as f64 + self.low() as f64 / TWO_POW_64
    }

    /// Integer part, rounded toward negative infinity
    #[inline]
    pub const fn high(self) -> i64 {
        (self.0 >> FRAC_BITS) as i64
    }

    /// Fractional part in 2^-64 units (always non-negative)
    #[inline]
    pub const fn low(self) -> u64 {
        self.0 as u64
    }

    /// Round to the nearest integer, ties away from zero
    pub fn round(self) -> i64 {
        let half = 1i128 << (FRAC_BITS - 1);
        if self.0 >= 0 {
            (self.0.wrapping_add(half) >> FRAC_BITS) as i64
        } else {
            let magnitude = self.0.wrapping_neg().wrapping_add(half) >> FRAC_BITS;
            (magnitude as i64).wrapping_neg()
        }
    }

    pub fn abs(self) -> Self {
        Int64x64(self.0.wrapping_abs())
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `1 / self`
    ///
    /// # Panics
    /// Panics when `self` is zero.
    pub fn invert(self) -> Self {
        Int64x64::ONE / self
    }

    /// `self * (1 / other)`, the way conversion tables apply an inverse factor
    pub fn mul_by_invert(self, other: Int64x64) -> Self {
        self * other.invert()
    }
}

/// Unsigned 128x128 multiply keeping bits 64..192 of the 256-bit product
fn umul(a: u128, b: u128) -> u128 {
    let (ah, al) = (a >> FRAC_BITS, a & LOW_MASK);
    let (bh, bl) = (b >> FRAC_BITS, b & LOW_MASK);

    let ll = al * bl;
    let mid = (ah * bl).wrapping_add(al * bh);
    let hh = ah * bh;

    // Round on the first discarded bit.
    let round = (ll >> (FRAC_BITS - 1)) & 1;
    (hh << FRAC_BITS)
        .wrapping_add(mid)
        .wrapping_add(ll >> FRAC_BITS)
        .wrapping_add(round)
}

/// Unsigned `(a << 64) / b` by schoolbook long division on the fraction
fn udiv(a: u128, b: u128) -> u128 {
    assert!(b != 0, "Int64x64 division by zero");

    let quotient = a / b;
    let mut rem = a % b;
    let mut frac: u128 = 0;

    for _ in 0..FRAC_BITS {
        let carry = rem >> 127;
        rem <<= 1;
        frac <<= 1;
        if carry == 1 || rem >= b {
            rem = rem.wrapping_sub(b);
            frac |= 1;
        }
    }

    let carry = rem >> 127;
    rem <<= 1;
    if carry == 1 || rem >= b {
        frac += 1;
    }

    (quotient << FRAC_BITS).wrapping_add(frac)
}

fn apply_sign(magnitude: u128, negative: bool) -> Int64x64 {
    let value = magnitude as i128;
    Int64x64(if negative { value.wrapping_neg() } else { value })
}

impl Add for Int64x64 {
    type Output = Int64x64;

    #[inline]
    fn add(self, rhs: Int64x64) -> Int64x64 {
        Int64x64(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Int64x64 {
    type Output = Int64x64;

    #[inline]
    fn sub(self, rhs: Int64x64) -> Int64x64 {
        Int64x64(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Int64x64 {
    type Output = Int64x64;

    fn mul(self, rhs: Int64x64) -> Int64x64 {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        apply_sign(umul(self.0.unsigned_abs(), rhs.0.unsigned_abs()), negative)
    }
}

impl Div for Int64x64 {
    type Output = Int64x64;

    fn div(self, rhs: Int64x64) -> Int64x64 {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        apply_sign(udiv(self.0.unsigned_abs(), rhs.0.unsigned_abs()), negative)
    }
}

impl Neg for Int64x64 {
    type Output = Int64x64;

    #[inline]
    fn neg(self) -> Int64x64 {
        Int64x64(self.0.wrapping_neg())
    }
}

impl AddAssign for Int64x64 {
    fn add_assign(&mut self, rhs: Int64x64) {
        *self = *self + rhs;
    }
}

impl SubAssign for Int64x64 {
    fn sub_assign(&mut self, rhs: Int64x64) {
        *self = *self - rhs;
    }
}

impl From<i64> for Int64x64 {
    fn from(value: i64) -> Self {
        Int64x64::from_int(value)
    }
}

impl fmt::Display for Int64x64 {
    /// Signed decimal form, e.g. `+1.5`. Precision caps the fraction digits
    /// (20 by default); trailing zeros are dropped.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let int_part = magnitude >> FRAC_BITS;
        let mut frac = magnitude & LOW_MASK;

        let mut out = String::new();
        out.push(if negative { '-' } else { '+' });
        out.push_str(&int_part.to_string());
        out.push('.');

        let max_digits = f.precision().unwrap_or(20).max(1);
        for _ in 0..max_digits {
            frac *= 10;
            let digit = (frac >> FRAC_BITS) as u8;
            frac &= LOW_MASK;
            out.push(char::from(b'0' + digit));
            if frac == 0 {
                break;
            }
        }

        f.write_str(&out)
    }
}

impl fmt::Debug for Int64x64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Int64x64({}, {:#018x})", self.high(), self.low())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Int64x64, b: Int64x64, ulps: i128) -> bool {
        (a.raw() - b.raw()).abs() <= ulps
    }

    #[test]
    fn test_integer_arithmetic() {
        let two = Int64x64::from_int(2);
        let three = Int64x64::from_int(3);

        assert_eq!(two + three, Int64x64::from_int(5));
        assert_eq!(two - three, Int64x64::from_int(-1));
        assert_eq!(two * three, Int64x64::from_int(6));
        assert_eq!(Int64x64::from_int(6) / three, two);
    }

    #[test]
    fn test_fractional_multiply_is_exact() {
        let a = Int64x64::from_f64(1.5);
        let b = Int64x64::from_f64(2.5);
        assert_eq!(a * b, Int64x64::from_f64(3.75));
        assert_eq!(-a * b, Int64x64::from_f64(-3.75));
    }

    #[test]
    fn test_division_round_trip() {
        let one = Int64x64::ONE;
        let three = Int64x64::from_int(3);
        let third = one / three;

        assert!(close(third * three, one, 2));
    }

    #[test]
    fn test_invert() {
        let thousand = Int64x64::from_int(1000);
        let inv = thousand.invert();

        assert!(close(inv * thousand, Int64x64::ONE, 1000));
        assert!(close(
            Int64x64::from_int(5).mul_by_invert(thousand),
            Int64x64::from_f64(0.005),
            1000
        ));
    }

    #[test]
    fn test_high_low_floor_semantics() {
        let v = Int64x64::from_f64(-1.5);
        assert_eq!(v.high(), -2);
        assert_eq!(v.low(), 1 << 63);

        let v = Int64x64::from_f64(2.25);
        assert_eq!(v.high(), 2);
        assert_eq!(v.low(), 1 << 62);
    }

    #[test]
    fn test_round_ties_away_from_zero() {
        assert_eq!(Int64x64::from_f64(2.5).round(), 3);
        assert_eq!(Int64x64::from_f64(-2.5).round(), -3);
        assert_eq!(Int64x64::from_f64(2.4999).round(), 2);
        assert_eq!(Int64x64::from_f64(-0.4).round(), 0);
    }

    #[test]
    fn test_f64_round_trip() {
        for v in [0.0, 1.0, -1.0, 0.1, 123.456, -98765.4321, 1e-9] {
            let back = Int64x64::from_f64(v).to_f64();
            assert!((back - v).abs() <= v.abs() * 1e-15 + 1e-18, "{v} -> {back}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Int64x64::from_f64(1.5).to_string(), "+1.5");
        assert_eq!(Int64x64::from_int(-3).to_string(), "-3.0");
        assert_eq!(Int64x64::from_f64(0.25).to_string(), "+0.25");
        assert_eq!(format!("{:.2}", Int64x64::from_f64(0.125)), "+0.12");
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn test_divide_by_zero_panics() {
        let _ = Int64x64::ONE / Int64x64::ZERO;
    }
}
