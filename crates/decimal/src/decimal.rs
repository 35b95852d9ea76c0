//! The decimal value type.

use core::convert::TryFrom;
use core::fmt;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use core::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};

use crate::DecimalError;

/// An immutable arbitrary-precision signed decimal.
///
/// `+`, `-` and `*` are exact (decimal addition and multiplication never
/// need rounding); the rounded operations live on
/// [`Context`](crate::Context).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub(crate) fn from_raw(inner: BigDecimal) -> Self {
        Decimal(inner)
    }

    pub(crate) fn raw(&self) -> &BigDecimal {
        &self.0
    }

    pub fn zero() -> Self {
        Decimal(BigDecimal::from(0))
    }

    pub fn one() -> Self {
        Decimal(BigDecimal::from(1))
    }

    /// `10^exponent` as an exact decimal.
    pub fn pow10(exponent: i64) -> Self {
        Decimal(BigDecimal::new(BigInt::from(1), -exponent))
    }

    /// Exact conversion from a binary float.
    ///
    /// Fails on NaN and infinities.
    pub fn from_f64(value: f64) -> Result<Self, DecimalError> {
        BigDecimal::try_from(value)
            .map(Decimal)
            .map_err(|_| DecimalError::InvalidNumber(value.to_string()))
    }

    /// Lossy conversion used only at the boundary with float-based callers.
    pub fn to_f64(&self) -> f64 {
        num_traits::ToPrimitive::to_f64(&self.0).unwrap_or(f64::NAN)
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// -1, 0 or 1.
    pub fn signum(&self) -> i32 {
        match self.0.sign() {
            bigdecimal::num_bigint::Sign::Minus => -1,
            bigdecimal::num_bigint::Sign::NoSign => 0,
            bigdecimal::num_bigint::Sign::Plus => 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        num_traits::Zero::is_zero(&self.0)
    }

    pub fn is_negative(&self) -> bool {
        self.signum() < 0
    }

    pub fn is_positive(&self) -> bool {
        self.signum() > 0
    }

    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Equality under an absolute tolerance.
    ///
    /// Exact comparison is `==`; this is the separate predicate used by the
    /// verification layer.
    pub fn approx_eq(&self, other: &Decimal, tolerance: &Decimal) -> bool {
        (self - other).abs() <= tolerance.abs()
    }

    /// Largest integer less than or equal to self, as an exact decimal.
    pub fn floor(&self) -> Self {
        Decimal(self.0.with_scale_round(0, RoundingMode::Floor))
    }

    /// Fixed-point rendering with `scale` digits after the point,
    /// round-half-to-even. Trailing zeros are kept; trimming them is the
    /// serializer's job.
    pub fn to_fixed(&self, scale: i64) -> String {
        let rounded = self.0.with_scale_round(scale, RoundingMode::HalfEven);
        if num_traits::Zero::is_zero(&rounded) {
            // Avoid "-0" leaking out of half-even rounding.
            return BigDecimal::from(0).with_scale(scale.max(0)).to_string();
        }
        rounded.to_string()
    }

    /// Scientific rendering, mostly for diagnostics.
    pub fn to_exponential(&self) -> String {
        self.0.to_scientific_notation()
    }

    /// Number of significant digits currently stored.
    pub fn digits(&self) -> u64 {
        self.0.digits()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self.0)
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;
    fn from_str(s: &str) -> Result<Self, DecimalError> {
        BigDecimal::from_str(s)
            .map(Decimal)
            .map_err(|_| DecimalError::InvalidNumber(s.to_string()))
    }
}

impl From<i32> for Decimal {
    fn from(v: i32) -> Self {
        Decimal(BigDecimal::from(v))
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal(BigDecimal::from(v))
    }
}

impl From<u32> for Decimal {
    fn from(v: u32) -> Self {
        Decimal(BigDecimal::from(v))
    }
}

impl From<usize> for Decimal {
    fn from(v: usize) -> Self {
        Decimal(BigDecimal::from(v as u64))
    }
}

macro_rules! exact_binop {
    ($Trait:ident, $method:ident) => {
        impl $Trait for &Decimal {
            type Output = Decimal;
            fn $method(self, rhs: &Decimal) -> Decimal {
                Decimal((&self.0).$method(&rhs.0))
            }
        }

        impl $Trait for Decimal {
            type Output = Decimal;
            fn $method(self, rhs: Decimal) -> Decimal {
                Decimal(self.0.$method(rhs.0))
            }
        }

        impl $Trait<&Decimal> for Decimal {
            type Output = Decimal;
            fn $method(self, rhs: &Decimal) -> Decimal {
                Decimal(self.0.$method(&rhs.0))
            }
        }

        impl $Trait<Decimal> for &Decimal {
            type Output = Decimal;
            fn $method(self, rhs: Decimal) -> Decimal {
                Decimal((&self.0).$method(rhs.0))
            }
        }
    };
}

exact_binop!(Add, add);
exact_binop!(Sub, sub);
exact_binop!(Mul, mul);

impl Neg for Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Neg for &Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal(-&self.0)
    }
}

impl AddAssign<&Decimal> for Decimal {
    fn add_assign(&mut self, rhs: &Decimal) {
        self.0 += &rhs.0;
    }
}

impl AddAssign<Decimal> for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl SubAssign<&Decimal> for Decimal {
    fn sub_assign(&mut self, rhs: &Decimal) {
        self.0 -= &rhs.0;
    }
}

impl num_traits::Zero for Decimal {
    fn zero() -> Self {
        Decimal::zero()
    }
    fn is_zero(&self) -> bool {
        Decimal::is_zero(self)
    }
}

impl num_traits::One for Decimal {
    fn one() -> Self {
        Decimal::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn exact_ring_ops() {
        let a = dec("0.1");
        let b = dec("0.2");
        assert_eq!(&a + &b, dec("0.3"));
        assert_eq!(&a - &b, dec("-0.1"));
        assert_eq!(&a * &b, dec("0.02"));
        assert_eq!(-&a, dec("-0.1"));
    }

    #[test]
    fn comparisons() {
        assert!(dec("1.5") > dec("1.4999999999999999999999999999999"));
        assert_eq!(dec("1.50"), dec("1.5"));
        assert!(dec("-2").is_negative());
        assert_eq!(dec("0.0").signum(), 0);
    }

    #[test]
    fn approx_eq_tolerance() {
        let tol = Decimal::pow10(-70);
        let a = dec("1");
        let b = &a + &Decimal::pow10(-71);
        assert!(a.approx_eq(&b, &tol));
        let c = &a + &Decimal::pow10(-69);
        assert!(!a.approx_eq(&c, &tol));
    }

    #[test]
    fn fixed_rendering() {
        assert_eq!(dec("1.25").to_fixed(1), "1.2"); // half to even
        assert_eq!(dec("1.35").to_fixed(1), "1.4");
        assert_eq!(dec("10").to_fixed(3), "10.000");
        assert_eq!(dec("-0.0000001").to_fixed(3), "0.000");
    }

    #[test]
    fn floor_values() {
        assert_eq!(dec("2.7").floor(), dec("2"));
        assert_eq!(dec("-2.1").floor(), dec("-3"));
        assert_eq!(dec("5").floor(), dec("5"));
    }

    #[test]
    fn pow10_values() {
        assert_eq!(Decimal::pow10(2), dec("100"));
        assert_eq!(Decimal::pow10(-3), dec("0.001"));
    }
}
