//! The precision context.
//!
//! Everything that has to round goes through a [`Context`]. The context
//! owns the working precision (P significant digits), a cached π computed
//! at construction, and the tolerance `10^-(P-10)` derived from it.

use core::num::NonZeroU64;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};

use crate::{Decimal, DecimalError};

/// Guard digits carried by intermediate results before the final rounding.
const GUARD: u32 = 10;

/// An explicit arithmetic context.
///
/// Operations round half-to-even at `digits` significant digits. The
/// default context works at 80 digits, which puts the derived comparison
/// tolerance at `1e-70`.
#[derive(Clone, Debug)]
pub struct Context {
    digits: u32,
    pi: Decimal,
    two_pi: Decimal,
    half_pi: Decimal,
    tolerance: Decimal,
}

impl Context {
    pub const DEFAULT_DIGITS: u32 = 80;

    /// A context rounding at `digits` significant digits.
    ///
    /// `digits` must be at least 16; the derived tolerance is
    /// `10^-(digits-10)`.
    pub fn new(digits: u32) -> Self {
        assert!(digits >= 16, "the working precision must be at least 16 digits");
        let pi = compute_pi(digits + GUARD);
        let two_pi = round_digits(&(&pi + &pi), digits + GUARD);
        let half_pi = round_digits(&(&pi * &dec_half()), digits + GUARD);
        Context {
            digits,
            pi,
            two_pi,
            half_pi,
            tolerance: Decimal::pow10(-(digits as i64 - 10)),
        }
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// π at the working precision.
    pub fn pi(&self) -> Decimal {
        self.round(&self.pi)
    }

    /// The comparison tolerance `10^-(P-10)`.
    pub fn tolerance(&self) -> Decimal {
        self.tolerance.clone()
    }

    /// Round half-to-even at the working precision.
    pub fn round(&self, value: &Decimal) -> Decimal {
        round_digits(value, self.digits)
    }

    fn round_extra(&self, value: &Decimal) -> Decimal {
        round_digits(value, self.digits + GUARD)
    }

    fn stop(&self) -> Decimal {
        Decimal::pow10(-((self.digits + GUARD) as i64))
    }

    // Internal division for divisors known to be non-zero.
    fn div_raw(&self, a: &Decimal, b: &Decimal) -> Decimal {
        debug_assert!(!b.is_zero());
        div_digits(a, b, self.digits + GUARD)
    }

    pub fn div(&self, a: &Decimal, b: &Decimal) -> Result<Decimal, DecimalError> {
        if b.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        Ok(self.round(&div_digits(a, b, self.digits + GUARD)))
    }

    pub fn sqrt(&self, a: &Decimal) -> Result<Decimal, DecimalError> {
        if a.is_negative() {
            return Err(DecimalError::NegativeRoot(a.to_string()));
        }
        Ok(self.round(&self.sqrt_raw(a)))
    }

    // Newton iteration; caller guarantees a >= 0.
    fn sqrt_raw(&self, a: &Decimal) -> Decimal {
        if a.is_zero() {
            return Decimal::zero();
        }
        // Normalize to b = a / 10^(2h) with b in [1, 100) so the f64 seed
        // is safe for any magnitude.
        let (mantissa, scale) = a.raw().as_bigint_and_exponent();
        let exponent10 = int_digits(&mantissa) - scale;
        let h = exponent10.div_euclid(2);
        let b = Decimal::from_raw(BigDecimal::new(mantissa, scale + 2 * h));

        let mut y = match Decimal::from_f64(b.to_f64().sqrt()) {
            Ok(seed) if !seed.is_zero() => seed,
            _ => Decimal::one(),
        };

        // Each iteration doubles the number of correct digits; the f64
        // seed is good for ~15 of them.
        let mut correct = 15u32;
        let target = self.digits + GUARD;
        while correct < target * 2 {
            let q = self.div_raw(&b, &y);
            y = self.round_extra(&(&(&y + &q) * &dec_half()));
            correct = correct.saturating_mul(2);
        }

        self.round_extra(&(&y * &Decimal::pow10(h)))
    }

    /// `a^n` for integer exponents, by repeated squaring.
    pub fn powi(&self, a: &Decimal, n: i64) -> Result<Decimal, DecimalError> {
        if n < 0 {
            let p = self.powi(a, -n)?;
            return self.div(&Decimal::one(), &p);
        }
        let mut result = Decimal::one();
        let mut base = a.clone();
        let mut n = n as u64;
        while n > 0 {
            if n & 1 == 1 {
                result = self.round_extra(&(&result * &base));
            }
            base = self.round_extra(&(&base * &base));
            n >>= 1;
        }
        Ok(self.round(&result))
    }

    /// Reduce an angle to [-π, π).
    fn reduce_angle(&self, x: &Decimal) -> Decimal {
        if x.abs() <= self.pi {
            return x.clone();
        }
        let k = self.div_raw(&(x + &self.pi), &self.two_pi).floor();
        self.round_extra(&(x - &(&k * &self.two_pi)))
    }

    pub fn sin(&self, x: &Decimal) -> Decimal {
        let x = self.reduce_angle(x);
        let x2 = self.round_extra(&(&x * &x));
        let stop = self.stop();

        let mut term = x.clone();
        let mut sum = x;
        let mut k: i64 = 1;
        loop {
            // term_{k} = -term_{k-1} · x² / ((2k)(2k+1))
            term = self.div_raw(
                &-(&term * &x2),
                &Decimal::from(2 * k * (2 * k + 1)),
            );
            if term.abs() < stop {
                break;
            }
            sum += &term;
            k += 1;
        }
        self.round(&sum)
    }

    pub fn cos(&self, x: &Decimal) -> Decimal {
        let x = self.reduce_angle(x);
        let x2 = self.round_extra(&(&x * &x));
        let stop = self.stop();

        let mut term = Decimal::one();
        let mut sum = Decimal::one();
        let mut k: i64 = 1;
        loop {
            term = self.div_raw(
                &-(&term * &x2),
                &Decimal::from((2 * k - 1) * 2 * k),
            );
            if term.abs() < stop {
                break;
            }
            sum += &term;
            k += 1;
        }
        self.round(&sum)
    }

    pub fn tan(&self, x: &Decimal) -> Result<Decimal, DecimalError> {
        let c = self.cos(x);
        if c.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        self.div(&self.sin(x), &c)
    }

    pub fn atan(&self, x: &Decimal) -> Decimal {
        if x.is_zero() {
            return Decimal::zero();
        }
        if x.abs() > Decimal::one() {
            // atan(x) = sign(x)·π/2 − atan(1/x)
            let inv = self.div_raw(&Decimal::one(), x);
            let outer = if x.is_positive() {
                self.half_pi.clone()
            } else {
                -&self.half_pi
            };
            return self.round(&(&outer - &self.atan_raw(&inv)));
        }
        self.round(&self.atan_raw(x))
    }

    // |x| <= 1. Argument halving until the series converges quickly.
    fn atan_raw(&self, x: &Decimal) -> Decimal {
        let threshold: Decimal = Decimal::pow10(-2) * Decimal::from(5); // 0.05
        let mut x = x.clone();
        let mut doublings = 0u32;
        while x.abs() > threshold {
            // atan(x) = 2·atan(x / (1 + √(1+x²)))
            let denom = &Decimal::one() + &self.sqrt_raw(&(&Decimal::one() + &(&x * &x)));
            x = self.div_raw(&x, &denom);
            doublings += 1;
        }

        let x2 = self.round_extra(&(&x * &x));
        let stop = self.stop();

        let mut power = x.clone();
        let mut sum = x;
        let mut k: i64 = 1;
        loop {
            power = self.round_extra(&-(&power * &x2));
            let term = self.div_raw(&power, &Decimal::from(2 * k + 1));
            if term.abs() < stop {
                break;
            }
            sum += &term;
            k += 1;
        }

        for _ in 0..doublings {
            sum = &sum + &sum;
        }
        self.round_extra(&sum)
    }

    pub fn atan2(&self, y: &Decimal, x: &Decimal) -> Decimal {
        if x.is_zero() {
            return match y.signum() {
                0 => Decimal::zero(),
                s if s > 0 => self.round(&self.half_pi),
                _ => self.round(&-&self.half_pi),
            };
        }
        let base = self.atan(&self.div_raw(y, x));
        if x.is_positive() {
            base
        } else if y.is_negative() {
            self.round(&(&base - &self.pi))
        } else {
            self.round(&(&base + &self.pi))
        }
    }

    pub fn acos(&self, x: &Decimal) -> Result<Decimal, DecimalError> {
        // acos(x) = atan2(√(1−x²), x); |x| > 1 surfaces as NegativeRoot.
        let s = self.sqrt(&(&Decimal::one() - &(x * x)))?;
        Ok(self.atan2(&s, x))
    }

    pub fn to_radians(&self, degrees: &Decimal) -> Decimal {
        self.round(&self.div_raw(&(degrees * &self.pi), &Decimal::from(180)))
    }

    pub fn to_degrees(&self, radians: &Decimal) -> Decimal {
        let per_rad = self.div_raw(&Decimal::from(180), &self.pi);
        self.round(&(radians * &per_rad))
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(Self::DEFAULT_DIGITS)
    }
}

fn dec_half() -> Decimal {
    Decimal::pow10(-1) * Decimal::from(5)
}

fn round_digits(value: &Decimal, digits: u32) -> Decimal {
    if value.is_zero() {
        return Decimal::zero();
    }
    let prec = NonZeroU64::new(digits as u64).expect("precision is non-zero");
    Decimal::from_raw(
        value
            .raw()
            .with_precision_round(prec, RoundingMode::HalfEven),
    )
}

fn int_digits(n: &BigInt) -> i64 {
    let s = n.to_string();
    s.trim_start_matches('-').len() as i64
}

// Long division on the mantissas with `digits` significant digits of
// quotient, truncated; callers round the guard digits away.
fn div_digits(a: &Decimal, b: &Decimal, digits: u32) -> Decimal {
    if a.is_zero() {
        return Decimal::zero();
    }
    let (am, ascale) = a.raw().as_bigint_and_exponent();
    let (bm, bscale) = b.raw().as_bigint_and_exponent();

    let have = int_digits(&am) - int_digits(&bm);
    let shift = (digits as i64 + 2 - have).max(0);
    let scaled = am * BigInt::from(10u32).pow(shift as u32);
    let q = scaled / bm;
    round_digits(
        &Decimal::from_raw(BigDecimal::new(q, shift + ascale - bscale)),
        digits,
    )
}

fn compute_pi(digits: u32) -> Decimal {
    // Machin: π = 16·atan(1/5) − 4·atan(1/239).
    let a5 = atan_inv(5, digits + 5);
    let a239 = atan_inv(239, digits + 5);
    let pi = &(&a5 * &Decimal::from(16)) - &(&a239 * &Decimal::from(4));
    round_digits(&pi, digits)
}

// atan(1/x) for an integer x >= 2, by the alternating series.
fn atan_inv(x: i64, digits: u32) -> Decimal {
    let x2 = Decimal::from(x * x);
    let stop = Decimal::pow10(-(digits as i64));

    let mut power = div_digits(&Decimal::one(), &Decimal::from(x), digits);
    let mut sum = power.clone();
    let mut k: i64 = 1;
    let mut negate = true;
    loop {
        power = div_digits(&power, &x2, digits);
        let term = div_digits(&power, &Decimal::from(2 * k + 1), digits);
        if term.abs() < stop {
            break;
        }
        if negate {
            sum -= &term;
        } else {
            sum += &term;
        }
        negate = !negate;
        k += 1;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    // 100 decimal places.
    const PI_100: &str = "3.1415926535897932384626433832795028841971693993751058209749445923078164062862089986280348253421170679";

    #[test]
    fn pi_digits() {
        let cx = Context::default();
        let reference = dec(PI_100);
        assert!(cx.pi().approx_eq(&reference, &Decimal::pow10(-85)));
    }

    #[test]
    fn division_rounds_half_even() {
        let cx = Context::new(16);
        let q = cx.div(&dec("1"), &dec("3")).unwrap();
        assert_eq!(q, dec("0.3333333333333333"));
        assert!(cx.div(&dec("1"), &dec("0")).is_err());
    }

    #[test]
    fn division_exact_multiple() {
        let cx = Context::default();
        assert_eq!(cx.div(&dec("1"), &dec("8")).unwrap(), dec("0.125"));
        assert_eq!(cx.div(&dec("-42"), &dec("7")).unwrap(), dec("-6"));
    }

    #[test]
    fn sqrt_squares_back() {
        let cx = Context::default();
        let two = dec("2");
        let r = cx.sqrt(&two).unwrap();
        assert!((&r * &r).approx_eq(&two, &cx.tolerance()));
        // First digits of √2.
        assert!(r.approx_eq(
            &dec("1.41421356237309504880168872420969807856967187537694"),
            &Decimal::pow10(-50)
        ));
        assert!(cx.sqrt(&dec("-1")).is_err());
        assert_eq!(cx.sqrt(&Decimal::zero()).unwrap(), Decimal::zero());
    }

    #[test]
    fn sqrt_extreme_magnitudes() {
        let cx = Context::default();
        let big = dec("1e120");
        let r = cx.sqrt(&big).unwrap();
        assert!((&r * &r).approx_eq(&big, &(&big * &cx.tolerance())));
        let tiny = dec("4e-120");
        let r = cx.sqrt(&tiny).unwrap();
        assert!(r.approx_eq(&dec("2e-60"), &Decimal::pow10(-120)));
    }

    #[test]
    fn sin_cos_identities() {
        let cx = Context::default();
        let x = dec("0.7");
        let s = cx.sin(&x);
        let c = cx.cos(&x);
        let one = &(&s * &s) + &(&c * &c);
        assert!(one.approx_eq(&Decimal::one(), &cx.tolerance()));

        // sin(π/6) = 1/2
        let sixth = cx.div(&cx.pi(), &dec("6")).unwrap();
        assert!(cx.sin(&sixth).approx_eq(&dec("0.5"), &cx.tolerance()));
        // cos(π) = −1
        assert!(cx.cos(&cx.pi()).approx_eq(&dec("-1"), &cx.tolerance()));
    }

    #[test]
    fn angle_reduction() {
        let cx = Context::default();
        let x = dec("0.3");
        let big = &x + &(&cx.pi() * &dec("20"));
        assert!(cx.sin(&big).approx_eq(&cx.sin(&x), &cx.tolerance()));
    }

    #[test]
    fn atan_and_atan2() {
        let cx = Context::default();
        // atan(1) = π/4
        let quarter = cx.div(&cx.pi(), &dec("4")).unwrap();
        assert!(cx.atan(&dec("1")).approx_eq(&quarter, &cx.tolerance()));
        // atan(x) + atan(1/x) = π/2 for x > 0
        let x = dec("3.7");
        let inv = cx.div(&Decimal::one(), &x).unwrap();
        let sum = &cx.atan(&x) + &cx.atan(&inv);
        let half = &cx.pi() * &dec("0.5");
        assert!(sum.approx_eq(&half, &cx.tolerance()));

        // Quadrants.
        assert_eq!(cx.atan2(&Decimal::zero(), &Decimal::zero()), Decimal::zero());
        assert!(cx
            .atan2(&dec("1"), &dec("0"))
            .approx_eq(&half, &cx.tolerance()));
        assert!(cx
            .atan2(&dec("0"), &dec("-1"))
            .approx_eq(&cx.pi(), &cx.tolerance()));
        assert!(cx
            .atan2(&dec("-1"), &dec("-1"))
            .approx_eq(&(&quarter * &dec("-3")), &cx.tolerance()));
    }

    #[test]
    fn acos_domain() {
        let cx = Context::default();
        assert!(cx.acos(&dec("0")).unwrap().approx_eq(
            &(&cx.pi() * &dec("0.5")),
            &cx.tolerance()
        ));
        assert!(cx.acos(&dec("-1")).unwrap().approx_eq(&cx.pi(), &cx.tolerance()));
        assert!(cx.acos(&dec("1.0000001")).is_err());
    }

    #[test]
    fn tan_matches_ratio() {
        let cx = Context::default();
        let x = dec("0.9");
        let expected = cx.div(&cx.sin(&x), &cx.cos(&x)).unwrap();
        assert_eq!(cx.tan(&x).unwrap(), expected);
    }

    #[test]
    fn integer_powers() {
        let cx = Context::default();
        assert_eq!(cx.powi(&dec("2"), 10).unwrap(), dec("1024"));
        assert_eq!(cx.powi(&dec("7"), 0).unwrap(), Decimal::one());
        assert_eq!(cx.powi(&dec("2"), -2).unwrap(), dec("0.25"));
        assert!(cx.powi(&Decimal::zero(), -1).is_err());
    }

    #[test]
    fn degree_radian_round_trip() {
        let cx = Context::default();
        let deg = dec("90");
        let rad = cx.to_radians(&deg);
        assert!(rad.approx_eq(&(&cx.pi() * &dec("0.5")), &cx.tolerance()));
        assert!(cx.to_degrees(&rad).approx_eq(&deg, &cx.tolerance()));
    }
}
