//! Decimal vectors.

use core::fmt;

use svgbake_decimal::{Context, Decimal};

use crate::{LinAlgError, Matrix};

/// A dense vector of [`Decimal`] entries.
#[derive(Clone, PartialEq)]
pub struct Vector {
    data: Vec<Decimal>,
}

impl Vector {
    pub fn new(data: Vec<Decimal>) -> Vector {
        Vector { data }
    }

    pub fn zeros(len: usize) -> Vector {
        Vector {
            data: vec![Decimal::zero(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> &Decimal {
        &self.data[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decimal> {
        self.data.iter()
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(Decimal::is_zero)
    }

    fn same_len(&self, other: &Vector) -> Result<(), LinAlgError> {
        if self.len() == other.len() {
            Ok(())
        } else {
            Err(LinAlgError::ShapeMismatch(format!(
                "vectors of length {} and {}",
                self.len(),
                other.len()
            )))
        }
    }

    /// Entry-wise sum. Exact.
    pub fn add(&self, other: &Vector) -> Result<Vector, LinAlgError> {
        self.same_len(other)?;
        Ok(Vector::new(
            self.data.iter().zip(&other.data).map(|(a, b)| a + b).collect(),
        ))
    }

    /// Entry-wise difference. Exact.
    pub fn sub(&self, other: &Vector) -> Result<Vector, LinAlgError> {
        self.same_len(other)?;
        Ok(Vector::new(
            self.data.iter().zip(&other.data).map(|(a, b)| a - b).collect(),
        ))
    }

    /// Multiply every entry by a scalar, rounding at the working precision.
    pub fn scale(&self, factor: &Decimal, cx: &Context) -> Vector {
        Vector::new(self.data.iter().map(|a| cx.round(&(a * factor))).collect())
    }

    pub fn dot(&self, other: &Vector, cx: &Context) -> Result<Decimal, LinAlgError> {
        self.same_len(other)?;
        let mut sum = Decimal::zero();
        for (a, b) in self.data.iter().zip(&other.data) {
            sum += &(a * b);
        }
        Ok(cx.round(&sum))
    }

    /// Cross product; only defined for three-dimensional vectors.
    pub fn cross(&self, other: &Vector, cx: &Context) -> Result<Vector, LinAlgError> {
        if self.len() != 3 || other.len() != 3 {
            return Err(LinAlgError::ShapeMismatch(format!(
                "cross product needs two 3-vectors, got {} and {}",
                self.len(),
                other.len()
            )));
        }
        let (a, b) = (&self.data, &other.data);
        Ok(Vector::new(vec![
            cx.round(&(&(&a[1] * &b[2]) - &(&a[2] * &b[1]))),
            cx.round(&(&(&a[2] * &b[0]) - &(&a[0] * &b[2]))),
            cx.round(&(&(&a[0] * &b[1]) - &(&a[1] * &b[0]))),
        ]))
    }

    /// Outer product `self · otherᵀ`.
    pub fn outer(&self, other: &Vector, cx: &Context) -> Matrix {
        let mut out = Matrix::zeros(self.len(), other.len());
        for i in 0..self.len() {
            for j in 0..other.len() {
                out.set(i, j, cx.round(&(&self.data[i] * &other.data[j])));
            }
        }
        out
    }

    pub fn norm(&self, cx: &Context) -> Result<Decimal, LinAlgError> {
        let mut sum = Decimal::zero();
        for e in &self.data {
            sum += &(e * e);
        }
        cx.sqrt(&sum).map_err(LinAlgError::Numeric)
    }

    pub fn normalize(&self, cx: &Context) -> Result<Vector, LinAlgError> {
        let n = self.norm(cx)?;
        if n.is_zero() {
            return Err(LinAlgError::ZeroVector);
        }
        let inv = cx.div(&Decimal::one(), &n)?;
        Ok(self.scale(&inv, cx))
    }

    /// The angle between two vectors, in radians.
    pub fn angle_between(&self, other: &Vector, cx: &Context) -> Result<Decimal, LinAlgError> {
        let na = self.norm(cx)?;
        let nb = other.norm(cx)?;
        if na.is_zero() || nb.is_zero() {
            return Err(LinAlgError::ZeroVector);
        }
        let mut cos = cx.div(&self.dot(other, cx)?, &cx.round(&(&na * &nb)))?;
        // Rounding can push the ratio a hair out of [-1, 1].
        let one = Decimal::one();
        if cos > one {
            cos = one;
        } else if cos < -&one {
            cos = -one;
        }
        cx.acos(&cos).map_err(LinAlgError::Numeric)
    }

    /// Project `self` onto `other`.
    pub fn project_onto(&self, other: &Vector, cx: &Context) -> Result<Vector, LinAlgError> {
        let denom = other.dot(other, cx)?;
        if denom.is_zero() {
            return Err(LinAlgError::ZeroVector);
        }
        let factor = cx.div(&self.dot(other, cx)?, &denom)?;
        Ok(other.scale(&factor, cx))
    }

    /// A vector orthogonal to `self`.
    ///
    /// In two dimensions this is the quarter turn `(−y, x)`; in higher
    /// dimensions a standard basis vector is orthogonalized against `self`
    /// with Gram–Schmidt.
    pub fn orthogonal(&self, cx: &Context) -> Result<Vector, LinAlgError> {
        if self.is_zero() {
            return Err(LinAlgError::ZeroVector);
        }
        if self.len() == 2 {
            return Ok(Vector::new(vec![-&self.data[1], self.data[0].clone()]));
        }
        for axis in 0..self.len() {
            let mut basis = vec![Decimal::zero(); self.len()];
            basis[axis] = Decimal::one();
            let e = Vector::new(basis);
            let candidate = e.sub(&self.project_onto_unchecked(&e, cx)?)?;
            if !candidate.is_zero() {
                return Ok(candidate);
            }
        }
        Err(LinAlgError::ZeroVector)
    }

    // Projection of `other` onto self; self known non-zero.
    fn project_onto_unchecked(&self, other: &Vector, cx: &Context) -> Result<Vector, LinAlgError> {
        let denom = self.dot(self, cx)?;
        let factor = cx.div(&other.dot(self, cx)?, &denom)?;
        Ok(self.scale(&factor, cx))
    }

    pub fn distance(&self, other: &Vector, cx: &Context) -> Result<Decimal, LinAlgError> {
        self.sub(other)?.norm(cx)
    }

    /// Entry-wise comparison under an absolute tolerance.
    pub fn approx_eq(&self, other: &Vector, tolerance: &Decimal) -> bool {
        self.len() == other.len()
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a.approx_eq(b, tolerance))
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector [")?;
        for e in &self.data {
            write!(f, "{} ", e)?;
        }
        write!(f, "]")
    }
}
