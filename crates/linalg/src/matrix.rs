//! Dense row-major matrices of decimals.

use core::fmt;

use svgbake_decimal::{Context, Decimal};

use crate::{LinAlgError, Vector};

/// A dense rows×cols matrix of [`Decimal`] entries.
///
/// Matrices are logically immutable values; every operation returns a new
/// matrix. Square-only operations (`lu`, `determinant`, `inverse`,
/// `solve`, `exp`) fail with [`LinAlgError::NotSquare`] on rectangular
/// input and [`LinAlgError::Singular`] when no usable pivot exists.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Decimal>,
}

/// The result of `P·A = L·U` with partial pivoting.
#[derive(Clone, Debug)]
pub struct LuDecomposition {
    pub l: Matrix,
    pub u: Matrix,
    pub p: Matrix,
    /// +1 or −1, the sign of the row permutation.
    pub sign: i32,
}

impl Matrix {
    /// Build a matrix from rows. All rows must have the same non-zero
    /// length.
    pub fn from_rows(rows: Vec<Vec<Decimal>>) -> Result<Matrix, LinAlgError> {
        let r = rows.len();
        let c = rows.first().map(Vec::len).unwrap_or(0);
        if r == 0 || c == 0 {
            return Err(LinAlgError::ShapeMismatch(
                "a matrix needs at least one row and one column".into(),
            ));
        }
        let mut data = Vec::with_capacity(r * c);
        for row in rows {
            if row.len() != c {
                return Err(LinAlgError::ShapeMismatch(format!(
                    "row of length {} in a matrix with {} columns",
                    row.len(),
                    c
                )));
            }
            data.extend(row);
        }
        Ok(Matrix { rows: r, cols: c, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        assert!(rows > 0 && cols > 0);
        Matrix {
            rows,
            cols,
            data: vec![Decimal::zero(); rows * cols],
        }
    }

    pub fn identity(size: usize) -> Matrix {
        let mut m = Matrix::zeros(size, size);
        for i in 0..size {
            m.set(i, i, Decimal::one());
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &Decimal {
        assert!(row < self.rows && col < self.cols);
        &self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Decimal) {
        assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col] = value;
    }

    fn require_square(&self) -> Result<(), LinAlgError> {
        if self.is_square() {
            Ok(())
        } else {
            Err(LinAlgError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    fn same_shape(&self, other: &Matrix) -> Result<(), LinAlgError> {
        if self.rows == other.rows && self.cols == other.cols {
            Ok(())
        } else {
            Err(LinAlgError::ShapeMismatch(format!(
                "{}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )))
        }
    }

    /// Entry-wise sum. Exact.
    pub fn add(&self, other: &Matrix) -> Result<Matrix, LinAlgError> {
        self.same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Entry-wise difference. Exact.
    pub fn sub(&self, other: &Matrix) -> Result<Matrix, LinAlgError> {
        self.same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Multiply every entry by a scalar, rounding at the working precision.
    pub fn scale(&self, factor: &Decimal, cx: &Context) -> Matrix {
        let data = self.data.iter().map(|a| cx.round(&(a * factor))).collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }

    /// Matrix product, entries rounded at the working precision.
    pub fn mul(&self, other: &Matrix, cx: &Context) -> Result<Matrix, LinAlgError> {
        if self.cols != other.rows {
            return Err(LinAlgError::ShapeMismatch(format!(
                "{}x{} * {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = Decimal::zero();
                for k in 0..self.cols {
                    sum += &(self.get(i, k) * other.get(k, j));
                }
                out.set(i, j, cx.round(&sum));
            }
        }
        Ok(out)
    }

    /// Matrix·vector product.
    pub fn mul_vector(&self, v: &Vector, cx: &Context) -> Result<Vector, LinAlgError> {
        if self.cols != v.len() {
            return Err(LinAlgError::ShapeMismatch(format!(
                "{}x{} * vector of length {}",
                self.rows,
                self.cols,
                v.len()
            )));
        }
        let mut out = Vec::with_capacity(self.rows);
        for i in 0..self.rows {
            let mut sum = Decimal::zero();
            for k in 0..self.cols {
                sum += &(self.get(i, k) * v.get(k));
            }
            out.push(cx.round(&sum));
        }
        Ok(Vector::new(out))
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.set(j, i, self.get(i, j).clone());
            }
        }
        out
    }

    // Doolittle with partial pivoting. Returns the row permutation, the
    // packed L\U factors and the permutation sign.
    fn lu_packed(&self, cx: &Context) -> Result<(Vec<usize>, Matrix, i32), LinAlgError> {
        self.require_square()?;
        let n = self.rows;
        let mut a = self.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut sign = 1;

        for k in 0..n {
            // Pick the row with the largest |a[i,k]|.
            let mut pivot_row = k;
            let mut pivot_abs = a.get(k, k).abs();
            for i in (k + 1)..n {
                let candidate = a.get(i, k).abs();
                if candidate > pivot_abs {
                    pivot_abs = candidate;
                    pivot_row = i;
                }
            }
            if pivot_abs.is_zero() {
                return Err(LinAlgError::Singular);
            }
            if pivot_row != k {
                a.swap_rows(k, pivot_row);
                perm.swap(k, pivot_row);
                sign = -sign;
            }

            let pivot = a.get(k, k).clone();
            for i in (k + 1)..n {
                let factor = cx.div(a.get(i, k), &pivot)?;
                for j in (k + 1)..n {
                    let updated = a.get(i, j) - &(&factor * a.get(k, j));
                    a.set(i, j, cx.round(&updated));
                }
                a.set(i, k, factor);
            }
        }

        Ok((perm, a, sign))
    }

    fn swap_rows(&mut self, r1: usize, r2: usize) {
        if r1 == r2 {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(r1 * self.cols + j, r2 * self.cols + j);
        }
    }

    /// LU decomposition with partial pivoting: `P·A = L·U`.
    pub fn lu(&self, cx: &Context) -> Result<LuDecomposition, LinAlgError> {
        let n = self.rows;
        let (perm, packed, sign) = self.lu_packed(cx)?;

        let mut l = Matrix::identity(n);
        let mut u = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if j < i {
                    l.set(i, j, packed.get(i, j).clone());
                } else {
                    u.set(i, j, packed.get(i, j).clone());
                }
            }
        }
        let mut p = Matrix::zeros(n, n);
        for (to, from) in perm.iter().enumerate() {
            p.set(to, *from, Decimal::one());
        }

        Ok(LuDecomposition { l, u, p, sign })
    }

    /// Determinant via LU: the product of the diagonal of U times the
    /// permutation sign.
    pub fn determinant(&self, cx: &Context) -> Result<Decimal, LinAlgError> {
        let (_, packed, sign) = self.lu_packed(cx)?;
        let mut det = Decimal::one();
        for i in 0..self.rows {
            det = cx.round(&(&det * packed.get(i, i)));
        }
        if sign < 0 {
            det = -det;
        }
        Ok(det)
    }

    /// Inverse by Gauss–Jordan elimination on the augmented `[A | I]`.
    pub fn inverse(&self, cx: &Context) -> Result<Matrix, LinAlgError> {
        self.require_square()?;
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for k in 0..n {
            let mut pivot_row = k;
            let mut pivot_abs = a.get(k, k).abs();
            for i in (k + 1)..n {
                let candidate = a.get(i, k).abs();
                if candidate > pivot_abs {
                    pivot_abs = candidate;
                    pivot_row = i;
                }
            }
            if pivot_abs.is_zero() {
                return Err(LinAlgError::Singular);
            }
            a.swap_rows(k, pivot_row);
            inv.swap_rows(k, pivot_row);

            let pivot = a.get(k, k).clone();
            for j in 0..n {
                let scaled = cx.div(a.get(k, j), &pivot)?;
                a.set(k, j, scaled);
                let scaled = cx.div(inv.get(k, j), &pivot)?;
                inv.set(k, j, scaled);
            }

            for i in 0..n {
                if i == k {
                    continue;
                }
                let factor = a.get(i, k).clone();
                if factor.is_zero() {
                    continue;
                }
                for j in 0..n {
                    let updated = a.get(i, j) - &(&factor * a.get(k, j));
                    a.set(i, j, cx.round(&updated));
                    let updated = inv.get(i, j) - &(&factor * inv.get(k, j));
                    inv.set(i, j, cx.round(&updated));
                }
            }
        }

        Ok(inv)
    }

    /// Solve `A·x = b` by forward elimination and back substitution.
    pub fn solve(&self, b: &Vector, cx: &Context) -> Result<Vector, LinAlgError> {
        self.require_square()?;
        if b.len() != self.rows {
            return Err(LinAlgError::ShapeMismatch(format!(
                "{}x{} system with right-hand side of length {}",
                self.rows,
                self.cols,
                b.len()
            )));
        }
        let n = self.rows;
        let (perm, packed, _) = self.lu_packed(cx)?;

        // Forward: L·y = P·b (L has unit diagonal).
        let mut y: Vec<Decimal> = (0..n).map(|i| b.get(perm[i]).clone()).collect();
        for i in 0..n {
            let mut sum = y[i].clone();
            for j in 0..i {
                sum -= &(packed.get(i, j) * &y[j]);
            }
            y[i] = cx.round(&sum);
        }

        // Back: U·x = y.
        let mut x = vec![Decimal::zero(); n];
        for i in (0..n).rev() {
            let mut sum = y[i].clone();
            for j in (i + 1)..n {
                sum -= &(packed.get(i, j) * &x[j]);
            }
            x[i] = cx.div(&sum, packed.get(i, i))?;
        }

        Ok(Vector::new(x))
    }

    /// Householder QR. Returns `(Q, R)` with Q orthogonal and R upper
    /// triangular, `A = Q·R`. Requires rows ≥ cols.
    pub fn qr(&self, cx: &Context) -> Result<(Matrix, Matrix), LinAlgError> {
        if self.rows < self.cols {
            return Err(LinAlgError::ShapeMismatch(format!(
                "QR needs rows >= cols, got {}x{}",
                self.rows, self.cols
            )));
        }
        let m = self.rows;
        let n = self.cols;
        let mut r = self.clone();
        let mut q = Matrix::identity(m);

        for k in 0..n.min(m - 1) {
            // Householder vector for column k below the diagonal.
            let mut norm_sq = Decimal::zero();
            for i in k..m {
                let e = r.get(i, k);
                norm_sq += &(e * e);
            }
            if norm_sq.is_zero() {
                continue;
            }
            let norm = cx.sqrt(&norm_sq).map_err(LinAlgError::Numeric)?;
            let head = r.get(k, k).clone();
            // Choose the sign that avoids cancellation.
            let alpha = if head.is_negative() { norm } else { -norm };

            let mut v: Vec<Decimal> = (k..m).map(|i| r.get(i, k).clone()).collect();
            let head_minus_alpha = &v[0] - &alpha;
            v[0] = head_minus_alpha;
            let mut v_norm_sq = Decimal::zero();
            for e in &v {
                v_norm_sq += &(e * e);
            }
            if v_norm_sq.is_zero() {
                continue;
            }

            // Apply H = I − 2·v·vᵀ/|v|² to R (and accumulate into Q).
            for j in 0..n {
                let mut dot = Decimal::zero();
                for (idx, e) in v.iter().enumerate() {
                    dot += &(e * r.get(k + idx, j));
                }
                let coeff = cx.div(&(&dot + &dot), &v_norm_sq)?;
                for (idx, e) in v.iter().enumerate() {
                    let updated = r.get(k + idx, j) - &(&coeff * e);
                    r.set(k + idx, j, cx.round(&updated));
                }
            }
            for j in 0..m {
                let mut dot = Decimal::zero();
                for (idx, e) in v.iter().enumerate() {
                    dot += &(e * q.get(j, k + idx));
                }
                let coeff = cx.div(&(&dot + &dot), &v_norm_sq)?;
                for (idx, e) in v.iter().enumerate() {
                    let updated = q.get(j, k + idx) - &(&coeff * e);
                    q.set(j, k + idx, cx.round(&updated));
                }
            }
        }

        Ok((q, r))
    }

    /// Matrix exponential by scaling and squaring around a Taylor series.
    ///
    /// The series stops once the entry-wise absolute sum of the next term
    /// drops under the context tolerance.
    pub fn exp(&self, cx: &Context) -> Result<Matrix, LinAlgError> {
        self.require_square()?;
        let n = self.rows;

        // Scale down until the max-row-sum norm is at most 1.
        let mut norm = Decimal::zero();
        for i in 0..n {
            let mut row_sum = Decimal::zero();
            for j in 0..n {
                row_sum += &self.get(i, j).abs();
            }
            if row_sum > norm {
                norm = row_sum;
            }
        }
        let mut squarings = 0u32;
        let mut limit = Decimal::one();
        while norm > limit {
            limit = &limit + &limit;
            squarings += 1;
        }
        let scale_factor = cx.powi(&Decimal::from(2), -(squarings as i64))?;
        let scaled = self.scale(&scale_factor, cx);

        // Taylor: Σ Aᵏ/k!
        let mut result = Matrix::identity(n);
        let mut term = Matrix::identity(n);
        let mut k: i64 = 1;
        loop {
            term = term.mul(&scaled, cx)?;
            term = term.scale(&cx.div(&Decimal::one(), &Decimal::from(k))?, cx);
            let mut term_sum = Decimal::zero();
            for e in &term.data {
                term_sum += &e.abs();
            }
            result = result.add(&term)?;
            if term_sum < cx.tolerance() {
                break;
            }
            k += 1;
        }

        for _ in 0..squarings {
            result = result.mul(&result, cx)?;
        }
        Ok(result)
    }

    /// Entry-wise comparison under an absolute tolerance.
    pub fn approx_eq(&self, other: &Matrix, tolerance: &Decimal) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a.approx_eq(b, tolerance))
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix {}x{} [", self.rows, self.cols)?;
        for i in 0..self.rows {
            write!(f, "  ")?;
            for j in 0..self.cols {
                write!(f, "{} ", self.get(i, j))?;
            }
            writeln!(f)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn mat(rows: &[&[&str]]) -> Matrix {
        Matrix::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|s| dec(s)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn construction_invariants() {
        assert!(Matrix::from_rows(vec![]).is_err());
        assert!(Matrix::from_rows(vec![vec![]]).is_err());
        assert!(Matrix::from_rows(vec![vec![dec("1")], vec![dec("1"), dec("2")]]).is_err());
        let m = mat(&[&["1", "2"], &["3", "4"]]);
        assert_eq!(m.get(1, 0), &dec("3"));
    }

    #[test]
    fn multiplication() {
        let cx = Context::default();
        let a = mat(&[&["1", "2"], &["3", "4"]]);
        let b = mat(&[&["5", "6"], &["7", "8"]]);
        let ab = a.mul(&b, &cx).unwrap();
        assert_eq!(ab, mat(&[&["19", "22"], &["43", "50"]]));
        assert!(a.mul(&Matrix::zeros(3, 3), &cx).is_err());
    }

    #[test]
    fn determinant_and_sign() {
        let cx = Context::default();
        let m = mat(&[&["1", "2"], &["3", "4"]]);
        assert_eq!(m.determinant(&cx).unwrap(), dec("-2"));

        // Permuted identity has determinant -1.
        let p = mat(&[&["0", "1"], &["1", "0"]]);
        assert_eq!(p.determinant(&cx).unwrap(), dec("-1"));

        let singular = mat(&[&["1", "2"], &["2", "4"]]);
        assert!(matches!(
            singular.determinant(&cx),
            Err(LinAlgError::Singular)
        ));

        let rect = Matrix::zeros(2, 3);
        assert!(matches!(
            rect.determinant(&cx),
            Err(LinAlgError::NotSquare { .. })
        ));
    }

    #[test]
    fn lu_reconstructs() {
        let cx = Context::default();
        let a = mat(&[
            &["2", "1", "1"],
            &["4", "-6", "0"],
            &["-2", "7", "2"],
        ]);
        let lu = a.lu(&cx).unwrap();
        let pa = lu.p.mul(&a, &cx).unwrap();
        let lu_prod = lu.l.mul(&lu.u, &cx).unwrap();
        assert!(pa.approx_eq(&lu_prod, &cx.tolerance()));
        assert!(lu.sign == 1 || lu.sign == -1);
    }

    #[test]
    fn inverse_round_trip() {
        let cx = Context::default();
        let a = mat(&[
            &["3", "0", "2"],
            &["2", "0", "-2"],
            &["0", "1", "1"],
        ]);
        let inv = a.inverse(&cx).unwrap();
        let id = a.mul(&inv, &cx).unwrap();
        assert!(id.approx_eq(&Matrix::identity(3), &cx.tolerance()));
    }

    #[test]
    fn solve_system() {
        let cx = Context::default();
        let a = mat(&[&["2", "1"], &["1", "3"]]);
        let b = Vector::new(vec![dec("5"), dec("10")]);
        let x = a.solve(&b, &cx).unwrap();
        // 2x + y = 5, x + 3y = 10 → x = 1, y = 3
        assert!(x.get(0).approx_eq(&dec("1"), &cx.tolerance()));
        assert!(x.get(1).approx_eq(&dec("3"), &cx.tolerance()));
    }

    #[test]
    fn qr_reconstructs() {
        let cx = Context::default();
        let a = mat(&[
            &["12", "-51", "4"],
            &["6", "167", "-68"],
            &["-4", "24", "-41"],
        ]);
        let (q, r) = a.qr(&cx).unwrap();
        let qtq = q.transpose().mul(&q, &cx).unwrap();
        assert!(qtq.approx_eq(&Matrix::identity(3), &cx.tolerance()));
        let qr = q.mul(&r, &cx).unwrap();
        assert!(qr.approx_eq(&a, &cx.tolerance()));
        // R is upper triangular.
        assert!(r.get(1, 0).approx_eq(&Decimal::zero(), &cx.tolerance()));
        assert!(r.get(2, 0).approx_eq(&Decimal::zero(), &cx.tolerance()));
        assert!(r.get(2, 1).approx_eq(&Decimal::zero(), &cx.tolerance()));
    }

    #[test]
    fn exp_of_zero_is_identity() {
        let cx = Context::default();
        let z = Matrix::zeros(3, 3);
        assert!(z.exp(&cx).unwrap().approx_eq(&Matrix::identity(3), &cx.tolerance()));
    }

    #[test]
    fn exp_of_nilpotent() {
        let cx = Context::default();
        // N = [[0,1],[0,0]] → exp(N) = I + N exactly.
        let n = mat(&[&["0", "1"], &["0", "0"]]);
        let e = n.exp(&cx).unwrap();
        let expected = mat(&[&["1", "1"], &["0", "1"]]);
        assert!(e.approx_eq(&expected, &cx.tolerance()));
    }

    #[test]
    fn exp_of_scalar() {
        let cx = Context::default();
        // exp([[1]]) = e.
        let m = mat(&[&["1"]]);
        let e = m.exp(&cx).unwrap();
        let euler = dec("2.71828182845904523536028747135266249775724709369995");
        assert!(e.get(0, 0).approx_eq(&euler, &Decimal::pow10(-49)));
    }

    #[test]
    fn transpose_shape() {
        let m = Matrix::zeros(2, 3);
        let t = m.transpose();
        assert_eq!((t.rows(), t.cols()), (3, 2));
    }
}
