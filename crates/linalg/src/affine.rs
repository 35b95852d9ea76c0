//! 2D affine transform constructors.
//!
//! All constructors return 3×3 homogeneous matrices. Composition reads
//! right-to-left: in `T·R·S·p` the scale applies first.

use svgbake_decimal::{Context, Decimal};

use crate::{point, LinAlgError, Matrix, Point};

pub fn translation(tx: &Decimal, ty: &Decimal) -> Matrix {
    let mut m = Matrix::identity(3);
    m.set(0, 2, tx.clone());
    m.set(1, 2, ty.clone());
    m
}

pub fn scale(sx: &Decimal, sy: &Decimal) -> Matrix {
    let mut m = Matrix::identity(3);
    m.set(0, 0, sx.clone());
    m.set(1, 1, sy.clone());
    m
}

pub fn scale_uniform(s: &Decimal) -> Matrix {
    scale(s, s)
}

/// Counter-clockwise rotation by `theta` radians (y-down SVG coordinates
/// make this read clockwise on screen).
pub fn rotation(theta: &Decimal, cx: &Context) -> Matrix {
    let (s, c) = (cx.sin(theta), cx.cos(theta));
    let mut m = Matrix::identity(3);
    m.set(0, 0, c.clone());
    m.set(0, 1, -&s);
    m.set(1, 0, s);
    m.set(1, 1, c);
    m
}

/// `T(p) · R(θ) · T(−p)`.
pub fn rotation_around_point(
    theta: &Decimal,
    px: &Decimal,
    py: &Decimal,
    cx: &Context,
) -> Result<Matrix, LinAlgError> {
    let to = translation(px, py);
    let back = translation(&-px, &-py);
    to.mul(&rotation(theta, cx), cx)?.mul(&back, cx)
}

/// Skew by `ax`/`ay` radians along x and y.
pub fn skew(ax: &Decimal, ay: &Decimal, cx: &Context) -> Result<Matrix, LinAlgError> {
    let mut m = Matrix::identity(3);
    m.set(0, 1, cx.tan(ax)?);
    m.set(1, 0, cx.tan(ay)?);
    Ok(m)
}

pub fn skew_x(ax: &Decimal, cx: &Context) -> Result<Matrix, LinAlgError> {
    skew(ax, &Decimal::zero(), cx)
}

pub fn skew_y(ay: &Decimal, cx: &Context) -> Result<Matrix, LinAlgError> {
    skew(&Decimal::zero(), ay, cx)
}

/// Stretch by factor `k` along the axis `(ux, uy)`: `I + (k−1)·u·uᵀ`
/// padded to 3×3. The axis is normalized first.
pub fn stretch_along_axis(
    ux: &Decimal,
    uy: &Decimal,
    k: &Decimal,
    cx: &Context,
) -> Result<Matrix, LinAlgError> {
    let norm_sq = &(ux * ux) + &(uy * uy);
    if norm_sq.is_zero() {
        return Err(LinAlgError::ZeroAxis);
    }
    let norm = cx.sqrt(&norm_sq).map_err(LinAlgError::Numeric)?;
    let ux = cx.div(ux, &norm)?;
    let uy = cx.div(uy, &norm)?;

    let k1 = k - &Decimal::one();
    let mut m = Matrix::identity(3);
    m.set(0, 0, cx.round(&(&Decimal::one() + &(&(&k1 * &ux) * &ux))));
    m.set(0, 1, cx.round(&(&(&k1 * &ux) * &uy)));
    m.set(1, 0, cx.round(&(&(&k1 * &uy) * &ux)));
    m.set(1, 1, cx.round(&(&Decimal::one() + &(&(&k1 * &uy) * &uy))));
    Ok(m)
}

pub fn reflect_x() -> Matrix {
    let mut m = Matrix::identity(3);
    m.set(1, 1, -&Decimal::one());
    m
}

pub fn reflect_y() -> Matrix {
    let mut m = Matrix::identity(3);
    m.set(0, 0, -&Decimal::one());
    m
}

pub fn reflect_origin() -> Matrix {
    let mut m = Matrix::identity(3);
    m.set(0, 0, -&Decimal::one());
    m.set(1, 1, -&Decimal::one());
    m
}

/// Apply a 3×3 homogeneous matrix to a point: `[x y 1]` is multiplied and
/// the result divided by w.
pub fn apply_to_point(m: &Matrix, p: &Point, cx: &Context) -> Result<Point, LinAlgError> {
    debug_assert!(m.rows() == 3 && m.cols() == 3);
    let x = &(&(m.get(0, 0) * &p.x) + &(m.get(0, 1) * &p.y)) + m.get(0, 2);
    let y = &(&(m.get(1, 0) * &p.x) + &(m.get(1, 1) * &p.y)) + m.get(1, 2);
    let w = &(&(m.get(2, 0) * &p.x) + &(m.get(2, 1) * &p.y)) + m.get(2, 2);
    if w == Decimal::one() {
        return Ok(point(cx.round(&x), cx.round(&y)));
    }
    Ok(point(cx.div(&x, &w)?, cx.div(&y, &w)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn translate_then_scale() {
        let cx = Context::default();
        // T·S applies the scale first.
        let m = translation(&dec("10"), &dec("20"))
            .mul(&scale(&dec("2"), &dec("2")), &cx)
            .unwrap();
        let p = apply_to_point(&m, &point(dec("100"), dec("100")), &cx).unwrap();
        assert_eq!(p, point(dec("210"), dec("220")));
    }

    #[test]
    fn rotation_quarter_turn() {
        let cx = Context::default();
        let quarter = &cx.pi() * &dec("0.5");
        let m = rotation(&quarter, &cx);
        let p = apply_to_point(&m, &point(dec("1"), dec("0")), &cx).unwrap();
        assert!(p.approx_eq(&point(dec("0"), dec("1")), &cx.tolerance()));
    }

    #[test]
    fn rotation_around_point_fixes_center() {
        let cx = Context::default();
        let theta = dec("0.83");
        let m = rotation_around_point(&theta, &dec("5"), &dec("7"), &cx).unwrap();
        let center = apply_to_point(&m, &point(dec("5"), dec("7")), &cx).unwrap();
        assert!(center.approx_eq(&point(dec("5"), dec("7")), &cx.tolerance()));
    }

    #[test]
    fn skew_x_45_degrees() {
        let cx = Context::default();
        let quarter = &cx.pi() * &dec("0.25");
        let m = skew_x(&quarter, &cx).unwrap();
        let p = apply_to_point(&m, &point(dec("0"), dec("1")), &cx).unwrap();
        // tan(45°) = 1 shifts x by y.
        assert!(p.approx_eq(&point(dec("1"), dec("1")), &cx.tolerance()));
    }

    #[test]
    fn stretch_preserves_orthogonal_direction() {
        let cx = Context::default();
        let m = stretch_along_axis(&dec("1"), &dec("0"), &dec("3"), &cx).unwrap();
        let along = apply_to_point(&m, &point(dec("2"), dec("0")), &cx).unwrap();
        assert!(along.approx_eq(&point(dec("6"), dec("0")), &cx.tolerance()));
        let across = apply_to_point(&m, &point(dec("0"), dec("2")), &cx).unwrap();
        assert!(across.approx_eq(&point(dec("0"), dec("2")), &cx.tolerance()));

        assert!(matches!(
            stretch_along_axis(&dec("0"), &dec("0"), &dec("2"), &cx),
            Err(LinAlgError::ZeroAxis)
        ));
    }

    #[test]
    fn reflections() {
        let cx = Context::default();
        let p = point(dec("3"), dec("4"));
        assert_eq!(
            apply_to_point(&reflect_x(), &p, &cx).unwrap(),
            point(dec("3"), dec("-4"))
        );
        assert_eq!(
            apply_to_point(&reflect_y(), &p, &cx).unwrap(),
            point(dec("-3"), dec("4"))
        );
        assert_eq!(
            apply_to_point(&reflect_origin(), &p, &cx).unwrap(),
            point(dec("-3"), dec("-4"))
        );
    }
}
