//! 3D affine transform constructors (4×4 homogeneous matrices).

use svgbake_decimal::{Context, Decimal};

use crate::{LinAlgError, Matrix, Vector};

pub fn translation(tx: &Decimal, ty: &Decimal, tz: &Decimal) -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(0, 3, tx.clone());
    m.set(1, 3, ty.clone());
    m.set(2, 3, tz.clone());
    m
}

pub fn scale(sx: &Decimal, sy: &Decimal, sz: &Decimal) -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(0, 0, sx.clone());
    m.set(1, 1, sy.clone());
    m.set(2, 2, sz.clone());
    m
}

pub fn rotation_x(theta: &Decimal, cx: &Context) -> Matrix {
    let (s, c) = (cx.sin(theta), cx.cos(theta));
    let mut m = Matrix::identity(4);
    m.set(1, 1, c.clone());
    m.set(1, 2, -&s);
    m.set(2, 1, s);
    m.set(2, 2, c);
    m
}

pub fn rotation_y(theta: &Decimal, cx: &Context) -> Matrix {
    let (s, c) = (cx.sin(theta), cx.cos(theta));
    let mut m = Matrix::identity(4);
    m.set(0, 0, c.clone());
    m.set(0, 2, s.clone());
    m.set(2, 0, -&s);
    m.set(2, 2, c);
    m
}

pub fn rotation_z(theta: &Decimal, cx: &Context) -> Matrix {
    let (s, c) = (cx.sin(theta), cx.cos(theta));
    let mut m = Matrix::identity(4);
    m.set(0, 0, c.clone());
    m.set(0, 1, -&s);
    m.set(1, 0, s);
    m.set(1, 1, c);
    m
}

/// Rodrigues rotation by `theta` radians around an arbitrary axis.
///
/// The axis is normalized automatically; the zero vector fails with
/// [`LinAlgError::ZeroAxis`].
pub fn rotation_around_axis(
    axis: &Vector,
    theta: &Decimal,
    cx: &Context,
) -> Result<Matrix, LinAlgError> {
    if axis.len() != 3 {
        return Err(LinAlgError::ShapeMismatch(format!(
            "rotation axis must be a 3-vector, got length {}",
            axis.len()
        )));
    }
    let unit = match axis.normalize(cx) {
        Ok(u) => u,
        Err(LinAlgError::ZeroVector) => return Err(LinAlgError::ZeroAxis),
        Err(e) => return Err(e),
    };
    let (x, y, z) = (unit.get(0), unit.get(1), unit.get(2));

    // K is the cross-product matrix of the unit axis;
    // R = I + sinθ·K + (1−cosθ)·K².
    let mut k = Matrix::zeros(3, 3);
    k.set(0, 1, -z);
    k.set(0, 2, y.clone());
    k.set(1, 0, z.clone());
    k.set(1, 2, -x);
    k.set(2, 0, -y);
    k.set(2, 1, x.clone());

    let s = cx.sin(theta);
    let c1 = &Decimal::one() - &cx.cos(theta);
    let k2 = k.mul(&k, cx)?;
    let r = Matrix::identity(3)
        .add(&k.scale(&s, cx))?
        .add(&k2.scale(&c1, cx))?;

    // Pad to homogeneous 4×4.
    let mut m = Matrix::identity(4);
    for i in 0..3 {
        for j in 0..3 {
            m.set(i, j, r.get(i, j).clone());
        }
    }
    Ok(m)
}

/// Conjugate a rotation by a translation so it pivots around `(px, py, pz)`.
pub fn rotation_around_point(
    axis: &Vector,
    theta: &Decimal,
    px: &Decimal,
    py: &Decimal,
    pz: &Decimal,
    cx: &Context,
) -> Result<Matrix, LinAlgError> {
    let to = translation(px, py, pz);
    let back = translation(&-px, &-py, &-pz);
    to.mul(&rotation_around_axis(axis, theta, cx)?, cx)?.mul(&back, cx)
}

pub fn reflect_xy() -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(2, 2, -&Decimal::one());
    m
}

pub fn reflect_xz() -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(1, 1, -&Decimal::one());
    m
}

pub fn reflect_yz() -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(0, 0, -&Decimal::one());
    m
}

pub fn reflect_origin() -> Matrix {
    let mut m = Matrix::identity(4);
    m.set(0, 0, -&Decimal::one());
    m.set(1, 1, -&Decimal::one());
    m.set(2, 2, -&Decimal::one());
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn apply(m: &Matrix, x: &str, y: &str, z: &str, cx: &Context) -> Vector {
        let v = Vector::new(vec![dec(x), dec(y), dec(z), Decimal::one()]);
        m.mul_vector(&v, cx).unwrap()
    }

    #[test]
    fn rodrigues_matches_rotation_z() {
        let cx = Context::default();
        let theta = dec("1.1");
        let ez = Vector::new(vec![dec("0"), dec("0"), dec("4")]); // not unit on purpose
        let general = rotation_around_axis(&ez, &theta, &cx).unwrap();
        let direct = rotation_z(&theta, &cx);
        assert!(general.approx_eq(&direct, &cx.tolerance()));
    }

    #[test]
    fn zero_axis_rejected() {
        let cx = Context::default();
        let zero = Vector::zeros(3);
        assert!(matches!(
            rotation_around_axis(&zero, &dec("1"), &cx),
            Err(LinAlgError::ZeroAxis)
        ));
    }

    #[test]
    fn rotation_around_point_fixes_pivot() {
        let cx = Context::default();
        let axis = Vector::new(vec![dec("0"), dec("0"), dec("1")]);
        let m = rotation_around_point(&axis, &dec("0.7"), &dec("1"), &dec("2"), &dec("3"), &cx)
            .unwrap();
        let fixed = apply(&m, "1", "2", "3", &cx);
        assert!(fixed.get(0).approx_eq(&dec("1"), &cx.tolerance()));
        assert!(fixed.get(1).approx_eq(&dec("2"), &cx.tolerance()));
        assert!(fixed.get(2).approx_eq(&dec("3"), &cx.tolerance()));
    }

    #[test]
    fn translation_composes_right_to_left() {
        let cx = Context::default();
        let t = translation(&dec("1"), &dec("0"), &dec("0"));
        let s = scale(&dec("2"), &dec("2"), &dec("2"));
        // T·S scales first, then translates.
        let m = t.mul(&s, &cx).unwrap();
        let out = apply(&m, "1", "1", "1", &cx);
        assert_eq!(out.get(0), &dec("3"));
        assert_eq!(out.get(1), &dec("2"));
    }

    #[test]
    fn reflections_flip_single_axes() {
        let cx = Context::default();
        let out = apply(&reflect_xy(), "1", "2", "3", &cx);
        assert_eq!(out.get(2), &dec("-3"));
        let out = apply(&reflect_origin(), "1", "2", "3", &cx);
        assert_eq!(
            (out.get(0), out.get(1), out.get(2)),
            (&dec("-1"), &dec("-2"), &dec("-3"))
        );
    }
}
