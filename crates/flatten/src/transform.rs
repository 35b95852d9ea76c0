//! The transform and viewBox engine.
//!
//! Parses `transform` lists, `viewBox` and `preserveAspectRatio` into
//! decimal matrices, and bakes a CTM into canonical path data. Arcs
//! survive baking as arcs: the endpoint is transformed as a point while
//! radii, rotation and the sweep flag are recomputed from the principal
//! ellipse vectors under the linear part of the matrix.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{affine, point, Matrix, Point};
use svgbake_path::absolute::path_to_absolute;
use svgbake_path::parser::parse_decimal;
use svgbake_path::{Path, PathCommand, Verb};

use crate::ErrorKind;

/// A parsed `viewBox` rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewBox {
    pub min_x: Decimal,
    pub min_y: Decimal,
    pub width: Decimal,
    pub height: Decimal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlignFactor {
    Min,
    Mid,
    Max,
}

impl AlignFactor {
    // Alignment consumes this fraction of the leftover space.
    fn fraction(self) -> Decimal {
        match self {
            AlignFactor::Min => Decimal::zero(),
            AlignFactor::Mid => Decimal::pow10(-1) * Decimal::from(5),
            AlignFactor::Max => Decimal::one(),
        }
    }
}

/// A parsed `preserveAspectRatio` value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PreserveAspectRatio {
    pub defer: bool,
    /// `None` is the non-uniform stretch case.
    pub align: Option<(AlignFactor, AlignFactor)>,
    pub slice: bool,
}

impl PreserveAspectRatio {
    /// The default `xMidYMid meet`.
    pub const DEFAULT: Self = PreserveAspectRatio {
        defer: false,
        align: Some((AlignFactor::Mid, AlignFactor::Mid)),
        slice: false,
    };
}

impl Default for PreserveAspectRatio {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn invalid_transform(src: &str, message: impl Into<String>) -> ErrorKind {
    ErrorKind::InvalidTransform {
        src: src.to_string(),
        message: message.into(),
    }
}

/// Parse a `transform` attribute into a single 3×3 matrix.
///
/// Recognized functions (case-insensitive): `translate`, `scale`,
/// `rotate`, `skewX`, `skewY`, `matrix`. The combined matrix multiplies
/// left-to-right in textual order, so the last function applies to
/// coordinates first.
pub fn parse_transform_list(src: &str, cx: &Context) -> Result<Matrix, ErrorKind> {
    let mut result = Matrix::identity(3);
    let mut rest = src.trim_start_matches(|c: char| c.is_whitespace() || c == ',');

    while !rest.is_empty() {
        let open = rest
            .find('(')
            .ok_or_else(|| invalid_transform(src, "expected '('"))?;
        let name = rest[..open].trim().to_ascii_lowercase();
        let close = rest[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| invalid_transform(src, "expected ')'"))?;
        let args = parse_arguments(&rest[open + 1..close])
            .ok_or_else(|| invalid_transform(src, "malformed number in arguments"))?;

        let step = transform_function(&name, &args, cx)
            .map_err(|message| invalid_transform(src, message))?;
        result = result.mul(&step, cx).map_err(ErrorKind::LinAlg)?;

        rest = rest[close + 1..].trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    }

    Ok(result)
}

fn parse_arguments(src: &str) -> Option<Vec<Decimal>> {
    let mut out = Vec::new();
    for token in src.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        out.push(parse_decimal(token)?);
    }
    Some(out)
}

fn transform_function(
    name: &str,
    args: &[Decimal],
    cx: &Context,
) -> Result<Matrix, String> {
    let wrong_arity = || format!("{} does not take {} arguments", name, args.len());
    match name {
        "translate" => match args {
            [tx] => Ok(affine::translation(tx, &Decimal::zero())),
            [tx, ty] => Ok(affine::translation(tx, ty)),
            _ => Err(wrong_arity()),
        },
        "scale" => match args {
            [s] => Ok(affine::scale_uniform(s)),
            [sx, sy] => Ok(affine::scale(sx, sy)),
            _ => Err(wrong_arity()),
        },
        "rotate" => match args {
            [deg] => Ok(affine::rotation(&cx.to_radians(deg), cx)),
            [deg, px, py] => {
                affine::rotation_around_point(&cx.to_radians(deg), px, py, cx)
                    .map_err(|e| e.to_string())
            }
            _ => Err(wrong_arity()),
        },
        "skewx" => match args {
            [deg] => affine::skew_x(&cx.to_radians(deg), cx).map_err(|e| e.to_string()),
            _ => Err(wrong_arity()),
        },
        "skewy" => match args {
            [deg] => affine::skew_y(&cx.to_radians(deg), cx).map_err(|e| e.to_string()),
            _ => Err(wrong_arity()),
        },
        "matrix" => match args {
            [a, b, c, d, e, f] => {
                let mut m = Matrix::identity(3);
                m.set(0, 0, a.clone());
                m.set(1, 0, b.clone());
                m.set(0, 1, c.clone());
                m.set(1, 1, d.clone());
                m.set(0, 2, e.clone());
                m.set(1, 2, f.clone());
                Ok(m)
            }
            _ => Err(wrong_arity()),
        },
        _ => Err(format!("unknown transform function {:?}", name)),
    }
}

fn invalid_view_box(src: &str, message: impl Into<String>) -> ErrorKind {
    ErrorKind::InvalidViewBox {
        src: src.to_string(),
        message: message.into(),
    }
}

/// Parse a `viewBox` attribute: exactly four numbers with a positive
/// width and height.
pub fn parse_view_box(src: &str) -> Result<ViewBox, ErrorKind> {
    let numbers =
        parse_arguments(src).ok_or_else(|| invalid_view_box(src, "malformed number"))?;
    match numbers.as_slice() {
        [min_x, min_y, width, height] => {
            if !width.is_positive() || !height.is_positive() {
                return Err(invalid_view_box(src, "width and height must be positive"));
            }
            Ok(ViewBox {
                min_x: min_x.clone(),
                min_y: min_y.clone(),
                width: width.clone(),
                height: height.clone(),
            })
        }
        _ => Err(invalid_view_box(src, "expected four numbers")),
    }
}

/// Parse a `preserveAspectRatio` attribute.
pub fn parse_preserve_aspect_ratio(src: &str) -> Result<PreserveAspectRatio, ErrorKind> {
    let mut tokens = src.split_whitespace().peekable();
    let mut out = PreserveAspectRatio::DEFAULT;

    if tokens.peek() == Some(&"defer") {
        out.defer = true;
        tokens.next();
    }

    let align = tokens
        .next()
        .ok_or_else(|| invalid_view_box(src, "missing alignment"))?;
    out.align = match align {
        "none" => None,
        _ => {
            let (x, y) = parse_alignment(align)
                .ok_or_else(|| invalid_view_box(src, "unknown alignment"))?;
            Some((x, y))
        }
    };

    match tokens.next() {
        None => {}
        Some("meet") => out.slice = false,
        Some("slice") => out.slice = true,
        Some(other) => {
            return Err(invalid_view_box(src, format!("unknown mode {:?}", other)))
        }
    }
    if tokens.next().is_some() {
        return Err(invalid_view_box(src, "trailing tokens"));
    }

    Ok(out)
}

fn parse_alignment(token: &str) -> Option<(AlignFactor, AlignFactor)> {
    if token.len() != 8 || !token.starts_with('x') {
        return None;
    }
    let x = match &token[1..4] {
        "Min" => AlignFactor::Min,
        "Mid" => AlignFactor::Mid,
        "Max" => AlignFactor::Max,
        _ => return None,
    };
    if &token[4..5] != "Y" {
        return None;
    }
    let y = match &token[5..8] {
        "Min" => AlignFactor::Min,
        "Mid" => AlignFactor::Mid,
        "Max" => AlignFactor::Max,
        _ => return None,
    };
    Some((x, y))
}

/// The viewBox-to-viewport matrix (SVG 2 equivalent algorithm).
pub fn view_box_transform(
    vb: &ViewBox,
    viewport_width: &Decimal,
    viewport_height: &Decimal,
    par: &PreserveAspectRatio,
    cx: &Context,
) -> Result<Matrix, ErrorKind> {
    let sx = cx.div(viewport_width, &vb.width).map_err(ErrorKind::Numeric)?;
    let sy = cx
        .div(viewport_height, &vb.height)
        .map_err(ErrorKind::Numeric)?;
    let move_origin = affine::translation(&-&vb.min_x, &-&vb.min_y);

    let m = match par.align {
        // Non-uniform stretch.
        None => affine::scale(&sx, &sy)
            .mul(&move_origin, cx)
            .map_err(ErrorKind::LinAlg)?,
        Some((ax, ay)) => {
            let s = if par.slice {
                sx.clone().max(sy)
            } else {
                sx.clone().min(sy)
            };
            let leftover_x = viewport_width - &cx.round(&(&vb.width * &s));
            let leftover_y = viewport_height - &cx.round(&(&vb.height * &s));
            let tx = cx.round(&(&ax.fraction() * &leftover_x));
            let ty = cx.round(&(&ay.fraction() * &leftover_y));
            affine::translation(&tx, &ty)
                .mul(&affine::scale_uniform(&s), cx)
                .map_err(ErrorKind::LinAlg)?
                .mul(&move_origin, cx)
                .map_err(ErrorKind::LinAlg)?
        }
    };
    Ok(m)
}

/// Bake a 3×3 matrix into path data.
///
/// The input is canonicalized to absolute `{M, L, C, Q, A, Z}` first.
/// Point-bearing commands transform their coordinate pairs; arcs keep
/// their command form with recomputed radii, rotation and sweep.
pub fn apply_to_path(path: &Path, m: &Matrix, cx: &Context) -> Result<Path, ErrorKind> {
    let absolute = path_to_absolute(path);
    let mut out = Vec::with_capacity(absolute.len());

    for cmd in absolute.iter() {
        let a = &cmd.args;
        match cmd.verb {
            Verb::MoveTo | Verb::LineTo => {
                let p = transform_point(m, &a[0], &a[1], cx)?;
                out.push(PathCommand::new(cmd.verb, false, vec![p.x, p.y]));
            }
            Verb::CurveTo => {
                let c1 = transform_point(m, &a[0], &a[1], cx)?;
                let c2 = transform_point(m, &a[2], &a[3], cx)?;
                let to = transform_point(m, &a[4], &a[5], cx)?;
                out.push(PathCommand::new(
                    Verb::CurveTo,
                    false,
                    vec![c1.x, c1.y, c2.x, c2.y, to.x, to.y],
                ));
            }
            Verb::QuadraticTo => {
                let c = transform_point(m, &a[0], &a[1], cx)?;
                let to = transform_point(m, &a[2], &a[3], cx)?;
                out.push(PathCommand::new(
                    Verb::QuadraticTo,
                    false,
                    vec![c.x, c.y, to.x, to.y],
                ));
            }
            Verb::ArcTo => {
                out.push(transform_arc(m, a, cx)?);
            }
            Verb::ClosePath => out.push(cmd.clone()),
            _ => out.push(cmd.clone()),
        }
    }

    Ok(Path::from_commands(out))
}

pub(crate) fn transform_point(
    m: &Matrix,
    x: &Decimal,
    y: &Decimal,
    cx: &Context,
) -> Result<Point, ErrorKind> {
    affine::apply_to_point(m, &point(x.clone(), y.clone()), cx).map_err(ErrorKind::LinAlg)
}

// Principal-vector method: u₁ = (rx·cosφ, rx·sinφ), u₂ = (−ry·sinφ,
// ry·cosφ) through the linear part give the new radii and rotation; the
// sweep flips when the determinant is negative.
fn transform_arc(m: &Matrix, args: &[Decimal], cx: &Context) -> Result<PathCommand, ErrorKind> {
    let rx = &args[0];
    let ry = &args[1];
    let phi = cx.to_radians(&args[2]);
    let (sin_phi, cos_phi) = (cx.sin(&phi), cx.cos(&phi));

    let linear = |vx: &Decimal, vy: &Decimal| -> (Decimal, Decimal) {
        (
            cx.round(&(&(m.get(0, 0) * vx) + &(m.get(0, 1) * vy))),
            cx.round(&(&(m.get(1, 0) * vx) + &(m.get(1, 1) * vy))),
        )
    };

    let u1 = linear(&cx.round(&(rx * &cos_phi)), &cx.round(&(rx * &sin_phi)));
    let u2 = linear(&cx.round(&-(ry * &sin_phi)), &cx.round(&(ry * &cos_phi)));

    let new_rx = cx
        .sqrt(&(&(&u1.0 * &u1.0) + &(&u1.1 * &u1.1)))
        .map_err(ErrorKind::Numeric)?;
    let new_ry = cx
        .sqrt(&(&(&u2.0 * &u2.0) + &(&u2.1 * &u2.1)))
        .map_err(ErrorKind::Numeric)?;
    let rotation = cx.to_degrees(&cx.atan2(&u1.1, &u1.0));

    let det = &(m.get(0, 0) * m.get(1, 1)) - &(m.get(0, 1) * m.get(1, 0));
    let sweep = if det.is_negative() {
        &Decimal::one() - &args[4]
    } else {
        args[4].clone()
    };

    let endpoint = transform_point(m, &args[5], &args[6], cx)?;

    Ok(PathCommand::new(
        Verb::ArcTo,
        false,
        vec![
            new_rx,
            new_ry,
            rotation,
            args[3].clone(),
            sweep,
            endpoint.x,
            endpoint.y,
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use svgbake_path::parser::parse_path;
    use svgbake_path::serialize::path_to_string;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn apply(m: &Matrix, x: &str, y: &str, cx: &Context) -> Point {
        transform_point(m, &dec(x), &dec(y), cx).unwrap()
    }

    #[test]
    fn translate_and_scale_compose_textually() {
        let cx = Context::default();
        let m = parse_transform_list("translate(10,20) scale(2)", &cx).unwrap();
        // Scale applies first.
        let p = apply(&m, "100", "100", &cx);
        assert_eq!(p, point(dec("210"), dec("220")));
    }

    #[test]
    fn rotate_with_center() {
        let cx = Context::default();
        let m = parse_transform_list("rotate(90, 5, 5)", &cx).unwrap();
        let p = apply(&m, "6", "5", &cx);
        assert!(p.approx_eq(&point(dec("5"), dec("6")), &cx.tolerance()));
    }

    #[test]
    fn skew_and_matrix_forms() {
        let cx = Context::default();
        let m = parse_transform_list("skewX(45)", &cx).unwrap();
        let p = apply(&m, "0", "1", &cx);
        assert!(p.approx_eq(&point(dec("1"), dec("1")), &cx.tolerance()));

        let m = parse_transform_list("matrix(1, 0, 0, 1, 7, -3)", &cx).unwrap();
        let p = apply(&m, "1", "1", &cx);
        assert_eq!(p, point(dec("8"), dec("-2")));
    }

    #[test]
    fn case_insensitive_names_and_separators() {
        let cx = Context::default();
        let m = parse_transform_list("  TRANSLATE( 1 , 2 ) , Scale(3)  ", &cx).unwrap();
        let p = apply(&m, "1", "1", &cx);
        assert_eq!(p, point(dec("4"), dec("5")));
    }

    #[test]
    fn transform_errors() {
        let cx = Context::default();
        assert!(matches!(
            parse_transform_list("wobble(1)", &cx),
            Err(ErrorKind::InvalidTransform { .. })
        ));
        assert!(matches!(
            parse_transform_list("scale(1", &cx),
            Err(ErrorKind::InvalidTransform { .. })
        ));
        assert!(matches!(
            parse_transform_list("scale(1,2,3)", &cx),
            Err(ErrorKind::InvalidTransform { .. })
        ));
        assert!(matches!(
            parse_transform_list("scale(x)", &cx),
            Err(ErrorKind::InvalidTransform { .. })
        ));
    }

    #[test]
    fn view_box_parsing() {
        let vb = parse_view_box("0 0 100 50").unwrap();
        assert_eq!(vb.width, dec("100"));
        assert!(matches!(
            parse_view_box("0 0 100"),
            Err(ErrorKind::InvalidViewBox { .. })
        ));
        assert!(matches!(
            parse_view_box("0 0 0 50"),
            Err(ErrorKind::InvalidViewBox { .. })
        ));
    }

    #[test]
    fn preserve_aspect_ratio_parsing() {
        let par = parse_preserve_aspect_ratio("xMidYMid meet").unwrap();
        assert_eq!(par, PreserveAspectRatio::DEFAULT);
        let par = parse_preserve_aspect_ratio("defer xMaxYMin slice").unwrap();
        assert!(par.defer);
        assert!(par.slice);
        assert_eq!(par.align, Some((AlignFactor::Max, AlignFactor::Min)));
        let par = parse_preserve_aspect_ratio("none").unwrap();
        assert_eq!(par.align, None);
        assert!(parse_preserve_aspect_ratio("xMidYMid stretch").is_err());
    }

    #[test]
    fn view_box_none_stretches() {
        let cx = Context::default();
        let vb = parse_view_box("10 20 100 50").unwrap();
        let par = parse_preserve_aspect_ratio("none").unwrap();
        let m = view_box_transform(&vb, &dec("200"), &dec("200"), &par, &cx).unwrap();
        // (10,20) lands on the origin, (110,70) on (200,200).
        assert!(apply(&m, "10", "20", &cx).approx_eq(&point(dec("0"), dec("0")), &cx.tolerance()));
        assert!(apply(&m, "110", "70", &cx)
            .approx_eq(&point(dec("200"), dec("200")), &cx.tolerance()));
    }

    #[test]
    fn view_box_meet_centers() {
        let cx = Context::default();
        // 100×50 into a 200×200 viewport, xMidYMid meet: uniform scale 2,
        // centered vertically with 50 spare on each side.
        let vb = parse_view_box("0 0 100 50").unwrap();
        let m = view_box_transform(
            &vb,
            &dec("200"),
            &dec("200"),
            &PreserveAspectRatio::DEFAULT,
            &cx,
        )
        .unwrap();
        assert!(apply(&m, "0", "0", &cx).approx_eq(&point(dec("0"), dec("50")), &cx.tolerance()));
        assert!(apply(&m, "100", "50", &cx)
            .approx_eq(&point(dec("200"), dec("150")), &cx.tolerance()));
    }

    #[test]
    fn view_box_slice_overflows() {
        let cx = Context::default();
        // Same box with slice: uniform scale 4, x overflows, centered.
        let vb = parse_view_box("0 0 100 50").unwrap();
        let par = parse_preserve_aspect_ratio("xMidYMid slice").unwrap();
        let m = view_box_transform(&vb, &dec("200"), &dec("200"), &par, &cx).unwrap();
        assert!(apply(&m, "0", "0", &cx)
            .approx_eq(&point(dec("-100"), dec("0")), &cx.tolerance()));
        assert!(apply(&m, "100", "50", &cx)
            .approx_eq(&point(dec("300"), dec("200")), &cx.tolerance()));
    }

    #[test]
    fn bake_points_into_path() {
        let cx = Context::default();
        let m = parse_transform_list("translate(10,0) scale(2)", &cx).unwrap();
        let path = parse_path("M 0 0 L 10 0").unwrap();
        let baked = apply_to_path(&path, &m, &cx).unwrap();
        assert_eq!(path_to_string(&baked, 6), "M 10 0 L 30 0");
    }

    #[test]
    fn bake_mirrored_arc() {
        let cx = Context::default();
        // scale(-1,1) mirrors: sweep flips, endpoint negates, radii keep,
        // rotation lands on 180°.
        let m = parse_transform_list("scale(-1,1)", &cx).unwrap();
        let path = parse_path("M 0 0 A 50 30 0 0 1 100 0").unwrap();
        let baked = apply_to_path(&path, &m, &cx).unwrap();
        let arc = baked.iter().find(|c| c.verb == Verb::ArcTo).unwrap();
        assert!(arc.args[0].approx_eq(&dec("50"), &cx.tolerance()));
        assert!(arc.args[1].approx_eq(&dec("30"), &cx.tolerance()));
        assert!(arc.args[2].approx_eq(&dec("180"), &cx.tolerance()));
        assert_eq!(arc.args[4], Decimal::zero());
        assert!(arc.args[5].approx_eq(&dec("-100"), &cx.tolerance()));
        assert!(arc.args[6].approx_eq(&dec("0"), &cx.tolerance()));
    }

    #[test]
    fn bake_rotated_arc_radii() {
        let cx = Context::default();
        // Pure rotation keeps the radii and shifts the x-rotation.
        let m = parse_transform_list("rotate(30)", &cx).unwrap();
        let path = parse_path("M 0 0 A 40 20 10 1 0 50 0").unwrap();
        let baked = apply_to_path(&path, &m, &cx).unwrap();
        let arc = baked.iter().find(|c| c.verb == Verb::ArcTo).unwrap();
        assert!(arc.args[0].approx_eq(&dec("40"), &cx.tolerance()));
        assert!(arc.args[1].approx_eq(&dec("20"), &cx.tolerance()));
        assert!(arc.args[2].approx_eq(&dec("40"), &cx.tolerance()));
        // Flags untouched under a positive determinant.
        assert_eq!(arc.args[3], Decimal::one());
        assert_eq!(arc.args[4], Decimal::zero());
    }
}
