//! Conversion of SVG basic shapes to path data.
//!
//! Circles and ellipses come in two flavors: the classic four-cubic
//! approximation with κ = 4/3·(√2 − 1), and an N-arc version using the
//! optimal control distance L = (4/3)·tan(θ/4) per arc, whose maximum
//! radial error shrinks like θ⁴/1440.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Point};
use svgbake_path::{Path, PathCommand, Verb};

use crate::GeometryError;

fn half(value: &Decimal) -> Decimal {
    value * &(Decimal::pow10(-1) * Decimal::from(5))
}

fn cmd(verb: Verb, args: Vec<Decimal>) -> PathCommand {
    PathCommand::new(verb, false, args)
}

/// κ = 4/3·(√2 − 1), the control distance for a quarter-circle cubic.
pub fn kappa(cx: &Context) -> Result<Decimal, GeometryError> {
    let sqrt2 = cx.sqrt(&Decimal::from(2))?;
    let four_thirds = cx.div(&Decimal::from(4), &Decimal::from(3))?;
    Ok(cx.round(&(&four_thirds * &(&sqrt2 - &Decimal::one()))))
}

/// Convert a rect, clamping the corner radii to half the width/height.
///
/// With zero radii this is a plain four-corner outline. Rounded corners
/// are emitted as `A` commands when `use_arcs` is set and as cubics
/// otherwise.
pub fn rect_to_path(
    x: &Decimal,
    y: &Decimal,
    width: &Decimal,
    height: &Decimal,
    rx: &Decimal,
    ry: &Decimal,
    use_arcs: bool,
    cx: &Context,
) -> Result<Path, GeometryError> {
    let right = x + width;
    let bottom = y + height;

    if rx.is_zero() && ry.is_zero() {
        return Ok(Path::from_commands(vec![
            cmd(Verb::MoveTo, vec![x.clone(), y.clone()]),
            cmd(Verb::LineTo, vec![right.clone(), y.clone()]),
            cmd(Verb::LineTo, vec![right, bottom.clone()]),
            cmd(Verb::LineTo, vec![x.clone(), bottom]),
            cmd(Verb::ClosePath, Vec::new()),
        ]));
    }

    let rx = rx.abs().min(half(width));
    let ry = ry.abs().min(half(height));
    let x1 = x + &rx;
    let x2 = &right - &rx;
    let y1 = y + &ry;
    let y2 = &bottom - &ry;

    let mut commands = vec![
        cmd(Verb::MoveTo, vec![x1.clone(), y.clone()]),
        cmd(Verb::LineTo, vec![x2.clone(), y.clone()]),
    ];

    // The four corners, clockwise from the top-right.
    let corners = [
        ((x2.clone(), y.clone()), (right.clone(), y1.clone())),
        ((right.clone(), y2.clone()), (x2.clone(), bottom.clone())),
        ((x1.clone(), bottom.clone()), (x.clone(), y2.clone())),
        ((x.clone(), y1.clone()), (x1.clone(), y.clone())),
    ];
    let edges = [
        Some((right.clone(), y2.clone())),
        Some((x1.clone(), bottom.clone())),
        Some((x.clone(), y1.clone())),
        None,
    ];

    let k = if use_arcs { None } else { Some(kappa(cx)?) };
    for (i, ((sx, sy), (ex, ey))) in corners.iter().enumerate() {
        match &k {
            None => commands.push(cmd(
                Verb::ArcTo,
                vec![
                    rx.clone(),
                    ry.clone(),
                    Decimal::zero(),
                    Decimal::zero(),
                    Decimal::one(),
                    ex.clone(),
                    ey.clone(),
                ],
            )),
            Some(k) => {
                let kx = cx.round(&(k * &rx));
                let ky = cx.round(&(k * &ry));
                // Control points stretch from each endpoint toward the
                // corner of the bounding box.
                let (c1x, c1y, c2x, c2y) = match i {
                    0 => (sx + &kx, sy.clone(), ex.clone(), ey - &ky),
                    1 => (sx.clone(), sy + &ky, ex + &kx, ey.clone()),
                    2 => (sx - &kx, sy.clone(), ex.clone(), ey + &ky),
                    _ => (sx.clone(), sy - &ky, ex - &kx, ey.clone()),
                };
                commands.push(cmd(
                    Verb::CurveTo,
                    vec![c1x, c1y, c2x, c2y, ex.clone(), ey.clone()],
                ));
            }
        }
        if let Some((lx, ly)) = &edges[i] {
            commands.push(cmd(Verb::LineTo, vec![lx.clone(), ly.clone()]));
        }
    }
    commands.push(cmd(Verb::ClosePath, Vec::new()));

    Ok(Path::from_commands(commands))
}

/// Classic four-cubic circle approximation.
pub fn circle_to_path(
    center_x: &Decimal,
    center_y: &Decimal,
    r: &Decimal,
    cx: &Context,
) -> Result<Path, GeometryError> {
    ellipse_to_path(center_x, center_y, r, r, cx)
}

/// Classic four-cubic ellipse approximation with κ-scaled controls.
pub fn ellipse_to_path(
    center_x: &Decimal,
    center_y: &Decimal,
    rx: &Decimal,
    ry: &Decimal,
    cx: &Context,
) -> Result<Path, GeometryError> {
    let k = kappa(cx)?;
    let kx = cx.round(&(&k * rx));
    let ky = cx.round(&(&k * ry));
    let right = center_x + rx;
    let left = center_x - rx;
    let top = center_y - ry;
    let bottom = center_y + ry;

    Ok(Path::from_commands(vec![
        cmd(Verb::MoveTo, vec![right.clone(), center_y.clone()]),
        cmd(
            Verb::CurveTo,
            vec![
                right.clone(),
                center_y + &ky,
                center_x + &kx,
                bottom.clone(),
                center_x.clone(),
                bottom.clone(),
            ],
        ),
        cmd(
            Verb::CurveTo,
            vec![
                center_x - &kx,
                bottom,
                left.clone(),
                center_y + &ky,
                left.clone(),
                center_y.clone(),
            ],
        ),
        cmd(
            Verb::CurveTo,
            vec![
                left,
                center_y - &ky,
                center_x - &kx,
                top.clone(),
                center_x.clone(),
                top.clone(),
            ],
        ),
        cmd(
            Verb::CurveTo,
            vec![
                center_x + &kx,
                top,
                right.clone(),
                center_y - &ky,
                right,
                center_y.clone(),
            ],
        ),
        cmd(Verb::ClosePath, Vec::new()),
    ]))
}

/// High-precision circle: `arcs` cubic Béziers (rounded up to a multiple
/// of four).
pub fn circle_to_path_n(
    center_x: &Decimal,
    center_y: &Decimal,
    r: &Decimal,
    arcs: u32,
    cx: &Context,
) -> Result<Path, GeometryError> {
    ellipse_to_path_n(center_x, center_y, r, r, arcs, cx)
}

/// High-precision ellipse: N cubic arcs with the optimal control distance
/// L = (4/3)·tan(θ/4) where θ = 2π/N.
pub fn ellipse_to_path_n(
    center_x: &Decimal,
    center_y: &Decimal,
    rx: &Decimal,
    ry: &Decimal,
    arcs: u32,
    cx: &Context,
) -> Result<Path, GeometryError> {
    let n = (arcs.max(1) + 3) / 4 * 4;
    let theta = cx.div(&(&cx.pi() + &cx.pi()), &Decimal::from(n))?;
    let quarter_theta = half(&half(&theta));
    let four_thirds = cx.div(&Decimal::from(4), &Decimal::from(3))?;
    let l = cx.round(&(&four_thirds * &cx.tan(&quarter_theta)?));

    // Point and tangent at parameter angle a.
    let eval = |a: &Decimal| -> (Point, Point) {
        let (s, c) = (cx.sin(a), cx.cos(a));
        let p = point(
            cx.round(&(center_x + &(rx * &c))),
            cx.round(&(center_y + &(ry * &s))),
        );
        let tangent = point(cx.round(&-(rx * &s)), cx.round(&(ry * &c)));
        (p, tangent)
    };

    let start_angle = Decimal::zero();
    let (start, _) = eval(&start_angle);
    let mut commands = vec![cmd(Verb::MoveTo, vec![start.x, start.y])];

    for i in 0..n {
        let a0 = cx.round(&(&theta * &Decimal::from(i)));
        let a1 = cx.round(&(&theta * &Decimal::from(i + 1)));
        let (p0, t0) = eval(&a0);
        let (p1, t1) = eval(&a1);
        let c1x = cx.round(&(&p0.x + &(&l * &t0.x)));
        let c1y = cx.round(&(&p0.y + &(&l * &t0.y)));
        let c2x = cx.round(&(&p1.x - &(&l * &t1.x)));
        let c2y = cx.round(&(&p1.y - &(&l * &t1.y)));
        commands.push(cmd(
            Verb::CurveTo,
            vec![c1x, c1y, c2x, c2y, p1.x, p1.y],
        ));
    }
    commands.push(cmd(Verb::ClosePath, Vec::new()));

    Ok(Path::from_commands(commands))
}

pub fn line_to_path(x1: &Decimal, y1: &Decimal, x2: &Decimal, y2: &Decimal) -> Path {
    Path::from_commands(vec![
        cmd(Verb::MoveTo, vec![x1.clone(), y1.clone()]),
        cmd(Verb::LineTo, vec![x2.clone(), y2.clone()]),
    ])
}

/// A straight-line chain through `points`.
pub fn polyline_to_path(points: &[Point]) -> Path {
    let mut commands = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let verb = if i == 0 { Verb::MoveTo } else { Verb::LineTo };
        commands.push(cmd(verb, vec![p.x.clone(), p.y.clone()]));
    }
    Path::from_commands(commands)
}

/// Like [`polyline_to_path`] but closed with `Z`.
pub fn polygon_to_path(points: &[Point]) -> Path {
    let mut path = polyline_to_path(points);
    if !path.is_empty() {
        path.push(cmd(Verb::ClosePath, Vec::new()));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use svgbake_linalg::point;
    use svgbake_path::serialize::path_to_string;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn kappa_value() {
        let cx = Context::default();
        let k = kappa(&cx).unwrap();
        assert!(k.approx_eq(&dec("0.5522847498307933984"), &Decimal::pow10(-18)));
    }

    #[test]
    fn sharp_rect() {
        let cx = Context::default();
        let path = rect_to_path(
            &dec("1"),
            &dec("2"),
            &dec("10"),
            &dec("20"),
            &Decimal::zero(),
            &Decimal::zero(),
            false,
            &cx,
        )
        .unwrap();
        assert_eq!(
            path_to_string(&path, 6),
            "M 1 2 L 11 2 L 11 22 L 1 22 Z"
        );
    }

    #[test]
    fn rounded_rect_clamps_radii() {
        let cx = Context::default();
        // rx 60 clamps to 50, ry 30 clamps to 25.
        let path = rect_to_path(
            &dec("0"),
            &dec("0"),
            &dec("100"),
            &dec("50"),
            &dec("60"),
            &dec("30"),
            false,
            &cx,
        )
        .unwrap();
        let text = path_to_string(&path, 6);
        assert!(text.starts_with("M 50 0"));
        let cubics = path.iter().filter(|c| c.verb == Verb::CurveTo).count();
        assert_eq!(cubics, 4);
        assert!(text.ends_with('Z'));
    }

    #[test]
    fn rounded_rect_with_arcs() {
        let cx = Context::default();
        let path = rect_to_path(
            &dec("0"),
            &dec("0"),
            &dec("40"),
            &dec("40"),
            &dec("10"),
            &dec("10"),
            true,
            &cx,
        )
        .unwrap();
        let arcs = path.iter().filter(|c| c.verb == Verb::ArcTo).count();
        assert_eq!(arcs, 4);
        // First corner: from (30,0) to (40,10).
        let arc = path
            .iter()
            .find(|c| c.verb == Verb::ArcTo)
            .unwrap();
        assert_eq!(arc.args[5], dec("40"));
        assert_eq!(arc.args[6], dec("10"));
    }

    #[test]
    fn legacy_circle_passes_cardinal_points() {
        let cx = Context::default();
        let path = circle_to_path(&dec("100"), &dec("100"), &dec("50"), &cx).unwrap();
        let text = path_to_string(&path, 6);
        assert!(text.starts_with("M 150 100"));
        let cubics = path.iter().filter(|c| c.verb == Verb::CurveTo).count();
        assert_eq!(cubics, 4);
        // Cardinal endpoints appear exactly.
        for expected in ["100 150", "50 100", "100 50"] {
            assert!(text.contains(expected), "{} missing {}", text, expected);
        }
    }

    #[test]
    fn n_arc_circle_rounds_up_to_multiple_of_four() {
        let cx = Context::default();
        // 6 rounds up to 8 arcs.
        let path = circle_to_path_n(&dec("0"), &dec("0"), &dec("1"), 6, &cx).unwrap();
        let cubics = path.iter().filter(|c| c.verb == Verb::CurveTo).count();
        assert_eq!(cubics, 8);
    }

    #[test]
    fn n_arc_circle_radial_error_bound() {
        let cx = Context::default();
        let n = 16u32;
        let path = circle_to_path_n(&dec("0"), &dec("0"), &dec("1"), n, &cx).unwrap();

        // Sample every cubic at its midpoint and check the radius error
        // stays under 10·θ⁴/1440.
        let theta = cx.div(&(&cx.pi() + &cx.pi()), &Decimal::from(n)).unwrap();
        let theta2 = &theta * &theta;
        let bound = cx
            .div(
                &(&(&theta2 * &theta2) * &Decimal::from(10)),
                &Decimal::from(1440),
            )
            .unwrap();

        let first = path
            .iter()
            .find(|c| c.verb == Verb::CurveTo)
            .unwrap();
        let p0 = point(dec("1"), dec("0"));
        let c1 = point(first.args[0].clone(), first.args[1].clone());
        let c2 = point(first.args[2].clone(), first.args[3].clone());
        let p3 = point(first.args[4].clone(), first.args[5].clone());

        // Bernstein evaluation at t = 1/4; all coefficients are exact
        // decimals. The worst radial deviation sits between the endpoint
        // and the arc midpoint.
        let b0 = dec("0.421875"); // (3/4)³
        let b1 = dec("0.421875"); // 3·(3/4)²·(1/4)
        let b2 = dec("0.140625"); // 3·(3/4)·(1/4)²
        let b3 = dec("0.015625"); // (1/4)³
        let sample = point(
            &(&(&b0 * &p0.x) + &(&b1 * &c1.x)) + &(&(&b2 * &c2.x) + &(&b3 * &p3.x)),
            &(&(&b0 * &p0.y) + &(&b1 * &c1.y)) + &(&(&b2 * &c2.y) + &(&b3 * &p3.y)),
        );
        let radius = cx
            .sqrt(&(&(&sample.x * &sample.x) + &(&sample.y * &sample.y)))
            .unwrap();
        let error = (&radius - &Decimal::one()).abs();
        assert!(error < bound, "radial error {} over bound {}", error, bound);
    }

    #[test]
    fn polygon_closes() {
        let pts = [
            point(dec("0"), dec("0")),
            point(dec("10"), dec("0")),
            point(dec("5"), dec("8")),
        ];
        let path = polygon_to_path(&pts);
        assert_eq!(path_to_string(&path, 6), "M 0 0 L 10 0 L 5 8 Z");
        let open = polyline_to_path(&pts);
        assert_eq!(path_to_string(&open, 6), "M 0 0 L 10 0 L 5 8");
    }
}
