//! Path canonicalization.
//!
//! [`path_to_absolute`] rewrites a parsed path so that every command is
//! absolute and drawn from the verb set `{M, L, C, Q, A, Z}`: horizontal
//! and vertical line-tos become plain line-tos, and the smooth variants
//! get their reflected control point materialized. [`path_to_cubics`]
//! additionally raises quadratics to cubics, leaving `{M, L, C, A, Z}`.
//!
//! Arcs survive canonicalization as arcs; they are never discretized.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Point};

use crate::{Path, PathCommand, Verb};

/// The running state threaded through a path walk.
#[derive(Clone, Debug)]
pub struct PathState {
    pub current: Point,
    pub subpath_start: Point,
    pub last_control: Option<Point>,
    pub last_verb: Option<Verb>,
}

impl PathState {
    pub fn new() -> PathState {
        PathState {
            current: Point::origin(),
            subpath_start: Point::origin(),
            last_control: None,
            last_verb: None,
        }
    }
}

impl Default for PathState {
    fn default() -> Self {
        PathState::new()
    }
}

fn resolve(x: &Decimal, y: &Decimal, relative: bool, current: &Point) -> Point {
    if relative {
        point(x + &current.x, y + &current.y)
    } else {
        point(x.clone(), y.clone())
    }
}

// 2·current − control.
fn reflect(current: &Point, control: &Point) -> Point {
    point(
        &(&current.x + &current.x) - &control.x,
        &(&current.y + &current.y) - &control.y,
    )
}

fn push(out: &mut Vec<PathCommand>, verb: Verb, args: Vec<Decimal>) {
    out.push(PathCommand::new(verb, false, args));
}

/// Expand a path to absolute coordinates and the canonical verb set
/// `{M, L, C, Q, A, Z}`.
pub fn path_to_absolute(path: &Path) -> Path {
    let mut out = Vec::with_capacity(path.len());
    let mut st = PathState::new();

    for cmd in path.iter() {
        let rel = cmd.relative;
        let a = &cmd.args;
        match cmd.verb {
            Verb::MoveTo => {
                let p = resolve(&a[0], &a[1], rel, &st.current);
                push(&mut out, Verb::MoveTo, vec![p.x.clone(), p.y.clone()]);
                st.subpath_start = p.clone();
                st.current = p;
                st.last_control = None;
                st.last_verb = Some(Verb::MoveTo);
            }
            Verb::LineTo => {
                let p = resolve(&a[0], &a[1], rel, &st.current);
                push(&mut out, Verb::LineTo, vec![p.x.clone(), p.y.clone()]);
                st.current = p;
                st.last_control = None;
                st.last_verb = Some(Verb::LineTo);
            }
            Verb::HorizontalTo => {
                let x = if rel { &a[0] + &st.current.x } else { a[0].clone() };
                let p = point(x, st.current.y.clone());
                push(&mut out, Verb::LineTo, vec![p.x.clone(), p.y.clone()]);
                st.current = p;
                st.last_control = None;
                st.last_verb = Some(Verb::LineTo);
            }
            Verb::VerticalTo => {
                let y = if rel { &a[0] + &st.current.y } else { a[0].clone() };
                let p = point(st.current.x.clone(), y);
                push(&mut out, Verb::LineTo, vec![p.x.clone(), p.y.clone()]);
                st.current = p;
                st.last_control = None;
                st.last_verb = Some(Verb::LineTo);
            }
            Verb::CurveTo => {
                let c1 = resolve(&a[0], &a[1], rel, &st.current);
                let c2 = resolve(&a[2], &a[3], rel, &st.current);
                let to = resolve(&a[4], &a[5], rel, &st.current);
                push(
                    &mut out,
                    Verb::CurveTo,
                    vec![c1.x, c1.y, c2.x.clone(), c2.y.clone(), to.x.clone(), to.y.clone()],
                );
                st.current = to;
                st.last_control = Some(c2);
                st.last_verb = Some(Verb::CurveTo);
            }
            Verb::SmoothCurveTo => {
                let c1 = match (&st.last_verb, &st.last_control) {
                    (Some(Verb::CurveTo), Some(prev)) => reflect(&st.current, prev),
                    _ => st.current.clone(),
                };
                let c2 = resolve(&a[0], &a[1], rel, &st.current);
                let to = resolve(&a[2], &a[3], rel, &st.current);
                push(
                    &mut out,
                    Verb::CurveTo,
                    vec![c1.x, c1.y, c2.x.clone(), c2.y.clone(), to.x.clone(), to.y.clone()],
                );
                st.current = to;
                st.last_control = Some(c2);
                st.last_verb = Some(Verb::CurveTo);
            }
            Verb::QuadraticTo => {
                let c = resolve(&a[0], &a[1], rel, &st.current);
                let to = resolve(&a[2], &a[3], rel, &st.current);
                push(
                    &mut out,
                    Verb::QuadraticTo,
                    vec![c.x.clone(), c.y.clone(), to.x.clone(), to.y.clone()],
                );
                st.current = to;
                st.last_control = Some(c);
                st.last_verb = Some(Verb::QuadraticTo);
            }
            Verb::SmoothQuadraticTo => {
                let c = match (&st.last_verb, &st.last_control) {
                    (Some(Verb::QuadraticTo), Some(prev)) => reflect(&st.current, prev),
                    _ => st.current.clone(),
                };
                let to = resolve(&a[0], &a[1], rel, &st.current);
                push(
                    &mut out,
                    Verb::QuadraticTo,
                    vec![c.x.clone(), c.y.clone(), to.x.clone(), to.y.clone()],
                );
                st.current = to;
                st.last_control = Some(c);
                st.last_verb = Some(Verb::QuadraticTo);
            }
            Verb::ArcTo => {
                let to = resolve(&a[5], &a[6], rel, &st.current);
                // Negative radii take their absolute value, per SVG.
                push(
                    &mut out,
                    Verb::ArcTo,
                    vec![
                        a[0].abs(),
                        a[1].abs(),
                        a[2].clone(),
                        a[3].clone(),
                        a[4].clone(),
                        to.x.clone(),
                        to.y.clone(),
                    ],
                );
                st.current = to;
                st.last_control = None;
                st.last_verb = Some(Verb::ArcTo);
            }
            Verb::ClosePath => {
                push(&mut out, Verb::ClosePath, Vec::new());
                st.current = st.subpath_start.clone();
                st.last_control = None;
                st.last_verb = Some(Verb::ClosePath);
            }
        }
    }

    Path::from_commands(out)
}

/// Canonicalize to absolute commands and raise quadratics to cubics by
/// the 2/3 rule, leaving the verb set `{M, L, C, A, Z}`.
pub fn path_to_cubics(path: &Path, cx: &Context) -> Path {
    let absolute = path_to_absolute(path);
    let two_thirds = match cx.div(&Decimal::from(2), &Decimal::from(3)) {
        Ok(v) => v,
        Err(_) => unreachable!("3 is not zero"),
    };

    let mut out = Vec::with_capacity(absolute.len());
    let mut current = Point::origin();
    let mut subpath_start = Point::origin();

    for cmd in absolute.iter() {
        let a = &cmd.args;
        match cmd.verb {
            Verb::QuadraticTo => {
                let c = point(a[0].clone(), a[1].clone());
                let to = point(a[2].clone(), a[3].clone());
                // c1 = from + 2/3·(c − from), c2 = to + 2/3·(c − to)
                let c1x = cx.round(&(&current.x + &(&two_thirds * &(&c.x - &current.x))));
                let c1y = cx.round(&(&current.y + &(&two_thirds * &(&c.y - &current.y))));
                let c2x = cx.round(&(&to.x + &(&two_thirds * &(&c.x - &to.x))));
                let c2y = cx.round(&(&to.y + &(&two_thirds * &(&c.y - &to.y))));
                out.push(PathCommand::new(
                    Verb::CurveTo,
                    false,
                    vec![c1x, c1y, c2x, c2y, to.x.clone(), to.y.clone()],
                ));
                current = to;
            }
            Verb::MoveTo => {
                current = point(a[0].clone(), a[1].clone());
                subpath_start = current.clone();
                out.push(cmd.clone());
            }
            Verb::LineTo => {
                current = point(a[0].clone(), a[1].clone());
                out.push(cmd.clone());
            }
            Verb::CurveTo => {
                current = point(a[4].clone(), a[5].clone());
                out.push(cmd.clone());
            }
            Verb::ArcTo => {
                current = point(a[5].clone(), a[6].clone());
                out.push(cmd.clone());
            }
            Verb::ClosePath => {
                current = subpath_start.clone();
                out.push(cmd.clone());
            }
            _ => out.push(cmd.clone()),
        }
    }

    Path::from_commands(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_path;
    use crate::serialize::path_to_string;

    fn canon(src: &str) -> String {
        path_to_string(&path_to_absolute(&parse_path(src).unwrap()), 6)
    }

    #[test]
    fn relative_to_absolute() {
        assert_eq!(canon("m 10 20 l 5 5"), "M 10 20 L 15 25");
        assert_eq!(canon("m 10 20 10 0"), "M 10 20 L 20 20");
    }

    #[test]
    fn horizontal_and_vertical() {
        assert_eq!(canon("M 1 2 H 10 V 20"), "M 1 2 L 10 2 L 10 20");
        assert_eq!(canon("M 1 2 h 10 v 20"), "M 1 2 L 11 2 L 11 22");
    }

    #[test]
    fn smooth_cubic_reflection() {
        // S reflects the previous second control point through the
        // current point: 2·(10,0) − (7.5,-5) = (12.5, 5).
        assert_eq!(
            canon("M 0 0 C 2.5 -5 7.5 -5 10 0 S 17.5 5 20 0"),
            "M 0 0 C 2.5 -5 7.5 -5 10 0 C 12.5 5 17.5 5 20 0"
        );
        // With no preceding curve, the first control is the current point.
        assert_eq!(
            canon("M 0 0 S 10 10 20 0"),
            "M 0 0 C 0 0 10 10 20 0"
        );
    }

    #[test]
    fn smooth_quadratic_reflection() {
        assert_eq!(
            canon("M 0 0 Q 5 10 10 0 T 20 0"),
            "M 0 0 Q 5 10 10 0 Q 15 -10 20 0"
        );
        // T after a line does not reflect.
        assert_eq!(canon("M 0 0 L 5 0 T 10 0"), "M 0 0 L 5 0 Q 5 0 10 0");
    }

    #[test]
    fn close_restores_start() {
        assert_eq!(
            canon("M 5 5 l 10 0 Z l 1 1"),
            "M 5 5 L 15 5 Z L 6 6"
        );
    }

    #[test]
    fn relative_arc_endpoint() {
        assert_eq!(
            canon("M 100 100 a 25 30 0 0 1 50 -25"),
            "M 100 100 A 25 30 0 0 1 150 75"
        );
    }

    #[test]
    fn negative_radii_normalized() {
        assert_eq!(
            canon("M 0 0 A -25 30 0 1 0 10 10"),
            "M 0 0 A 25 30 0 1 0 10 10"
        );
    }

    #[test]
    fn quadratics_raised_to_cubics() {
        let cx = Context::default();
        let path = parse_path("M 0 0 Q 3 6 6 0").unwrap();
        let cubic = path_to_cubics(&path, &cx);
        assert_eq!(path_to_string(&cubic, 6), "M 0 0 C 2 4 4 4 6 0");
    }

    #[test]
    fn cubics_mode_keeps_lines_and_arcs() {
        let cx = Context::default();
        let path = parse_path("M 0 0 L 5 5 A 1 1 0 0 1 7 7 Z").unwrap();
        let cubic = path_to_cubics(&path, &cx);
        let verbs: Vec<Verb> = cubic.iter().map(|c| c.verb).collect();
        assert_eq!(
            verbs,
            vec![Verb::MoveTo, Verb::LineTo, Verb::ArcTo, Verb::ClosePath]
        );
    }

    #[test]
    fn absolute_is_idempotent() {
        let src = "m 1 2 c 1 1 2 2 3 3 s 1 -1 2 0 q 1 1 2 2 t 1 0 h 4 v -2 a 5 5 0 1 0 1 1 z";
        let once = path_to_absolute(&parse_path(src).unwrap());
        let twice = path_to_absolute(&once);
        assert_eq!(once, twice);
    }
}
