//! The polygon engine.
//!
//! Clip paths and masks are realized as polygon booleans: paths are
//! sampled to polygons at a configurable segment count, intersected with
//! Sutherland–Hodgman against a convex clip, and measured with the
//! shoelace formula. Everything stays in decimals; the only roundings are
//! the divisions at edge crossings and the curve parameter steps.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Point};
use svgbake_path::absolute::path_to_absolute;
use svgbake_path::{Path, Verb};

use crate::arc::SvgArc;
use crate::GeometryError;

/// An implicitly closed polygon.
///
/// Fewer than three vertices is a valid degenerate value meaning
/// "empty"; it shows up as the result of clipping away everything.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Polygon {
        Polygon { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when there are not enough vertices to enclose any area.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3
    }

    /// Shoelace sum; positive for counter-clockwise winding (in the
    /// y-up sense).
    pub fn signed_area(&self, cx: &Context) -> Decimal {
        if self.is_degenerate() {
            return Decimal::zero();
        }
        let mut doubled = Decimal::zero();
        let n = self.points.len();
        for i in 0..n {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            doubled += &(&(&a.x * &b.y) - &(&b.x * &a.y));
        }
        cx.round(&(&doubled * &half()))
    }

    /// Absolute enclosed area.
    pub fn area(&self, cx: &Context) -> Decimal {
        self.signed_area(cx).abs()
    }

    pub fn bounding_box(&self) -> Option<(Point, Point)> {
        let first = self.points.first()?;
        let mut min = first.clone();
        let mut max = first.clone();
        for p in &self.points[1..] {
            if p.x < min.x {
                min.x = p.x.clone();
            }
            if p.y < min.y {
                min.y = p.y.clone();
            }
            if p.x > max.x {
                max.x = p.x.clone();
            }
            if p.y > max.y {
                max.y = p.y.clone();
            }
        }
        Some((min, max))
    }

    /// Whether all turns go the same way. Collinear runs are tolerated.
    pub fn is_convex(&self) -> bool {
        if self.is_degenerate() {
            return false;
        }
        let n = self.points.len();
        let mut sign = 0;
        for i in 0..n {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            let c = &self.points[(i + 2) % n];
            let cross = cross_from(a, b, c);
            let s = cross.signum();
            if s == 0 {
                continue;
            }
            if sign == 0 {
                sign = s;
            } else if s != sign {
                return false;
            }
        }
        true
    }

    /// Ray cast along +x. A point within `tolerance` of an edge counts as
    /// inside.
    pub fn contains_point(
        &self,
        p: &Point,
        tolerance: &Decimal,
        cx: &Context,
    ) -> Result<bool, GeometryError> {
        if self.is_degenerate() {
            return Ok(false);
        }
        if !tolerance.is_zero() {
            if let Some(d) = self.min_distance_to_edge(p, cx)? {
                if d <= tolerance.abs() {
                    return Ok(true);
                }
            }
        }

        let n = self.points.len();
        let mut inside = false;
        for i in 0..n {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            if (a.y > p.y) != (b.y > p.y) {
                // x of the edge at the ray's height.
                let t = cx.div(&(&p.y - &a.y), &(&b.y - &a.y))?;
                let x = cx.round(&(&a.x + &(&t * &(&b.x - &a.x))));
                if x > p.x {
                    inside = !inside;
                }
            }
        }
        Ok(inside)
    }

    /// Exact minimum distance from `p` to the polygon outline. `None` for
    /// a polygon with no vertices.
    pub fn min_distance_to_edge(
        &self,
        p: &Point,
        cx: &Context,
    ) -> Result<Option<Decimal>, GeometryError> {
        if self.points.is_empty() {
            return Ok(None);
        }
        let n = self.points.len();
        let mut best_sq: Option<Decimal> = None;
        for i in 0..n {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            let d_sq = point_segment_distance_sq(p, a, b, cx)?;
            best_sq = Some(match best_sq {
                None => d_sq,
                Some(best) => best.min(d_sq),
            });
        }
        match best_sq {
            Some(d) => Ok(Some(cx.sqrt(&d)?)),
            None => Ok(None),
        }
    }
}

fn half() -> Decimal {
    Decimal::pow10(-1) * Decimal::from(5)
}

// Cross product of (b−a) × (c−a); exact.
fn cross_from(a: &Point, b: &Point, c: &Point) -> Decimal {
    let abx = &b.x - &a.x;
    let aby = &b.y - &a.y;
    let acx = &c.x - &a.x;
    let acy = &c.y - &a.y;
    &(&abx * &acy) - &(&aby * &acx)
}

fn point_segment_distance_sq(
    p: &Point,
    a: &Point,
    b: &Point,
    cx: &Context,
) -> Result<Decimal, GeometryError> {
    let abx = &b.x - &a.x;
    let aby = &b.y - &a.y;
    let len_sq = &(&abx * &abx) + &(&aby * &aby);

    let (nx, ny) = if len_sq.is_zero() {
        (a.x.clone(), a.y.clone())
    } else {
        let apx = &p.x - &a.x;
        let apy = &p.y - &a.y;
        let mut t = cx.div(&(&(&apx * &abx) + &(&apy * &aby)), &len_sq)?;
        let one = Decimal::one();
        if t.is_negative() {
            t = Decimal::zero();
        } else if t > one {
            t = one;
        }
        (
            cx.round(&(&a.x + &(&t * &abx))),
            cx.round(&(&a.y + &(&t * &aby))),
        )
    };

    let dx = &p.x - &nx;
    let dy = &p.y - &ny;
    Ok(cx.round(&(&(&dx * &dx) + &(&dy * &dy))))
}

/// Sample a path into a polygon: line segments contribute their
/// endpoints, curves are sampled at `segments` uniform parameter steps,
/// arcs via their center parameterization. Sub-paths concatenate.
pub fn sample_path(path: &Path, segments: u32, cx: &Context) -> Result<Polygon, GeometryError> {
    let absolute = path_to_absolute(path);
    let segments = segments.max(1);
    let mut points: Vec<Point> = Vec::new();
    let mut current = Point::origin();
    let mut subpath_start = Point::origin();

    let mut push = |points: &mut Vec<Point>, p: Point| {
        if points.last() != Some(&p) {
            points.push(p);
        }
    };

    for cmd in absolute.iter() {
        let a = &cmd.args;
        match cmd.verb {
            Verb::MoveTo => {
                let p = point(a[0].clone(), a[1].clone());
                subpath_start = p.clone();
                current = p.clone();
                push(&mut points, p);
            }
            Verb::LineTo => {
                let p = point(a[0].clone(), a[1].clone());
                current = p.clone();
                push(&mut points, p);
            }
            Verb::CurveTo => {
                let c1 = point(a[0].clone(), a[1].clone());
                let c2 = point(a[2].clone(), a[3].clone());
                let to = point(a[4].clone(), a[5].clone());
                for j in 1..=segments {
                    let t = cx.div(&Decimal::from(j), &Decimal::from(segments))?;
                    push(&mut points, cubic_at(&current, &c1, &c2, &to, &t, cx));
                }
                current = to;
            }
            Verb::QuadraticTo => {
                let c = point(a[0].clone(), a[1].clone());
                let to = point(a[2].clone(), a[3].clone());
                for j in 1..=segments {
                    let t = cx.div(&Decimal::from(j), &Decimal::from(segments))?;
                    push(&mut points, quadratic_at(&current, &c, &to, &t, cx));
                }
                current = to;
            }
            Verb::ArcTo => {
                let to = point(a[5].clone(), a[6].clone());
                let arc = SvgArc {
                    from: current.clone(),
                    to: to.clone(),
                    rx: a[0].clone(),
                    ry: a[1].clone(),
                    x_rotation: cx.to_radians(&a[2]),
                    large_arc: !a[3].is_zero(),
                    sweep: !a[4].is_zero(),
                };
                for p in arc.sample(segments, cx)? {
                    push(&mut points, p);
                }
                current = to;
            }
            Verb::ClosePath => {
                current = subpath_start.clone();
            }
            _ => {}
        }
    }

    // The implicit closing edge makes a trailing copy of the start
    // redundant.
    if points.len() > 1 && points.last() == points.first() {
        points.pop();
    }

    Ok(Polygon::new(points))
}

fn cubic_at(
    p0: &Point,
    c1: &Point,
    c2: &Point,
    p3: &Point,
    t: &Decimal,
    cx: &Context,
) -> Point {
    let u = &Decimal::one() - t;
    let uu = &u * &u;
    let tt = t * t;
    let three = Decimal::from(3);
    let b0 = &uu * &u;
    let b1 = &(&uu * t) * &three;
    let b2 = &(&u * &tt) * &three;
    let b3 = &tt * t;
    point(
        cx.round(
            &(&(&(&b0 * &p0.x) + &(&b1 * &c1.x)) + &(&(&b2 * &c2.x) + &(&b3 * &p3.x))),
        ),
        cx.round(
            &(&(&(&b0 * &p0.y) + &(&b1 * &c1.y)) + &(&(&b2 * &c2.y) + &(&b3 * &p3.y))),
        ),
    )
}

fn quadratic_at(p0: &Point, c: &Point, p2: &Point, t: &Decimal, cx: &Context) -> Point {
    let u = &Decimal::one() - t;
    let two = Decimal::from(2);
    let b0 = &u * &u;
    let b1 = &(&u * t) * &two;
    let b2 = t * t;
    point(
        cx.round(&(&(&(&b0 * &p0.x) + &(&b1 * &c.x)) + &(&b2 * &p2.x))),
        cx.round(&(&(&(&b0 * &p0.y) + &(&b1 * &c.y)) + &(&b2 * &p2.y))),
    )
}

// Signed distance surrogate of `p` against the directed clip edge (a, b):
// positive on the left (inside for counter-clockwise clips).
fn edge_side(a: &Point, b: &Point, p: &Point) -> Decimal {
    cross_from(a, b, p)
}

fn edge_crossing(
    s: &Point,
    e: &Point,
    d_s: &Decimal,
    d_e: &Decimal,
    cx: &Context,
) -> Result<Point, GeometryError> {
    let t = cx.div(d_s, &(d_s - d_e))?;
    Ok(point(
        cx.round(&(&s.x + &(&t * &(&e.x - &s.x)))),
        cx.round(&(&s.y + &(&t * &(&e.y - &s.y)))),
    ))
}

fn oriented_ccw(clip: &Polygon, cx: &Context) -> Vec<Point> {
    let mut pts = clip.points().to_vec();
    if clip.signed_area(cx).is_negative() {
        pts.reverse();
    }
    pts
}

// One Sutherland–Hodgman pass against the half-plane of edge (a, b).
// `keep_inside` selects which side survives.
fn clip_against_edge(
    input: &[Point],
    a: &Point,
    b: &Point,
    keep_inside: bool,
    cx: &Context,
) -> Result<Vec<Point>, GeometryError> {
    let mut output = Vec::with_capacity(input.len() + 2);
    let n = input.len();
    for i in 0..n {
        let cur = &input[i];
        let prev = &input[(i + n - 1) % n];
        let d_cur = edge_side(a, b, cur);
        let d_prev = edge_side(a, b, prev);
        let in_cur = if keep_inside {
            !d_cur.is_negative()
        } else {
            !d_cur.is_positive()
        };
        let in_prev = if keep_inside {
            !d_prev.is_negative()
        } else {
            !d_prev.is_positive()
        };

        if in_cur {
            if !in_prev {
                output.push(edge_crossing(prev, cur, &d_prev, &d_cur, cx)?);
            }
            output.push(cur.clone());
        } else if in_prev {
            output.push(edge_crossing(prev, cur, &d_prev, &d_cur, cx)?);
        }
    }
    Ok(output)
}

/// Sutherland–Hodgman intersection of `subject` with a convex `clip`.
///
/// The clip polygon is assumed convex; its winding does not matter. The
/// result may be degenerate when the polygons do not overlap.
pub fn intersect_convex(
    subject: &Polygon,
    clip: &Polygon,
    cx: &Context,
) -> Result<Polygon, GeometryError> {
    if subject.is_degenerate() || clip.is_degenerate() {
        return Ok(Polygon::default());
    }
    let clip_pts = oriented_ccw(clip, cx);
    let mut output = subject.points().to_vec();
    let n = clip_pts.len();
    for i in 0..n {
        if output.is_empty() {
            break;
        }
        let a = &clip_pts[i];
        let b = &clip_pts[(i + 1) % n];
        output = clip_against_edge(&output, a, b, true, cx)?;
    }
    Ok(Polygon::new(output))
}

/// The parts of `subject` outside the convex `clip`, one fragment per
/// clip edge. Successive clipping makes the fragments a partition, so
/// their areas sum to `area(subject) − area(subject ∩ clip)`.
pub fn difference_fragments(
    subject: &Polygon,
    clip: &Polygon,
    cx: &Context,
) -> Result<Vec<Polygon>, GeometryError> {
    if subject.is_degenerate() {
        return Ok(Vec::new());
    }
    if clip.is_degenerate() {
        return Ok(vec![subject.clone()]);
    }
    let clip_pts = oriented_ccw(clip, cx);
    let mut fragments = Vec::new();
    let mut remaining = subject.points().to_vec();
    let n = clip_pts.len();
    for i in 0..n {
        if remaining.is_empty() {
            break;
        }
        let a = &clip_pts[i];
        let b = &clip_pts[(i + 1) % n];
        let outside = clip_against_edge(&remaining, a, b, false, cx)?;
        if outside.len() >= 3 {
            fragments.push(Polygon::new(outside));
        }
        remaining = clip_against_edge(&remaining, a, b, true, cx)?;
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svgbake_path::parser::parse_path;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rect(x0: &str, y0: &str, x1: &str, y1: &str) -> Polygon {
        Polygon::new(vec![
            point(dec(x0), dec(y0)),
            point(dec(x1), dec(y0)),
            point(dec(x1), dec(y1)),
            point(dec(x0), dec(y1)),
        ])
    }

    #[test]
    fn shoelace_area() {
        let cx = Context::default();
        let r = rect("0", "0", "10", "10");
        assert_eq!(r.area(&cx), dec("100"));
        let triangle = Polygon::new(vec![
            point(dec("0"), dec("0")),
            point(dec("4"), dec("0")),
            point(dec("0"), dec("3")),
        ]);
        assert_eq!(triangle.area(&cx), dec("6"));
        assert!(Polygon::default().area(&cx).is_zero());
    }

    #[test]
    fn point_containment() {
        let cx = Context::default();
        let r = rect("0", "0", "10", "10");
        let tol = Decimal::pow10(-6);
        assert!(r.contains_point(&point(dec("5"), dec("5")), &tol, &cx).unwrap());
        assert!(!r.contains_point(&point(dec("15"), dec("5")), &tol, &cx).unwrap());
        // On an edge, within tolerance.
        assert!(r.contains_point(&point(dec("10"), dec("5")), &tol, &cx).unwrap());
        // Just outside the tolerance band.
        assert!(!r
            .contains_point(&point(dec("10.001"), dec("5")), &tol, &cx)
            .unwrap());
    }

    #[test]
    fn distance_to_edges() {
        let cx = Context::default();
        let r = rect("0", "0", "10", "10");
        let d = r
            .min_distance_to_edge(&point(dec("5"), dec("5")), &cx)
            .unwrap()
            .unwrap();
        assert!(d.approx_eq(&dec("5"), &cx.tolerance()));
        // Distance to a corner.
        let d = r
            .min_distance_to_edge(&point(dec("13"), dec("14")), &cx)
            .unwrap()
            .unwrap();
        assert!(d.approx_eq(&dec("5"), &cx.tolerance()));
    }

    #[test]
    fn convexity() {
        let r = rect("0", "0", "10", "10");
        assert!(r.is_convex());
        let dart = Polygon::new(vec![
            point(dec("0"), dec("0")),
            point(dec("10"), dec("0")),
            point(dec("2"), dec("2")),
            point(dec("0"), dec("10")),
        ]);
        assert!(!dart.is_convex());
    }

    #[test]
    fn rectangle_intersection() {
        let cx = Context::default();
        let subject = rect("0", "0", "10", "10");
        let clip = rect("5", "5", "15", "15");
        let out = intersect_convex(&subject, &clip, &cx).unwrap();
        assert!(out.area(&cx).approx_eq(&dec("25"), &Decimal::pow10(-10)));

        // Intersection is contained in both inputs and bounded by the
        // smaller area.
        let tol = Decimal::pow10(-6);
        for p in out.points() {
            assert!(subject.contains_point(p, &tol, &cx).unwrap());
            assert!(clip.contains_point(p, &tol, &cx).unwrap());
        }
        let min_area = subject.area(&cx).min(clip.area(&cx));
        assert!(out.area(&cx) <= min_area);
    }

    #[test]
    fn disjoint_intersection_is_degenerate() {
        let cx = Context::default();
        let subject = rect("0", "0", "1", "1");
        let clip = rect("5", "5", "6", "6");
        let out = intersect_convex(&subject, &clip, &cx).unwrap();
        assert!(out.is_degenerate());
    }

    #[test]
    fn clip_winding_does_not_matter() {
        let cx = Context::default();
        let subject = rect("0", "0", "10", "10");
        let mut clip_pts = rect("5", "5", "15", "15").points().to_vec();
        clip_pts.reverse();
        let clip = Polygon::new(clip_pts);
        let out = intersect_convex(&subject, &clip, &cx).unwrap();
        assert!(out.area(&cx).approx_eq(&dec("25"), &Decimal::pow10(-10)));
    }

    #[test]
    fn difference_partitions_the_subject() {
        let cx = Context::default();
        let subject = rect("0", "0", "10", "10");
        let clip = rect("5", "5", "15", "15");
        let fragments = difference_fragments(&subject, &clip, &cx).unwrap();
        let mut total = Decimal::zero();
        for f in &fragments {
            total += &f.area(&cx);
        }
        assert!(total.approx_eq(&dec("75"), &Decimal::pow10(-10)));
    }

    #[test]
    fn sample_straight_path() {
        let cx = Context::default();
        let path = parse_path("M 0 0 L 10 0 L 10 10 L 0 10 Z").unwrap();
        let poly = sample_path(&path, 64, &cx).unwrap();
        assert_eq!(poly.len(), 4);
        assert_eq!(poly.area(&cx), dec("100"));
    }

    #[test]
    fn sample_cubic_path_area_converges() {
        let cx = Context::default();
        // A unit square with one edge expressed as a degenerate cubic.
        let path =
            parse_path("M 0 0 C 0.25 0 0.75 0 1 0 L 1 1 L 0 1 Z").unwrap();
        let poly = sample_path(&path, 16, &cx).unwrap();
        assert!(poly.area(&cx).approx_eq(&Decimal::one(), &Decimal::pow10(-10)));
    }

    #[test]
    fn sample_arc_path() {
        let cx = Context::default();
        // Half disc of radius 50: area π·50²/2.
        let path = parse_path("M 0 0 A 50 50 0 0 1 100 0 Z").unwrap();
        let poly = sample_path(&path, 256, &cx).unwrap();
        let expected = &(&cx.pi() * &dec("1250"));
        let error = (&poly.area(&cx) - expected).abs();
        // A 256-gon underestimates the disc by ~2π³r²/(3·256²).
        assert!(error < dec("0.4"), "area error {}", error);
    }
}
