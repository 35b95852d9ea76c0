//! Verification of pipeline invariants.
//!
//! Every mutation stage can prove that it preserved what it was supposed
//! to preserve. Each check returns a [`Verification`] record; the
//! pipeline collects them into the stats and, under
//! [`VerificationMode::Strict`], aborts on the first failure.
//!
//! The default tolerance is the context's `10^-(P-10)`. Polygon
//! containment takes a distance tolerance instead (curve sampling may put
//! vertices slightly outside the clip), and the end-to-end area check
//! takes the user-facing `e2e_tolerance`.

use svgbake_algorithms::polygon::Polygon;
use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{Matrix, Point};
use svgbake_path::{Path, Verb};

use crate::transform::transform_point;

/// The verification categories, one per invariant family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VerifyCategory {
    RoundTrip,
    Inversion,
    Associativity,
    GeometryPreservation,
    ShapeToPath,
    GradientEndpoints,
    PolygonContainment,
    IntersectionBounds,
    AreaConservation,
}

impl VerifyCategory {
    pub fn name(self) -> &'static str {
        match self {
            VerifyCategory::RoundTrip => "round-trip",
            VerifyCategory::Inversion => "inversion",
            VerifyCategory::Associativity => "associativity",
            VerifyCategory::GeometryPreservation => "geometry-preservation",
            VerifyCategory::ShapeToPath => "shape-to-path",
            VerifyCategory::GradientEndpoints => "gradient-endpoints",
            VerifyCategory::PolygonContainment => "polygon-containment",
            VerifyCategory::IntersectionBounds => "intersection-bounds",
            VerifyCategory::AreaConservation => "area-conservation",
        }
    }
}

/// Whether a failed check is fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum VerificationMode {
    /// Record the failure in the stats and continue.
    Report,
    /// Abort the pipeline on the first failure.
    Strict,
}

/// The outcome of one check.
#[derive(Clone, Debug)]
pub struct Verification {
    pub category: VerifyCategory,
    pub valid: bool,
    /// The observed error, when the check measures one.
    pub error: Option<Decimal>,
    pub tolerance: Decimal,
    pub message: String,
}

fn outcome(
    category: VerifyCategory,
    valid: bool,
    error: Option<Decimal>,
    tolerance: Decimal,
    message: impl Into<String>,
) -> Verification {
    Verification {
        category,
        valid,
        error,
        tolerance,
        message: message.into(),
    }
}

fn matrix_max_error(a: &Matrix, b: &Matrix) -> Decimal {
    let mut max = Decimal::zero();
    for i in 0..a.rows() {
        for j in 0..a.cols() {
            let d = (a.get(i, j) - b.get(i, j)).abs();
            if d > max {
                max = d;
            }
        }
    }
    max
}

/// `M⁻¹·(M·p) ≈ p`.
pub fn round_trip(m: &Matrix, p: &Point, cx: &Context) -> Verification {
    let tolerance = cx.tolerance();
    let inverse = match m.inverse(cx) {
        Ok(inv) => inv,
        Err(e) => {
            return outcome(
                VerifyCategory::RoundTrip,
                false,
                None,
                tolerance,
                format!("matrix not invertible: {}", e),
            )
        }
    };
    let forward = match transform_point(m, &p.x, &p.y, cx) {
        Ok(q) => q,
        Err(e) => {
            return outcome(
                VerifyCategory::RoundTrip,
                false,
                None,
                tolerance,
                e.to_string(),
            )
        }
    };
    let back = match transform_point(&inverse, &forward.x, &forward.y, cx) {
        Ok(q) => q,
        Err(e) => {
            return outcome(
                VerifyCategory::RoundTrip,
                false,
                None,
                tolerance,
                e.to_string(),
            )
        }
    };
    let error = (&back.x - &p.x).abs().max((&back.y - &p.y).abs());
    let valid = error <= tolerance;
    outcome(
        VerifyCategory::RoundTrip,
        valid,
        Some(error),
        tolerance,
        "inverse transform returns the original point",
    )
}

/// `M·M⁻¹ ≈ I` entry-wise.
pub fn inversion(m: &Matrix, cx: &Context) -> Verification {
    let tolerance = cx.tolerance();
    let inverse = match m.inverse(cx) {
        Ok(inv) => inv,
        Err(e) => {
            return outcome(
                VerifyCategory::Inversion,
                false,
                None,
                tolerance,
                format!("matrix not invertible: {}", e),
            )
        }
    };
    let product = match m.mul(&inverse, cx) {
        Ok(p) => p,
        Err(e) => {
            return outcome(
                VerifyCategory::Inversion,
                false,
                None,
                tolerance,
                e.to_string(),
            )
        }
    };
    let error = matrix_max_error(&product, &Matrix::identity(m.rows()));
    let valid = error <= tolerance;
    outcome(
        VerifyCategory::Inversion,
        valid,
        Some(error),
        tolerance,
        "M·M⁻¹ stays within tolerance of the identity",
    )
}

/// `(A·B)·C ≈ A·(B·C)`.
pub fn associativity(a: &Matrix, b: &Matrix, c: &Matrix, cx: &Context) -> Verification {
    let tolerance = cx.tolerance();
    let left = a.mul(b, cx).and_then(|ab| ab.mul(c, cx));
    let right = b.mul(c, cx).and_then(|bc| a.mul(&bc, cx));
    match (left, right) {
        (Ok(l), Ok(r)) => {
            let error = matrix_max_error(&l, &r);
            let valid = error <= tolerance;
            outcome(
                VerifyCategory::Associativity,
                valid,
                Some(error),
                tolerance,
                "matrix multiplication associates",
            )
        }
        (Err(e), _) | (_, Err(e)) => outcome(
            VerifyCategory::Associativity,
            false,
            None,
            tolerance,
            e.to_string(),
        ),
    }
}

fn triangle_area(a: &Point, b: &Point, c: &Point, cx: &Context) -> Decimal {
    let half = Decimal::pow10(-1) * Decimal::from(5);
    let cross = &(&(&b.x - &a.x) * &(&c.y - &a.y)) - &(&(&b.y - &a.y) * &(&c.x - &a.x));
    cx.round(&(&cross.abs() * &half))
}

/// Triangle area scales by `|det M|`; the tolerance scales with the
/// magnitude of the expected area.
pub fn geometry_preservation(
    m: &Matrix,
    triangle: &[Point; 3],
    cx: &Context,
) -> Verification {
    let base_tolerance = cx.tolerance();
    let det = match m.determinant(cx) {
        Ok(d) => d,
        Err(e) => {
            return outcome(
                VerifyCategory::GeometryPreservation,
                false,
                None,
                base_tolerance,
                format!("determinant unavailable: {}", e),
            )
        }
    };
    let mapped: Result<Vec<Point>, _> = triangle
        .iter()
        .map(|p| transform_point(m, &p.x, &p.y, cx))
        .collect();
    let mapped = match mapped {
        Ok(pts) => pts,
        Err(e) => {
            return outcome(
                VerifyCategory::GeometryPreservation,
                false,
                None,
                base_tolerance,
                e.to_string(),
            )
        }
    };

    let before = triangle_area(&triangle[0], &triangle[1], &triangle[2], cx);
    let after = triangle_area(&mapped[0], &mapped[1], &mapped[2], cx);
    let expected = cx.round(&(&det.abs() * &before));
    let error = (&after - &expected).abs();

    let scale = Decimal::one().max(expected.abs());
    let tolerance = cx.round(&(&base_tolerance * &scale));
    let valid = error <= tolerance;
    outcome(
        VerifyCategory::GeometryPreservation,
        valid,
        Some(error),
        tolerance,
        "triangle area scales by |det M|",
    )
}

/// Every key point must coincide with some command endpoint of the
/// generated path.
pub fn shape_to_path(path: &Path, key_points: &[Point], cx: &Context) -> Verification {
    let tolerance = cx.tolerance();
    let mut endpoints: Vec<Point> = Vec::new();
    for cmd in path.iter() {
        let a = &cmd.args;
        match cmd.verb {
            Verb::MoveTo | Verb::LineTo => {
                endpoints.push(svgbake_linalg::point(a[0].clone(), a[1].clone()))
            }
            Verb::CurveTo => endpoints.push(svgbake_linalg::point(a[4].clone(), a[5].clone())),
            Verb::QuadraticTo => {
                endpoints.push(svgbake_linalg::point(a[2].clone(), a[3].clone()))
            }
            Verb::ArcTo => endpoints.push(svgbake_linalg::point(a[5].clone(), a[6].clone())),
            _ => {}
        }
    }

    let mut worst = Decimal::zero();
    for key in key_points {
        let mut best: Option<Decimal> = None;
        for e in &endpoints {
            let d = (&e.x - &key.x).abs().max((&e.y - &key.y).abs());
            best = Some(match best {
                None => d,
                Some(b) => b.min(d),
            });
        }
        match best {
            Some(d) => {
                if d > worst {
                    worst = d;
                }
            }
            None => {
                return outcome(
                    VerifyCategory::ShapeToPath,
                    false,
                    None,
                    tolerance,
                    "generated path has no endpoints",
                )
            }
        }
    }
    let valid = worst <= tolerance;
    outcome(
        VerifyCategory::ShapeToPath,
        valid,
        Some(worst),
        tolerance,
        "key points preserved by shape conversion",
    )
}

/// Baked gradient endpoints must equal the transform of the originals.
pub fn gradient_endpoints(
    m: &Matrix,
    original: &[Point],
    baked: &[Point],
    cx: &Context,
) -> Verification {
    let tolerance = cx.tolerance();
    if original.len() != baked.len() {
        return outcome(
            VerifyCategory::GradientEndpoints,
            false,
            None,
            tolerance,
            "endpoint count changed",
        );
    }
    let mut worst = Decimal::zero();
    for (o, b) in original.iter().zip(baked) {
        let mapped = match transform_point(m, &o.x, &o.y, cx) {
            Ok(p) => p,
            Err(e) => {
                return outcome(
                    VerifyCategory::GradientEndpoints,
                    false,
                    None,
                    tolerance,
                    e.to_string(),
                )
            }
        };
        let d = (&mapped.x - &b.x).abs().max((&mapped.y - &b.y).abs());
        if d > worst {
            worst = d;
        }
    }
    let valid = worst <= tolerance;
    outcome(
        VerifyCategory::GradientEndpoints,
        valid,
        Some(worst),
        tolerance,
        "gradient endpoints transformed correctly",
    )
}

/// Every vertex of `inner` lies inside `outer`, allowing `distance_tol`
/// of slack for curve sampling.
pub fn polygon_containment(
    inner: &Polygon,
    outer: &Polygon,
    distance_tol: &Decimal,
    cx: &Context,
) -> Verification {
    let tolerance = distance_tol.clone();
    for p in inner.points() {
        match outer.contains_point(p, distance_tol, cx) {
            Ok(true) => {}
            Ok(false) => {
                let error = outer
                    .min_distance_to_edge(p, cx)
                    .ok()
                    .flatten();
                return outcome(
                    VerifyCategory::PolygonContainment,
                    false,
                    error,
                    tolerance,
                    format!("vertex {:?} escapes the outer polygon", p),
                );
            }
            Err(e) => {
                return outcome(
                    VerifyCategory::PolygonContainment,
                    false,
                    None,
                    tolerance,
                    e.to_string(),
                )
            }
        }
    }
    outcome(
        VerifyCategory::PolygonContainment,
        true,
        Some(Decimal::zero()),
        tolerance,
        "polygon contained",
    )
}

/// The intersection is contained in both inputs and its area does not
/// exceed either.
pub fn intersection_bounds(
    intersection: &Polygon,
    a: &Polygon,
    b: &Polygon,
    distance_tol: &Decimal,
    cx: &Context,
) -> Verification {
    let in_a = polygon_containment(intersection, a, distance_tol, cx);
    if !in_a.valid {
        return Verification {
            category: VerifyCategory::IntersectionBounds,
            ..in_a
        };
    }
    let in_b = polygon_containment(intersection, b, distance_tol, cx);
    if !in_b.valid {
        return Verification {
            category: VerifyCategory::IntersectionBounds,
            ..in_b
        };
    }

    let area = intersection.area(cx);
    let min_area = a.area(cx).min(b.area(cx));
    let slack = &area - &min_area;
    let valid = slack <= *distance_tol;
    outcome(
        VerifyCategory::IntersectionBounds,
        valid,
        Some(slack.max(Decimal::zero())),
        distance_tol.clone(),
        "intersection bounded by both inputs",
    )
}

/// `clipped ≤ original` and `outside = original − clipped ≥ 0`, within
/// the end-to-end tolerance.
pub fn area_conservation(
    original: &Decimal,
    clipped: &Decimal,
    tolerance: &Decimal,
    cx: &Context,
) -> Verification {
    let outside = cx.round(&(original - clipped));
    let overshoot = (clipped - original).max(-&outside);
    let valid = overshoot <= *tolerance;
    outcome(
        VerifyCategory::AreaConservation,
        valid,
        Some(overshoot.max(Decimal::zero())),
        tolerance.clone(),
        format!(
            "clipped {} of original {}, outside {}",
            clipped, original, outside
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::parse_transform_list;
    use svgbake_algorithms::polygon::intersect_convex;
    use svgbake_linalg::point;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn round_trip_and_inversion() {
        let cx = Context::default();
        let m = parse_transform_list("translate(3,4) rotate(37) scale(2.5)", &cx).unwrap();
        let v = round_trip(&m, &point(dec("12"), dec("-7")), &cx);
        assert!(v.valid, "{}", v.message);
        let v = inversion(&m, &cx);
        assert!(v.valid, "{}", v.message);

        let singular = parse_transform_list("scale(0)", &cx).unwrap();
        assert!(!inversion(&singular, &cx).valid);
    }

    #[test]
    fn associativity_of_random_chain() {
        let cx = Context::default();
        let a = parse_transform_list("rotate(13)", &cx).unwrap();
        let b = parse_transform_list("translate(5,6)", &cx).unwrap();
        let c = parse_transform_list("scale(3,0.5)", &cx).unwrap();
        let v = associativity(&a, &b, &c, &cx);
        assert!(v.valid, "{}", v.message);
    }

    #[test]
    fn areas_scale_by_determinant() {
        let cx = Context::default();
        let m = parse_transform_list("scale(2,3) skewX(20)", &cx).unwrap();
        let triangle = [
            point(dec("0"), dec("0")),
            point(dec("10"), dec("0")),
            point(dec("0"), dec("7")),
        ];
        let v = geometry_preservation(&m, &triangle, &cx);
        assert!(v.valid, "{}", v.message);
    }

    #[test]
    fn shape_key_points() {
        let cx = Context::default();
        let path = svgbake_algorithms::shapes::circle_to_path_n(
            &dec("100"),
            &dec("100"),
            &dec("50"),
            8,
            &cx,
        )
        .unwrap();
        let cardinals = [
            point(dec("150"), dec("100")),
            point(dec("100"), dec("150")),
            point(dec("50"), dec("100")),
            point(dec("100"), dec("50")),
        ];
        let v = shape_to_path(&path, &cardinals, &cx);
        assert!(v.valid, "error {:?}", v.error);

        let off = [point(dec("151"), dec("100"))];
        assert!(!shape_to_path(&path, &off, &cx).valid);
    }

    #[test]
    fn containment_with_distance_tolerance() {
        let cx = Context::default();
        let outer = Polygon::new(vec![
            point(dec("0"), dec("0")),
            point(dec("10"), dec("0")),
            point(dec("10"), dec("10")),
            point(dec("0"), dec("10")),
        ]);
        // A vertex a hair outside passes under the distance tolerance.
        let inner = Polygon::new(vec![
            point(dec("1"), dec("1")),
            point(dec("10.0000001"), dec("5")),
            point(dec("1"), dec("9")),
        ]);
        let v = polygon_containment(&inner, &outer, &Decimal::pow10(-6), &cx);
        assert!(v.valid, "{}", v.message);
        let v = polygon_containment(&inner, &outer, &Decimal::pow10(-9), &cx);
        assert!(!v.valid);
    }

    #[test]
    fn intersection_checks() {
        let cx = Context::default();
        let a = Polygon::new(vec![
            point(dec("0"), dec("0")),
            point(dec("10"), dec("0")),
            point(dec("10"), dec("10")),
            point(dec("0"), dec("10")),
        ]);
        let b = Polygon::new(vec![
            point(dec("5"), dec("5")),
            point(dec("15"), dec("5")),
            point(dec("15"), dec("15")),
            point(dec("5"), dec("15")),
        ]);
        let inter = intersect_convex(&a, &b, &cx).unwrap();
        let v = intersection_bounds(&inter, &a, &b, &Decimal::pow10(-6), &cx);
        assert!(v.valid, "{}", v.message);
    }

    #[test]
    fn e2e_area_check() {
        let cx = Context::default();
        let tol = Decimal::pow10(-10);
        let v = area_conservation(&dec("100"), &dec("25"), &tol, &cx);
        assert!(v.valid);
        let v = area_conservation(&dec("100"), &dec("100.001"), &tol, &cx);
        assert!(!v.valid);
    }
}
