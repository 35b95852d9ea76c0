//! Elliptical arc math.
//!
//! SVG stores arcs in endpoint parameterization; sampling needs the
//! center parameterization. The conversion follows the SVG
//! implementation notes (F.6.5), including the radii correction step.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Point};

use crate::GeometryError;

/// An elliptical arc between two endpoints, as stored in path data.
///
/// `x_rotation` is in radians here; the path layer converts from the
/// degrees found in `A` commands.
#[derive(Clone, Debug)]
pub struct SvgArc {
    pub from: Point,
    pub to: Point,
    pub rx: Decimal,
    pub ry: Decimal,
    pub x_rotation: Decimal,
    pub large_arc: bool,
    pub sweep: bool,
}

/// Center parameterization: origin, radii and the swept angle range.
#[derive(Clone, Debug)]
pub struct CenterArc {
    pub center: Point,
    pub rx: Decimal,
    pub ry: Decimal,
    pub x_rotation: Decimal,
    pub start_angle: Decimal,
    pub sweep_angle: Decimal,
}

impl SvgArc {
    /// Arcs degenerate to straight lines when either radius is zero;
    /// equal endpoints draw nothing.
    pub fn is_straight_line(&self) -> bool {
        self.rx.is_zero() || self.ry.is_zero() || self.from == self.to
    }

    /// Endpoint to center conversion (SVG F.6.5).
    ///
    /// Out-of-range radii are scaled up just enough to span the
    /// endpoints. The caller is expected to handle
    /// [`is_straight_line`](Self::is_straight_line) first.
    pub fn to_center(&self, cx: &Context) -> Result<CenterArc, GeometryError> {
        let half = Decimal::pow10(-1) * Decimal::from(5);
        let cos_phi = cx.cos(&self.x_rotation);
        let sin_phi = cx.sin(&self.x_rotation);

        let dx = &(&self.from.x - &self.to.x) * &half;
        let dy = &(&self.from.y - &self.to.y) * &half;
        let x1p = cx.round(&(&(&cos_phi * &dx) + &(&sin_phi * &dy)));
        let y1p = cx.round(&(&(&cos_phi * &dy) - &(&sin_phi * &dx)));

        let mut rx = self.rx.abs();
        let mut ry = self.ry.abs();

        // Scale radii that cannot reach the endpoints.
        let lambda = cx.round(&(&cx.div(&(&x1p * &x1p), &(&rx * &rx))?
            + &cx.div(&(&y1p * &y1p), &(&ry * &ry))?));
        if lambda > Decimal::one() {
            let s = cx.sqrt(&lambda)?;
            rx = cx.round(&(&rx * &s));
            ry = cx.round(&(&ry * &s));
        }

        let rx2 = &rx * &rx;
        let ry2 = &ry * &ry;
        let x1p2 = &x1p * &x1p;
        let y1p2 = &y1p * &y1p;

        let num = &(&rx2 * &ry2) - &(&(&rx2 * &y1p2) + &(&ry2 * &x1p2));
        let den = &(&rx2 * &y1p2) + &(&ry2 * &x1p2);
        // Radii correction guarantees num >= 0 up to rounding.
        let ratio = if num.is_negative() {
            Decimal::zero()
        } else {
            cx.div(&num, &den)?
        };
        let mut coef = cx.sqrt(&ratio)?;
        if self.large_arc == self.sweep {
            coef = -coef;
        }

        let cxp = cx.round(&(&coef * &cx.div(&(&rx * &y1p), &ry)?));
        let cyp = cx.round(&(&-&coef * &cx.div(&(&ry * &x1p), &rx)?));

        let mid_x = &(&self.from.x + &self.to.x) * &half;
        let mid_y = &(&self.from.y + &self.to.y) * &half;
        let center = point(
            cx.round(&(&(&(&cos_phi * &cxp) - &(&sin_phi * &cyp)) + &mid_x)),
            cx.round(&(&(&(&sin_phi * &cxp) + &(&cos_phi * &cyp)) + &mid_y)),
        );

        let start_angle = cx.atan2(
            &cx.div(&(&y1p - &cyp), &ry)?,
            &cx.div(&(&x1p - &cxp), &rx)?,
        );
        let end_angle = cx.atan2(
            &cx.div(&(&-&y1p - &cyp), &ry)?,
            &cx.div(&(&-&x1p - &cxp), &rx)?,
        );

        let two_pi = &cx.pi() + &cx.pi();
        let mut sweep_angle = &end_angle - &start_angle;
        if self.sweep && sweep_angle.is_negative() {
            sweep_angle = &sweep_angle + &two_pi;
        } else if !self.sweep && sweep_angle.is_positive() {
            sweep_angle = &sweep_angle - &two_pi;
        }

        Ok(CenterArc {
            center,
            rx,
            ry,
            x_rotation: self.x_rotation.clone(),
            start_angle: cx.round(&start_angle),
            sweep_angle: cx.round(&sweep_angle),
        })
    }

    /// Points along the arc at `segments` uniform parameter steps,
    /// excluding the start point.
    pub fn sample(&self, segments: u32, cx: &Context) -> Result<Vec<Point>, GeometryError> {
        if self.is_straight_line() {
            return Ok(vec![self.to.clone()]);
        }
        let center = self.to_center(cx)?;
        let segments = segments.max(1);
        let mut out = Vec::with_capacity(segments as usize);
        for j in 1..=segments {
            let t = cx.div(&Decimal::from(j), &Decimal::from(segments))?;
            out.push(center.point_at(&t, cx)?);
        }
        Ok(out)
    }
}

impl CenterArc {
    /// The point at fraction `t` of the sweep, `t` in [0, 1].
    pub fn point_at(&self, t: &Decimal, cx: &Context) -> Result<Point, GeometryError> {
        let theta = cx.round(&(&self.start_angle + &(&self.sweep_angle * t)));
        let (sin_t, cos_t) = (cx.sin(&theta), cx.cos(&theta));
        let (sin_phi, cos_phi) = (cx.sin(&self.x_rotation), cx.cos(&self.x_rotation));
        let rx_cos = &self.rx * &cos_t;
        let ry_sin = &self.ry * &sin_t;
        Ok(point(
            cx.round(&(&(&(&cos_phi * &rx_cos) - &(&sin_phi * &ry_sin)) + &self.center.x)),
            cx.round(&(&(&(&sin_phi * &rx_cos) + &(&cos_phi * &ry_sin)) + &self.center.y)),
        ))
    }
}
