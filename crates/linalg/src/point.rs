//! 2D points.

use core::fmt;

use svgbake_decimal::Decimal;

/// A 2D position with decimal coordinates.
#[derive(Clone, PartialEq)]
pub struct Point {
    pub x: Decimal,
    pub y: Decimal,
}

/// Shorthand for `Point { x, y }`.
pub fn point(x: Decimal, y: Decimal) -> Point {
    Point { x, y }
}

impl Point {
    pub fn origin() -> Point {
        point(Decimal::zero(), Decimal::zero())
    }

    pub fn approx_eq(&self, other: &Point, tolerance: &Decimal) -> bool {
        self.x.approx_eq(&other.x, tolerance) && self.y.approx_eq(&other.y, tolerance)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
