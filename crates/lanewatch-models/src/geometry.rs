//! Image-plane geometry primitives.

use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a point lies on a polygon edge.
const EDGE_EPSILON: f64 = 1e-9;

/// A point in pixel (image plane) or ground-plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// A closed polygon given by its vertices in order.
///
/// Serialized as a plain list of `[x, y]` pairs so scene files stay readable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    /// Create a polygon from vertices.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Convenience constructor from `(x, y)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    /// Absolute area (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }

        let twice_area: f64 = (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();

        twice_area.abs() / 2.0
    }

    /// A polygon that cannot enclose anything: fewer than three vertices,
    /// non-finite coordinates or zero area.
    pub fn is_degenerate(&self) -> bool {
        self.vertices.len() < 3
            || self.vertices.iter().any(|v| !v.is_finite())
            || self.area() <= f64::EPSILON
    }

    /// Point containment test (even-odd rule).
    ///
    /// Points lying exactly on an edge or a vertex count as inside.
    /// Degenerate polygons contain nothing.
    pub fn contains(&self, point: &Point) -> bool {
        if !point.is_finite() || self.is_degenerate() {
            return false;
        }

        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;

        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];

            if on_segment(point, &a, &b) {
                return true;
            }

            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
                if point.x < x_cross {
                    inside = !inside;
                }
            }

            j = i;
        }

        inside
    }
}

fn on_segment(p: &Point, a: &Point, b: &Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EDGE_EPSILON * a.distance(b).max(1.0) {
        return false;
    }

    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

/// Axis-aligned bounding box in image pixels, as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x1: f64,
    /// Top edge y-coordinate
    pub y1: f64,
    /// Right edge x-coordinate
    pub x2: f64,
    /// Bottom edge y-coordinate
    pub y2: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Reference point used for lane and speed decisions: bottom-center.
    #[inline]
    pub fn bottom_center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, self.y2)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Return a new box with padding added on all sides.
    pub fn pad(&self, padding: f64) -> BoundingBox {
        BoundingBox {
            x1: self.x1 - padding,
            y1: self.y1 - padding,
            x2: self.x2 + padding,
            y2: self.y2 + padding,
        }
    }

    /// Clamp box edges to the frame boundaries.
    ///
    /// A box entirely outside the frame collapses to zero width or height.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let w = frame_width as f64;
        let h = frame_height as f64;

        BoundingBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        b.as_array()
    }
}
