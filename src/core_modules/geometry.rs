// THEORY:
// The `geometry` module defines the per-tick input of the whole engine: a tracked
// entity's identity plus its geometry estimate, as handed over by the external
// multi-object tracker.
//
// Key architectural principles:
// 1.  **Tagged Geometry**: A tracker reports either a set of key points or an explicit
//     box. Both are variants of one `Geometry` enum and expose the same two accessors,
//     `centroid()` and `bounding_box()`. No component looks at variant fields.
// 2.  **Dumb Data Containers**: `Point`, `BoundingBox` and `Observation` carry no
//     memory of previous frames. All state lives in the accumulators.
// 3.  **Pixel Space**: `x` is the column and `y` is the row, origin at the top-left
//     corner of the frame, for every component.

use crate::error::ObservationError;
use serde::{Deserialize, Serialize};

/// A 2D point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned box given by its top-left and bottom-right corners.
///
/// Corners are stored as given; a box whose corners are swapped has a zero or
/// negative area and is treated as degenerate by the dwell logic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    pub const fn new(top_left: Point, bottom_right: Point) -> Self {
        Self { top_left, bottom_right }
    }

    pub const fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    pub fn width(&self) -> f64 {
        self.bottom_right.x - self.top_left.x
    }

    pub fn height(&self) -> f64 {
        self.bottom_right.y - self.top_left.y
    }

    /// Width times height. Zero or negative for degenerate boxes.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn centroid(&self) -> Point {
        Point::new(
            (self.top_left.x + self.bottom_right.x) / 2.0,
            (self.top_left.y + self.bottom_right.y) / 2.0,
        )
    }

    /// Area of the rectangle spanned by the larger top-left corner and the smaller
    /// bottom-right corner. Disjoint boxes give zero.
    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let left = self.top_left.x.max(other.top_left.x);
        let top = self.top_left.y.max(other.top_left.y);
        let right = self.bottom_right.x.min(other.bottom_right.x);
        let bottom = self.bottom_right.y.min(other.bottom_right.y);

        let width = right - left;
        let height = bottom - top;
        if width <= 0.0 || height <= 0.0 {
            0.0
        } else {
            width * height
        }
    }
}

/// The geometry estimate a tracker reports for one entity in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    /// Key points (for a box-shaped estimate, its two corners).
    Points(Vec<Point>),
    /// An explicit box.
    Box(BoundingBox),
}

impl Geometry {
    /// Mean of the points, or the mean of the two box corners.
    pub fn centroid(&self) -> Option<Point> {
        match self {
            Geometry::Points(points) => {
                if points.is_empty() {
                    return None;
                }
                let n = points.len() as f64;
                let (sx, sy) = points
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
                Some(Point::new(sx / n, sy / n))
            }
            Geometry::Box(bbox) => Some(bbox.centroid()),
        }
    }

    /// The explicit box, or the axis-aligned extent of the points.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Points(points) => {
                let first = points.first()?;
                let (min, max) = points.iter().skip(1).fold((*first, *first), |(min, max), p| {
                    (
                        Point::new(min.x.min(p.x), min.y.min(p.y)),
                        Point::new(max.x.max(p.x), max.y.max(p.y)),
                    )
                });
                Some(BoundingBox::new(min, max))
            }
            Geometry::Box(bbox) => Some(*bbox),
        }
    }

    fn fault(&self) -> Option<&'static str> {
        match self {
            Geometry::Points(points) if points.is_empty() => Some("empty point set"),
            Geometry::Points(points) if !points.iter().all(Point::is_finite) => {
                Some("non-finite point coordinate")
            }
            Geometry::Box(bbox) if !(bbox.top_left.is_finite() && bbox.bottom_right.is_finite()) => {
                Some("non-finite box corner")
            }
            _ => None,
        }
    }
}

/// One tracked entity as seen in the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: u64,
    pub geometry: Geometry,
}

impl Observation {
    pub fn new(id: u64, geometry: Geometry) -> Self {
        Self { id, geometry }
    }

    pub fn with_box(id: u64, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(id, Geometry::Box(BoundingBox::from_corners(x0, y0, x1, y1)))
    }

    pub fn with_points(id: u64, points: Vec<Point>) -> Self {
        Self::new(id, Geometry::Points(points))
    }

    /// Checks that the geometry can be used by every component this tick.
    pub fn validate(&self) -> Result<(), ObservationError> {
        match self.geometry.fault() {
            Some(reason) => Err(ObservationError::UnsupportedGeometry { id: self.id, reason }),
            None => Ok(()),
        }
    }

    pub fn centroid(&self) -> Result<Point, ObservationError> {
        self.validate()?;
        self.geometry.centroid().ok_or(ObservationError::UnsupportedGeometry {
            id: self.id,
            reason: "no centroid",
        })
    }

    pub fn bounding_box(&self) -> Result<BoundingBox, ObservationError> {
        self.validate()?;
        self.geometry.bounding_box().ok_or(ObservationError::UnsupportedGeometry {
            id: self.id,
            reason: "no bounding box",
        })
    }
}
