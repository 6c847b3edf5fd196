//! Geometry primitives shared by shapes, tracks and the interpolation code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnnotationError, Result};

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Point on the segment `self -> other` at fraction `t`.
    pub fn lerp(&self, other: &Point, t: f64) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Split a flat `[x0, y0, x1, y1, ...]` sequence into points.
///
/// A trailing odd coordinate is ignored.
pub fn to_points(coords: &[f64]) -> Vec<Point> {
    coords
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect()
}

/// Flatten points into `[x0, y0, x1, y1, ...]`.
pub fn to_flat(points: &[Point]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

/// An axis-aligned bounding box given by its extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Smallest box enclosing all points. Returns None for an empty slice.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            bbox.xmin = bbox.xmin.min(p.x);
            bbox.ymin = bbox.ymin.min(p.y);
            bbox.xmax = bbox.xmax.max(p.x);
            bbox.ymax = bbox.ymax.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Map a point into the unit box spanned by `self`.
    pub fn normalize(&self, point: &Point) -> Point {
        Point::new(
            (point.x - self.xmin) / self.width(),
            (point.y - self.ymin) / self.height(),
        )
    }

    /// Inverse of [`BoundingBox::normalize`].
    pub fn denormalize(&self, point: &Point) -> Point {
        Point::new(
            point.x * self.width() + self.xmin,
            point.y * self.height() + self.ymin,
        )
    }
}

/// Geometry kind of a shape or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    /// Axis-aligned box stored as `[xtl, ytl, xbr, ybr]`
    Rectangle,
    /// Closed contour
    Polygon,
    /// Open curve
    Polyline,
    /// Unconnected point set
    Points,
}

impl ShapeType {
    /// All geometry kinds.
    pub fn all() -> &'static [ShapeType] {
        &[
            ShapeType::Rectangle,
            ShapeType::Polygon,
            ShapeType::Polyline,
            ShapeType::Points,
        ]
    }

    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Rectangle => "rectangle",
            ShapeType::Polygon => "polygon",
            ShapeType::Polyline => "polyline",
            ShapeType::Points => "points",
        }
    }

    /// Minimum number of points a shape of this kind must have.
    pub fn min_points(&self) -> usize {
        match self {
            ShapeType::Rectangle => 2,
            ShapeType::Polygon => 3,
            ShapeType::Polyline => 2,
            ShapeType::Points => 1,
        }
    }

    /// Check a flat coordinate sequence against this kind.
    pub fn validate_points(&self, coords: &[f64]) -> Result<()> {
        if coords.len() % 2 != 0 {
            return Err(AnnotationError::argument(format!(
                "Points of a {} must come in x/y pairs, got {} coordinates",
                self,
                coords.len()
            )));
        }
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(AnnotationError::argument(format!(
                "Point coordinates must be finite numbers, got {bad}"
            )));
        }

        let count = coords.len() / 2;
        let valid = match self {
            ShapeType::Rectangle => count == 2,
            _ => count >= self.min_points(),
        };
        if !valid {
            return Err(AnnotationError::argument(format!(
                "A {} expects {} points, got {}",
                self,
                match self {
                    ShapeType::Rectangle => "exactly 2".to_string(),
                    other => format!("at least {}", other.min_points()),
                },
                count
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeType {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rectangle" => Ok(ShapeType::Rectangle),
            "polygon" => Ok(ShapeType::Polygon),
            "polyline" => Ok(ShapeType::Polyline),
            "points" => Ok(ShapeType::Points),
            other => Err(AnnotationError::data(format!(
                "An unexpected type of shape \"{other}\""
            ))),
        }
    }
}
