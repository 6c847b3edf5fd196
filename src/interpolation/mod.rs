//! Track interpolation between two keyframes.
//!
//! Rectangles are interpolated coordinate by coordinate. Polygons, polylines
//! and point sets may have different vertex counts on the two keyframes, so
//! their points are first brought into correspondence (see [`matching`]) in a
//! normalized space and then interpolated pairwise.

pub mod matching;

#[cfg(test)]
mod tests;

use crate::config::InterpolationConfig;
use crate::model::geometry::{BoundingBox, Point, ShapeType, to_flat, to_points};

pub use matching::{Correspondence, CurveKind, correspond, outlier_threshold, stable_marriage};

/// Bounding boxes used to normalize the two keyframes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationBoxes {
    pub left: BoundingBox,
    pub right: BoundingBox,
    /// True when a degenerate box forced the reference box on both sides
    pub fallback: bool,
}

/// Pick the normalization boxes for two point sets.
///
/// Each side uses its own bounding box unless either box is thinner than
/// `degenerate_delta` in some direction, in which case both sides use the
/// reference box so that normalization never divides by zero.
pub fn normalization_boxes(
    left: &[Point],
    right: &[Point],
    config: &InterpolationConfig,
) -> NormalizationBoxes {
    let reference = BoundingBox::new(0.0, 0.0, config.reference_width, config.reference_height);
    let degenerate = |bbox: &Option<BoundingBox>| match bbox {
        Some(b) => b.width() < config.degenerate_delta || b.height() < config.degenerate_delta,
        None => true,
    };

    let left_box = BoundingBox::enclosing(left);
    let right_box = BoundingBox::enclosing(right);

    match (left_box, right_box) {
        (Some(l), Some(r)) if !degenerate(&left_box) && !degenerate(&right_box) => {
            NormalizationBoxes {
                left: l,
                right: r,
                fallback: false,
            }
        }
        _ => NormalizationBoxes {
            left: reference,
            right: reference,
            fallback: true,
        },
    }
}

/// Interpolate two flat coordinate sequences at time fraction `offset`.
///
/// `offset` is `(target - left_frame) / (right_frame - left_frame)`. The
/// result has as many points as the larger keyframe for polygon-like shapes.
pub fn interpolate_points(
    shape_type: ShapeType,
    left: &[f64],
    right: &[f64],
    offset: f64,
    config: &InterpolationConfig,
) -> Vec<f64> {
    match shape_type {
        ShapeType::Rectangle => linear(left, right, offset),
        ShapeType::Points if left.len() == right.len() => linear(left, right, offset),
        ShapeType::Points | ShapeType::Polygon => {
            interpolate_contour(left, right, offset, CurveKind::Closed, config)
        }
        ShapeType::Polyline => interpolate_contour(left, right, offset, CurveKind::Open, config),
    }
}

fn linear(left: &[f64], right: &[f64], offset: f64) -> Vec<f64> {
    left.iter()
        .zip(right)
        .map(|(l, r)| l + (r - l) * offset)
        .collect()
}

fn interpolate_contour(
    left: &[f64],
    right: &[f64],
    offset: f64,
    kind: CurveKind,
    config: &InterpolationConfig,
) -> Vec<f64> {
    let left_points = to_points(left);
    let right_points = to_points(right);
    if left_points.is_empty() || right_points.is_empty() {
        return left.to_vec();
    }

    let boxes = normalization_boxes(&left_points, &right_points, config);
    if boxes.fallback {
        log::debug!("Degenerate keyframe bounding box, normalizing with the reference box");
    }

    let left_normalized: Vec<Point> = left_points.iter().map(|p| boxes.left.normalize(p)).collect();
    let right_normalized: Vec<Point> = right_points
        .iter()
        .map(|p| boxes.right.normalize(p))
        .collect();

    let (new_left, new_right) = if left_normalized.len() <= right_normalized.len() {
        let c = correspond(&left_normalized, &right_normalized, kind, config.sigma_factor);
        (c.source, c.target)
    } else {
        let c = correspond(&right_normalized, &left_normalized, kind, config.sigma_factor);
        (c.target, c.source)
    };

    let interpolated: Vec<Point> = new_left
        .iter()
        .zip(&new_right)
        .map(|(l, r)| {
            let l = boxes.left.denormalize(l);
            let r = boxes.right.denormalize(r);
            l.lerp(&r, offset)
        })
        .collect();

    to_flat(&interpolated)
}
