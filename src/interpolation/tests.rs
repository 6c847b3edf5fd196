//! Tests for track interpolation and point correspondence.

use super::*;
use crate::interpolation::matching::distance_matrix;

fn config() -> InterpolationConfig {
    InterpolationConfig::default()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
    }
}

#[test]
fn test_rectangle_midpoint_is_exact() {
    let result = interpolate_points(
        ShapeType::Rectangle,
        &[0.0, 0.0, 10.0, 10.0],
        &[0.0, 0.0, 20.0, 20.0],
        0.5,
        &config(),
    );
    assert_eq!(result, vec![0.0, 0.0, 15.0, 15.0]);
}

#[test]
fn test_points_with_equal_count_interpolate_index_wise() {
    let result = interpolate_points(
        ShapeType::Points,
        &[0.0, 0.0, 10.0, 10.0],
        &[10.0, 10.0, 20.0, 20.0],
        0.5,
        &config(),
    );
    assert_close(&result, &[5.0, 5.0, 15.0, 15.0]);
}

#[test]
fn test_square_to_hexagon_produces_equal_length_sequences() {
    let square = [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0];
    let hexagon = [
        0.0, 0.0, 5.0, 0.0, 10.0, 0.0, 10.0, 10.0, 5.0, 10.0, 0.0, 10.0,
    ];

    let at_start = interpolate_points(ShapeType::Polygon, &square, &hexagon, 0.0, &config());
    assert_close(
        &at_start,
        &[0.0, 0.0, 5.0, 0.0, 10.0, 0.0, 10.0, 10.0, 5.0, 10.0, 0.0, 10.0],
    );

    let at_end = interpolate_points(ShapeType::Polygon, &square, &hexagon, 1.0, &config());
    assert_close(&at_end, &hexagon);

    // Order of the keyframes does not matter for the point count
    let reversed = interpolate_points(ShapeType::Polygon, &hexagon, &square, 0.5, &config());
    assert_eq!(reversed.len(), hexagon.len());
}

#[test]
fn test_stable_marriage_matches_each_proposer_once() {
    let source = vec![
        Point::new(0.0, 0.0),
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.0),
        Point::new(0.0, 1.0),
    ];
    let target = vec![
        Point::new(0.0, 0.1),
        Point::new(0.5, 0.0),
        Point::new(0.9, 0.0),
        Point::new(1.0, 0.9),
        Point::new(0.5, 1.0),
        Point::new(0.1, 1.0),
    ];

    let assignment = stable_marriage(&distance_matrix(&source, &target));
    assert_eq!(assignment.len(), 4);
    let mut used = assignment.clone();
    used.sort_unstable();
    used.dedup();
    assert_eq!(used.len(), 4, "acceptors must not be shared: {assignment:?}");
    assert_eq!(assignment, vec![0, 2, 3, 5]);

    let correspondence = correspond(&source, &target, CurveKind::Closed, 3.0);
    assert_eq!(correspondence.source.len(), 6);
    assert_eq!(correspondence.target.len(), 6);
    assert_eq!(correspondence.synthetic, vec![1, 4]);

    // Every original point of the smaller side appears exactly once
    for point in &source {
        let count = correspondence
            .source
            .iter()
            .enumerate()
            .filter(|(i, p)| *p == point && !correspondence.synthetic.contains(i))
            .count();
        assert_eq!(count, 1);
    }
}

#[test]
fn test_stable_marriage_dumps_worse_suitor() {
    // Both proposers prefer acceptor 0; proposer 1 is closer and wins it
    let distances = vec![vec![1.0, 2.0, 9.0], vec![0.5, 5.0, 6.0]];
    assert_eq!(stable_marriage(&distances), vec![1, 0]);
}

#[test]
fn test_degenerate_bounding_box_uses_reference_box() {
    let point = [Point::new(5.0, 5.0)];
    let boxes = normalization_boxes(&point, &point, &config());
    assert!(boxes.fallback);
    assert_eq!(boxes.left.width(), 1024.0);
    assert_eq!(boxes.left.height(), 768.0);

    let result = interpolate_points(ShapeType::Polygon, &[5.0, 5.0], &[5.0, 5.0], 0.5, &config());
    assert!(result.iter().all(|c| c.is_finite()));
    assert_close(&result, &[5.0, 5.0]);
}

#[test]
fn test_regular_boxes_do_not_fall_back() {
    let left = [Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
    let right = [Point::new(5.0, 5.0), Point::new(50.0, 30.0)];
    let boxes = normalization_boxes(&left, &right, &config());
    assert!(!boxes.fallback);
    assert_eq!(boxes.right.width(), 45.0);
}

#[test]
fn test_axis_aligned_polyline_stays_finite() {
    let result = interpolate_points(
        ShapeType::Polyline,
        &[0.0, 0.0, 10.0, 0.0],
        &[0.0, 0.0, 5.0, 0.0, 10.0, 0.0],
        0.5,
        &config(),
    );
    assert!(result.iter().all(|c| c.is_finite()));
    assert_close(&result, &[0.0, 0.0, 5.0, 0.0, 10.0, 0.0]);
}

#[test]
fn test_three_sigma_truncation_drops_far_pairing() {
    let target: Vec<Point> = (0..20).map(|i| Point::new(i as f64 * 0.001, 0.0)).collect();
    let mut source: Vec<Point> = (0..10).map(|i| Point::new(i as f64 * 0.001, 0.0)).collect();
    let far = Point::new(1.0, 1.0);
    source.push(far);

    let threshold = outlier_threshold(&source, &target, 3.0);
    let far_distance = far.distance_to(&target[19]);
    let edges = 28.0 * 0.001 + far.distance_to(&source[9]);
    let mean_edge = edges / 29.0;
    assert!(far_distance > 10.0 * mean_edge);
    assert!(far_distance > threshold);

    let result = correspond(&source, &target, CurveKind::Closed, 3.0);
    assert_eq!(result.source.len(), 20);
    assert_eq!(result.target.len(), 20);
    assert!(!result.source.contains(&far));
    assert_eq!(result.synthetic, (10..20).collect::<Vec<_>>());
    assert!(
        result
            .source
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
    );
}

#[test]
fn test_no_edges_means_no_truncation() {
    let single = [Point::new(0.0, 0.0)];
    assert_eq!(outlier_threshold(&single, &single, 3.0), f64::INFINITY);
}

#[test]
fn test_open_curve_anchors_unmatched_start_to_endpoint() {
    let source = [Point::new(0.5, 0.0), Point::new(1.0, 0.0)];
    let target = [Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(1.0, 0.0)];

    let open = correspond(&source, &target, CurveKind::Open, 3.0);
    assert_eq!(open.synthetic, vec![0]);
    assert_eq!(open.source[0], Point::new(0.5, 0.0));

    // A closed walk wraps around and lands between the last and first partner
    let closed = correspond(&source, &target, CurveKind::Closed, 3.0);
    assert_eq!(closed.synthetic, vec![0]);
    assert!((closed.source[0].x - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_synthetic_points_follow_edges_of_smaller_side() {
    let square = [
        Point::new(0.0, 0.0),
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.0),
        Point::new(0.0, 1.0),
    ];
    let target: Vec<Point> = (0..6).map(|i| Point::new(i as f64 * 0.1, 0.0)).collect();

    // Corners (1,1) and (0,1) end up on targets 4 and 1, so the partners
    // around targets 2 and 3 are not adjacent on the square
    let result = correspond(&square, &target, CurveKind::Closed, 3.0);
    assert_eq!(result.synthetic, vec![2, 3]);
    assert_eq!(result.source[1], square[3]);
    assert_eq!(result.source[4], square[2]);

    let on_edge = |p: &Point| {
        let near = |a: f64, b: f64| (a - b).abs() < 1e-9;
        let inside = |v: f64| (-1e-9..=1.0 + 1e-9).contains(&v);
        ((near(p.x, 0.0) || near(p.x, 1.0)) && inside(p.y))
            || ((near(p.y, 0.0) || near(p.y, 1.0)) && inside(p.x))
    };
    assert!(result.source.iter().all(on_edge), "{:?}", result.source);

    // The walk from (0,1) to (1,1) goes around through (0,0) and (1,0)
    assert!(result.source[2].distance_to(&square[0]) < 1e-9);
    assert!(result.source[3].distance_to(&square[1]) < 1e-9);
}

#[test]
fn test_synthetic_point_on_closing_edge() {
    let triangle = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 3.0)];
    let target = [
        Point::new(0.0, 0.0),
        Point::new(4.0, 0.0),
        Point::new(0.0, 3.0),
        Point::new(0.0, 1.5),
    ];

    let result = correspond(&triangle, &target, CurveKind::Closed, 3.0);
    assert_eq!(result.synthetic, vec![3]);
    // Halfway along the closing edge from (0,3) back to (0,0)
    assert!(result.source[3].distance_to(&Point::new(0.0, 1.5)) < 1e-9);
}
