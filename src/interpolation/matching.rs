//! Point correspondence between two contours with different vertex counts.
//!
//! The smaller point set proposes to the larger one in a stable-marriage
//! assignment over Euclidean distances. Matches that are far longer than the
//! typical edge of either contour are dropped, and every point of the larger
//! side left without a partner gets a synthetic partner on the edges of the
//! smaller side. The result is two equally long sequences ordered like the larger side.
//!
//! All coordinates are expected to be normalized into comparable ranges.

use std::collections::VecDeque;

use crate::model::geometry::Point;

/// Topology of the curve the points describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    /// Last point connects back to the first (polygons, point sets)
    Closed,
    /// Endpoints are not connected (polylines)
    Open,
}

/// Two point sequences of equal length where `source[i]` corresponds to `target[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    /// Points of the smaller side, including synthetic ones.
    pub source: Vec<Point>,
    /// Points of the larger side, in their original order.
    pub target: Vec<Point>,
    /// Indices of `source` entries that were synthesized.
    pub synthetic: Vec<usize>,
}

/// Pairwise distance matrix, `result[i][j] = |source[i] - target[j]|`.
pub fn distance_matrix(source: &[Point], target: &[Point]) -> Vec<Vec<f64>> {
    source
        .iter()
        .map(|s| target.iter().map(|t| s.distance_to(t)).collect())
        .collect()
}

/// Stable-marriage assignment of proposers (rows) to acceptors (columns).
///
/// Each proposer ranks acceptors by ascending distance and proposes in that
/// order; an acceptor keeps the closest proposer seen so far and dumps the
/// previous one. Requires `rows <= columns`, so every proposer ends up
/// matched. Returns the acceptor index of every proposer.
pub fn stable_marriage(distances: &[Vec<f64>]) -> Vec<usize> {
    let proposers = distances.len();
    let acceptors = distances.first().map(|row| row.len()).unwrap_or(0);
    debug_assert!(proposers <= acceptors);

    let preferences: Vec<Vec<usize>> = distances
        .iter()
        .map(|row| {
            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|a, b| row[*a].total_cmp(&row[*b]));
            order
        })
        .collect();

    let mut next_choice = vec![0usize; proposers];
    let mut engaged_to: Vec<Option<usize>> = vec![None; acceptors];
    let mut free: VecDeque<usize> = (0..proposers).collect();

    while let Some(man) = free.pop_front() {
        let Some(&woman) = preferences[man].get(next_choice[man]) else {
            // Rejected by everyone, only possible when rows > columns
            continue;
        };
        next_choice[man] += 1;

        match engaged_to[woman] {
            None => engaged_to[woman] = Some(man),
            Some(current) if distances[man][woman] < distances[current][woman] => {
                engaged_to[woman] = Some(man);
                free.push_back(current);
            }
            Some(_) => free.push_back(man),
        }
    }

    let mut result = vec![usize::MAX; proposers];
    for (woman, man) in engaged_to.iter().enumerate() {
        if let Some(man) = man {
            result[*man] = woman;
        }
    }
    result
}

/// Threshold above which a match counts as an outlier.
///
/// Computed from the consecutive edge lengths of both sequences combined:
/// `mean + sigma_factor * population_std_dev`. Returns infinity when there
/// are no edges or every edge has zero length.
pub fn outlier_threshold(source: &[Point], target: &[Point], sigma_factor: f64) -> f64 {
    let edges: Vec<f64> = source
        .windows(2)
        .chain(target.windows(2))
        .map(|pair| pair[0].distance_to(&pair[1]))
        .collect();

    if edges.is_empty() {
        return f64::INFINITY;
    }

    let count = edges.len() as f64;
    let mean = edges.iter().sum::<f64>() / count;
    if mean <= 0.0 {
        return f64::INFINITY;
    }

    let variance = edges.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / count;
    mean + sigma_factor * variance.sqrt()
}

/// Compute the correspondence between `source` and `target`.
///
/// `source` must not be longer than `target`.
pub fn correspond(
    source: &[Point],
    target: &[Point],
    kind: CurveKind,
    sigma_factor: f64,
) -> Correspondence {
    debug_assert!(source.len() <= target.len());

    if source.is_empty() {
        return Correspondence {
            source: Vec::new(),
            target: Vec::new(),
            synthetic: Vec::new(),
        };
    }

    let distances = distance_matrix(source, target);
    let assignment = stable_marriage(&distances);

    let threshold = outlier_threshold(source, target, sigma_factor);
    let mut partner_of_target: Vec<Option<usize>> = vec![None; target.len()];
    for (src, &tgt) in assignment.iter().enumerate() {
        if distances[src][tgt] <= threshold {
            partner_of_target[tgt] = Some(src);
        }
    }

    if partner_of_target.iter().all(Option::is_none) {
        log::debug!(
            "Outlier threshold {threshold} rejected every match, keeping all {} matches",
            assignment.len()
        );
        for (src, &tgt) in assignment.iter().enumerate() {
            partner_of_target[tgt] = Some(src);
        }
    }

    let mut result = Correspondence {
        source: Vec::with_capacity(target.len()),
        target: target.to_vec(),
        synthetic: Vec::new(),
    };

    for (index, partner) in partner_of_target.iter().enumerate() {
        match partner {
            Some(src) => result.source.push(source[*src]),
            None => {
                let point = match kind {
                    CurveKind::Closed => fill_closed(index, source, target, &partner_of_target),
                    CurveKind::Open => fill_open(index, source, target, &partner_of_target),
                };
                result.synthetic.push(result.source.len());
                result.source.push(point);
            }
        }
    }

    result
}

/// Length of the path along `points` visiting `indices` in order.
fn path_length(points: &[Point], indices: &[usize]) -> f64 {
    indices
        .windows(2)
        .map(|pair| points[pair[0]].distance_to(&points[pair[1]]))
        .sum()
}

/// Indices from `from` to `to` walking forward, wrapping around.
///
/// `from == to` walks the whole loop back to the start.
fn cyclic_path(from: usize, to: usize, len: usize) -> Vec<usize> {
    let mut path = vec![from];
    let mut current = from;
    loop {
        current = (current + 1) % len;
        path.push(current);
        if current == to {
            break;
        }
    }
    path
}

/// Indices from `from` to `to` without wrapping, in either direction.
fn open_path(from: usize, to: usize) -> Vec<usize> {
    if from <= to {
        (from..=to).collect()
    } else {
        (to..=from).rev().collect()
    }
}

/// Fraction of the path length covered when reaching `point` on `path`.
fn offset_along(points: &[Point], path: &[usize], point: usize) -> f64 {
    let total = path_length(points, path);
    if total <= 0.0 {
        return 0.0;
    }
    let reached = path.iter().position(|&i| i == point).unwrap_or(0);
    path_length(points, &path[..=reached]) / total
}

/// Point at fraction `t` of the arc length of `path`, on its edges.
fn point_along(points: &[Point], path: &[usize], t: f64) -> Point {
    let start = points[path[0]];
    let total = path_length(points, path);
    if total <= 0.0 {
        return start;
    }

    let mut remaining = t.clamp(0.0, 1.0) * total;
    for pair in path.windows(2) {
        let (a, b) = (points[pair[0]], points[pair[1]]);
        let edge = a.distance_to(&b);
        if remaining <= edge {
            return if edge > 0.0 { a.lerp(&b, remaining / edge) } else { a };
        }
        remaining -= edge;
    }
    points[path[path.len() - 1]]
}

fn fill_closed(
    index: usize,
    source: &[Point],
    target: &[Point],
    partners: &[Option<usize>],
) -> Point {
    let len = target.len();
    let prev = (1..=len)
        .map(|step| (index + len - step) % len)
        .find(|&i| partners[i].is_some())
        .unwrap_or(index);
    let next = (1..=len)
        .map(|step| (index + step) % len)
        .find(|&i| partners[i].is_some())
        .unwrap_or(index);

    let (Some(prev_partner), Some(next_partner)) = (partners[prev], partners[next]) else {
        return target[index];
    };

    let t = offset_along(target, &cyclic_path(prev, next, len), index);
    point_along(source, &cyclic_path(prev_partner, next_partner, source.len()), t)
}

fn fill_open(
    index: usize,
    source: &[Point],
    target: &[Point],
    partners: &[Option<usize>],
) -> Point {
    let prev = (0..index).rev().find(|&i| partners[i].is_some());
    let next = (index + 1..target.len()).find(|&i| partners[i].is_some());

    // Missing neighbours are anchored to the endpoints of both curves
    let (path_start, start_anchor) = match prev {
        Some(i) => (i, partners[i]),
        None => (0, Some(0)),
    };
    let (path_end, end_anchor) = match next {
        Some(i) => (i, partners[i]),
        None => (target.len() - 1, Some(source.len() - 1)),
    };

    let (Some(start_anchor), Some(end_anchor)) = (start_anchor, end_anchor) else {
        return target[index];
    };

    let t = offset_along(target, &open_path(path_start, path_end), index);
    point_along(source, &open_path(start_anchor, end_anchor), t)
}
