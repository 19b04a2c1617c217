//! Planar convex hull over (longitude, latitude).
//!
//! Treats longitude as x and latitude as y. Fine for single-country VHF
//! footprints; wrong near the poles and across the antimeridian.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::Point;

/// Convex hull in counter-clockwise order, starting from the point with the
/// smallest latitude (then smallest longitude).
///
/// Duplicate points are collapsed first. Fewer than three distinct points are
/// returned as-is. Collinear input degenerates to its two extreme points.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let distinct: Vec<Point> = points
        .iter()
        .map(|p| (p.exact_key(), *p))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect();
    if distinct.len() < 3 {
        return distinct;
    }

    // BTreeMap order is (lat, lon) ascending, so the first entry is the start.
    let start = distinct[0];
    let mut rest: Vec<Point> = distinct[1..].to_vec();
    rest.sort_by(|a, b| polar_order(start, *a, *b));

    let mut hull: Vec<Point> = vec![start];
    for p in rest {
        while hull.len() >= 2 {
            let a = hull[hull.len() - 2];
            let b = hull[hull.len() - 1];
            if cross(a, b, p) <= 0.0 {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(p);
    }
    hull
}

/// Z component of (b - a) x (p - b) with lon as x, lat as y.
/// Positive for a left (counter-clockwise) turn.
fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.lon - a.lon) * (p.lat - b.lat) - (b.lat - a.lat) * (p.lon - b.lon)
}

fn polar_order(start: Point, a: Point, b: Point) -> Ordering {
    let angle = |p: Point| (p.lat - start.lat).atan2(p.lon - start.lon);
    angle(a)
        .total_cmp(&angle(b))
        .then(a.lat.total_cmp(&b.lat))
        .then(a.lon.total_cmp(&b.lon))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
