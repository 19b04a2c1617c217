//! Coverage footprints: one convex hull per receiving station.
//!
//! Primary mode hulls each relay's heard-by set around the relay's own
//! position. When no relay qualifies, fallback mode groups segment endpoints
//! on a rounded-coordinate grid and hulls each endpoint's neighbourhood.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::geo::distance_km;
use crate::hull::convex_hull;
use crate::propagation::{PathSegment, PropagationGraph, PropagationParams};
use crate::types::{GridKey, Point};

/// Minimum number of distinct points needed for a footprint.
pub const MIN_FOOTPRINT_POINTS: usize = 3;

/// A coverage polygon anchored at a receiving station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    pub anchor: Point,
    pub hull: Vec<Point>,
    pub max_distance_km: f64,
}

/// Heard-by footprints, or fallback footprints when there are none.
pub fn aggregate(graph: &PropagationGraph, params: &PropagationParams) -> Vec<Footprint> {
    let primary = heard_by_footprints(graph);
    if !primary.is_empty() {
        return primary;
    }
    fallback_footprints(&graph.segments, params.fallback_round_decimals)
}

/// One footprint per positioned relay with at least three heard points.
///
/// The hull covers `{anchor} ∪ heard`; `max_distance_km` is the farthest
/// composing point from the anchor.
pub fn heard_by_footprints(graph: &PropagationGraph) -> Vec<Footprint> {
    let mut footprints = Vec::new();
    for (callsign, heard) in &graph.heard_by {
        if heard.len() < MIN_FOOTPRINT_POINTS {
            continue;
        }
        let Some(station) = graph.positions.get(callsign) else {
            continue;
        };
        let anchor = station.point();

        let mut points = Vec::with_capacity(heard.len() + 1);
        points.push(anchor);
        points.extend(heard.points());

        if let Some(fp) = footprint(anchor, &points, None) {
            footprints.push(fp);
        }
    }
    footprints
}

/// Group segment endpoints by rounded coordinate and hull each group.
///
/// Every endpoint collects itself and the endpoints it is linked to; groups
/// with at least three distinct members become footprints anchored at the
/// rounded coordinate. `max_distance_km` is the longest segment touching it.
pub fn fallback_footprints(segments: &[PathSegment], decimals: u32) -> Vec<Footprint> {
    let mut neighbours: BTreeMap<GridKey, BTreeSet<GridKey>> = BTreeMap::new();
    let mut longest: BTreeMap<GridKey, f64> = BTreeMap::new();

    for seg in segments {
        let k1 = seg.from_pos.grid_key(decimals);
        let k2 = seg.to_pos.grid_key(decimals);
        for (k, other) in [(k1, k2), (k2, k1)] {
            let group = neighbours.entry(k).or_default();
            group.insert(k);
            group.insert(other);
            let d = longest.entry(k).or_insert(0.0);
            *d = d.max(seg.distance_km);
        }
    }

    let mut footprints = Vec::new();
    for (key, group) in &neighbours {
        if group.len() < MIN_FOOTPRINT_POINTS {
            continue;
        }
        let points: Vec<Point> = group.iter().map(|k| k.to_point()).collect();
        let max_dist = longest.get(key).copied().unwrap_or(0.0);
        if let Some(fp) = footprint(key.to_point(), &points, Some(max_dist)) {
            footprints.push(fp);
        }
    }
    footprints
}

fn footprint(anchor: Point, points: &[Point], max_distance_km: Option<f64>) -> Option<Footprint> {
    let hull = convex_hull(points);
    if hull.len() < MIN_FOOTPRINT_POINTS {
        return None;
    }
    let max_distance_km = max_distance_km.unwrap_or_else(|| {
        points
            .iter()
            .map(|p| distance_km(anchor, *p))
            .fold(0.0, f64::max)
    });
    Some(Footprint {
        anchor,
        hull,
        max_distance_km,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::format_position;
    use crate::propagation::build;
    use crate::types::RawFrame;

    fn beacon(ts: f64, header: &str, lat: f64, lon: f64) -> RawFrame {
        RawFrame::new(ts, format!("{header}:{}", format_position(lat, lon, '/', '>')))
    }

    fn segment(a: Point, b: Point) -> PathSegment {
        PathSegment {
            from_callsign: "A".into(),
            to_callsign: "B".into(),
            from_pos: a,
            to_pos: b,
            distance_km: distance_km(a, b),
            observed_at: 0.0,
        }
    }

    fn digi_with_three_sources() -> Vec<RawFrame> {
        vec![
            beacon(0.0, "DIGI>APRS", 35.0, -82.0),
            beacon(1.0, "S1>APRS,DIGI*", 35.5, -82.0),
            beacon(2.0, "S2>APRS,DIGI*", 34.5, -81.5),
            beacon(3.0, "S3>APRS,DIGI*", 34.6, -82.6),
        ]
    }

    #[test]
    fn test_heard_by_footprint() {
        let graph = build(&digi_with_three_sources(), PropagationParams::default()).unwrap();
        let fps = aggregate(&graph, &PropagationParams::default());
        assert_eq!(fps.len(), 1);
        let fp = &fps[0];
        assert!((fp.anchor.lat - 35.0).abs() < 1e-6);
        // Anchor lies inside the triangle of sources
        assert_eq!(fp.hull.len(), 3);
        assert!(!fp.hull.contains(&fp.anchor));
        // S1 is ~56 km away, S2 is the farthest at ~72 km
        assert!(fp.max_distance_km > 60.0 && fp.max_distance_km < 80.0, "{}", fp.max_distance_km);
    }

    #[test]
    fn test_two_heard_points_not_enough() {
        let mut frames = digi_with_three_sources();
        frames.pop();
        let graph = build(&frames, PropagationParams::default()).unwrap();
        assert!(heard_by_footprints(&graph).is_empty());
    }

    #[test]
    fn test_fallback_used_without_heard_by() {
        // Every hop is shorter than the separation threshold, so no heard-by
        // sets form, but segments exist.
        let params = PropagationParams {
            min_separation_km: 10_000.0,
            ..PropagationParams::default()
        };
        let graph = build(&digi_with_three_sources(), params).unwrap();
        assert!(graph.heard_by.is_empty());
        assert_eq!(graph.segments.len(), 3);

        let fps = aggregate(&graph, &params);
        assert_eq!(fps.len(), 1);
        assert!((fps[0].anchor.lat - 35.0).abs() < 1e-6);
        assert_eq!(fps[0].hull.len(), 3);
        let longest = graph
            .segments
            .iter()
            .map(|s| s.distance_km)
            .fold(0.0, f64::max);
        assert_eq!(fps[0].max_distance_km, longest);
    }

    #[test]
    fn test_fallback_rounding_merges_endpoints() {
        let hub = Point::new(35.0, -82.0);
        // Three copies of the hub, each within 2e-5 degrees of the others
        let segs = vec![
            segment(hub, Point::new(35.5, -82.0)),
            segment(Point::new(35.000_01, -82.000_01), Point::new(34.5, -81.5)),
            segment(Point::new(35.000_02, -82.000_02), Point::new(34.6, -82.6)),
        ];
        let fps = fallback_footprints(&segs, 4);
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].anchor, Point::new(35.0, -82.0));

        // At 6 decimals every hub copy stands alone with one neighbour
        let fps = fallback_footprints(&segs, 6);
        assert!(fps.is_empty());
    }

    #[test]
    fn test_fallback_collinear_group_dropped() {
        let hub = Point::new(0.0, 0.0);
        let segs = vec![
            segment(hub, Point::new(1.0, 1.0)),
            segment(hub, Point::new(2.0, 2.0)),
        ];
        assert!(fallback_footprints(&segs, 4).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = PropagationGraph::default();
        assert!(aggregate(&graph, &PropagationParams::default()).is_empty());
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let frames = digi_with_three_sources();
        let params = PropagationParams::default();
        let a = aggregate(&build(&frames, params).unwrap(), &params);
        let b = aggregate(&build(&frames, params).unwrap(), &params);
        assert_eq!(a, b);
    }
}
