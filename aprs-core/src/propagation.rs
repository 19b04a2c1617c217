//! Replay stored frames into a propagation graph.
//!
//! Pure logic, no I/O. Frames must arrive in ascending `received_at` order;
//! the builder keeps the latest position per callsign and, for every hop in
//! a frame's path, derives:
//!
//! - a `PathSegment` between adjacent stations that both have a position, and
//! - a heard-by entry: relay `D` heard source `S` at `S`'s position, kept only
//!   when the two are at least `min_separation_km` apart.
//!
//! Both outputs come out of the same single ordered scan.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::frame::{parse_tnc2, ParsedFrame};
use crate::geo::distance_km;
use crate::types::{AprsError, GridKey, Point, RawFrame, Result};

/// Default minimum source-to-relay distance for a heard-by entry.
pub const DEFAULT_MIN_SEPARATION_KM: f64 = 20.0;

/// Default rounding (decimal places) when grouping fallback endpoints.
pub const DEFAULT_FALLBACK_ROUND_DECIMALS: u32 = 4;

/// Tunables for the read path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationParams {
    /// Heard-by pairs closer than this are treated as co-located noise.
    pub min_separation_km: f64,
    /// Decimal places used to group segment endpoints in fallback mode.
    pub fallback_round_decimals: u32,
}

impl Default for PropagationParams {
    fn default() -> Self {
        PropagationParams {
            min_separation_km: DEFAULT_MIN_SEPARATION_KM,
            fallback_round_decimals: DEFAULT_FALLBACK_ROUND_DECIMALS,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived entities
// ---------------------------------------------------------------------------

/// Latest known position of a station within the replayed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationPosition {
    pub callsign: String,
    pub lat: f64,
    pub lon: f64,
    pub last_seen: f64,
    pub symbol_table: char,
    pub symbol_code: char,
}

impl StationPosition {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// One hop between two positioned stations in a frame's path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSegment {
    pub from_callsign: String,
    pub to_callsign: String,
    pub from_pos: Point,
    pub to_pos: Point,
    pub distance_km: f64,
    pub observed_at: f64,
}

/// Distinct source positions heard through one relay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeardBySet {
    points: BTreeMap<GridKey, Point>,
}

impl HeardBySet {
    pub fn insert(&mut self, p: Point) {
        self.points.entry(p.exact_key()).or_insert(p);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in (lat, lon) order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.values().copied()
    }
}

/// Everything derived from one replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationGraph {
    pub positions: BTreeMap<String, StationPosition>,
    pub segments: Vec<PathSegment>,
    pub heard_by: BTreeMap<String, HeardBySet>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Single-pass, order-checked replay of raw frames.
pub struct GraphBuilder {
    params: PropagationParams,
    graph: PropagationGraph,
    last_received_at: Option<f64>,
    pub total_frames: u64,
    pub position_frames: u64,
}

impl GraphBuilder {
    pub fn new(params: PropagationParams) -> Self {
        GraphBuilder {
            params,
            graph: PropagationGraph::default(),
            last_received_at: None,
            total_frames: 0,
            position_frames: 0,
        }
    }

    /// Feed the next frame. Rejects a frame older than its predecessor.
    pub fn push(&mut self, frame: &RawFrame) -> Result<()> {
        check_order(&mut self.last_received_at, frame.received_at)?;
        self.total_frames += 1;

        let Some(parsed) = parse_tnc2(&frame.text) else {
            return Ok(());
        };
        self.apply(&parsed, frame.received_at);
        Ok(())
    }

    pub fn finish(self) -> PropagationGraph {
        self.graph
    }

    fn apply(&mut self, frame: &ParsedFrame, received_at: f64) {
        let own_position = frame.position();
        if let Some(p) = own_position {
            self.position_frames += 1;
            record_position(&mut self.graph.positions, frame, p, received_at);
        }

        let stations = frame.stations();

        for pair in stations.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (Some(pa), Some(pb)) = (self.known(a), self.known(b)) else {
                continue;
            };
            self.graph.segments.push(PathSegment {
                from_callsign: a.to_string(),
                to_callsign: b.to_string(),
                from_pos: pa,
                to_pos: pb,
                distance_km: distance_km(pa, pb),
                observed_at: received_at,
            });
        }

        let Some(source_pos) = own_position.or_else(|| self.known(&frame.source)) else {
            return;
        };
        for relay in &stations[1..] {
            let Some(relay_pos) = self.known(relay) else {
                continue;
            };
            if distance_km(relay_pos, source_pos) < self.params.min_separation_km {
                continue;
            }
            self.graph
                .heard_by
                .entry(relay.to_string())
                .or_default()
                .insert(source_pos);
        }
    }

    fn known(&self, callsign: &str) -> Option<Point> {
        self.graph.positions.get(callsign).map(StationPosition::point)
    }
}

fn record_position(
    positions: &mut BTreeMap<String, StationPosition>,
    frame: &ParsedFrame,
    p: Point,
    received_at: f64,
) {
    let (symbol_table, symbol_code) = frame.symbol();
    positions.insert(
        frame.source.clone(),
        StationPosition {
            callsign: frame.source.clone(),
            lat: p.lat,
            lon: p.lon,
            last_seen: received_at,
            symbol_table,
            symbol_code,
        },
    );
}

/// Replay `frames` (ascending by `received_at`) into a graph.
pub fn build(frames: &[RawFrame], params: PropagationParams) -> Result<PropagationGraph> {
    let mut builder = GraphBuilder::new(params);
    for frame in frames {
        builder.push(frame)?;
    }
    Ok(builder.finish())
}

/// Latest position per callsign, without path processing.
/// Reject a frame older than the one before it, then remember its time.
fn check_order(last: &mut Option<f64>, received_at: f64) -> Result<()> {
    if let Some(previous) = *last {
        if received_at < previous {
            return Err(AprsError::OutOfOrder {
                previous,
                got: received_at,
            });
        }
    }
    *last = Some(received_at);
    Ok(())
}

pub fn latest_positions(frames: &[RawFrame]) -> Result<BTreeMap<String, StationPosition>> {
    let mut positions = BTreeMap::new();
    let mut last = None;
    for frame in frames {
        check_order(&mut last, frame.received_at)?;

        let Some(parsed) = parse_tnc2(&frame.text) else {
            continue;
        };
        if let Some(p) = parsed.position() {
            record_position(&mut positions, &parsed, p, frame.received_at);
        }
    }
    Ok(positions)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
