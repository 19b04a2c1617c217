//! Read API payloads: the propagation overlay and station locations.
//!
//! These are the JSON shapes the map layer consumes. Building them is pure;
//! fetching the frames for a window is the caller's job.

use serde::Serialize;

use crate::footprint::{aggregate, Footprint};
use crate::geo::midpoint;
use crate::propagation::{build, latest_positions, PathSegment, PropagationParams, StationPosition};
use crate::types::{RawFrame, Result};

/// Legend label attached to every overlay value.
pub const VALUE_LABEL: &str = "VHF path km";

/// A footprint polygon as sent to the map. Hull vertices are `[lat, lon]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blob {
    pub lat: f64,
    pub lon: f64,
    pub hull: Vec<[f64; 2]>,
    #[serde(rename = "maxDist")]
    pub max_dist: f64,
}

impl From<&Footprint> for Blob {
    fn from(fp: &Footprint) -> Self {
        Blob {
            lat: fp.anchor.lat,
            lon: fp.anchor.lon,
            hull: fp.hull.iter().map(|p| [p.lat, p.lon]).collect(),
            max_dist: fp.max_distance_km,
        }
    }
}

/// Line and polygon data for one window.
///
/// `coordinates` are `[lon, lat, km]`, `segments` are
/// `[lon1, lat1, lon2, lat2, km]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationOverlay {
    pub coordinates: Vec<[f64; 3]>,
    pub segments: Vec<[f64; 5]>,
    pub blobs: Vec<Blob>,
    #[serde(rename = "valueLabel")]
    pub value_label: String,
}

impl PropagationOverlay {
    pub fn empty() -> Self {
        PropagationOverlay {
            coordinates: Vec::new(),
            segments: Vec::new(),
            blobs: Vec::new(),
            value_label: VALUE_LABEL.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty() && self.segments.is_empty() && self.blobs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub callsign: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "lastSeen")]
    pub last_seen: f64,
    #[serde(rename = "symbolTable")]
    pub symbol_table: char,
    pub symbol: char,
}

impl From<StationPosition> for Location {
    fn from(sp: StationPosition) -> Self {
        Location {
            callsign: sp.callsign,
            lat: sp.lat,
            lon: sp.lon,
            last_seen: sp.last_seen,
            symbol_table: sp.symbol_table,
            symbol: sp.symbol_code,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationsResponse {
    pub locations: Vec<Location>,
}

impl LocationsResponse {
    pub fn empty() -> Self {
        LocationsResponse::default()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Endpoints and midpoint of every segment, each tagged with its distance.
pub fn rasterize(segments: &[PathSegment]) -> Vec<[f64; 3]> {
    let mut coords = Vec::with_capacity(segments.len() * 3);
    for seg in segments {
        let mid = midpoint(seg.from_pos, seg.to_pos);
        let d = seg.distance_km;
        coords.push([seg.from_pos.lon, seg.from_pos.lat, d]);
        coords.push([seg.to_pos.lon, seg.to_pos.lat, d]);
        coords.push([mid.lon, mid.lat, d]);
    }
    coords
}

/// Replay `frames` (ascending by capture time) into the overlay payload.
pub fn propagation_overlay(
    frames: &[RawFrame],
    params: PropagationParams,
) -> Result<PropagationOverlay> {
    let graph = build(frames, params)?;
    let footprints = aggregate(&graph, &params);

    Ok(PropagationOverlay {
        coordinates: rasterize(&graph.segments),
        segments: graph
            .segments
            .iter()
            .map(|s| {
                [
                    s.from_pos.lon,
                    s.from_pos.lat,
                    s.to_pos.lon,
                    s.to_pos.lat,
                    s.distance_km,
                ]
            })
            .collect(),
        blobs: footprints.iter().map(Blob::from).collect(),
        value_label: VALUE_LABEL.to_string(),
    })
}

/// Latest position per callsign, ordered by callsign.
pub fn locations(frames: &[RawFrame]) -> Result<LocationsResponse> {
    let positions = latest_positions(frames)?;
    Ok(LocationsResponse {
        locations: positions.into_values().map(Location::from).collect(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
