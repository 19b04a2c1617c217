//! Read API: windowed queries over the packet store.
//!
//! Every call opens its own connection, replays the window from scratch, and
//! degrades to an empty payload on any failure. Nothing here returns an error.

use std::path::Path;

use tracing::{debug, warn};

use aprs_core::overlay::{self, LocationsResponse, PropagationOverlay};
use aprs_core::propagation::PropagationParams;
use aprs_core::types::{RawFrame, Window};
use aprs_feeder::store::{PacketStore, StoreStats};

/// Frames inside `window` ending at `now`, oldest first.
///
/// `None` when the store is absent or unreadable.
fn load_frames(db_path: &Path, window: Window, now: f64) -> Option<Vec<RawFrame>> {
    let store = match PacketStore::open_existing(db_path) {
        Ok(Some(s)) => s,
        Ok(None) => {
            debug!("packet store not found: {}", db_path.display());
            return None;
        }
        Err(e) => {
            debug!("packet store open failed: {e}");
            return None;
        }
    };
    match store.frames_since(window.cutoff(now)) {
        Ok(frames) => Some(frames),
        Err(e) => {
            debug!("packet store read failed: {e}");
            None
        }
    }
}

/// Segments, rasterized points, and footprints for the window.
pub fn propagation_overlay(
    db_path: &Path,
    window: Window,
    now: f64,
    params: PropagationParams,
) -> PropagationOverlay {
    let Some(frames) = load_frames(db_path, window, now) else {
        return PropagationOverlay::empty();
    };
    overlay::propagation_overlay(&frames, params).unwrap_or_else(|e| {
        warn!("propagation replay failed: {e}");
        PropagationOverlay::empty()
    })
}

/// Latest position per callsign in the window.
pub fn locations(db_path: &Path, window: Window, now: f64) -> LocationsResponse {
    let Some(frames) = load_frames(db_path, window, now) else {
        return LocationsResponse::empty();
    };
    overlay::locations(&frames).unwrap_or_else(|e| {
        warn!("location replay failed: {e}");
        LocationsResponse::empty()
    })
}

/// Store statistics; zero count when the store is absent or unreadable.
pub fn stats(db_path: &Path) -> StoreStats {
    let empty = StoreStats {
        count: 0,
        oldest: None,
        newest: None,
    };
    match PacketStore::open_existing(db_path) {
        Ok(Some(store)) => store.stats().unwrap_or_else(|e| {
            debug!("packet store stats failed: {e}");
            empty
        }),
        Ok(None) => empty,
        Err(e) => {
            debug!("packet store open failed: {e}");
            empty
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
