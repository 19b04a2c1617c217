//! Shared types, error enum, and geographic primitives for aprs-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by aprs-core.
#[derive(Debug, Error)]
pub enum AprsError {
    #[error("frames out of order: {got} arrived after {previous}")]
    OutOfOrder { previous: f64, got: f64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AprsError>;

// ---------------------------------------------------------------------------
// Raw frames
// ---------------------------------------------------------------------------

/// One line received from the feed, exactly as stored.
///
/// `received_at` is Unix epoch seconds at capture time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawFrame {
    pub received_at: f64,
    pub text: String,
}

impl RawFrame {
    pub fn new(received_at: f64, text: impl Into<String>) -> Self {
        RawFrame {
            received_at,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Point { lat, lon }
    }

    /// Integer key after rounding both axes to `decimals` places.
    ///
    /// Used wherever points need set semantics (dedup, grouping) since
    /// `f64` is neither `Eq` nor `Ord`.
    pub fn grid_key(&self, decimals: u32) -> GridKey {
        let scale = 10f64.powi(decimals as i32);
        GridKey {
            lat: (self.lat * scale).round() as i64,
            lon: (self.lon * scale).round() as i64,
            decimals,
        }
    }

    /// Key fine enough to treat two points as identical (micro-degree).
    pub fn exact_key(&self) -> GridKey {
        self.grid_key(EXACT_DECIMALS)
    }
}

/// Decimal places used for exact point identity (~0.1 m).
pub const EXACT_DECIMALS: u32 = 6;

/// A point snapped to a decimal grid. Orders by latitude, then longitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey {
    pub lat: i64,
    pub lon: i64,
    pub decimals: u32,
}

impl GridKey {
    /// Back to degrees (the rounded coordinate).
    pub fn to_point(self) -> Point {
        let scale = 10f64.powi(self.decimals as i32);
        Point::new(self.lat as f64 / scale, self.lon as f64 / scale)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current Unix time in seconds.
pub fn now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Shortest accepted query window, in hours.
pub const MIN_WINDOW_HOURS: f64 = 0.25;
/// Longest accepted query window, in hours (one week).
pub const MAX_WINDOW_HOURS: f64 = 168.0;
/// Window used when the caller gives none.
pub const DEFAULT_WINDOW_HOURS: f64 = 6.0;

/// A look-back window over the packet store.
///
/// The lower bound is closed: a frame received exactly at `now - window`
/// is inside the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    hours: f64,
}

impl Window {
    /// Build a window, clamping to `[MIN_WINDOW_HOURS, MAX_WINDOW_HOURS]`.
    /// NaN or missing input falls back to `default_hours`; infinities clamp.
    pub fn from_hours(hours: Option<f64>, default_hours: f64) -> Self {
        let h = match hours {
            Some(h) if !h.is_nan() => h,
            _ => default_hours,
        };
        Window {
            hours: h.clamp(MIN_WINDOW_HOURS, MAX_WINDOW_HOURS),
        }
    }

    pub fn hours(&self) -> f64 {
        self.hours
    }

    pub fn seconds(&self) -> f64 {
        self.hours * 3600.0
    }

    /// Earliest `received_at` still inside the window.
    pub fn cutoff(&self, now: f64) -> f64 {
        now - self.seconds()
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::from_hours(None, DEFAULT_WINDOW_HOURS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_clamps() {
        assert_eq!(Window::from_hours(Some(0.0), 6.0).hours(), MIN_WINDOW_HOURS);
        assert_eq!(Window::from_hours(Some(1000.0), 6.0).hours(), MAX_WINDOW_HOURS);
        assert_eq!(Window::from_hours(Some(12.0), 6.0).hours(), 12.0);
        assert_eq!(Window::from_hours(None, 6.0).hours(), 6.0);
        assert_eq!(Window::from_hours(Some(f64::NAN), 6.0).hours(), 6.0);
    }

    #[test]
    fn test_window_infinite_hours_clamp() {
        let inf: f64 = "inf".parse().unwrap();
        assert_eq!(Window::from_hours(Some(inf), 6.0).hours(), MAX_WINDOW_HOURS);
        assert_eq!(
            Window::from_hours(Some(f64::NEG_INFINITY), 6.0).hours(),
            MIN_WINDOW_HOURS
        );
    }

    #[test]
    fn test_window_closed_lower_bound() {
        let w = Window::from_hours(Some(1.0), 6.0);
        let now = 1_000_000.0;
        let cutoff = w.cutoff(now);
        assert_eq!(cutoff, 996_400.0);
        assert_eq!(w.seconds(), 3600.0);
    }

    #[test]
    fn test_grid_key_rounding() {
        let p = Point::new(49.058_33, -72.029_17);
        let k = p.grid_key(4);
        assert_eq!(k.lat, 490_583);
        assert_eq!(k.lon, -720_292);
        let back = k.to_point();
        assert!((back.lat - 49.0583).abs() < 1e-9);
        assert!((back.lon + 72.0292).abs() < 1e-9);
    }

    #[test]
    fn test_exact_key_identity() {
        let a = Point::new(35.123_456_7, -82.5);
        let b = Point::new(35.123_456_6, -82.5);
        assert_eq!(a.exact_key(), b.exact_key());
        assert_ne!(a.exact_key(), Point::new(35.1236, -82.5).exact_key());
    }
}
