//! Great-circle distance on a spherical Earth.

use crate::types::Point;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Haversine distance between two points, in kilometres.
pub fn distance_km(a: Point, b: Point) -> f64 {
    haversine_km(a.lat, a.lon, b.lat, b.lon)
}

/// Planar midpoint, good enough for placing a label on a short VHF hop.
pub fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0)
}
