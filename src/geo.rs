//! Great-circle distance and unit conversions

use crate::types::Coordinate;

/// Mean earth radius (meters)
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters in a statute mile
pub const METERS_PER_MILE: f64 = 1609.34;

/// Multiplier from meters/second to miles/hour
pub const MPS_TO_MPH: f64 = 2.23694;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Haversine distance between two coordinates (meters)
pub fn haversine_meters(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = to_radians(from.latitude);
    let lat2_rad = to_radians(to.latitude);

    let dlat = lat2_rad - lat1_rad;
    let dlon = to_radians(to.longitude - from.longitude);

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Haversine distance between two coordinates (miles)
pub fn haversine_miles(from: Coordinate, to: Coordinate) -> f64 {
    meters_to_miles(haversine_meters(from, to))
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Convert a provider speed to mph. Unknown (negative) or non-finite speeds become 0.
pub fn mps_to_mph(speed_mps: f64) -> f64 {
    if !speed_mps.is_finite() {
        return 0.0;
    }
    (speed_mps * MPS_TO_MPH).max(0.0)
}
