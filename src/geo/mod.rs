use crate::models::agent::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

/// Travel-time estimate from distance and an average-speed model.
///
/// Nonzero distances never report less than `min_eta_secs`.
pub fn eta_seconds(distance_m: f64, speed_mps: f64, min_eta_secs: u64) -> u64 {
    if distance_m <= 0.0 || speed_mps <= 0.0 {
        return 0;
    }

    let raw = (distance_m / speed_mps).ceil() as u64;
    raw.max(min_eta_secs)
}
