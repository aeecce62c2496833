#![forbid(unsafe_code)]

use wayguide_kernel_contracts::route::Route;
use wayguide_kernel_contracts::GeoPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Stride into raw geometry when a step carries no better waypoint.
pub const GEOMETRY_FALLBACK_STRIDE: usize = 10;

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let s_lat = (dlat / 2.0).sin();
    let s_lng = (dlng / 2.0).sin();
    let h = s_lat * s_lat + lat1.cos() * lat2.cos() * s_lng * s_lng;
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in `[0, 360)`.
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Moves from `from` toward `to` by at most `step_m`, interpolating linearly in degrees.
/// Returns `to` once within one step, and `from` when already within a meter.
pub fn step_toward(from: GeoPoint, to: GeoPoint, step_m: f64) -> GeoPoint {
    let remaining = haversine_m(from, to);
    if remaining <= 1.0 || step_m <= 0.0 {
        return from;
    }
    let fraction = (step_m / remaining).min(1.0);
    GeoPoint {
        lat: from.lat + fraction * (to.lat - from.lat),
        lng: from.lng + fraction * (to.lng - from.lng),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointSource {
    InstructionEnd,
    GeometryWayPoint,
    RouteWaypoint,
    GeometryStride,
}

/// End-of-step target for `step_index`, with where it came from.
///
/// Preference order: the instruction's own end coordinate, its `way_points` end index into the
/// geometry, the route waypoint at the same index, then a strided geometry point.
pub fn waypoint_for_step(route: &Route, step_index: usize) -> Option<(GeoPoint, WaypointSource)> {
    let instruction = route.instruction(step_index)?;
    if let Some(end) = instruction.end_location {
        return Some((end, WaypointSource::InstructionEnd));
    }
    if let Some([_, end_idx]) = instruction.way_points {
        if let Some(p) = route.geometry.get(end_idx) {
            return Some((*p, WaypointSource::GeometryWayPoint));
        }
    }
    if let Some(p) = route.waypoints.get(step_index) {
        return Some((*p, WaypointSource::RouteWaypoint));
    }
    if route.geometry.is_empty() {
        return None;
    }
    let idx = step_index
        .saturating_mul(GEOMETRY_FALLBACK_STRIDE)
        .min(route.geometry.len() - 1);
    Some((route.geometry[idx], WaypointSource::GeometryStride))
}

pub fn distance_to_step_waypoint(route: &Route, step_index: usize, at: GeoPoint) -> Option<f64> {
    waypoint_for_step(route, step_index).map(|(wp, _)| haversine_m(at, wp))
}
