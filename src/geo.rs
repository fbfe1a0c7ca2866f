//! Distance and angle math over fixed-point coordinates.
//!
//! All computations start from the i32 fixed-point representation so that
//! identical input bits produce identical weights and angles on every
//! platform.

use crate::types::{FixedPointCoordinate, COORDINATE_PRECISION};

const EARTH_RADIUS_M: f64 = 6_371_008.8;

fn to_degrees(c: FixedPointCoordinate) -> (f64, f64) {
    (
        c.lat as f64 / COORDINATE_PRECISION,
        c.lon as f64 / COORDINATE_PRECISION,
    )
}

/// Great-circle distance between two fixed-point coordinates in meters.
pub fn great_circle_distance(a: FixedPointCoordinate, b: FixedPointCoordinate) -> f64 {
    let (lat1_deg, lon1_deg) = to_degrees(a);
    let (lat2_deg, lon2_deg) = to_degrees(b);

    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let delta_lat = (lat2_deg - lat1_deg).to_radians();
    let delta_lon = (lon2_deg - lon1_deg).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Segment weight in deci-seconds for a distance in meters at speed km/h.
pub fn distance_weight(distance_m: f64, speed_kmh: f64) -> i32 {
    ((distance_m * 10.0) / (speed_kmh / 3.6) + 0.5).floor().max(1.0) as i32
}

/// Bearing of the segment `from -> to` in degrees [0, 360), on a local
/// planar approximation (longitudes scaled by cos of the mean latitude).
fn planar_bearing(from: FixedPointCoordinate, to: FixedPointCoordinate) -> f64 {
    let mean_lat_rad =
        ((from.lat as f64 + to.lat as f64) / 2.0 / COORDINATE_PRECISION).to_radians();
    let dx = (to.lon - from.lon) as f64 * mean_lat_rad.cos();
    let dy = (to.lat - from.lat) as f64;
    let bearing = dx.atan2(dy).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Exterior turn angle at `b` for the movement `a -> b -> c`: the angle in
/// [0, 360) between the bearing of `a->b` and the bearing of `b->c`.
/// 0 means straight on, 180 a full reversal.
pub fn turn_angle(
    a: FixedPointCoordinate,
    b: FixedPointCoordinate,
    c: FixedPointCoordinate,
) -> f64 {
    let in_bearing = planar_bearing(a, b);
    let out_bearing = planar_bearing(b, c);
    (out_bearing - in_bearing + 360.0) % 360.0
}

/// Wrap an exterior angle [0, 360) to the signed range (-180, 180].
pub fn signed_deviation(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else {
        angle
    }
}
