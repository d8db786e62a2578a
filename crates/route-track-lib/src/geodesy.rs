//! Spherical earth geodesy helpers
//!
//! All functions work on a sphere of radius [`EARTH_RADIUS_M`] and take
//! positions in degrees. Computation happens in `f64`; positions are stored as
//! `f32` like the rest of the track model.

use crate::Position;

/// Earth's radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Segments shorter than this (in radians) have no usable direction
const DEGENERATE_ANGLE: f64 = 1e-12;

/// Foot of the perpendicular from a point onto a great-circle segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Foot {
    /// Cross-track distance in meters
    pub distance: f64,
    /// Fractional position of the foot along the segment, in `[0, 1]`
    pub fraction: f64,
}

/// Minimal distance from a point to a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDistance {
    /// Distance in meters
    pub distance: f64,
    /// Fractional position of the closest point along the segment, in `[0, 1]`
    pub fraction: f64,
    /// `true` when the closest point is the foot of a perpendicular,
    /// `false` when it is one of the endpoints
    pub perpendicular: bool,
}

/// Haversine distance between two positions in meters
#[inline]
pub fn distance(a: Position, b: Position) -> f64 {
    EARTH_RADIUS_M * angular_distance(a, b)
}

/// Central angle between two positions in radians
#[inline]
fn angular_distance(a: Position, b: Position) -> f64 {
    let lat1 = (a.latitude as f64).to_radians();
    let lat2 = (b.latitude as f64).to_radians();
    let delta_lat = lat2 - lat1;
    let delta_lon = (b.longitude as f64 - a.longitude as f64).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

/// Initial bearing from `a` towards `b` in degrees, normalized to `[0, 360)`
#[inline]
pub fn heading(a: Position, b: Position) -> f64 {
    heading_radians(a, b).to_degrees().rem_euclid(360.0)
}

#[inline]
fn heading_radians(a: Position, b: Position) -> f64 {
    let lat1 = (a.latitude as f64).to_radians();
    let lat2 = (b.latitude as f64).to_radians();
    let delta_lon = (b.longitude as f64 - a.longitude as f64).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    y.atan2(x)
}

/// Position reached from `start` after travelling `distance` meters on the
/// initial bearing `heading` (degrees)
pub fn destination(start: Position, heading: f64, distance: f64) -> Position {
    let delta = distance / EARTH_RADIUS_M;
    let theta = heading.to_radians();
    let lat1 = (start.latitude as f64).to_radians();
    let lon1 = (start.longitude as f64).to_radians();

    let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let y = theta.sin() * delta.sin() * lat1.cos();
    let x = delta.cos() - lat1.sin() * sin_lat2;
    let lon2 = lon1 + y.atan2(x);

    // Normalize longitude to [-180, 180)
    let lon2 = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Position::new(lat2.to_degrees() as f32, lon2 as f32)
}

/// Perpendicular (cross-track) foot from `p3` onto the great-circle segment
/// `p1 -> p2`
///
/// Returns `None` when no perpendicular from `p3` meets the segment between
/// its endpoints, or when the segment is degenerate.
pub fn perpendicular(p1: Position, p2: Position, p3: Position) -> Option<Foot> {
    let d12 = angular_distance(p1, p2);
    if d12 < DEGENERATE_ANGLE {
        return None;
    }

    let d13 = angular_distance(p1, p3);
    let delta_theta = heading_radians(p1, p3) - heading_radians(p1, p2);

    let cross = (d13.sin() * delta_theta.sin()).clamp(-1.0, 1.0).asin();
    if delta_theta.cos() < 0.0 && d13 > DEGENERATE_ANGLE {
        // Foot lies behind p1
        return None;
    }

    let along = (d13.cos() / cross.cos()).clamp(-1.0, 1.0).acos();
    let fraction = along / d12;
    if fraction > 1.0 {
        return None;
    }

    Some(Foot {
        distance: cross.abs() * EARTH_RADIUS_M,
        fraction,
    })
}

/// Minimal distance from `p3` to the segment `p1 -> p2`
///
/// Uses the perpendicular when it falls on the segment, otherwise the nearer
/// endpoint (fraction 0 for `p1`, 1 for `p2`).
pub fn minimal_distance(p1: Position, p2: Position, p3: Position) -> SegmentDistance {
    if let Some(foot) = perpendicular(p1, p2, p3) {
        return SegmentDistance {
            distance: foot.distance,
            fraction: foot.fraction,
            perpendicular: true,
        };
    }

    let to_start = distance(p1, p3);
    let to_end = distance(p2, p3);
    if to_end < to_start {
        SegmentDistance {
            distance: to_end,
            fraction: 1.0,
            perpendicular: false,
        }
    } else {
        SegmentDistance {
            distance: to_start,
            fraction: 0.0,
            perpendicular: false,
        }
    }
}
