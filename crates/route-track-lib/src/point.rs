//! Track point sample model
//!
//! A [`TrackPoint`] carries its position, altitude and the cumulative
//! [`CommonValues`] (distance, time, ascent, descent) since the start of the
//! sequence it belongs to, plus a few instantaneous derived values.

use crate::geodesy;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub latitude: f32,
    pub longitude: f32,
}

impl Position {
    #[inline]
    pub const fn new(latitude: f32, longitude: f32) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Exact hashable key for this position
    #[inline]
    pub fn key(&self) -> PositionKey {
        PositionKey::from(*self)
    }
}

impl From<Position> for geo::Coord<f64> {
    #[inline]
    fn from(position: Position) -> Self {
        geo::Coord {
            x: position.longitude as f64,
            y: position.latitude as f64,
        }
    }
}

/// Bit-exact position key used for hash lookups
///
/// Two keys are equal exactly when the positions compare equal; there is no
/// tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey(u32, u32);

impl From<Position> for PositionKey {
    #[inline]
    fn from(position: Position) -> Self {
        // +0.0 and -0.0 compare equal, so they must hash equal too
        let bits = |v: f32| if v == 0.0 { 0 } else { v.to_bits() };
        PositionKey(bits(position.latitude), bits(position.longitude))
    }
}

/// Road surface classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Surface {
    #[default]
    Unknown = 0,
    Paved = 1,
    Compacted = 2,
    Gravel = 3,
    Unpaved = 4,
    Path = 5,
    Ferry = 6,
}

impl Surface {
    /// Decode a surface enumerant, mapping unknown values to [`Surface::Unknown`]
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Surface::Paved,
            2 => Surface::Compacted,
            3 => Surface::Gravel,
            4 => Surface::Unpaved,
            5 => Surface::Path,
            6 => Surface::Ferry,
            _ => Surface::Unknown,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Cumulative (distance, time, ascent, descent) accumulator
///
/// Values are fixed point: millimeters for distance, ascent and descent and
/// milliseconds for time, so chaining segments is exact integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CommonValues {
    distance_mm: i64,
    time_ms: i64,
    ascent_mm: i64,
    descent_mm: i64,
}

#[inline]
fn meters_to_mm(meters: f64) -> i64 {
    (meters * 1000.0).round() as i64
}

impl CommonValues {
    pub const ZERO: CommonValues = CommonValues {
        distance_mm: 0,
        time_ms: 0,
        ascent_mm: 0,
        descent_mm: 0,
    };

    /// Build from meters and milliseconds
    pub fn new(distance: f64, time_ms: i64, ascent: f64, descent: f64) -> Self {
        Self {
            distance_mm: meters_to_mm(distance),
            time_ms,
            ascent_mm: meters_to_mm(ascent),
            descent_mm: meters_to_mm(descent),
        }
    }

    /// Build from raw fixed-point parts
    #[inline]
    pub const fn from_raw(distance_mm: i64, time_ms: i64, ascent_mm: i64, descent_mm: i64) -> Self {
        Self {
            distance_mm,
            time_ms,
            ascent_mm,
            descent_mm,
        }
    }

    /// Distance in meters
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance_mm as f64 / 1000.0
    }

    /// Elapsed time in milliseconds
    #[inline]
    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }

    /// Elapsed time in seconds
    #[inline]
    pub fn time(&self) -> f64 {
        self.time_ms as f64 / 1000.0
    }

    /// Ascent in meters
    #[inline]
    pub fn ascent(&self) -> f64 {
        self.ascent_mm as f64 / 1000.0
    }

    /// Descent in meters
    #[inline]
    pub fn descent(&self) -> f64 {
        self.descent_mm as f64 / 1000.0
    }

    #[inline]
    pub fn distance_mm(&self) -> i64 {
        self.distance_mm
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Linear interpolation towards `other`
    pub fn lerp(&self, other: &CommonValues, fraction: f64) -> CommonValues {
        let mix = |a: i64, b: i64| a + ((b - a) as f64 * fraction).round() as i64;
        CommonValues {
            distance_mm: mix(self.distance_mm, other.distance_mm),
            time_ms: mix(self.time_ms, other.time_ms),
            ascent_mm: mix(self.ascent_mm, other.ascent_mm),
            descent_mm: mix(self.descent_mm, other.descent_mm),
        }
    }
}

impl Add for CommonValues {
    type Output = CommonValues;

    #[inline]
    fn add(self, rhs: CommonValues) -> CommonValues {
        CommonValues {
            distance_mm: self.distance_mm + rhs.distance_mm,
            time_ms: self.time_ms + rhs.time_ms,
            ascent_mm: self.ascent_mm + rhs.ascent_mm,
            descent_mm: self.descent_mm + rhs.descent_mm,
        }
    }
}

impl Sub for CommonValues {
    type Output = CommonValues;

    #[inline]
    fn sub(self, rhs: CommonValues) -> CommonValues {
        CommonValues {
            distance_mm: self.distance_mm - rhs.distance_mm,
            time_ms: self.time_ms - rhs.time_ms,
            ascent_mm: self.ascent_mm - rhs.ascent_mm,
            descent_mm: self.descent_mm - rhs.descent_mm,
        }
    }
}

impl Neg for CommonValues {
    type Output = CommonValues;

    #[inline]
    fn neg(self) -> CommonValues {
        CommonValues::ZERO - self
    }
}

impl AddAssign for CommonValues {
    #[inline]
    fn add_assign(&mut self, rhs: CommonValues) {
        *self = *self + rhs;
    }
}

impl SubAssign for CommonValues {
    #[inline]
    fn sub_assign(&mut self, rhs: CommonValues) {
        *self = *self - rhs;
    }
}

impl std::iter::Sum for CommonValues {
    fn sum<I: Iterator<Item = CommonValues>>(iter: I) -> Self {
        iter.fold(CommonValues::ZERO, |acc, v| acc + v)
    }
}

/// A single geo-temporal sample of a track
///
/// Equality compares the position only, which is what segment boundary
/// matching across revisions relies on.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPoint {
    pub latitude: f32,
    pub longitude: f32,
    /// Altitude in meters
    pub altitude: f32,
    /// Cumulative values since the start of the owning sequence
    pub values: CommonValues,
    /// Bearing towards the next sample in degrees
    pub heading: f32,
    /// Gradient in percent
    pub gradient: f32,
    /// Speed in km/h
    pub speed: f32,
    pub surface: Surface,
}

impl PartialEq for TrackPoint {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

impl TrackPoint {
    /// Create a point at a position with all other values zeroed
    pub fn at(position: Position, altitude: f32) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude,
            ..Default::default()
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }

    /// Cumulative distance in meters
    #[inline]
    pub fn distance(&self) -> f64 {
        self.values.distance()
    }

    /// Elapsed time in milliseconds
    #[inline]
    pub fn time_ms(&self) -> i64 {
        self.values.time_ms()
    }

    /// The same sample shifted by `offset`
    #[inline]
    pub fn offset_by(&self, offset: CommonValues) -> TrackPoint {
        TrackPoint {
            values: self.values + offset,
            ..*self
        }
    }

    /// Compare every field, not just the position
    pub fn identical(&self, other: &TrackPoint) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
            && self.altitude.to_bits() == other.altitude.to_bits()
            && self.values == other.values
            && self.heading.to_bits() == other.heading.to_bits()
            && self.gradient.to_bits() == other.gradient.to_bits()
            && self.speed.to_bits() == other.speed.to_bits()
            && self.surface == other.surface
    }
}

/// Interpolate between two consecutive samples
///
/// The position is moved from `previous` along its heading by the given
/// fraction of the geodesic step length. Altitude and cumulative values are
/// interpolated linearly; instantaneous values are taken from `previous`.
/// Fractions at or beyond the ends return the endpoints unchanged.
pub fn lerp(previous: &TrackPoint, next: &TrackPoint, fraction: f64) -> TrackPoint {
    if fraction <= 0.0 {
        return *previous;
    }
    if fraction >= 1.0 {
        return *next;
    }

    let step = geodesy::distance(previous.position(), next.position());
    let position =
        geodesy::destination(previous.position(), previous.heading as f64, step * fraction);

    TrackPoint {
        latitude: position.latitude,
        longitude: position.longitude,
        altitude: previous.altitude + ((next.altitude - previous.altitude) as f64 * fraction) as f32,
        values: previous.values.lerp(&next.values, fraction),
        heading: previous.heading,
        gradient: previous.gradient,
        speed: previous.speed,
        surface: previous.surface,
    }
}
