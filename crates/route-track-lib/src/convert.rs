//! Conversion of routed positions into enriched track points
//!
//! The routing collaborator hands over a plain ordered list of positions with
//! optional altitude, elapsed time and surface. [`convert`] walks it once and
//! derives cumulative distance, hysteresis-filtered ascent/descent, heading,
//! gradient and speed.

use crate::{CommonValues, Config, Position, Surface, TrackPoint, geodesy};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A raw routed sample
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoutePoint {
    pub position: Position,
    /// Altitude in meters, if the backend provides one
    pub altitude: Option<f32>,
    /// Elapsed time since the section start in milliseconds
    pub time_ms: i64,
    pub surface: Option<Surface>,
}

impl RoutePoint {
    pub fn new(position: Position, altitude: Option<f32>, time_ms: i64) -> Self {
        Self {
            position,
            altitude,
            time_ms,
            surface: None,
        }
    }
}

/// Surface change marker: from `distance` meters on, the surface is `surface`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceBreak {
    pub distance: f64,
    pub surface: Surface,
}

/// Output of the conversion pipeline
#[derive(Debug, Clone, Default)]
pub struct ConvertedSection {
    pub points: Vec<TrackPoint>,
    /// `f32::INFINITY` when there are no points
    pub min_altitude: f32,
    /// `f32::NEG_INFINITY` when there are no points
    pub max_altitude: f32,
}

impl ConvertedSection {
    /// Totals of the whole sequence (the values of its last point)
    #[inline]
    pub fn totals(&self) -> CommonValues {
        self.points.last().map(|p| p.values).unwrap_or_default()
    }
}

/// Dead-band accumulator pair used to smooth ascent and descent
#[derive(Debug, Default)]
struct ClimbFilter {
    pending_up: f64,
    pending_down: f64,
    /// Distance covered since the accumulators last started filling
    pending_distance: f64,
    ascent: f64,
    descent: f64,
    gradient: f64,
}

impl ClimbFilter {
    fn step(&mut self, delta: f64, step_distance: f64, config: &Config) {
        if self.pending_up == 0.0 && self.pending_down == 0.0 {
            self.pending_distance = 0.0;
        }
        self.pending_distance += step_distance;

        if delta > 0.0 {
            let cancel = delta.min(self.pending_down);
            self.pending_down -= cancel;
            self.pending_up += delta - cancel;
        } else if delta < 0.0 {
            let fall = -delta;
            let cancel = fall.min(self.pending_up);
            self.pending_up -= cancel;
            self.pending_down += fall - cancel;
        }

        if self.pending_up > config.ascent_dead_band {
            self.ascent += self.pending_up;
            self.gradient = self.slope(self.pending_up);
            self.pending_up = 0.0;
        } else if self.pending_down > config.descent_dead_band {
            self.descent += self.pending_down;
            self.gradient = -self.slope(self.pending_down);
            self.pending_down = 0.0;
        } else if self.pending_up == 0.0 && self.pending_down == 0.0 {
            self.gradient = 0.0;
        }
    }

    fn slope(&self, rise: f64) -> f64 {
        if self.pending_distance < f64::EPSILON {
            0.0
        } else {
            rise / self.pending_distance * 100.0
        }
    }
}

/// Convert raw routed positions into track points
///
/// The output has the same length as `points`. Values of the first point are
/// zero; `breaks` must be sorted by distance.
pub fn convert(points: &[RoutePoint], breaks: &[SurfaceBreak], config: &Config) -> ConvertedSection {
    #[cfg(feature = "profiling")]
    profiling::scope!("convert::convert");

    let mut out: Vec<TrackPoint> = Vec::with_capacity(points.len());
    let mut min_altitude = f32::INFINITY;
    let mut max_altitude = f32::NEG_INFINITY;

    let mut filter = ClimbFilter::default();
    let mut distance = 0.0f64;
    let mut time_ms = 0i64;
    let mut base_ms = 0i64;
    let mut altitude = 0.0f32;
    let mut heading = 0.0f32;
    let mut surface = Surface::Unknown;
    let mut next_break = 0usize;

    for (i, raw) in points.iter().enumerate() {
        if let Some(alt) = raw.altitude {
            altitude = alt;
        }
        if let Some(s) = raw.surface {
            surface = s;
        }

        let mut gradient = 0.0f32;
        let mut speed = 0.0f32;

        if i == 0 {
            // Section-relative: elapsed time starts at zero
            base_ms = raw.time_ms;
        } else {
            let previous = &out[i - 1];
            let step = geodesy::distance(previous.position(), raw.position);
            let step_time = (raw.time_ms - base_ms).max(time_ms) - time_ms;
            time_ms += step_time;
            distance += step;

            if step >= config.min_step_distance {
                heading = geodesy::heading(previous.position(), raw.position) as f32;
                out[i - 1].heading = heading;
            }

            let mut delta = (altitude - out[i - 1].altitude) as f64;
            if delta.abs() < config.min_altitude_delta {
                delta = 0.0;
            }
            filter.step(delta, step, config);

            if step >= config.min_step_distance {
                gradient = filter.gradient as f32;
                if step_time > 0 {
                    speed = (step / (step_time as f64 / 1000.0) * 3.6) as f32;
                }
            }
        }

        while let Some(b) = breaks.get(next_break) {
            if b.distance > distance {
                break;
            }
            surface = b.surface;
            next_break += 1;
        }

        min_altitude = min_altitude.min(altitude);
        max_altitude = max_altitude.max(altitude);

        out.push(TrackPoint {
            latitude: raw.position.latitude,
            longitude: raw.position.longitude,
            altitude,
            values: CommonValues::new(distance, time_ms, filter.ascent, filter.descent),
            heading,
            gradient,
            speed,
            surface,
        });
    }

    tracing::trace!(
        points = out.len(),
        distance,
        ascent = filter.ascent,
        descent = filter.descent,
        "Converted routed section"
    );

    ConvertedSection {
        points: out,
        min_altitude,
        max_altitude,
    }
}

/// Two-point fallback between `from` and `to` at the configured fallback speed
pub fn straight_line(
    from: Position,
    from_altitude: Option<f32>,
    to: Position,
    to_altitude: Option<f32>,
    config: &Config,
) -> ConvertedSection {
    let length = geodesy::distance(from, to);
    let seconds = length / (config.fallback_speed_kmh / 3.6);
    let raw = [
        RoutePoint::new(from, from_altitude, 0),
        RoutePoint::new(to, to_altitude, (seconds * 1000.0).round() as i64),
    ];
    convert(&raw, &[], config)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points heading east along the equator, one every `spacing` degrees
    fn eastward(altitudes: &[f32], spacing: f32, seconds_per_step: i64) -> Vec<RoutePoint> {
        altitudes
            .iter()
            .enumerate()
            .map(|(i, &alt)| {
                RoutePoint::new(
                    Position::new(0.0, i as f32 * spacing),
                    Some(alt),
                    i as i64 * seconds_per_step * 1000,
                )
            })
            .collect()
    }

    #[test]
    fn test_convert_empty() {
        let converted = convert(&[], &[], &Config::default());
        assert!(converted.points.is_empty());
        assert!(converted.totals().is_zero());
    }

    #[test]
    fn test_convert_distance_and_time() {
        let raw = eastward(&[100.0; 5], 0.001, 10);
        let converted = convert(&raw, &[], &Config::default());

        assert_eq!(converted.points.len(), 5);
        let expected_step = geodesy::distance(raw[0].position, raw[1].position);
        let last = converted.points.last().unwrap();
        assert!((last.distance() - 4.0 * expected_step).abs() < 0.01);
        assert_eq!(last.time_ms(), 40_000);
        assert!((converted.points[0].heading - 90.0).abs() < 0.01);
        // ~111 m in 10 s is ~40 km/h
        assert!((converted.points[1].speed - (expected_step / 10.0 * 3.6) as f32).abs() < 0.01);
    }

    #[test]
    fn test_convert_ignores_noise_below_dead_band() {
        // Alternating +-5 cm wobble must not accumulate into ascent
        let altitudes: Vec<f32> = (0..50).map(|i| if i % 2 == 0 { 100.0 } else { 100.05 }).collect();
        let converted = convert(&eastward(&altitudes, 0.0005, 5), &[], &Config::default());
        let totals = converted.totals();
        assert_eq!(totals.ascent(), 0.0);
        assert_eq!(totals.descent(), 0.0);
    }

    #[test]
    fn test_convert_counts_real_climb() {
        let altitudes: Vec<f32> = (0..11).map(|i| 100.0 + i as f32 * 2.0).collect();
        let converted = convert(&eastward(&altitudes, 0.001, 20), &[], &Config::default());
        let totals = converted.totals();
        assert!((totals.ascent() - 20.0).abs() < 0.01);
        assert_eq!(totals.descent(), 0.0);
        // 2 m over ~111 m
        assert!((converted.points[5].gradient - 1.8).abs() < 0.05);
        assert_eq!(converted.min_altitude, 100.0);
        assert_eq!(converted.max_altitude, 120.0);
    }

    #[test]
    fn test_convert_descent() {
        let altitudes = [500.0, 490.0, 480.0, 480.0, 485.0];
        let converted = convert(&eastward(&altitudes, 0.001, 20), &[], &Config::default());
        let totals = converted.totals();
        assert!((totals.descent() - 20.0).abs() < 0.01);
        assert!((totals.ascent() - 5.0).abs() < 0.01);
        assert!(converted.points[1].gradient < 0.0);
        assert_eq!(converted.points[3].gradient, 0.0);
    }

    #[test]
    fn test_convert_degenerate_step_has_no_motion() {
        let p = Position::new(47.0, 8.0);
        let raw = [
            RoutePoint::new(p, Some(100.0), 0),
            RoutePoint::new(p, Some(105.0), 1000),
        ];
        let converted = convert(&raw, &[], &Config::default());
        assert_eq!(converted.points[1].gradient, 0.0);
        assert_eq!(converted.points[1].speed, 0.0);
        assert!(converted.points[1].gradient.is_finite());
    }

    #[test]
    fn test_convert_is_monotonic() {
        let altitudes: Vec<f32> = (0..200)
            .map(|i| 300.0 + (i as f32 * 0.37).sin() * 25.0)
            .collect();
        let mut raw = eastward(&altitudes, 0.0003, 3);
        // A backwards timestamp must not break monotonicity
        raw[50].time_ms -= 10_000;
        let converted = convert(&raw, &[], &Config::default());

        for pair in converted.points.windows(2) {
            assert!(pair[1].values.distance_mm() >= pair[0].values.distance_mm());
            assert!(pair[1].time_ms() >= pair[0].time_ms());
            assert!(pair[1].values.ascent() >= pair[0].values.ascent());
            assert!(pair[1].values.descent() >= pair[0].values.descent());
        }
    }

    #[test]
    fn test_convert_surface_breaks() {
        let raw = eastward(&[0.0; 6], 0.001, 10);
        let step = geodesy::distance(raw[0].position, raw[1].position);
        let breaks = [
            SurfaceBreak {
                distance: 0.0,
                surface: Surface::Paved,
            },
            SurfaceBreak {
                distance: step * 2.5,
                surface: Surface::Gravel,
            },
        ];
        let converted = convert(&raw, &breaks, &Config::default());
        let surfaces: Vec<Surface> = converted.points.iter().map(|p| p.surface).collect();
        assert_eq!(
            surfaces,
            vec![
                Surface::Paved,
                Surface::Paved,
                Surface::Paved,
                Surface::Gravel,
                Surface::Gravel,
                Surface::Gravel
            ]
        );
    }

    #[test]
    fn test_convert_missing_altitude_carries_previous() {
        let raw = [
            RoutePoint::new(Position::new(0.0, 0.0), Some(250.0), 0),
            RoutePoint::new(Position::new(0.0, 0.001), None, 1000),
        ];
        let converted = convert(&raw, &[], &Config::default());
        assert_eq!(converted.points[1].altitude, 250.0);
    }

    #[test]
    fn test_convert_rebases_time() {
        let mut raw = eastward(&[100.0; 3], 0.001, 10);
        for point in &mut raw {
            point.time_ms += 3_600_000;
        }
        let converted = convert(&raw, &[], &Config::default());
        assert_eq!(converted.points[0].time_ms(), 0);
        assert_eq!(converted.totals().time_ms(), 20_000);
    }

    #[test]
    fn test_straight_line_fallback_speed() {
        let from = Position::new(0.0, 0.0);
        let to = Position::new(0.0, 0.1);
        let converted = straight_line(from, None, to, None, &Config::default());
        assert_eq!(converted.points.len(), 2);
        let length = geodesy::distance(from, to);
        let expected_ms = (length / (20.0 / 3.6) * 1000.0).round() as i64;
        assert_eq!(converted.totals().time_ms(), expected_ms);
        assert!((converted.points[1].speed - 20.0).abs() < 0.01);
    }
}
