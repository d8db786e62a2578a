//! Elevation profile sampling

use crate::{SegmentStore, Surface, TrackIndex};

/// One sample of the elevation profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSample {
    /// Distance from the track start in meters
    pub distance: f64,
    /// Altitude in meters, linearly interpolated
    pub altitude: f32,
    /// Surface of the point preceding the sample
    pub surface: Surface,
}

/// Lazy iterator over equidistant profile samples
///
/// Created by [`SegmentStore::by_distance`]. Walks the track once with a
/// forward cursor, so a full profile costs O(N + samples).
#[derive(Debug)]
pub struct ByDistance<'a> {
    store: &'a SegmentStore,
    cursor: Option<TrackIndex>,
    from: f64,
    step: f64,
    to: f64,
    taken: u64,
}

impl Iterator for ByDistance<'_> {
    type Item = ProfileSample;

    fn next(&mut self) -> Option<ProfileSample> {
        let distance = self.from + self.taken as f64 * self.step;
        if distance > self.to {
            return None;
        }
        let mut cursor = self.cursor?;

        // Move to the last point at or before `distance`
        while let Some(next) = self.store.next(cursor) {
            match self.store.at(next) {
                Some(point) if point.distance() <= distance => cursor = next,
                _ => break,
            }
        }
        self.cursor = Some(cursor);
        self.taken += 1;

        let previous = self.store.at(cursor)?;
        let altitude = match self.store.next(cursor).and_then(|n| self.store.at(n)) {
            Some(next) if next.distance() > previous.distance() => {
                let fraction = (distance - previous.distance()) / (next.distance() - previous.distance());
                previous.altitude + ((next.altitude - previous.altitude) as f64 * fraction.clamp(0.0, 1.0)) as f32
            }
            _ => previous.altitude,
        };

        Some(ProfileSample {
            distance,
            altitude,
            surface: previous.surface,
        })
    }
}

impl SegmentStore {
    /// Sample the track every `step` meters from `from` up to `to`
    ///
    /// The range is clamped to the linked prefix. A non-positive step yields
    /// nothing.
    pub fn by_distance(&self, from: f64, to: f64, step: f64) -> ByDistance<'_> {
        let total = self.total().distance();
        let from = from.max(0.0);
        let to = to.min(total);
        let valid = step > 0.0 && step.is_finite() && from <= to;

        // Start from the segment holding `from` instead of the first point
        let cursor = if valid {
            self.search(from)
                .map(|(_, index)| index)
                .or_else(|| self.first_index())
        } else {
            None
        };

        ByDistance {
            store: self,
            cursor,
            from,
            step,
            to,
            taken: 0,
        }
    }
}
