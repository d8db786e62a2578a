//! Virtual rider replaying the track in (scaled) real time

use crate::{SegmentStore, TrackIndex, TrackPoint};
use std::time::Duration;

/// Playback state over a [`SegmentStore`]
///
/// The player only keeps a cursor and a clock; the store is passed on every
/// call so it can be read under the change lock.
#[derive(Debug, Clone)]
pub struct Player {
    cursor: Option<TrackIndex>,
    time_ms: i64,
    /// Playback speed multiplier
    speed: f64,
    current: Option<TrackPoint>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Player {
    pub fn new(speed: f64) -> Self {
        Self {
            cursor: None,
            time_ms: 0,
            speed: speed.max(0.0),
            current: None,
        }
    }

    #[inline]
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    /// Track time of the rider in milliseconds
    #[inline]
    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }

    /// The rider's current (interpolated) position
    #[inline]
    pub fn current(&self) -> Option<&TrackPoint> {
        self.current.as_ref()
    }

    /// Jump back to the start
    pub fn reset(&mut self) {
        self.cursor = None;
        self.time_ms = 0;
        self.current = None;
    }

    /// Jump to `distance` meters from the start
    pub fn seek(&mut self, store: &SegmentStore, distance: f64) -> Option<TrackPoint> {
        let (point, index) = store.search(distance)?;
        self.cursor = Some(index);
        self.time_ms = point.time_ms();
        self.current = Some(point);
        self.current
    }

    /// Advance the clock by `elapsed` wall time and move the rider
    pub fn tick(&mut self, store: &SegmentStore, elapsed: Duration) -> Option<TrackPoint> {
        let step = (elapsed.as_secs_f64() * 1000.0 * self.speed).round() as i64;
        self.time_ms = self.time_ms.saturating_add(step);

        // A cursor from an older store state may no longer be valid
        let from = self
            .cursor
            .filter(|c| store.is_valid(*c))
            .or_else(|| store.first_index())?;
        let (point, cursor) = store.advance_to(self.time_ms, from)?;
        self.cursor = Some(cursor);
        self.current = Some(point);
        self.current
    }

    /// Whether the rider reached the end of the linked track
    pub fn is_finished(&self, store: &SegmentStore) -> bool {
        self.time_ms >= store.total().time_ms()
    }
}
