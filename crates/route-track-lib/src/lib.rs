//! Route Track Library - Track Point Model for Multi-Section Cycling Routes
//!
//! This library keeps the point sequence of a planned route that is assembled
//! from independently (re)calculated sections. Sections are stored as separate
//! segments chained by cumulative offsets so that recalculating one section only
//! touches that section's points, while queries see one continuous track.
//!
//! # Architecture
//!
//! - **[`geodesy`]**: Spherical distance, heading, destination and cross-track helpers
//! - **[`TrackPoint`]** / **[`CommonValues`]**: Sample model with drift-free accumulators
//! - **[`convert()`]**: Routed positions to enriched track points (ascent/descent smoothing)
//! - **[`SegmentStore`]**: Per-section point arrays, linking, file groups and the query surface
//! - **[`DiffEngine`]**: Incremental differences between a frozen snapshot and the live track
//! - **[`Track`]**: Waypoints, sections and event fan-out to the store, diff engine and listeners
//!
//! # Performance Characteristics
//!
//! - **Relink**: O(S) for S segments, no point is touched
//! - **Random access**: O(1); **search by distance**: O(S + log N)
//! - **Playback advance**: amortized O(1) per tick

mod convert;
mod diff;
pub mod encoding;
pub mod export;
pub mod geodesy;
mod index;
mod player;
mod point;
mod profile;
mod section;
mod segment;
mod store;
mod track;

// Public API exports
pub use convert::{ConvertedSection, RoutePoint, SurfaceBreak, convert, straight_line};
pub use diff::{DiffEngine, DifferenceId, TrackDifference};
pub use index::{NearPoint, NearestPoint, TrackIndex};
pub use player::Player;
pub use point::{CommonValues, Position, PositionKey, Surface, TrackPoint, lerp};
pub use profile::{ByDistance, ProfileSample};
pub use section::{
    Outcome, RouteResult, RouteSection, Router, SectionId, StraightLineRouter, Waypoint,
};
pub use segment::Segment;
pub use store::SegmentStore;
pub use track::{SharedTrack, Track, TrackEvent, TrackListener};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error types for the track model
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Invalid point encoding: {len} bytes is not a multiple of {record}")]
    InvalidEncoding { len: usize, record: usize },

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown file group {0}")]
    UnknownFileGroup(u32),

    #[error("GPX error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackError>;

/// Tuning values for conversion, fallback routing and difference detection
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Pending climb (meters) that must accumulate before it counts as ascent
    pub ascent_dead_band: f64,
    /// Pending fall (meters) that must accumulate before it counts as descent
    pub descent_dead_band: f64,
    /// Altitude steps below this (meters) are treated as flat
    pub min_altitude_delta: f64,
    /// Steps shorter than this (meters) get zero gradient and speed
    pub min_step_distance: f64,
    /// Speed assumed for straight-line fallback sections, in km/h
    pub fallback_speed_kmh: f64,
    /// Differences whose points all stay within this many meters are noise
    pub noise_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ascent_dead_band: 0.1,
            descent_dead_band: 0.1,
            min_altitude_delta: 0.01,
            min_step_distance: 0.01,
            fallback_speed_kmh: 20.0,
            noise_tolerance: 1.0,
        }
    }
}
