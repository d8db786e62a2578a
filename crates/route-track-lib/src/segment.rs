//! Per-section point storage

use crate::{CommonValues, RouteResult, RouteSection, TrackPoint};
use std::sync::Arc;

/// The stored points and chaining metadata of one route section
///
/// Point values are relative to the segment start. The start offset, start
/// ordinal and file group are only meaningful while the segment is linked.
#[derive(Clone, Debug)]
pub struct Segment {
    /// The section these points were calculated for
    section: RouteSection,
    /// `None` until the section has been calculated
    points: Option<Arc<[TrackPoint]>>,
    /// Cumulative values of all linked predecessors
    start: CommonValues,
    /// Global ordinal of the first point
    start_ordinal: usize,
    /// 1-based file group, 0 while unlinked
    file_group: u32,
    min_altitude: f32,
    max_altitude: f32,
    linked: bool,
}

impl Segment {
    /// Create a segment whose points are not calculated yet
    pub fn new(section: RouteSection) -> Self {
        Self {
            section,
            points: None,
            start: CommonValues::ZERO,
            start_ordinal: 0,
            file_group: 0,
            min_altitude: f32::INFINITY,
            max_altitude: f32::NEG_INFINITY,
            linked: false,
        }
    }

    /// Create a segment with calculated points
    pub fn with_result(section: RouteSection, result: RouteResult) -> Self {
        let mut segment = Self::new(section);
        segment.set_result(result);
        segment
    }

    #[inline]
    pub fn section(&self) -> &RouteSection {
        &self.section
    }

    pub(crate) fn section_mut(&mut self) -> &mut RouteSection {
        &mut self.section
    }

    /// Segment-relative points, if calculated
    #[inline]
    pub fn points(&self) -> Option<&[TrackPoint]> {
        self.points.as_deref().filter(|p| !p.is_empty())
    }

    /// Shared handle to the points, if calculated
    #[inline]
    pub fn shared_points(&self) -> Option<Arc<[TrackPoint]>> {
        self.points.clone().filter(|p| !p.is_empty())
    }

    #[inline]
    pub fn has_points(&self) -> bool {
        self.points().is_some()
    }

    /// Number of stored points, including the one shared with the next segment
    #[inline]
    pub fn len(&self) -> usize {
        self.points().map_or(0, |p| p.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Segment totals (values of the last point)
    #[inline]
    pub fn totals(&self) -> CommonValues {
        self.points()
            .and_then(|p| p.last())
            .map(|p| p.values)
            .unwrap_or_default()
    }

    #[inline]
    pub fn start(&self) -> CommonValues {
        self.start
    }

    #[inline]
    pub fn start_ordinal(&self) -> usize {
        self.start_ordinal
    }

    #[inline]
    pub fn file_group(&self) -> u32 {
        self.file_group
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// `f32::INFINITY` when there are no points
    #[inline]
    pub fn min_altitude(&self) -> f32 {
        self.min_altitude
    }

    /// `f32::NEG_INFINITY` when there are no points
    #[inline]
    pub fn max_altitude(&self) -> f32 {
        self.max_altitude
    }

    /// Point `ordinal` with track-absolute values
    #[inline]
    pub fn point(&self, ordinal: usize) -> Option<TrackPoint> {
        self.points()?.get(ordinal).map(|p| p.offset_by(self.start))
    }

    pub(crate) fn set_result(&mut self, result: RouteResult) {
        self.min_altitude = result.min_altitude;
        self.max_altitude = result.max_altitude;
        self.points = Some(Arc::from(result.points));
    }

    pub(crate) fn clear_points(&mut self) {
        self.points = None;
        self.min_altitude = f32::INFINITY;
        self.max_altitude = f32::NEG_INFINITY;
    }

    pub(crate) fn link(&mut self, start: CommonValues, start_ordinal: usize, file_group: u32) {
        self.start = start;
        self.start_ordinal = start_ordinal;
        self.file_group = file_group;
        self.linked = true;
    }

    pub(crate) fn unlink(&mut self) {
        self.start = CommonValues::ZERO;
        self.start_ordinal = 0;
        self.file_group = 0;
        self.linked = false;
    }

    pub(crate) fn set_file_group(&mut self, file_group: u32) {
        self.file_group = file_group;
    }
}
