//! SegmentStore - ordered per-section segments chained into one track
//!
//! Segments are kept in section order. Each linked segment knows the
//! cumulative values and the global point ordinal at which it starts, so the
//! track is a simple forward chain of offsets. A segment is linked only if its
//! predecessor is linked and already has points; relinking is a forward scan
//! that stops at the first segment that cannot be linked.

use crate::{CommonValues, RouteResult, Segment};

/// Cached aggregate of the linked prefix
///
/// Updated on every relink so that totals and counts are O(1).
#[derive(Debug, Clone, Default)]
struct CachedStats {
    /// Sum of the totals of all linked segments with points
    total: CommonValues,
    /// Number of distinct points in the linked prefix
    point_count: usize,
    /// Last segment that is linked and has points
    last_linked: Option<usize>,
}

/// Owner of all segments of a track
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    segments: Vec<Segment>,
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment at `index` and relink from there
    ///
    /// The first segment is always linked with a zero offset and file group 1.
    pub fn insert(&mut self, index: usize, segment: Segment) {
        let index = index.min(self.segments.len());
        self.segments.insert(index, segment);
        tracing::debug!(index, segments = self.segments.len(), "Inserted segment");
        self.relink(index);
    }

    /// Remove the segment at `index` and relink the following ones
    pub fn remove(&mut self, index: usize) -> Option<Segment> {
        if index >= self.segments.len() {
            return None;
        }
        let removed = self.segments.remove(index);
        if index == 0 {
            if let Some(first) = self.segments.first_mut() {
                first.unlink();
            }
        }
        tracing::debug!(index, segments = self.segments.len(), "Removed segment");
        self.relink(index);
        Some(removed)
    }

    /// Store calculated points for the segment at `index`
    pub fn set_points(&mut self, index: usize, result: RouteResult) {
        let Some(segment) = self.segments.get_mut(index) else {
            return;
        };
        segment.set_result(result);
        self.relink(index);
    }

    /// Drop the points of the segment at `index`; it stays in place
    pub fn clear_points(&mut self, index: usize) {
        let Some(segment) = self.segments.get_mut(index) else {
            return;
        };
        segment.clear_points();
        self.relink(index);
    }

    /// Change the file-split flag of the section starting segment `index`
    pub fn set_file_split(&mut self, index: usize, split: bool) {
        let Some(segment) = self.segments.get_mut(index) else {
            return;
        };
        segment.section_mut().set_file_split(split);
        self.update_file_group(index);
    }

    /// Re-derive the file group of `index` and shift all following linked
    /// segments by the same amount
    pub fn update_file_group(&mut self, index: usize) {
        let Some(segment) = self.segments.get(index) else {
            return;
        };
        if !segment.is_linked() {
            return;
        }

        let expected = if index == 0 {
            1
        } else {
            let previous = &self.segments[index - 1];
            previous.file_group() + u32::from(segment.section().starts_file())
        };
        let delta = expected as i64 - segment.file_group() as i64;
        if delta == 0 {
            return;
        }

        for segment in self.segments[index..].iter_mut() {
            if !segment.is_linked() {
                break;
            }
            let group = (segment.file_group() as i64 + delta).max(1) as u32;
            segment.set_file_group(group);
        }
        tracing::debug!(index, delta, "Propagated file group change");
        self.check_invariants();
    }

    /// Recompute links, offsets and file groups from `from` onwards
    ///
    /// Linking stops at the first segment whose predecessor is unlinked or has
    /// no points; that segment and all following ones are unlinked.
    pub fn relink(&mut self, from: usize) {
        #[cfg(feature = "profiling")]
        profiling::scope!("store::relink");

        for i in from..self.segments.len() {
            if i == 0 {
                self.segments[0].link(CommonValues::ZERO, 0, 1);
                continue;
            }

            let previous = &self.segments[i - 1];
            if !(previous.is_linked() && previous.has_points()) {
                for segment in self.segments[i..].iter_mut() {
                    segment.unlink();
                }
                break;
            }

            let start = previous.start() + previous.totals();
            let start_ordinal = previous.start_ordinal() + previous.len() - 1;
            let file_group =
                previous.file_group() + u32::from(self.segments[i].section().starts_file());
            self.segments[i].link(start, start_ordinal, file_group);
        }

        self.rebuild_cached_stats();
        self.check_invariants();
    }

    /// Rebuild cached statistics from the linked prefix
    fn rebuild_cached_stats(&mut self) {
        let last_linked = self
            .segments
            .iter()
            .rposition(|s| s.is_linked() && s.has_points());

        self.cached_stats = match last_linked {
            Some(i) => {
                let segment = &self.segments[i];
                CachedStats {
                    total: segment.start() + segment.totals(),
                    point_count: segment.start_ordinal() + segment.len(),
                    last_linked: Some(i),
                }
            }
            None => CachedStats::default(),
        };
    }

    /// Sum of the totals of all linked segments with points
    pub fn linked_totals(&self) -> CommonValues {
        self.linked().iter().map(Segment::totals).sum()
    }

    /// Structural consistency check, compiled in debug builds only
    #[inline]
    fn check_invariants(&self) {
        #[cfg(debug_assertions)]
        {
            let mut accumulated = CommonValues::ZERO;
            let mut ordinal = 0usize;
            let mut group = 0u32;
            for (i, segment) in self.segments.iter().enumerate() {
                if !segment.is_linked() {
                    debug_assert!(
                        self.segments[i..].iter().all(|s| !s.is_linked()),
                        "linked segment after an unlinked one at {i}"
                    );
                    break;
                }
                group += u32::from(i == 0 || segment.section().starts_file());
                debug_assert_eq!(segment.start(), accumulated, "start offset of segment {i}");
                debug_assert_eq!(segment.start_ordinal(), ordinal, "start ordinal of segment {i}");
                debug_assert_eq!(segment.file_group(), group, "file group of segment {i}");
                if !segment.has_points() {
                    break;
                }
                accumulated += segment.totals();
                ordinal += segment.len() - 1;
            }
            debug_assert_eq!(accumulated, self.cached_stats.total, "running total");
        }
    }

    /// All segments, linked or not
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// The queryable prefix: linked segments that have points
    #[inline]
    pub fn linked(&self) -> &[Segment] {
        match self.cached_stats.last_linked {
            Some(i) => &self.segments[..=i],
            None => &[],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Aggregate values of the linked prefix
    ///
    /// This is O(1) as the value is cached.
    #[inline]
    pub fn total(&self) -> CommonValues {
        self.cached_stats.total
    }

    /// Number of distinct points in the linked prefix
    ///
    /// Boundary points shared by consecutive segments are counted once.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.cached_stats.point_count
    }

    /// Whether every segment is linked and has points
    pub fn is_complete(&self) -> bool {
        self.cached_stats.last_linked.map(|i| i + 1) == Some(self.segments.len())
    }

    /// Lowest altitude over the linked prefix
    pub fn min_altitude(&self) -> Option<f32> {
        self.linked()
            .iter()
            .map(Segment::min_altitude)
            .reduce(f32::min)
    }

    /// Highest altitude over the linked prefix
    pub fn max_altitude(&self) -> Option<f32> {
        self.linked()
            .iter()
            .map(Segment::max_altitude)
            .reduce(f32::max)
    }

    /// Number of export files covered by the linked prefix
    #[inline]
    pub fn file_count(&self) -> u32 {
        self.linked().last().map_or(0, Segment::file_group)
    }
}
