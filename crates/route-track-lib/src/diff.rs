//! Difference detection between a frozen snapshot and the live track
//!
//! [`DiffEngine::new`] freezes the current store as the original track. The
//! engine then shadows every structural change of the live store and, whenever
//! a section calculation finishes, re-scans only the region around that
//! section. Differences outside the re-scanned region stay untouched.
//!
//! Matching between both sides is by exact position equality. Consecutive
//! sections share their boundary point, which is what lets a re-scan find
//! stable anchors on both sides of an edit.

use crate::{CommonValues, Config, PositionKey, SegmentStore, TrackPoint, geodesy};
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier of a reported difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DifferenceId(u64);

impl fmt::Display for DifferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diff#{}", self.0)
    }
}

/// One diverging stretch, in original-track coordinates
#[derive(Debug, Clone)]
pub struct TrackDifference {
    pub id: DifferenceId,
    /// Original points of the stretch, boundaries included, absolute values
    pub original_points: Vec<TrackPoint>,
    /// Original segment the stretch starts in
    pub segment: usize,
    /// Distance of the stretch start on the original track, in meters
    pub distance: f64,
    /// Length of the stretch on the original track, in meters
    pub length: f64,
    /// New stretch totals minus original stretch totals
    pub delta: CommonValues,
    /// Original point ordinals covered
    span: RangeInclusive<usize>,
}

impl TrackDifference {
    /// Original point ordinals covered by this difference
    #[inline]
    pub fn span(&self) -> RangeInclusive<usize> {
        self.span.clone()
    }

    /// Whether this difference touches `[from, to]` on the original track
    fn overlaps(&self, from: usize, to: usize) -> bool {
        let (start, end) = (*self.span.start(), *self.span.end());
        if start == end {
            (from..=to).contains(&start)
        } else {
            start < to && end > from
        }
    }
}

/// A segment of the frozen original track
#[derive(Debug)]
struct OriginalSegment {
    start: CommonValues,
    start_ordinal: usize,
    points: Arc<[TrackPoint]>,
    /// Every ordinal of every position within this segment, ascending
    lookup: HashMap<PositionKey, SmallVec<[usize; 1]>>,
}

impl OriginalSegment {
    fn new(start: CommonValues, start_ordinal: usize, points: Arc<[TrackPoint]>) -> Self {
        let mut lookup: HashMap<PositionKey, SmallVec<[usize; 1]>> = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            lookup.entry(p.position().key()).or_default().push(i);
        }
        Self {
            start,
            start_ordinal,
            points,
            lookup,
        }
    }

    /// Ordinal of the last point on the original track
    fn end_ordinal(&self) -> usize {
        self.start_ordinal + self.points.len().saturating_sub(1)
    }
}

/// Live points of a segment as seen by the engine
#[derive(Debug, Clone)]
enum NewPoints {
    /// The section is being (re)calculated
    Pending,
    Ready(Arc<[TrackPoint]>),
}

#[derive(Debug, Clone)]
struct NewSegment {
    /// Original segment this one mirrored when the comparison started
    origin: Option<usize>,
    points: NewPoints,
}

impl NewSegment {
    fn new(origin: Option<usize>, points: Option<Arc<[TrackPoint]>>) -> Self {
        let mut segment = Self {
            origin,
            points: NewPoints::Pending,
        };
        segment.set_points(points);
        segment
    }

    fn set_points(&mut self, points: Option<Arc<[TrackPoint]>>) {
        self.points = match points {
            Some(p) if !p.is_empty() => NewPoints::Ready(p),
            _ => NewPoints::Pending,
        };
    }

    fn ready(&self) -> Option<&Arc<[TrackPoint]>> {
        match &self.points {
            NewPoints::Ready(points) => Some(points),
            NewPoints::Pending => None,
        }
    }
}

/// Resolved re-scan range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Range {
    /// New segments `first..=last`
    first: usize,
    last: usize,
    /// Original ordinals `from..=to`
    from: usize,
    to: usize,
}

/// Incremental difference detector
///
/// Owned by the track while a comparison is active. [`DiffEngine::dispose`]
/// ends the comparison and hands back the final differences.
#[derive(Debug)]
pub struct DiffEngine {
    config: Config,
    originals: Vec<OriginalSegment>,
    original_count: usize,
    news: Vec<NewSegment>,
    differences: Vec<TrackDifference>,
    current: Option<DifferenceId>,
    next_id: u64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl DiffEngine {
    /// Freeze the linked prefix of `store` as the original track
    pub fn new(store: &SegmentStore, config: Config) -> Self {
        let originals: Vec<OriginalSegment> = store
            .linked()
            .par_iter()
            .filter_map(|segment| {
                segment
                    .shared_points()
                    .map(|points| OriginalSegment::new(segment.start(), segment.start_ordinal(), points))
            })
            .collect();
        let news = store
            .segments()
            .iter()
            .enumerate()
            .map(|(k, segment)| NewSegment::new((k < originals.len()).then_some(k), segment.shared_points()))
            .collect();

        let original_count = store.point_count();
        tracing::debug!(
            segments = originals.len(),
            points = original_count,
            "Started track comparison"
        );

        Self {
            config,
            originals,
            original_count,
            news,
            differences: Vec::new(),
            current: None,
            next_id: 1,
        }
    }

    /// All reported differences, ordered by original distance
    #[inline]
    pub fn differences(&self) -> &[TrackDifference] {
        &self.differences
    }

    /// The selected difference, if any
    pub fn current(&self) -> Option<&TrackDifference> {
        let id = self.current?;
        self.differences.iter().find(|d| d.id == id)
    }

    /// Select a difference by id; returns false for unknown ids
    pub fn select(&mut self, id: DifferenceId) -> bool {
        let known = self.differences.iter().any(|d| d.id == id);
        if known {
            self.current = Some(id);
        }
        known
    }

    /// Select the following difference, wrapping around at the end
    pub fn select_next(&mut self) -> Option<&TrackDifference> {
        let len = self.differences.len();
        let next = match self.current_position() {
            Some(i) => (i + 1) % len.max(1),
            None => 0,
        };
        self.current = self.differences.get(next).map(|d| d.id);
        self.current()
    }

    /// Select the preceding difference, wrapping around at the start
    pub fn select_previous(&mut self) -> Option<&TrackDifference> {
        let len = self.differences.len();
        let previous = match self.current_position() {
            Some(0) | None => len.saturating_sub(1),
            Some(i) => i - 1,
        };
        self.current = self.differences.get(previous).map(|d| d.id);
        self.current()
    }

    fn current_position(&self) -> Option<usize> {
        let id = self.current?;
        self.differences.iter().position(|d| d.id == id)
    }

    /// End the comparison
    pub fn dispose(self) -> Vec<TrackDifference> {
        tracing::debug!(differences = self.differences.len(), "Ended track comparison");
        self.differences
    }

    /// A section was inserted into the live store at `index`
    pub fn section_added(&mut self, index: usize) {
        let index = index.min(self.news.len());
        self.news.insert(
            index,
            NewSegment {
                origin: None,
                points: NewPoints::Pending,
            },
        );
    }

    /// A section was removed from the live store at `index`
    pub fn section_removed(&mut self, index: usize) {
        if index < self.news.len() {
            self.news.remove(index);
        }
    }

    /// The section at `index` started recalculating
    pub fn calculation_starting(&mut self, index: usize) {
        if let Some(segment) = self.news.get_mut(index) {
            segment.points = NewPoints::Pending;
        }
    }

    /// A recalculation was canceled; restore the live points without a re-scan
    pub fn calculation_canceled(&mut self, index: usize, points: Option<Arc<[TrackPoint]>>) {
        if let Some(segment) = self.news.get_mut(index) {
            segment.set_points(points);
        }
    }

    /// The section at `index` finished with new `points`; re-scan around it
    pub fn calculation_finished(&mut self, index: usize, points: Option<Arc<[TrackPoint]>>) {
        let Some(segment) = self.news.get_mut(index) else {
            tracing::warn!(index, "Calculation finished for unknown segment");
            return;
        };
        segment.set_points(points);
        self.resync(index);
    }

    /// Recompute the differences around the live segment `index`
    ///
    /// Deferred (no-op) while a segment the re-scan depends on is pending.
    pub fn resync(&mut self, index: usize) {
        #[cfg(feature = "profiling")]
        profiling::scope!("diff::resync");

        if self.originals.is_empty() || index >= self.news.len() {
            return;
        }

        let Some(range) = self.resolve_range(index) else {
            tracing::debug!(index, "Deferred resync, neighbouring section pending");
            return;
        };

        let original: Vec<TrackPoint> = (range.from..=range.to)
            .filter_map(|ordinal| self.original_point(ordinal))
            .collect();
        let new = self.new_points(&range, original.first().map(|p| p.values).unwrap_or_default());

        // Retract everything the re-scan will report again
        let mut retracted = Vec::new();
        self.differences.retain(|d| {
            let overlaps = d.overlaps(range.from, range.to);
            if overlaps {
                retracted.push((d.id, d.span()));
            }
            !overlaps
        });
        let rehome = self
            .current
            .and_then(|id| retracted.iter().find(|(r, _)| *r == id))
            .map(|(_, span)| span.clone());

        let found = self.walk(&range, &original, &new);
        tracing::debug!(
            index,
            from = range.from,
            to = range.to,
            retracted = retracted.len(),
            found = found.len(),
            "Resynchronized differences"
        );

        for difference in found {
            let at = self
                .differences
                .partition_point(|d| d.span.start() < difference.span.start());
            self.differences.insert(at, difference);
        }

        if let Some(span) = rehome {
            self.current = self
                .differences
                .iter()
                .find(|d| d.overlaps(*span.start(), *span.end()))
                .map(|d| d.id);
        }
    }

    /// Find anchors on both sides of `index`, widening until no reported
    /// difference straddles the range boundary
    fn resolve_range(&self, index: usize) -> Option<Range> {
        let mut lower = usize::MAX;
        let mut upper = 0usize;
        loop {
            let (first, from) = self.find_start(index, lower)?;
            let (last, to) = self.find_end(index, from.max(upper))?;

            let (low, high) = self
                .differences
                .iter()
                .filter(|d| d.overlaps(from, to))
                .fold((from, to), |(lo, hi), d| {
                    (lo.min(*d.span.start()), hi.max(*d.span.end()))
                });
            if low >= from && high <= to {
                return Some(Range {
                    first,
                    last,
                    from,
                    to,
                });
            }
            lower = lower.min(low);
            upper = upper.max(high);
        }
    }

    /// Walk back to a new segment whose start exists on the original track at
    /// or before `max_ordinal`
    ///
    /// A position the original visits more than once resolves to the visit
    /// closest to where that new segment is expected to start.
    fn find_start(&self, index: usize, max_ordinal: usize) -> Option<(usize, usize)> {
        let mut j = index;
        loop {
            let points = self.news[j].ready()?;
            if j == 0 {
                return Some((0, 0));
            }
            let key = points[0].position().key();
            if let Some(ordinal) = self.locate_near(key, 0, max_ordinal, self.expected_start(j)) {
                return Some((j, ordinal));
            }
            j -= 1;
        }
    }

    /// Walk forward to a new segment whose end exists on the original track at
    /// or after `min_ordinal`
    fn find_end(&self, index: usize, min_ordinal: usize) -> Option<(usize, usize)> {
        let last_ordinal = self.original_count.saturating_sub(1);
        for m in index..self.news.len() {
            let points = self.news[m].ready()?;
            if m + 1 == self.news.len() {
                return Some((m, last_ordinal));
            }
            let end = points[points.len() - 1].position().key();
            if let Some(ordinal) = self.locate_near(end, min_ordinal, last_ordinal, self.expected_end(m)) {
                return Some((m, ordinal));
            }
        }
        None
    }

    /// Original ordinal the start of new segment `j` mirrored
    fn expected_start(&self, j: usize) -> usize {
        if let Some(k) = self.news[j].origin {
            return self.originals[k].start_ordinal;
        }
        self.news[..j]
            .iter()
            .rev()
            .find_map(|s| s.origin)
            .map_or(0, |k| self.originals[k].end_ordinal())
    }

    /// Original ordinal the end of new segment `m` mirrored
    fn expected_end(&self, m: usize) -> usize {
        if let Some(k) = self.news[m].origin {
            return self.originals[k].end_ordinal();
        }
        self.news[m + 1..]
            .iter()
            .find_map(|s| s.origin)
            .map_or(self.original_count.saturating_sub(1), |k| self.originals[k].start_ordinal)
    }

    /// Original ordinals of `key` within `[from, to]`, ascending
    fn occurrences(&self, key: PositionKey, from: usize, to: usize) -> impl Iterator<Item = usize> + '_ {
        let first = if from > to { None } else { self.original_segment(from) };
        first
            .map_or(&self.originals[..0], |f| &self.originals[f..])
            .iter()
            .take_while(move |segment| segment.start_ordinal <= to)
            .filter_map(move |segment| segment.lookup.get(&key).map(|p| (segment.start_ordinal, p)))
            .flat_map(|(start, p)| p.iter().map(move |&i| start + i))
            .filter(move |ordinal| (from..=to).contains(ordinal))
    }

    /// First original ordinal of `key` within `[from, to]`
    fn locate(&self, key: PositionKey, from: usize, to: usize) -> Option<usize> {
        self.occurrences(key, from, to).next()
    }

    /// Original ordinal of `key` within `[from, to]` closest to `expected`
    fn locate_near(&self, key: PositionKey, from: usize, to: usize, expected: usize) -> Option<usize> {
        self.occurrences(key, from, to)
            .min_by_key(|ordinal| ordinal.abs_diff(expected))
    }

    /// Original segment holding `ordinal`; boundary points resolve to the
    /// later segment
    fn original_segment(&self, ordinal: usize) -> Option<usize> {
        let after = self
            .originals
            .partition_point(|s| s.start_ordinal <= ordinal);
        after.checked_sub(1)
    }

    fn original_point(&self, ordinal: usize) -> Option<TrackPoint> {
        let segment = &self.originals[self.original_segment(ordinal)?];
        segment
            .points
            .get(ordinal - segment.start_ordinal)
            .map(|p| p.offset_by(segment.start))
    }

    /// Flattened live points of `range`, boundaries deduplicated, values
    /// offset to start at `offset`
    fn new_points(&self, range: &Range, offset: CommonValues) -> Vec<TrackPoint> {
        let mut out = Vec::new();
        let mut base = offset;
        for (n, segment) in self.news[range.first..=range.last].iter().enumerate() {
            let Some(points) = segment.ready() else {
                continue;
            };
            let skip = usize::from(n > 0);
            out.extend(points[skip..].iter().map(|p| p.offset_by(base)));
            base += points[points.len() - 1].values;
        }
        out
    }

    /// Lockstep walk over both sides of `range`
    fn walk(&mut self, range: &Range, original: &[TrackPoint], new: &[TrackPoint]) -> Vec<TrackDifference> {
        let mut found = Vec::new();
        let (mut i, mut j) = (0usize, 0usize);

        loop {
            while i < original.len() && j < new.len() && original[i] == new[j] {
                i += 1;
                j += 1;
            }
            if i >= original.len() && j >= new.len() {
                break;
            }

            // The stretch starts at the last matching pair
            let (start_i, start_j) = if i > 0 && j > 0 { (i - 1, j - 1) } else { (i, j) };

            let mut rejoin = None;
            for (jj, point) in new.iter().enumerate().skip(j) {
                let key = point.position().key();
                if let Some(ordinal) = self.locate(key, range.from + i, range.to) {
                    rejoin = Some((ordinal - range.from, jj));
                    break;
                }
            }

            let (end_i, end_j) = rejoin.unwrap_or((original.len() - 1, new.len() - 1));
            if let Some(difference) = self.difference(
                range.from + start_i,
                &original[start_i..=end_i],
                &new[start_j..=end_j],
            ) {
                found.push(difference);
            }

            match rejoin {
                Some((ii, jj)) => {
                    i = ii;
                    j = jj;
                }
                None => break,
            }
        }
        found
    }

    /// Build a difference from a diverging stretch unless it is noise
    fn difference(
        &mut self,
        start: usize,
        original: &[TrackPoint],
        new: &[TrackPoint],
    ) -> Option<TrackDifference> {
        let (first, last) = (original.first()?, original.last()?);
        let (new_first, new_last) = (new.first()?, new.last()?);

        let tolerance = self.config.noise_tolerance;
        if follows(original, new, tolerance) && follows(new, original, tolerance) {
            tracing::trace!(
                original = original.len(),
                new = new.len(),
                "Discarded stretch within noise tolerance"
            );
            return None;
        }

        let end = start + original.len() - 1;
        let delta = (new_last.values - new_first.values) - (last.values - first.values);

        let id = DifferenceId(self.next_id);
        self.next_id += 1;
        Some(TrackDifference {
            id,
            original_points: original.to_vec(),
            segment: self.original_segment(start).unwrap_or_default(),
            distance: first.distance(),
            length: last.distance() - first.distance(),
            delta,
            span: start..=end,
        })
    }
}

/// Whether every point of `a` but the last lies within `tolerance` of the
/// polyline `b`, visiting `b` in order
fn follows(a: &[TrackPoint], b: &[TrackPoint], tolerance: f64) -> bool {
    let Some((_, head)) = a.split_last() else {
        return true;
    };
    if b.len() == 1 {
        return head
            .iter()
            .all(|p| geodesy::distance(p.position(), b[0].position()) <= tolerance);
    }

    let mut cursor = 0usize;
    for p in head {
        loop {
            if cursor + 1 >= b.len() {
                return false;
            }
            let nearest =
                geodesy::minimal_distance(b[cursor].position(), b[cursor + 1].position(), p.position());
            if nearest.distance <= tolerance {
                break;
            }
            cursor += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Position, RoutePoint, RouteSection, Segment, Waypoint, convert};

    const SPACING: f32 = 0.001;

    fn convert_positions(positions: &[Position]) -> Arc<[TrackPoint]> {
        let raw: Vec<RoutePoint> = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| RoutePoint::new(p, Some(100.0 + (i % 3) as f32 * 5.0), i as i64 * 15_000))
            .collect();
        Arc::from(convert(&raw, &[], &Config::default()).points)
    }

    /// Straight eastward section `s`, `steps` steps long
    fn straight(s: usize, steps: usize) -> Vec<Position> {
        (0..=steps)
            .map(|i| Position::new(0.0, (s * steps + i) as f32 * SPACING))
            .collect()
    }

    /// Section `s` with a northward bulge replacing its interior
    fn detour(s: usize, steps: usize) -> Vec<Position> {
        let mut positions = straight(s, steps);
        for p in &mut positions[1..steps] {
            p.latitude = 0.0015;
        }
        positions
    }

    fn create_test_store(sections: usize, steps: usize) -> SegmentStore {
        let positions: Vec<_> = (0..sections).map(|s| straight(s, steps)).collect();
        create_store_from(&positions)
    }

    /// One segment per position list, converted the same way as `replace`
    fn create_store_from(sections: &[Vec<Position>]) -> SegmentStore {
        let mut store = SegmentStore::new();
        for (s, positions) in sections.iter().enumerate() {
            let section = RouteSection::new(
                Waypoint::new(positions[0]),
                Waypoint::new(positions[positions.len() - 1]),
            );
            let raw: Vec<RoutePoint> = positions
                .iter()
                .enumerate()
                .map(|(i, &p)| RoutePoint::new(p, Some(100.0 + (i % 3) as f32 * 5.0), i as i64 * 15_000))
                .collect();
            store.insert(s, Segment::with_result(section, convert(&raw, &[], &Config::default())));
        }
        store
    }

    /// East to B, back to A on a parallel road, then south to C
    fn out_and_back() -> Vec<Vec<Position>> {
        let out: Vec<Position> = (0..=5).map(|i| Position::new(0.0, i as f32 * SPACING)).collect();
        let back: Vec<Position> = (0..=5)
            .map(|i| {
                let lat = if i == 0 || i == 5 { 0.0 } else { 0.0005 };
                Position::new(lat, (5 - i) as f32 * SPACING)
            })
            .collect();
        let south: Vec<Position> = (0..=5).map(|i| Position::new(0.0 - i as f32 * SPACING, 0.0)).collect();
        vec![out, back, south]
    }

    fn replace(engine: &mut DiffEngine, index: usize, positions: &[Position]) -> Arc<[TrackPoint]> {
        let points = convert_positions(positions);
        engine.calculation_starting(index);
        engine.calculation_finished(index, Some(points.clone()));
        points
    }

    #[test]
    fn test_unchanged_track_has_no_differences() {
        let store = create_test_store(3, 5);
        let mut engine = DiffEngine::new(&store, Config::default());
        replace(&mut engine, 1, &straight(1, 5));
        assert!(engine.differences().is_empty());
    }

    #[test]
    fn test_middle_detour_is_one_difference() {
        let store = create_test_store(3, 5);
        let original_totals = store.segment(1).unwrap().totals();
        let start_distance = store.segment(1).unwrap().start().distance();

        let mut engine = DiffEngine::new(&store, Config::default());
        let points = replace(&mut engine, 1, &detour(1, 5));
        let new_totals = points[points.len() - 1].values;

        assert_eq!(engine.differences().len(), 1);
        let difference = &engine.differences()[0];
        assert_eq!(difference.segment, 1);
        assert_eq!(difference.distance, start_distance);
        assert!((difference.length - original_totals.distance()).abs() < 1e-6);
        assert_eq!(difference.delta, new_totals - original_totals);
        assert!(difference.delta.distance() > 0.0);
        assert_eq!(difference.original_points.len(), 6);
        assert_eq!(difference.span(), 5..=10);
    }

    #[test]
    fn test_jitter_is_not_a_difference() {
        let store = create_test_store(3, 5);
        let mut engine = DiffEngine::new(&store, Config::default());

        let mut jittered = straight(1, 5);
        for (i, p) in jittered[1..5].iter_mut().enumerate() {
            // Roughly 0.3 m either way
            p.latitude += if i % 2 == 0 { 0.000003 } else { -0.000003 };
        }
        replace(&mut engine, 1, &jittered);
        assert!(engine.differences().is_empty());
    }

    #[test]
    fn test_reverting_retracts_difference() {
        let store = create_test_store(3, 5);
        let mut engine = DiffEngine::new(&store, Config::default());
        replace(&mut engine, 1, &detour(1, 5));
        assert_eq!(engine.differences().len(), 1);

        replace(&mut engine, 1, &straight(1, 5));
        assert!(engine.differences().is_empty());
    }

    #[test]
    fn test_differences_keep_distance_order() {
        let store = create_test_store(4, 5);
        let mut engine = DiffEngine::new(&store, Config::default());
        replace(&mut engine, 2, &detour(2, 5));
        replace(&mut engine, 0, &detour(0, 5));

        let distances: Vec<f64> = engine.differences().iter().map(|d| d.distance).collect();
        assert_eq!(distances.len(), 2);
        assert!(distances[0] < distances[1]);
        assert_eq!(engine.differences()[0].segment, 0);
        assert_eq!(engine.differences()[1].segment, 2);
    }

    #[test]
    fn test_pending_neighbour_defers_resync() {
        let store = create_test_store(3, 5);
        let mut engine = DiffEngine::new(&store, Config::default());

        // Section 1 ends somewhere new, so its end cannot be anchored
        let mut moved_end = detour(1, 5);
        moved_end[5].latitude = 0.002;
        let mut moved_start = straight(2, 5);
        moved_start[0].latitude = 0.002;

        engine.calculation_starting(1);
        engine.calculation_starting(2);
        engine.calculation_finished(1, Some(convert_positions(&moved_end)));
        assert!(engine.differences().is_empty());

        engine.calculation_finished(2, Some(convert_positions(&moved_start)));
        assert_eq!(engine.differences().len(), 1);
        assert_eq!(engine.differences()[0].span(), 5..=11);
    }

    #[test]
    fn test_removed_first_section_is_reported_after_resync() {
        let store = create_test_store(3, 5);
        let first_totals = store.segment(0).unwrap().totals();
        let mut engine = DiffEngine::new(&store, Config::default());

        engine.section_removed(0);
        engine.resync(0);

        assert_eq!(engine.differences().len(), 1);
        let difference = &engine.differences()[0];
        assert_eq!(difference.distance, 0.0);
        assert_eq!(difference.delta, -first_totals);
    }

    #[test]
    fn test_removed_last_section_is_reported_after_resync() {
        let store = create_test_store(3, 5);
        let last_totals = store.segment(2).unwrap().totals();
        let mut engine = DiffEngine::new(&store, Config::default());

        engine.section_removed(2);
        engine.resync(1);

        assert_eq!(engine.differences().len(), 1);
        assert_eq!(engine.differences()[0].delta, -last_totals);
        assert_eq!(engine.differences()[0].span(), 10..=15);
    }

    #[test]
    fn test_canceled_calculation_restores_points() {
        let store = create_test_store(3, 5);
        let mut engine = DiffEngine::new(&store, Config::default());
        engine.calculation_starting(2);
        engine.calculation_canceled(2, store.segment(2).unwrap().shared_points());

        // The re-scan of section 1 needs section 2 to anchor its moved end
        let mut moved_end = detour(1, 5);
        moved_end[5].latitude = 0.002;
        replace(&mut engine, 1, &moved_end);
        assert_eq!(engine.differences().len(), 1);
        assert_eq!(engine.differences()[0].span(), 5..=11);
    }

    #[test]
    fn test_selection_follows_rescan() {
        let store = create_test_store(4, 5);
        let mut engine = DiffEngine::new(&store, Config::default());
        replace(&mut engine, 0, &detour(0, 5));
        replace(&mut engine, 2, &detour(2, 5));

        let first = engine.select_next().map(|d| d.id);
        assert_eq!(first, Some(engine.differences()[0].id));
        let second = engine.select_next().map(|d| d.id);
        assert_eq!(second, Some(engine.differences()[1].id));
        // Wraps around
        assert_eq!(engine.select_next().map(|d| d.id), first);
        assert_eq!(engine.select_previous().map(|d| d.id), second);

        // Re-scanning the selected region rehomes the selection
        let mut bigger = detour(2, 5);
        for p in &mut bigger[1..5] {
            p.latitude = 0.003;
        }
        replace(&mut engine, 2, &bigger);
        let current = engine.current().unwrap();
        assert_eq!(current.segment, 2);
        assert_ne!(Some(current.id), second);

        assert!(!engine.select(DifferenceId(9999)));
        let differences = engine.dispose();
        assert_eq!(differences.len(), 2);
    }

    #[test]
    fn test_revisited_waypoint_unchanged_has_no_differences() {
        let sections = out_and_back();
        let store = create_store_from(&sections);
        let mut engine = DiffEngine::new(&store, Config::default());

        // A is both ordinal 0 and the start of the last section
        replace(&mut engine, 2, &sections[2]);
        assert!(engine.differences().is_empty());
        replace(&mut engine, 1, &sections[1]);
        assert!(engine.differences().is_empty());
    }

    #[test]
    fn test_revisited_waypoint_detour_anchors_at_own_visit() {
        let sections = out_and_back();
        let store = create_store_from(&sections);
        let original_totals = store.segment(2).unwrap().totals();
        let mut engine = DiffEngine::new(&store, Config::default());

        let mut south = sections[2].clone();
        for p in &mut south[1..5] {
            p.longitude = 0.0015;
        }
        let points = replace(&mut engine, 2, &south);

        assert_eq!(engine.differences().len(), 1);
        let difference = &engine.differences()[0];
        assert_eq!(difference.segment, 2);
        assert_eq!(difference.span(), 10..=15);
        assert_eq!(difference.delta, points[points.len() - 1].values - original_totals);
    }

    #[test]
    fn test_detour_rejoins_at_repeated_vertex() {
        // The middle section runs through V twice, around a small loop
        let at = |lat: f32, step: usize| Position::new(lat, step as f32 * SPACING);
        let lollipop = |offset: f32| {
            vec![
                at(0.0, 5),
                at(0.0, 6),
                at(0.0, 7),
                at(offset, 7),
                at(offset, 6),
                at(0.0, 7),
                at(0.0, 8),
                at(0.0, 9),
                at(0.0, 10),
            ]
        };
        let sections = vec![straight(0, 5), lollipop(0.001), straight(2, 5)];
        let store = create_store_from(&sections);
        let original_totals = store.segment(1).unwrap().totals();
        let mut engine = DiffEngine::new(&store, Config::default());

        // A wider loop leaves at the first visit of V and rejoins at the second
        let points = replace(&mut engine, 1, &lollipop(0.002));
        assert_eq!(engine.differences().len(), 1);
        let difference = &engine.differences()[0];
        assert_eq!(difference.segment, 1);
        assert_eq!(difference.span(), 7..=10);
        let expected = points[points.len() - 1].values - original_totals;
        assert!((difference.delta.distance() - expected.distance()).abs() < 0.01);

        replace(&mut engine, 1, &sections[1]);
        assert!(engine.differences().is_empty());
    }
}
