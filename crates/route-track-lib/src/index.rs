//! Point index - the query surface over the segment store
//!
//! Every query only sees the linked prefix of the store (see
//! [`SegmentStore::linked`]). Consecutive segments share their boundary point;
//! enumeration visits it once, as the first point of the later segment.

use crate::{Position, SegmentStore, TrackPoint, geodesy, lerp};
use geo::{Coord, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cursor into the track: (segment ordinal, point ordinal)
///
/// Only valid for the store state it was obtained from. Queries that cannot
/// produce a valid index return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackIndex {
    segment: usize,
    point: usize,
}

impl TrackIndex {
    #[inline]
    pub const fn new(segment: usize, point: usize) -> Self {
        Self { segment, point }
    }

    #[inline]
    pub fn segment(&self) -> usize {
        self.segment
    }

    #[inline]
    pub fn point(&self) -> usize {
        self.point
    }
}

/// Result of [`SegmentStore::nearest_point`]
#[derive(Debug, Clone, Copy)]
pub struct NearestPoint {
    /// `None` when no candidate qualified
    pub index: Option<TrackIndex>,
    /// The closest point on the track (interpolated)
    pub point: Option<TrackPoint>,
    /// Distance in meters, `f64::INFINITY` when nothing qualified
    pub distance: f64,
}

impl NearestPoint {
    pub const NONE: NearestPoint = NearestPoint {
        index: None,
        point: None,
        distance: f64::INFINITY,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index.is_some()
    }
}

/// A local distance minimum reported by [`SegmentStore::near_points`]
#[derive(Debug, Clone, Copy)]
pub struct NearPoint {
    pub index: TrackIndex,
    pub point: TrackPoint,
    /// Distance in meters
    pub distance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SegmentStore {
    /// Whether `index` points at a stored point of the linked prefix
    #[inline]
    pub fn is_valid(&self, index: TrackIndex) -> bool {
        self.linked()
            .get(index.segment)
            .is_some_and(|s| index.point < s.len())
    }

    /// The point at `index` with track-absolute values
    #[inline]
    pub fn at(&self, index: TrackIndex) -> Option<TrackPoint> {
        self.linked().get(index.segment)?.point(index.point)
    }

    #[inline]
    pub fn first_index(&self) -> Option<TrackIndex> {
        (!self.linked().is_empty()).then_some(TrackIndex::new(0, 0))
    }

    #[inline]
    pub fn last_index(&self) -> Option<TrackIndex> {
        let linked = self.linked();
        let last = linked.last()?;
        Some(TrackIndex::new(linked.len() - 1, last.len() - 1))
    }

    /// The next distinct point, skipping the duplicated segment boundary
    pub fn next(&self, index: TrackIndex) -> Option<TrackIndex> {
        let linked = self.linked();
        if index.point + 1 < linked.get(index.segment)?.len() {
            return Some(TrackIndex::new(index.segment, index.point + 1));
        }
        (index.segment + 1..linked.len())
            .find(|&s| linked[s].len() > 1)
            .map(|s| TrackIndex::new(s, 1))
    }

    /// The previous distinct point, skipping the duplicated segment boundary
    pub fn prev(&self, index: TrackIndex) -> Option<TrackIndex> {
        let linked = self.linked();
        if index.point >= linked.get(index.segment)?.len() {
            return None;
        }
        if index.point > 0 {
            return Some(TrackIndex::new(index.segment, index.point - 1));
        }
        (0..index.segment)
            .rev()
            .find(|&s| linked[s].len() > 1)
            .map(|s| TrackIndex::new(s, linked[s].len() - 2))
    }

    /// Global ordinal of the point at `index`
    #[inline]
    pub fn ordinal(&self, index: TrackIndex) -> Option<usize> {
        let segment = self.linked().get(index.segment)?;
        (index.point < segment.len()).then(|| segment.start_ordinal() + index.point)
    }

    /// Index of the point with the given global ordinal
    pub fn index_at(&self, ordinal: usize) -> Option<TrackIndex> {
        let linked = self.linked();
        let after = linked.partition_point(|s| s.start_ordinal() <= ordinal);
        let segment = after.checked_sub(1)?;
        let point = ordinal - linked[segment].start_ordinal();
        (point < linked[segment].len()).then_some(TrackIndex::new(segment, point))
    }

    /// Iterate over all distinct points of the linked prefix
    pub fn points(&self) -> impl Iterator<Item = TrackPoint> + '_ {
        self.linked().iter().enumerate().flat_map(|(s, segment)| {
            let skip = usize::from(s > 0);
            (skip..segment.len()).filter_map(move |p| segment.point(p))
        })
    }

    /// The point at `distance` meters from the start
    ///
    /// Returns the stored point when one lies exactly at `distance`, otherwise
    /// the interpolation between the bracketing points together with the index
    /// of the preceding one. `None` outside `[0, total distance]`.
    pub fn search(&self, distance: f64) -> Option<(TrackPoint, TrackIndex)> {
        let linked = self.linked();
        let target = (distance * 1000.0).round() as i64;
        if linked.is_empty() || target < 0 || target > self.total().distance_mm() {
            return None;
        }

        let after = linked.partition_point(|s| s.start().distance_mm() <= target);
        let s = after.checked_sub(1)?;
        let segment = &linked[s];
        let points = segment.points()?;
        let relative = target - segment.start().distance_mm();

        let pos = points.partition_point(|p| p.values.distance_mm() < relative);
        if pos >= points.len() {
            let last = points.len() - 1;
            return Some((segment.point(last)?, TrackIndex::new(s, last)));
        }
        if pos == 0 || points[pos].values.distance_mm() == relative {
            return Some((segment.point(pos)?, TrackIndex::new(s, pos)));
        }

        let previous = segment.point(pos - 1)?;
        let next = segment.point(pos)?;
        let span = next.distance() - previous.distance();
        let fraction = if span > 0.0 {
            (distance - previous.distance()) / span
        } else {
            0.0
        };
        Some((lerp(&previous, &next, fraction), TrackIndex::new(s, pos - 1)))
    }

    /// Advance a playback cursor to `time_ms`
    ///
    /// Scans forward from `from` and returns the time-interpolated point and
    /// the index of the point preceding it, which is the cursor to pass on
    /// the next call. A time landing exactly on a stored point returns that
    /// point with the index before it. The cursor never moves backwards: a
    /// time before the cursor returns the cursor's own point. Past the end the
    /// last point is returned.
    pub fn advance_to(&self, time_ms: i64, from: TrackIndex) -> Option<(TrackPoint, TrackIndex)> {
        let mut cursor = from;
        let mut current = self.at(cursor)?;

        loop {
            if time_ms <= current.time_ms() {
                return Some((current, cursor));
            }
            let Some(next_index) = self.next(cursor) else {
                return Some((current, cursor));
            };
            let next = self.at(next_index)?;
            if next.time_ms() >= time_ms {
                let fraction = (time_ms - current.time_ms()) as f64
                    / (next.time_ms() - current.time_ms()) as f64;
                return Some((lerp(&current, &next, fraction), cursor));
            }
            cursor = next_index;
            current = next;
        }
    }

    /// The track point closest to `position`
    ///
    /// Only point pairs whose connecting line touches `region` (a lon/lat
    /// rectangle, typically the visible map area) are considered. With
    /// `section` set, only that segment is scanned.
    pub fn nearest_point(
        &self,
        position: Position,
        region: &Rect<f64>,
        section: Option<usize>,
    ) -> NearestPoint {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::nearest_point");

        let linked = self.linked();
        let range = match section {
            Some(s) if s < linked.len() => s..s + 1,
            Some(_) => return NearestPoint::NONE,
            None => 0..linked.len(),
        };

        let mut best: Option<(TrackIndex, f64, f64)> = None;
        for s in range {
            let Some(points) = linked[s].points() else {
                continue;
            };

            if points.len() == 1 {
                let only = points[0].position();
                if contains(region, only.into()) {
                    let d = geodesy::distance(only, position);
                    if best.is_none_or(|(_, _, bd)| d < bd) {
                        best = Some((TrackIndex::new(s, 0), 0.0, d));
                    }
                }
                continue;
            }

            for (p, pair) in points.windows(2).enumerate() {
                let (a, b) = (pair[0].position(), pair[1].position());
                if !line_intersects_rect(a.into(), b.into(), region) {
                    continue;
                }
                let candidate = geodesy::minimal_distance(a, b, position);
                if best.is_none_or(|(_, _, bd)| candidate.distance < bd) {
                    best = Some((TrackIndex::new(s, p), candidate.fraction, candidate.distance));
                }
            }
        }

        let Some((index, fraction, distance)) = best else {
            return NearestPoint::NONE;
        };
        let (point, index) = self.point_on_pair(index, fraction);
        NearestPoint {
            index: Some(index),
            point,
            distance,
        }
    }

    /// All local distance minima within `max_distance` of `position` between
    /// `from` and `to`
    ///
    /// Once the track leaves `max_distance`, the current minimum is only
    /// reported after the track has travelled `min_separation` meters further;
    /// re-entering before that continues the same minimum.
    pub fn near_points(
        &self,
        position: Position,
        from: TrackIndex,
        to: TrackIndex,
        max_distance: f64,
        min_separation: f64,
    ) -> Vec<NearPoint> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::near_points");

        let mut found = Vec::new();
        let (Some(first), Some(last)) = (self.ordinal(from), self.ordinal(to)) else {
            return found;
        };
        if first > last {
            return found;
        }

        // (pair start, fraction, distance)
        let mut candidate: Option<(TrackIndex, f64, f64)> = None;
        let mut exit_distance: Option<f64> = None;

        let mut cursor = from;
        let Some(mut a) = self.at(cursor) else {
            return found;
        };
        while self.ordinal(cursor).is_some_and(|o| o < last) {
            let Some(next_index) = self.next(cursor) else {
                break;
            };
            let Some(b) = self.at(next_index) else {
                break;
            };

            let nearest = geodesy::minimal_distance(a.position(), b.position(), position);
            if nearest.distance <= max_distance {
                if candidate.is_none_or(|(_, _, d)| nearest.distance < d) {
                    candidate = Some((cursor, nearest.fraction, nearest.distance));
                }
                exit_distance = None;
            } else if candidate.is_some() {
                let exit = *exit_distance.get_or_insert(a.distance());
                if b.distance() - exit >= min_separation {
                    if let Some(c) = candidate.take() {
                        found.push(self.near_point(c));
                    }
                    exit_distance = None;
                }
            }

            cursor = next_index;
            a = b;
        }

        if let Some(c) = candidate {
            found.push(self.near_point(c));
        }
        tracing::trace!(count = found.len(), "Collected near points");
        found
    }

    fn near_point(&self, (index, fraction, distance): (TrackIndex, f64, f64)) -> NearPoint {
        let (point, index) = self.point_on_pair(index, fraction);
        NearPoint {
            index,
            point: point.unwrap_or_default(),
            distance,
        }
    }

    /// Interpolated point on the pair starting at `index`
    fn point_on_pair(&self, index: TrackIndex, fraction: f64) -> (Option<TrackPoint>, TrackIndex) {
        let Some(a) = self.at(index) else {
            return (None, index);
        };
        let Some(next_index) = self.next(index) else {
            return (Some(a), index);
        };
        if fraction >= 1.0 {
            return (self.at(next_index), next_index);
        }
        let point = self.at(next_index).map(|b| lerp(&a, &b, fraction));
        (point, index)
    }

    /// File group of the segment holding `index`
    #[inline]
    pub fn file_group(&self, index: TrackIndex) -> Option<u32> {
        self.linked().get(index.segment).map(|s| s.file_group())
    }

    /// First and last index of a file group
    pub fn file_range(&self, group: u32) -> Option<(TrackIndex, TrackIndex)> {
        let linked = self.linked();
        let first = linked.iter().position(|s| s.file_group() == group)?;
        let last = linked.iter().rposition(|s| s.file_group() == group)?;
        Some((
            TrackIndex::new(first, 0),
            TrackIndex::new(last, linked[last].len() - 1),
        ))
    }
}

#[inline]
fn contains(rect: &Rect<f64>, c: Coord<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    c.x >= min.x && c.x <= max.x && c.y >= min.y && c.y <= max.y
}

/// Check if a line segment intersects a rectangle
fn line_intersects_rect(p1: Coord<f64>, p2: Coord<f64>, rect: &Rect<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();

    // Cohen-Sutherland style outcodes
    let outcode = |p: Coord<f64>| -> u8 {
        let mut code = 0u8;
        if p.x < min.x {
            code |= 1;
        }
        if p.x > max.x {
            code |= 2;
        }
        if p.y < min.y {
            code |= 4;
        }
        if p.y > max.y {
            code |= 8;
        }
        code
    };

    let code1 = outcode(p1);
    let code2 = outcode(p2);
    if code1 == 0 || code2 == 0 {
        return true;
    }
    if code1 & code2 != 0 {
        return false;
    }

    let edges = [
        (Coord { x: min.x, y: min.y }, Coord { x: min.x, y: max.y }),
        (Coord { x: max.x, y: min.y }, Coord { x: max.x, y: max.y }),
        (Coord { x: min.x, y: min.y }, Coord { x: max.x, y: min.y }),
        (Coord { x: min.x, y: max.y }, Coord { x: max.x, y: max.y }),
    ];
    edges
        .into_iter()
        .any(|(e1, e2)| segments_intersect(p1, p2, e1, e2))
}

/// Check if two line segments intersect
fn segments_intersect(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>, p4: Coord<f64>) -> bool {
    let d1 = direction(p3, p4, p1);
    let d2 = direction(p3, p4, p2);
    let d3 = direction(p1, p2, p3);
    let d4 = direction(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

#[inline]
fn direction(p1: Coord<f64>, p2: Coord<f64>, p3: Coord<f64>) -> f64 {
    (p3.x - p1.x) * (p2.y - p1.y) - (p2.x - p1.x) * (p3.y - p1.y)
}

#[inline]
fn on_segment(p1: Coord<f64>, p2: Coord<f64>, p: Coord<f64>) -> bool {
    p.x >= p1.x.min(p2.x) && p.x <= p1.x.max(p2.x) && p.y >= p1.y.min(p2.y) && p.y <= p1.y.max(p2.y)
}
