//! GPX export, one document per file group

use crate::{Result, SegmentStore, TrackError};
use geo::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use std::io::Write;

/// Build the GPX document of file group `group` (1-based)
pub fn file_to_gpx(store: &SegmentStore, group: u32) -> Result<Gpx> {
    #[cfg(feature = "profiling")]
    profiling::scope!("export::file_to_gpx");

    let (first, last) = store
        .file_range(group)
        .ok_or(TrackError::UnknownFileGroup(group))?;
    let last_ordinal = store.ordinal(last).unwrap_or_default();

    let mut segment = TrackSegment::default();
    let mut cursor = Some(first);
    while let Some(index) = cursor {
        let Some(point) = store.at(index) else {
            break;
        };
        let mut waypoint = Waypoint::new(Point::new(point.longitude as f64, point.latitude as f64));
        waypoint.elevation = Some(point.altitude as f64);
        segment.points.push(waypoint);

        if store.ordinal(index).is_some_and(|o| o >= last_ordinal) {
            break;
        }
        cursor = store.next(index);
    }

    let name = store
        .segment(first.segment())
        .and_then(|s| s.section().start().name.clone())
        .unwrap_or_else(|| format!("Track {group}"));

    let mut track = Track::default();
    track.name = Some(name);
    track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(env!("CARGO_PKG_NAME").to_string());
    gpx.tracks.push(track);

    tracing::debug!(group, points = gpx.tracks[0].segments[0].points.len(), "Built GPX file");
    Ok(gpx)
}

/// Build one GPX document per file group
pub fn all_files(store: &SegmentStore) -> Result<Vec<Gpx>> {
    (1..=store.file_count())
        .map(|group| file_to_gpx(store, group))
        .collect()
}

/// Serialize `gpx` to `writer`
pub fn write_gpx<W: Write>(gpx: &Gpx, writer: W) -> Result<()> {
    gpx::write(gpx, writer)?;
    Ok(())
}
