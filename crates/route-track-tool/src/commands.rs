//! Command implementations, each writing its report to `out`

use crate::settings::{Command, Settings};
use geo::{Coord, Rect};
use route_track_lib::{
    CommonValues, Config, DiffEngine, Position, RouteSection, Segment, SegmentStore, TrackDifference,
    TrackError, Waypoint, convert, encoding, export,
};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} holds no points", .0.display())]
    EmptyFile(PathBuf),

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Whole-track figures printed by `info`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub sections: usize,
    pub points: usize,
    pub files: u32,
    pub totals: CommonValues,
    pub min_altitude: Option<f32>,
    pub max_altitude: Option<f32>,
}

impl Summary {
    pub fn of(store: &SegmentStore) -> Self {
        Self {
            sections: store.len(),
            points: store.point_count(),
            files: store.file_count(),
            totals: store.total(),
            min_altitude: store.min_altitude(),
            max_altitude: store.max_altitude(),
        }
    }
}

pub fn run<W: Write>(settings: &Settings, out: &mut W) -> Result<()> {
    let config = settings.tuning.config();
    match &settings.command {
        Command::Info { files, json } => {
            let store = load_store(files, &config)?;
            let summary = Summary::of(&store);
            if *json {
                serde_json::to_writer_pretty(&mut *out, &summary)?;
                writeln!(out)?;
            } else {
                write_summary(&summary, out)?;
            }
        }
        Command::Profile { files, step, from, to } => {
            let store = load_store(files, &config)?;
            let to = to.unwrap_or_else(|| store.total().distance());
            let samples = write_profile(&store, *from, to, *step, out)?;
            debug!(samples, "Wrote profile");
        }
        Command::Diff { original, new } => {
            let original = load_store(original, &config)?;
            let new = load_store(new, &config)?;
            let differences = compare(&original, &new, config);
            write_differences(&differences, out)?;
        }
        Command::Export {
            files,
            out_dir,
            split_at,
        } => {
            let mut store = load_store(files, &config)?;
            for &index in split_at {
                if index >= store.len() {
                    return Err(TrackError::IndexOutOfRange {
                        index,
                        len: store.len(),
                    }
                    .into());
                }
                store.set_file_split(index, true);
            }
            for path in export_files(&store, out_dir)? {
                writeln!(out, "{}", path.display())?;
            }
        }
        Command::Nearest {
            files,
            lat,
            lon,
            max_distance,
            min_separation,
        } => {
            let store = load_store(files, &config)?;
            write_nearest(
                &store,
                Position::new(*lat, *lon),
                *max_distance,
                *min_separation,
                out,
            )?;
        }
    }
    Ok(())
}

/// Load each file as one routed section, chained in order
pub fn load_store(files: &[PathBuf], config: &Config) -> Result<SegmentStore> {
    let mut store = SegmentStore::new();
    for (index, path) in files.iter().enumerate() {
        let bytes = fs::read(path).map_err(|source| ToolError::Read {
            path: path.clone(),
            source,
        })?;
        let raw = encoding::decode(&bytes)?;
        let (Some(first), Some(last)) = (raw.first(), raw.last()) else {
            return Err(ToolError::EmptyFile(path.clone()));
        };

        let previous_end = index
            .checked_sub(1)
            .and_then(|i| store.segment(i))
            .map(|s| s.section().end().position);
        if previous_end.is_some_and(|end| end != first.position) {
            warn!(path = %path.display(), "Section does not start where the previous one ends");
        }

        let mut start = Waypoint::new(first.position);
        start.altitude = first.altitude;
        start.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        let mut end = Waypoint::new(last.position);
        end.altitude = last.altitude;

        let result = convert(&raw, &[], config);
        store.insert(index, Segment::with_result(RouteSection::new(start, end), result));
        debug!(path = %path.display(), points = raw.len(), "Loaded section");
    }
    info!(
        sections = store.len(),
        points = store.point_count(),
        "Loaded track"
    );
    Ok(store)
}

/// Differences of `new` against the frozen `original`
///
/// Every new section is announced as recalculated, then finished in track
/// order.
pub fn compare(original: &SegmentStore, new: &SegmentStore, config: Config) -> Vec<TrackDifference> {
    let mut engine = DiffEngine::new(original, config);
    let mut count = original.len();
    while count < new.len() {
        engine.section_added(count);
        count += 1;
    }
    while count > new.len() {
        count -= 1;
        engine.section_removed(count);
    }

    for index in 0..new.len() {
        engine.calculation_starting(index);
    }
    for (index, segment) in new.segments().iter().enumerate() {
        engine.calculation_finished(index, segment.shared_points());
    }
    engine.dispose()
}

/// Write one GPX document per file group into `dir`, returning the paths
pub fn export_files(store: &SegmentStore, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|source| ToolError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (i, gpx) in export::all_files(store)?.iter().enumerate() {
        let path = dir.join(format!("track-{}.gpx", i + 1));
        let file = File::create(&path).map_err(|source| ToolError::Write {
            path: path.clone(),
            source,
        })?;
        export::write_gpx(gpx, BufWriter::new(file))?;
        info!(path = %path.display(), "Exported GPX file");
        written.push(path);
    }
    Ok(written)
}

fn write_summary<W: Write>(summary: &Summary, out: &mut W) -> Result<()> {
    writeln!(out, "sections:  {}", summary.sections)?;
    writeln!(out, "points:    {}", summary.points)?;
    writeln!(out, "files:     {}", summary.files)?;
    writeln!(out, "distance:  {:.3} km", summary.totals.distance() / 1000.0)?;
    writeln!(out, "time:      {}", format_duration(summary.totals.time_ms()))?;
    writeln!(out, "ascent:    {:.1} m", summary.totals.ascent())?;
    writeln!(out, "descent:   {:.1} m", summary.totals.descent())?;
    if let (Some(low), Some(high)) = (summary.min_altitude, summary.max_altitude) {
        writeln!(out, "altitude:  {low:.1} .. {high:.1} m")?;
    }
    Ok(())
}

fn write_profile<W: Write>(store: &SegmentStore, from: f64, to: f64, step: f64, out: &mut W) -> Result<usize> {
    writeln!(out, "distance,altitude,surface")?;
    let mut samples = 0;
    for sample in store.by_distance(from, to, step) {
        writeln!(out, "{:.1},{:.1},{:?}", sample.distance, sample.altitude, sample.surface)?;
        samples += 1;
    }
    Ok(samples)
}

fn write_differences<W: Write>(differences: &[TrackDifference], out: &mut W) -> Result<()> {
    if differences.is_empty() {
        writeln!(out, "no differences")?;
        return Ok(());
    }
    for difference in differences {
        writeln!(
            out,
            "{}: section {} at {:.1} m, {:.1} m long, distance {:+.1} m, time {:+.1} s, ascent {:+.1} m, descent {:+.1} m",
            difference.id,
            difference.segment,
            difference.distance,
            difference.length,
            difference.delta.distance(),
            difference.delta.time(),
            difference.delta.ascent(),
            difference.delta.descent(),
        )?;
    }
    Ok(())
}

fn write_nearest<W: Write>(
    store: &SegmentStore,
    position: Position,
    max_distance: f64,
    min_separation: f64,
    out: &mut W,
) -> Result<()> {
    let world = Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 });
    let nearest = store.nearest_point(position, &world, None);
    let Some(point) = nearest.point.filter(|_| nearest.is_valid()) else {
        writeln!(out, "no track points")?;
        return Ok(());
    };
    writeln!(
        out,
        "nearest: {:.1} m away at {:.1} m ({:.6}, {:.6})",
        nearest.distance,
        point.distance(),
        point.latitude,
        point.longitude
    )?;

    let (Some(first), Some(last)) = (store.first_index(), store.last_index()) else {
        return Ok(());
    };
    for pass in store.near_points(position, first, last, max_distance, min_separation) {
        writeln!(
            out,
            "pass: {:.1} m away at {:.1} m, {}",
            pass.distance,
            pass.point.distance(),
            format_duration(pass.point.time_ms())
        )?;
    }
    Ok(())
}

/// `H:MM:SS`, rounded down to the second
fn format_duration(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}
