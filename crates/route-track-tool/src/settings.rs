use clap::{Args, Parser, Subcommand};
use route_track_lib::Config;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Route Track Tool - Inspect, profile, compare and export routed track point files
///
/// Every input file holds one routed section as 17-byte point records; files
/// are chained in the order given.
pub struct Settings {
    #[clap(flatten)]
    pub tuning: Tuning,

    #[clap(subcommand)]
    pub command: Command,
}

/// Conversion and comparison tuning shared by all commands
#[derive(Args, Debug, Clone)]
pub struct Tuning {
    /// Pending climb in meters before it counts as ascent
    #[clap(long, global = true, default_value = "0.1")]
    pub ascent_dead_band: f64,

    /// Pending fall in meters before it counts as descent
    #[clap(long, global = true, default_value = "0.1")]
    pub descent_dead_band: f64,

    /// Speed assumed for straight-line sections, in km/h
    #[clap(long, global = true, default_value = "20.0")]
    pub fallback_speed: f64,

    /// Differences staying within this many meters of the original are ignored
    #[clap(long, global = true, default_value = "1.0")]
    pub noise_tolerance: f64,
}

impl Tuning {
    pub fn config(&self) -> Config {
        Config {
            ascent_dead_band: self.ascent_dead_band,
            descent_dead_band: self.descent_dead_band,
            fallback_speed_kmh: self.fallback_speed,
            noise_tolerance: self.noise_tolerance,
            ..Config::default()
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print totals, point count and altitude range of a track
    Info {
        /// Section point files, in track order
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Print the summary as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Sample altitude and surface at a fixed distance step (CSV)
    Profile {
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Distance between samples in meters
        #[clap(short, long, default_value = "100.0")]
        step: f64,

        /// First sampled distance in meters
        #[clap(long, default_value = "0.0")]
        from: f64,

        /// Last sampled distance in meters (track end when omitted)
        #[clap(long)]
        to: Option<f64>,
    },

    /// Report where a recalculated track diverges from the original
    Diff {
        /// Original section point files, in track order
        #[clap(short, long, required = true, num_args = 1.., value_name = "FILE")]
        original: Vec<PathBuf>,

        /// Recalculated section point files, in track order
        #[clap(short, long, required = true, num_args = 1.., value_name = "FILE")]
        new: Vec<PathBuf>,
    },

    /// Write one GPX file per file group
    Export {
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Directory receiving the GPX files
        #[clap(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Section indices that start a new output file
        #[clap(long, value_delimiter = ',')]
        split_at: Vec<usize>,
    },

    /// Find the track point closest to a position and every pass near it
    Nearest {
        #[clap(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[clap(long, allow_negative_numbers = true)]
        lat: f32,

        #[clap(long, allow_negative_numbers = true)]
        lon: f32,

        /// Passes farther than this many meters are not reported
        #[clap(long, default_value = "50.0")]
        max_distance: f64,

        /// Track distance in meters that separates two passes
        #[clap(long, default_value = "200.0")]
        min_separation: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let settings = Settings::try_parse_from(["route-track-tool", "info", "a.bin", "b.bin", "--json"]).unwrap();
        match settings.command {
            Command::Info { files, json } => {
                assert_eq!(files, vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")]);
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_tuning() {
        let settings = Settings::try_parse_from([
            "route-track-tool",
            "profile",
            "a.bin",
            "--noise-tolerance",
            "2.5",
            "--step",
            "25",
        ])
        .unwrap();
        let config = settings.tuning.config();
        assert_eq!(config.noise_tolerance, 2.5);
        assert_eq!(config.fallback_speed_kmh, 20.0);
        assert!(matches!(settings.command, Command::Profile { step, to: None, .. } if step == 25.0));
    }

    #[test]
    fn test_parse_diff_and_export() {
        let settings = Settings::try_parse_from([
            "route-track-tool",
            "diff",
            "--original",
            "a.bin",
            "b.bin",
            "--new",
            "c.bin",
        ])
        .unwrap();
        assert!(matches!(settings.command, Command::Diff { ref original, ref new } if original.len() == 2 && new.len() == 1));

        let settings =
            Settings::try_parse_from(["route-track-tool", "export", "a.bin", "--split-at", "2,4"]).unwrap();
        assert!(matches!(settings.command, Command::Export { ref split_at, .. } if split_at == &[2, 4]));
    }

    #[test]
    fn test_parse_nearest_negative() {
        let settings =
            Settings::try_parse_from(["route-track-tool", "nearest", "a.bin", "--lat", "-33.9", "--lon", "18.4"])
                .unwrap();
        assert!(matches!(settings.command, Command::Nearest { lat, .. } if lat == -33.9));
    }

    #[test]
    fn test_missing_files_rejected() {
        assert!(Settings::try_parse_from(["route-track-tool", "info"]).is_err());
    }
}
