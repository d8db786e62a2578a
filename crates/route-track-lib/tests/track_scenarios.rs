//! Whole-track scenarios through the public API

use geo::{Coord, Rect};
use route_track_lib::{
    Config, Outcome, Player, Position, RoutePoint, RouteSection, Router, Surface, SurfaceBreak,
    Track, TrackIndex, Waypoint, convert, encoding, export, geodesy,
};
use std::time::Duration;

/// Router that bends every section into a gentle S-curve with rolling terrain
struct WiggleRouter {
    config: Config,
    steps: usize,
}

impl WiggleRouter {
    fn new(steps: usize) -> Self {
        Self {
            config: Config::default(),
            steps,
        }
    }
}

impl Router for WiggleRouter {
    fn route(&self, section: &RouteSection) -> Outcome {
        if section.is_canceled() {
            return Outcome::Canceled;
        }
        let (a, b) = (section.start().position, section.end().position);
        let mut raw = Vec::with_capacity(self.steps + 1);
        let mut time_ms = 0i64;
        let mut previous = a;
        for i in 0..=self.steps {
            let t = i as f32 / self.steps as f32;
            let bend = if i == 0 || i == self.steps {
                0.0
            } else {
                (t * std::f32::consts::TAU).sin() * 0.0005
            };
            let position = Position::new(
                a.latitude + (b.latitude - a.latitude) * t + bend,
                a.longitude + (b.longitude - a.longitude) * t,
            );
            // 25 km/h
            time_ms += (geodesy::distance(previous, position) / (25.0 / 3.6) * 1000.0).round() as i64;
            previous = position;
            let altitude = 400.0 + (position.longitude * 300.0).sin() * 30.0;
            raw.push(RoutePoint::new(position, Some(altitude), time_ms));
        }
        let breaks = [SurfaceBreak {
            distance: 0.0,
            surface: Surface::Paved,
        }];
        Outcome::Success(convert(&raw, &breaks, &self.config))
    }
}

fn waypoint(lat: f32, lon: f32) -> Waypoint {
    Waypoint::new(Position::new(lat, lon))
}

fn create_test_track() -> Track {
    let mut track = Track::default();
    for i in 0..5 {
        track.add_waypoint(i, waypoint(46.0, 7.0 + i as f32 * 0.02)).unwrap();
    }
    track.calculate_pending(&WiggleRouter::new(40));
    track
}

fn world() -> Rect<f64> {
    Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 })
}

#[test]
fn test_track_is_continuous() {
    let track = create_test_track();
    let store = track.store();
    assert!(store.is_complete());
    assert_eq!(store.point_count(), 4 * 40 + 1);

    // Enumerated points are monotone and the last one carries the totals
    let points: Vec<_> = store.points().collect();
    assert_eq!(points.len(), store.point_count());
    for pair in points.windows(2) {
        assert!(pair[1].values.distance_mm() >= pair[0].values.distance_mm());
        assert!(pair[1].time_ms() >= pair[0].time_ms());
        assert!(pair[1].values.ascent() >= pair[0].values.ascent());
    }
    assert_eq!(points[points.len() - 1].values, store.total());
    assert_eq!(store.total(), store.linked_totals());
}

#[test]
fn test_search_whole_track() {
    let track = create_test_track();
    let store = track.store();
    let total = store.total().distance();

    let mut d = 0.0;
    while d <= total {
        let (point, index) = store.search(d).unwrap();
        assert!((point.distance() - d).abs() < 1e-3);
        assert!(store.is_valid(index));
        d += 97.3;
    }

    let (end, index) = store.search(total).unwrap();
    assert_eq!(end.values, store.total());
    assert_eq!(Some(index), store.last_index());
}

#[test]
fn test_nearest_and_near_points() {
    let track = create_test_track();
    let store = track.store();

    // Right on a stored point
    let target = store.at(TrackIndex::new(2, 10)).unwrap();
    let nearest = store.nearest_point(target.position(), &world(), None);
    assert!(nearest.distance < 0.01);

    let near = store.near_points(
        target.position(),
        store.first_index().unwrap(),
        store.last_index().unwrap(),
        50.0,
        100.0,
    );
    assert_eq!(near.len(), 1);
    assert!(near[0].distance < 0.01);
}

#[test]
fn test_profile_and_playback() {
    let track = create_test_track();
    let store = track.store();

    let profile: Vec<_> = store.by_distance(0.0, store.total().distance(), 100.0).collect();
    assert!(!profile.is_empty());
    assert!(profile.iter().all(|s| s.surface == Surface::Paved));
    let (low, high) = (store.min_altitude().unwrap(), store.max_altitude().unwrap());
    assert!(profile.iter().all(|s| s.altitude >= low - 1e-3 && s.altitude <= high + 1e-3));

    let mut player = Player::new(60.0);
    let mut last_distance = 0.0;
    while !player.is_finished(store) {
        let point = player.tick(store, Duration::from_secs(1)).unwrap();
        assert!(point.distance() >= last_distance);
        last_distance = point.distance();
    }
    assert_eq!(last_distance, store.total().distance());
}

#[test]
fn test_files_and_encoding() {
    let mut track = create_test_track();
    track.set_file_split(2, true).unwrap();
    let store = track.store();
    assert_eq!(store.file_count(), 2);

    let files = export::all_files(store).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].tracks[0].segments[0].points.len(), 81);
    assert_eq!(files[1].tracks[0].segments[0].points.len(), 81);

    let points: Vec<_> = store.points().collect();
    let decoded = encoding::decode(&encoding::encode(&points)).unwrap();
    let reconverted = convert(&decoded, &[], track.config());
    assert_eq!(reconverted.points.len(), points.len());
    assert!((reconverted.totals().distance() - store.total().distance()).abs() < 0.01);
}

#[test]
fn test_comparison_round_trip() {
    let mut track = create_test_track();
    let router = WiggleRouter::new(40);
    let before = track.store().total();
    track.start_comparison();

    // Pull the middle waypoint north and recalculate
    let original = track.waypoints()[2].clone();
    track.move_waypoint(2, waypoint(46.01, 7.04)).unwrap();
    track.calculate_pending(&router);

    let differences = track.diff().unwrap().differences();
    assert_eq!(differences.len(), 1);
    let difference = &differences[0];
    assert_eq!(difference.segment, 1);
    assert!(difference.delta.distance() > 0.0);
    assert_eq!(before + difference.delta, track.store().total());

    // Moving it back retracts the difference
    track.move_waypoint(2, original).unwrap();
    track.calculate_pending(&router);
    assert!(track.diff().unwrap().differences().is_empty());
    assert!(track.end_comparison().is_empty());
}

#[test]
fn test_comparison_delta_matches_totals() {
    let mut track = create_test_track();
    let before = track.store().total();
    let router = WiggleRouter::new(40);
    track.start_comparison();

    track.move_waypoint(2, waypoint(45.99, 7.045)).unwrap();
    track.calculate_pending(&router);

    let after = track.store().total();
    let differences = track.diff().unwrap().differences();
    let summed = differences
        .iter()
        .fold(route_track_lib::CommonValues::ZERO, |acc, d| acc + d.delta);
    assert_eq!(before + summed, after);
}

#[test]
fn test_out_and_back_comparison() {
    // A -> B -> A -> C: the start is visited twice
    let mut track = Track::default();
    let a = waypoint(46.0, 7.0);
    for (i, wp) in [a.clone(), waypoint(46.0, 7.03), a, waypoint(45.97, 7.0)]
        .into_iter()
        .enumerate()
    {
        track.add_waypoint(i, wp).unwrap();
    }
    let router = WiggleRouter::new(40);
    track.calculate_pending(&router);
    assert!(track.store().is_complete());
    let before = track.store().total();
    track.start_comparison();

    // Recalculating the last leg unchanged reports nothing
    let end = track.waypoints()[3].clone();
    track.move_waypoint(3, end).unwrap();
    track.calculate_pending(&router);
    assert!(track.diff().unwrap().differences().is_empty());

    // Moving its end reports one difference starting at the second visit of A
    track.move_waypoint(3, waypoint(45.96, 7.01)).unwrap();
    track.calculate_pending(&router);
    let differences = track.diff().unwrap().differences();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].segment, 2);
    assert_eq!(*differences[0].span().start(), 80);
    assert_eq!(before + differences[0].delta, track.store().total());
}
