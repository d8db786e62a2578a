//! Fixed-size binary point encoding
//!
//! Each point is a 17-byte little-endian record:
//!
//! | offset | type  | content                     |
//! |--------|-------|-----------------------------|
//! | 0      | `f32` | latitude (degrees)          |
//! | 4      | `f32` | longitude (degrees)         |
//! | 8      | `i32` | altitude in decimeters      |
//! | 12     | `i32` | elapsed time (milliseconds) |
//! | 16     | `u8`  | surface                     |
//!
//! There is no header; the point count is the byte length divided by 17.

use crate::{Config, ConvertedSection, Position, Result, RoutePoint, Surface, TrackError, TrackPoint, convert};
use std::io::{Read, Write};

/// Size of one encoded point in bytes
pub const RECORD_LEN: usize = 17;

/// Encode track points
pub fn encode(points: &[TrackPoint]) -> Vec<u8> {
    let mut out = Vec::with_capacity(points.len() * RECORD_LEN);
    for point in points {
        out.extend_from_slice(&point.latitude.to_le_bytes());
        out.extend_from_slice(&point.longitude.to_le_bytes());
        let altitude = (point.altitude as f64 * 10.0).round() as i32;
        out.extend_from_slice(&altitude.to_le_bytes());
        let time = point.time_ms().clamp(0, i32::MAX as i64) as i32;
        out.extend_from_slice(&time.to_le_bytes());
        out.push(point.surface.as_u8());
    }
    out
}

/// Decode raw routed points
///
/// Fails when the length is not a whole number of records.
pub fn decode(bytes: &[u8]) -> Result<Vec<RoutePoint>> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(TrackError::InvalidEncoding {
            len: bytes.len(),
            record: RECORD_LEN,
        });
    }

    let word = |chunk: &[u8], at: usize| [chunk[at], chunk[at + 1], chunk[at + 2], chunk[at + 3]];
    let points = bytes
        .chunks_exact(RECORD_LEN)
        .map(|chunk| {
            let latitude = f32::from_le_bytes(word(chunk, 0));
            let longitude = f32::from_le_bytes(word(chunk, 4));
            let altitude = i32::from_le_bytes(word(chunk, 8)) as f32 / 10.0;
            let time_ms = i32::from_le_bytes(word(chunk, 12)) as i64;
            RoutePoint {
                position: Position::new(latitude, longitude),
                altitude: Some(altitude),
                time_ms,
                surface: Some(Surface::from_u8(chunk[16])),
            }
        })
        .collect();
    Ok(points)
}

/// Decode and convert into track points in one go
pub fn decode_section(bytes: &[u8], config: &Config) -> Result<ConvertedSection> {
    let raw = decode(bytes)?;
    Ok(convert(&raw, &[], config))
}

/// Read all records from `reader`
pub fn read_points<R: Read>(mut reader: R) -> Result<Vec<RoutePoint>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Write `points` as records to `writer`
pub fn write_points<W: Write>(mut writer: W, points: &[TrackPoint]) -> Result<()> {
    writer.write_all(&encode(points))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_points() -> Vec<TrackPoint> {
        let raw: Vec<RoutePoint> = (0..20)
            .map(|i| {
                let mut point = RoutePoint::new(
                    Position::new(46.5 + i as f32 * 0.0007, 7.25 - i as f32 * 0.0003),
                    Some(512.34 + i as f32 * 1.7),
                    i as i64 * 4_321,
                );
                point.surface = Some(Surface::from_u8((i % 7) as u8));
                point
            })
            .collect();
        convert(&raw, &[], &Config::default()).points
    }

    #[test]
    fn test_record_layout() {
        let point = TrackPoint::at(Position::new(1.0, 2.0), 3.0);
        let bytes = encode(&[point]);
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &30i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0i32.to_le_bytes());
        assert_eq!(bytes[16], 0);
    }

    #[test]
    fn test_round_trip() {
        let points = create_test_points();
        let decoded = decode(&encode(&points)).unwrap();
        assert_eq!(decoded.len(), points.len());

        for (original, raw) in points.iter().zip(&decoded) {
            assert_eq!(raw.position.latitude.to_bits(), original.latitude.to_bits());
            assert_eq!(raw.position.longitude.to_bits(), original.longitude.to_bits());
            assert!((raw.altitude.unwrap() - original.altitude).abs() <= 0.05 + 1e-4);
            assert!((raw.time_ms - original.time_ms()).abs() <= 1);
            assert_eq!(raw.surface, Some(original.surface));
        }
    }

    #[test]
    fn test_invalid_length() {
        let mut bytes = encode(&create_test_points());
        bytes.push(0);
        match decode(&bytes) {
            Err(TrackError::InvalidEncoding { len, record }) => {
                assert_eq!(len, 20 * RECORD_LEN + 1);
                assert_eq!(record, RECORD_LEN);
            }
            other => panic!("expected encoding error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_unknown_surface() {
        assert!(decode(&[]).unwrap().is_empty());

        let mut bytes = encode(&[TrackPoint::at(Position::new(0.0, 0.0), 0.0)]);
        bytes[16] = 42;
        assert_eq!(decode(&bytes).unwrap()[0].surface, Some(Surface::Unknown));
    }

    #[test]
    fn test_read_write_points() {
        let points = create_test_points();
        let mut buffer = Vec::new();
        write_points(&mut buffer, &points).unwrap();
        let decoded = read_points(buffer.as_slice()).unwrap();
        assert_eq!(decoded.len(), points.len());

        let section = decode_section(&buffer, &Config::default()).unwrap();
        assert_eq!(section.points.len(), points.len());
        assert_eq!(section.points[0], points[0]);
    }
}
