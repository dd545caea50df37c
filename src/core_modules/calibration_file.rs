// THEORY:
// The calibration file is the only state this system keeps between runs: four
// screen-space points, one per named warp corner. It is deliberately tiny and
// human-editable (pretty JSON) so an installer can tweak a corner by hand.
//
// Guarantees:
// 1.  Round trip: f64 coordinates are written with shortest round-trip formatting
//     and parsed with `float_roundtrip`, so save-then-load is bit-identical.
// 2.  All or nothing: a record either parses completely (all four corners, all
//     finite) or the load fails; callers never see a partial quad.
// 3.  Saving always overwrites whatever was there.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CALIBRATION_FILE: &str = "quadwarp.json";

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration file {path:?} could not be read or written: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("calibration file {path:?} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("calibration file {path:?} holds a non-finite coordinate")]
    NonFinite { path: PathBuf },
}

/// One corner on disk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CornerRecord {
    pub x: f64,
    pub y: f64,
}

impl From<Point2<f64>> for CornerRecord {
    fn from(p: Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<CornerRecord> for Point2<f64> {
    fn from(c: CornerRecord) -> Self {
        Point2::new(c.x, c.y)
    }
}

/// The four named corners, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationRecord {
    pub top_left: CornerRecord,
    pub top_right: CornerRecord,
    pub bottom_left: CornerRecord,
    pub bottom_right: CornerRecord,
}

impl CalibrationRecord {
    fn is_finite(&self) -> bool {
        [self.top_left, self.top_right, self.bottom_left, self.bottom_right]
            .iter()
            .all(|c| c.x.is_finite() && c.y.is_finite())
    }
}

pub fn save(path: &Path, record: &CalibrationRecord) -> Result<(), CalibrationError> {
    let io_err = |source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    };
    if !record.is_finite() {
        return Err(CalibrationError::NonFinite {
            path: path.to_path_buf(),
        });
    }
    let text = serde_json::to_string_pretty(record).map_err(|source| CalibrationError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, text).map_err(io_err)
}

pub fn load(path: &Path) -> Result<CalibrationRecord, CalibrationError> {
    let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record: CalibrationRecord =
        serde_json::from_str(&text).map_err(|source| CalibrationError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    if !record.is_finite() {
        return Err(CalibrationError::NonFinite {
            path: path.to_path_buf(),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awkward_record() -> CalibrationRecord {
        CalibrationRecord {
            top_left: CornerRecord { x: 0.1 + 0.2, y: 1.0 / 3.0 },
            top_right: CornerRecord { x: 1023.999_999_999_9, y: -0.0 },
            bottom_left: CornerRecord { x: 5e-324, y: 767.25 },
            bottom_right: CornerRecord { x: 1e15 + 0.5, y: std::f64::consts::PI * 100.0 },
        }
    }

    #[test]
    fn save_then_load_is_bit_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quadwarp.json");
        let record = awkward_record();
        save(&path, &record).expect("save");
        let loaded = load(&path).expect("load");
        let bits = |r: &CalibrationRecord| {
            [r.top_left, r.top_right, r.bottom_left, r.bottom_right]
                .iter()
                .flat_map(|c| [c.x.to_bits(), c.y.to_bits()])
                .collect::<Vec<u64>>()
        };
        assert_eq!(bits(&record), bits(&loaded));
    }

    #[test]
    fn save_overwrites_previous_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("quadwarp.json");
        save(&path, &awkward_record()).expect("first save");
        let mut second = awkward_record();
        second.top_left = CornerRecord { x: 1.0, y: 2.0 };
        save(&path, &second).expect("second save");
        assert_eq!(load(&path).expect("load"), second);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CalibrationError::Io { .. }));
    }

    #[test]
    fn partial_record_is_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("partial.json");
        std::fs::write(
            &path,
            r#"{"top_left":{"x":1,"y":2},"top_right":{"x":3,"y":4},"bottom_left":{"x":5,"y":6}}"#,
        )
        .expect("write");
        assert!(matches!(load(&path).unwrap_err(), CalibrationError::Malformed { .. }));
    }

    #[test]
    fn garbage_is_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("garbage.json");
        std::fs::write(&path, "<quadwarp/>").expect("write");
        assert!(matches!(load(&path).unwrap_err(), CalibrationError::Malformed { .. }));
    }
}
