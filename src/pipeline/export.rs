use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use super::recording::FrameSnapshot;
use crate::error::ExportError;

/// Writes `snapshots` as a JSON array to `path` and returns how many were
/// written. The data goes to a sibling temp file first, so a failed write
/// never leaves a truncated file at `path`.
pub fn export_snapshots(snapshots: &[FrameSnapshot], path: &Path) -> Result<usize, ExportError> {
    if snapshots.is_empty() {
        return Err(ExportError::EmptyBuffer);
    }

    let tmp_path = temp_path_for(path);
    if let Err(err) = write_json(snapshots, path, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        ExportError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(snapshots.len())
}

fn write_json(snapshots: &[FrameSnapshot], path: &Path, tmp_path: &Path) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::create(tmp_path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, snapshots).map_err(|source| ExportError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)?;
    writer
        .into_inner()
        .map_err(|err| io_err(err.into_error()))?
        .sync_all()
        .map_err(io_err)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::recording::extract,
        types::{DetectionResult, Landmark, Region, RegionFilter},
    };
    use std::io::BufReader;

    fn load_snapshots(path: &Path) -> Result<Vec<FrameSnapshot>, ExportError> {
        let file = fs::File::open(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ExportError::Encode {
            path: path.to_path_buf(),
            source,
        })
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "holistic-recorder-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn detection(offset: f32) -> DetectionResult {
        let hand = |base: f32| {
            (0..21)
                .map(|i| Landmark::new(base + i as f32 * 0.01, 0.5 - offset, 0.001 * i as f32))
                .collect::<Vec<_>>()
        };
        DetectionResult {
            pose: Some(
                (0..33)
                    .map(|i| Landmark::new(0.3 + offset, i as f32 / 33.0, -0.2).with_visibility(0.7))
                    .collect(),
            ),
            face: None,
            left_hand: Some(hand(0.1)),
            right_hand: Some(hand(0.6)),
        }
    }

    #[test]
    fn empty_buffer_writes_nothing() {
        let dir = scratch_dir("empty");
        let path = dir.join("key_points.json");

        let err = export_snapshots(&[], &path).unwrap_err();
        assert!(matches!(err, ExportError::EmptyBuffer));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn empty_buffer_leaves_existing_file_untouched() {
        let dir = scratch_dir("untouched");
        let path = dir.join("key_points.json");
        fs::write(&path, "previous").unwrap();

        assert!(export_snapshots(&[], &path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn round_trip_preserves_points() {
        let dir = scratch_dir("round-trip");
        let path = dir.join("key_points.json");
        let detections: Vec<_> = (0..4).map(|i| detection(i as f32 * 0.05)).collect();
        let snapshots: Vec<_> = detections
            .iter()
            .map(|d| extract(d, RegionFilter::WholeBody))
            .collect();

        assert_eq!(export_snapshots(&snapshots, &path).unwrap(), 4);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let array = raw.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[0]["pose_landmarks"][0].as_array().unwrap().len(), 3);
        assert!(array[0].get("face_landmarks").is_none());

        let loaded = load_snapshots(&path).unwrap();
        for (snapshot, detection) in loaded.iter().zip(&detections) {
            for region in [Region::Pose, Region::LeftHand, Region::RightHand] {
                let expected = detection.region(region).unwrap();
                let actual = snapshot.get(region).unwrap();
                assert_eq!(actual.len(), expected.len());
                for (point, landmark) in actual.iter().zip(expected) {
                    for (a, b) in point.iter().zip(landmark.to_triple()) {
                        assert!((a - b).abs() < 1e-6);
                    }
                }
            }
        }
    }

    #[test]
    fn write_failure_reports_path() {
        let dir = scratch_dir("missing-parent");
        let path = dir.join("does-not-exist").join("key_points.json");
        let snapshots = vec![extract(&detection(0.0), RegionFilter::Legs)];

        let err = export_snapshots(&snapshots, &path).unwrap_err();
        match err {
            ExportError::Io { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!path.exists());
    }
}
