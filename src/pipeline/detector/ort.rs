use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{DynValue, Tensor};

use super::{
    LandmarkDetector, Thresholds,
    common::{self, CropTransform, InputSpec, LetterboxInfo},
    roi::{self, HandSide, Roi},
};
use crate::types::{
    DetectionResult, FACE_LANDMARK_COUNT, Frame, HAND_LANDMARK_COUNT, LandmarkSet,
    POSE_LANDMARK_COUNT,
};

// The pose model emits 39 points (33 body + 6 auxiliary) of 5 values each.
const POSE_OUTPUT_STRIDE: usize = 5;
const CROP_OUTPUT_STRIDE: usize = 3;

/// Model files to load. A missing entry disables the matching regions.
#[derive(Clone, Debug, Default)]
pub struct ModelFiles {
    pub pose: Option<PathBuf>,
    pub face: Option<PathBuf>,
    pub hand: Option<PathBuf>,
}

/// Holistic detection built from separate pose, face mesh and hand models.
/// Face and hand crops are placed using the pose landmarks, so without a
/// pose model nothing is detected.
#[derive(Debug)]
pub struct OrtHolistic {
    pose: Option<Session>,
    face: Option<Session>,
    hand: Option<Session>,
    thresholds: Thresholds,
}

impl OrtHolistic {
    pub fn new(files: &ModelFiles, thresholds: Thresholds) -> Result<Self> {
        let pose = files.pose.as_deref().map(load_session).transpose()?;
        let face = files.face.as_deref().map(load_session).transpose()?;
        let hand = files.hand.as_deref().map(load_session).transpose()?;

        if pose.is_none() {
            log::warn!("no pose model loaded; landmark detection is disabled");
        }
        if face.is_none() {
            log::warn!("no face mesh model loaded; face landmarks are disabled");
        }
        if hand.is_none() {
            log::warn!("no hand model loaded; hand landmarks are disabled");
        }

        Ok(Self {
            pose,
            face,
            hand,
            thresholds,
        })
    }
}

fn load_session(path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load ORT session from {}", path.display()))?;
    log::info!("loaded model {}", path.display());
    Ok(session)
}

impl LandmarkDetector for OrtHolistic {
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let Some(pose_session) = self.pose.as_mut() else {
            return Ok(DetectionResult::default());
        };
        let Some(pose) = run_pose(pose_session, frame, &self.thresholds)? else {
            return Ok(DetectionResult::default());
        };

        let tracking = self.thresholds.min_tracking_confidence;
        let mut result = DetectionResult::default();

        if let Some(session) = self.face.as_mut() {
            if let Some(roi) = roi::face_roi(&pose, frame.width, frame.height, tracking) {
                result.face = run_face(session, frame, roi, tracking)?;
            }
        }

        if let Some(session) = self.hand.as_mut() {
            for side in [HandSide::Left, HandSide::Right] {
                let Some(roi) = roi::hand_roi(&pose, side, frame.width, frame.height, tracking)
                else {
                    continue;
                };
                let hand = run_hand(session, frame, roi, tracking)?;
                match side {
                    HandSide::Left => result.left_hand = hand,
                    HandSide::Right => result.right_hand = hand,
                }
            }
        }

        result.pose = Some(pose);
        Ok(result)
    }
}

fn run_pose(
    session: &mut Session,
    frame: &Frame,
    thresholds: &Thresholds,
) -> Result<Option<LandmarkSet>> {
    let (input, letterbox) = common::prepare_letterbox(frame, InputSpec::POSE)?;
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run pose model")?;

    if outputs.len() < 2 {
        return Err(anyhow!(
            "pose model returned {} outputs, expected at least 2",
            outputs.len()
        ));
    }

    let confidence = first_value(&outputs[1]).unwrap_or(0.0);
    if confidence < thresholds.min_detection_confidence {
        return Ok(None);
    }

    let coords = outputs[0].try_extract_array::<f32>()?;
    let flat: Vec<f32> = coords.iter().copied().collect();
    decode_pose(&flat, &letterbox).map(Some)
}

fn decode_pose(flat: &[f32], letterbox: &LetterboxInfo) -> Result<LandmarkSet> {
    let points = common::decode_points(flat, POSE_LANDMARK_COUNT, POSE_OUTPUT_STRIDE)?;
    Ok(points
        .into_iter()
        .map(|p| letterbox.unproject(p[0], p[1], p[2]).with_visibility(common::sigmoid(p[3])))
        .collect())
}

fn run_face(
    session: &mut Session,
    frame: &Frame,
    roi: Roi,
    min_presence: f32,
) -> Result<Option<LandmarkSet>> {
    let (input, transform) =
        common::prepare_rotated_crop(frame, roi.center, roi.side, roi.angle, InputSpec::FACE)?;
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run face mesh model")?;

    if outputs.len() < 1 {
        return Err(anyhow!("face mesh model returned no outputs"));
    }

    // The face flag is a logit; a model without it is trusted.
    let presence = if outputs.len() > 1 {
        first_value(&outputs[1]).map(common::sigmoid).unwrap_or(0.0)
    } else {
        1.0
    };
    if presence < min_presence {
        return Ok(None);
    }

    let coords = outputs[0].try_extract_array::<f32>()?;
    let flat: Vec<f32> = coords.iter().copied().collect();
    decode_crop(&flat, FACE_LANDMARK_COUNT, &transform).map(Some)
}

fn run_hand(
    session: &mut Session,
    frame: &Frame,
    roi: Roi,
    min_presence: f32,
) -> Result<Option<LandmarkSet>> {
    let (input, transform) =
        common::prepare_rotated_crop(frame, roi.center, roi.side, roi.angle, InputSpec::HAND)?;
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run hand model")?;

    if outputs.len() < 2 {
        return Err(anyhow!(
            "hand model returned {} outputs, expected at least 2",
            outputs.len()
        ));
    }

    let presence = first_value(&outputs[1]).unwrap_or(0.0);
    if presence < min_presence {
        return Ok(None);
    }

    let coords = outputs[0].try_extract_array::<f32>()?;
    let flat: Vec<f32> = coords.iter().copied().collect();
    decode_crop(&flat, HAND_LANDMARK_COUNT, &transform).map(Some)
}

fn decode_crop(flat: &[f32], count: usize, transform: &CropTransform) -> Result<LandmarkSet> {
    let points = common::decode_points(flat, count, CROP_OUTPUT_STRIDE)?;
    Ok(points
        .into_iter()
        .map(|p| transform.unproject(p[0], p[1], p[2]))
        .collect())
}

fn first_value(value: &DynValue) -> Option<f32> {
    value
        .try_extract_array::<f32>()
        .ok()
        .and_then(|arr| arr.iter().next().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_without_models_finds_nothing() {
        let mut detector = OrtHolistic::new(&ModelFiles::default(), Thresholds::default()).unwrap();
        let frame = Frame::new(vec![0; 4 * 4 * 4], 4, 4);
        let result = detector.detect(&frame).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn missing_model_file_fails_to_load() {
        let files = ModelFiles {
            pose: Some(PathBuf::from("/nonexistent/pose.onnx")),
            ..Default::default()
        };
        assert!(OrtHolistic::new(&files, Thresholds::default()).is_err());
    }

    #[test]
    fn pose_output_keeps_body_points_with_visibility() {
        let letterbox = LetterboxInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 28.0,
            orig_w: 512,
            orig_h: 400,
        };
        let mut flat = vec![0.0_f32; 39 * POSE_OUTPUT_STRIDE];
        // Point 0 at the centre of the image area, clearly visible.
        flat[..5].copy_from_slice(&[128.0, 128.0, 0.0, 10.0, 10.0]);

        let pose = decode_pose(&flat, &letterbox).unwrap();
        assert_eq!(pose.len(), POSE_LANDMARK_COUNT);
        assert!((pose[0].x - 0.5).abs() < 1e-4);
        assert!((pose[0].y - 0.5).abs() < 1e-4);
        assert!(pose[0].visibility.is_some_and(|v| v > 0.99));
        assert!(pose[1].visibility.is_some_and(|v| (v - 0.5).abs() < 1e-4));
    }

    #[test]
    fn short_outputs_are_rejected() {
        let transform = CropTransform {
            center: (10.0, 10.0),
            side: 20.0,
            angle: 0.0,
            output_size: 224,
            orig_w: 20,
            orig_h: 20,
        };
        assert!(decode_crop(&[0.0; 60], HAND_LANDMARK_COUNT, &transform).is_err());
        let hand = decode_crop(&[112.0; 63], HAND_LANDMARK_COUNT, &transform).unwrap();
        assert_eq!(hand.len(), HAND_LANDMARK_COUNT);
        assert!((hand[0].x - 0.5).abs() < 1e-4);
    }
}
