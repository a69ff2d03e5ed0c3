mod common;
mod ort;
mod roi;

use crate::types::{DetectionResult, Frame};

pub use self::ort::{ModelFiles, OrtHolistic};

/// Produces the landmark sets found in one frame.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionResult>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// Minimum pose confidence for a frame to count as a detection at all.
    pub min_detection_confidence: f32,
    /// Minimum presence for face and hand crops, and the visibility a pose
    /// landmark needs before a crop is derived from it.
    pub min_tracking_confidence: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}
