use serde::{Deserialize, Serialize};

use crate::types::{DetectionResult, Landmark, Region, RegionFilter};

pub type PointTriple = [f32; 3];

/// Landmarks recorded for one frame, keyed by region. Regions that were not
/// requested, or were requested but not detected, are left out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose_landmarks: Option<Vec<PointTriple>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_landmarks: Option<Vec<PointTriple>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_hand_landmarks: Option<Vec<PointTriple>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_hand_landmarks: Option<Vec<PointTriple>>,
}

impl FrameSnapshot {
    pub fn get(&self, region: Region) -> Option<&[PointTriple]> {
        let slot = match region {
            Region::Pose => &self.pose_landmarks,
            Region::Face => &self.face_landmarks,
            Region::LeftHand => &self.left_hand_landmarks,
            Region::RightHand => &self.right_hand_landmarks,
        };
        slot.as_deref()
    }

    fn slot_mut(&mut self, region: Region) -> &mut Option<Vec<PointTriple>> {
        match region {
            Region::Pose => &mut self.pose_landmarks,
            Region::Face => &mut self.face_landmarks,
            Region::LeftHand => &mut self.left_hand_landmarks,
            Region::RightHand => &mut self.right_hand_landmarks,
        }
    }

    pub fn keys(&self) -> Vec<&'static str> {
        Region::ALL
            .iter()
            .filter(|r| self.get(**r).is_some())
            .map(|r| r.key())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

/// `None` when any coordinate is not finite; JSON has no encoding for those.
fn normalize_landmarks(landmarks: &[Landmark]) -> Option<Vec<PointTriple>> {
    let points: Vec<PointTriple> = landmarks.iter().map(Landmark::to_triple).collect();
    points
        .iter()
        .flatten()
        .all(|v| v.is_finite())
        .then_some(points)
}

/// Reduces a detection to the regions selected by `filter`, dropping any
/// per-point visibility. A region with non-finite coordinates counts as not
/// detected.
pub fn extract(detection: &DetectionResult, filter: RegionFilter) -> FrameSnapshot {
    let mut snapshot = FrameSnapshot::default();
    for &region in filter.regions() {
        if let Some(landmarks) = detection.region(region) {
            match normalize_landmarks(landmarks) {
                Some(points) => *snapshot.slot_mut(region) = Some(points),
                None => log::debug!("dropping {} with non-finite coordinates", region.key()),
            }
        }
    }
    snapshot
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub recorded: usize,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_save: bool,
}

/// Recording state machine plus the snapshot buffer. The buffer only grows;
/// nothing clears it for the lifetime of the process.
#[derive(Debug)]
pub struct Recorder {
    state: RecorderState,
    snapshots: Vec<FrameSnapshot>,
    has_stopped: bool,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            snapshots: Vec::new(),
            has_stopped: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Returns false if already recording.
    pub fn start(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        self.state = RecorderState::Recording;
        true
    }

    /// Returns the number of buffered snapshots, or `None` if not recording.
    pub fn stop(&mut self) -> Option<usize> {
        if !self.is_recording() {
            return None;
        }
        self.state = RecorderState::Idle;
        self.has_stopped = true;
        Some(self.len())
    }

    /// Appends a snapshot for `detection` while recording. Returns whether a
    /// snapshot was appended.
    pub fn record(&mut self, detection: &DetectionResult, filter: RegionFilter) -> bool {
        if !self.is_recording() {
            return false;
        }
        let snapshot = extract(detection, filter);
        if snapshot.is_empty() {
            log::trace!("recording a frame with no {filter} landmarks");
        }
        self.snapshots.push(snapshot);
        true
    }

    pub fn snapshots(&self) -> &[FrameSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn status(&self) -> RecorderStatus {
        let idle = !self.is_recording();
        RecorderStatus {
            state: self.state,
            recorded: self.len(),
            can_start: idle,
            can_stop: !idle,
            can_save: idle && self.has_stopped,
        }
    }
}
