use std::{fmt, str::FromStr, time::Instant};

use crate::error::SelectionError;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// One detected point. `x` and `y` are normalized to the image size, `z` is a
/// relative depth on the same scale as `x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn to_triple(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

pub type LandmarkSet = Vec<Landmark>;

pub const POSE_LANDMARK_COUNT: usize = 33;
pub const FACE_LANDMARK_COUNT: usize = 468;
pub const HAND_LANDMARK_COUNT: usize = 21;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    Pose,
    Face,
    LeftHand,
    RightHand,
}

impl Region {
    pub const ALL: [Region; 4] = [
        Region::Pose,
        Region::Face,
        Region::LeftHand,
        Region::RightHand,
    ];

    /// Key used for this region in recorded snapshots.
    pub fn key(&self) -> &'static str {
        match self {
            Region::Pose => "pose_landmarks",
            Region::Face => "face_landmarks",
            Region::LeftHand => "left_hand_landmarks",
            Region::RightHand => "right_hand_landmarks",
        }
    }
}

/// Landmark sets produced for a single frame. Any region may be missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub pose: Option<LandmarkSet>,
    pub face: Option<LandmarkSet>,
    pub left_hand: Option<LandmarkSet>,
    pub right_hand: Option<LandmarkSet>,
}

impl DetectionResult {
    pub fn region(&self, region: Region) -> Option<&[Landmark]> {
        let set = match region {
            Region::Pose => &self.pose,
            Region::Face => &self.face,
            Region::LeftHand => &self.left_hand,
            Region::RightHand => &self.right_hand,
        };
        set.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        Region::ALL.iter().all(|r| self.region(*r).is_none())
    }
}

/// Body-part category selected by the user. Controls what gets drawn and
/// what gets recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RegionFilter {
    #[default]
    WholeBody,
    Face,
    Hands,
    Legs,
}

struct FilterEntry {
    filter: RegionFilter,
    label: &'static str,
    regions: &'static [Region],
}

// Drawn and recorded regions are the same set for every filter. Legs keeps
// the full pose rather than a leg subset.
const FILTER_TABLE: [FilterEntry; 4] = [
    FilterEntry {
        filter: RegionFilter::WholeBody,
        label: "Whole Body",
        regions: &[
            Region::Pose,
            Region::Face,
            Region::RightHand,
            Region::LeftHand,
        ],
    },
    FilterEntry {
        filter: RegionFilter::Face,
        label: "Face",
        regions: &[Region::Face],
    },
    FilterEntry {
        filter: RegionFilter::Hands,
        label: "Hands",
        regions: &[Region::RightHand, Region::LeftHand],
    },
    FilterEntry {
        filter: RegionFilter::Legs,
        label: "Legs",
        regions: &[Region::Pose],
    },
];

impl RegionFilter {
    pub const ALL: [RegionFilter; 4] = [
        RegionFilter::WholeBody,
        RegionFilter::Face,
        RegionFilter::Hands,
        RegionFilter::Legs,
    ];

    fn entry(&self) -> &'static FilterEntry {
        match self {
            RegionFilter::WholeBody => &FILTER_TABLE[0],
            RegionFilter::Face => &FILTER_TABLE[1],
            RegionFilter::Hands => &FILTER_TABLE[2],
            RegionFilter::Legs => &FILTER_TABLE[3],
        }
    }

    pub fn label(&self) -> &'static str {
        self.entry().label
    }

    pub fn regions(&self) -> &'static [Region] {
        self.entry().regions
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RegionFilter {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FILTER_TABLE
            .iter()
            .find(|entry| entry.label == s.trim())
            .map(|entry| entry.filter)
            .ok_or_else(|| SelectionError::UnknownRegion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_labels_parse_back() {
        for filter in RegionFilter::ALL {
            assert_eq!(filter.label().parse::<RegionFilter>(), Ok(filter));
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert_eq!(
            "Feet".parse::<RegionFilter>(),
            Err(SelectionError::UnknownRegion("Feet".to_string()))
        );
        assert!("whole body".parse::<RegionFilter>().is_err());
    }

    #[test]
    fn legs_selects_full_pose() {
        assert_eq!(RegionFilter::Legs.regions(), &[Region::Pose]);
        assert!(!RegionFilter::Legs.regions().contains(&Region::Face));
    }

    #[test]
    fn detection_region_lookup() {
        let detection = DetectionResult {
            face: Some(vec![Landmark::new(0.1, 0.2, 0.3)]),
            ..Default::default()
        };
        assert!(!detection.is_empty());
        assert_eq!(detection.region(Region::Face).map(|s| s.len()), Some(1));
        assert!(detection.region(Region::Pose).is_none());
        assert!(DetectionResult::default().is_empty());
    }
}
