//! Crop regions for the face and hand models, derived from pose landmarks.

use crate::types::{Landmark, POSE_LANDMARK_COUNT};

const NOSE: usize = 0;
const LEFT_EYE: usize = 2;
const RIGHT_EYE: usize = 5;
const LEFT_EAR: usize = 7;
const RIGHT_EAR: usize = 8;
const MOUTH_RIGHT: usize = 10;
const LEFT_WRIST: usize = 15;
const RIGHT_WRIST: usize = 16;
const LEFT_PINKY: usize = 17;
const RIGHT_PINKY: usize = 18;
const LEFT_INDEX: usize = 19;
const RIGHT_INDEX: usize = 20;

const MIN_SIDE_PX: f32 = 24.0;
const FACE_SCALE: f32 = 2.0;
const HAND_SCALE: f32 = 4.0;
const HAND_SHIFT: f32 = 0.75;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roi {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandSide {
    Left,
    Right,
}

fn pixel(pose: &[Landmark], idx: usize, width: u32, height: u32) -> (f32, f32) {
    pose[idx].to_pixel(width, height)
}

fn visible(pose: &[Landmark], idx: usize, threshold: f32) -> bool {
    pose[idx].visibility.is_none_or(|v| v >= threshold)
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Face crop centred on the pose face points, rotated so the eyes are level.
pub fn face_roi(pose: &[Landmark], width: u32, height: u32, threshold: f32) -> Option<Roi> {
    if pose.len() < POSE_LANDMARK_COUNT || !visible(pose, NOSE, threshold) {
        return None;
    }

    let points: Vec<(f32, f32)> = (NOSE..=MOUTH_RIGHT)
        .map(|idx| pixel(pose, idx, width, height))
        .collect();
    let n = points.len() as f32;
    let center = points
        .iter()
        .fold((0.0, 0.0), |acc, p| (acc.0 + p.0 / n, acc.1 + p.1 / n));

    let ear_span = distance(
        pixel(pose, LEFT_EAR, width, height),
        pixel(pose, RIGHT_EAR, width, height),
    );
    let (min_x, max_x, min_y, max_y) = points.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |acc, (x, y)| (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y)),
    );
    let span = ear_span.max(max_x - min_x).max(max_y - min_y);
    let side = (span * FACE_SCALE).max(MIN_SIDE_PX);

    let right_eye = pixel(pose, RIGHT_EYE, width, height);
    let left_eye = pixel(pose, LEFT_EYE, width, height);
    let angle = (left_eye.1 - right_eye.1).atan2(left_eye.0 - right_eye.0);

    Some(Roi {
        center,
        side,
        angle,
    })
}

/// Hand crop extending from the wrist towards the knuckles, rotated so the
/// fingers point up in the crop.
pub fn hand_roi(
    pose: &[Landmark],
    side: HandSide,
    width: u32,
    height: u32,
    threshold: f32,
) -> Option<Roi> {
    if pose.len() < POSE_LANDMARK_COUNT {
        return None;
    }
    let (wrist_idx, index_idx, pinky_idx) = match side {
        HandSide::Left => (LEFT_WRIST, LEFT_INDEX, LEFT_PINKY),
        HandSide::Right => (RIGHT_WRIST, RIGHT_INDEX, RIGHT_PINKY),
    };
    if !visible(pose, wrist_idx, threshold) {
        return None;
    }

    let wrist = pixel(pose, wrist_idx, width, height);
    let index = pixel(pose, index_idx, width, height);
    let pinky = pixel(pose, pinky_idx, width, height);
    let knuckles = ((index.0 + pinky.0) * 0.5, (index.1 + pinky.1) * 0.5);
    let dir = (knuckles.0 - wrist.0, knuckles.1 - wrist.1);
    let len = distance(wrist, knuckles);
    if len < f32::EPSILON {
        return None;
    }

    Some(Roi {
        center: (wrist.0 + dir.0 * HAND_SHIFT, wrist.1 + dir.1 * HAND_SHIFT),
        side: (len * HAND_SCALE).max(MIN_SIDE_PX),
        angle: dir.0.atan2(-dir.1),
    })
}
