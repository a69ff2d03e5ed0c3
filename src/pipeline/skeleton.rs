use super::tessellation::tessellate;
use crate::types::{DetectionResult, Frame, Landmark, Region, RegionFilter};

pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// Points whose visibility is known and below this are not drawn.
const VISIBILITY_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PointStyle {
    color: [u8; 4],
    radius: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LineStyle {
    color: [u8; 4],
    thickness: i32,
}

#[derive(Clone, Copy, Debug)]
struct RegionStyle {
    landmark: PointStyle,
    connection: LineStyle,
}

const LIMB_STYLE: RegionStyle = RegionStyle {
    landmark: PointStyle {
        color: [255, 0, 0, 255],
        radius: 4,
    },
    connection: LineStyle {
        color: [0, 255, 0, 255],
        thickness: 2,
    },
};

const FACE_STYLE: RegionStyle = RegionStyle {
    landmark: PointStyle {
        color: [0, 255, 0, 255],
        radius: 1,
    },
    connection: LineStyle {
        color: [0, 0, 255, 255],
        thickness: 1,
    },
};

fn region_style(region: Region) -> RegionStyle {
    match region {
        Region::Face => FACE_STYLE,
        Region::Pose | Region::LeftHand | Region::RightHand => LIMB_STYLE,
    }
}

enum Graph {
    Edges(&'static [(usize, usize)]),
    /// Triangulated from the points themselves.
    Mesh,
}

fn region_graph(region: Region) -> Graph {
    match region {
        Region::Pose => Graph::Edges(POSE_CONNECTIONS),
        Region::LeftHand | Region::RightHand => Graph::Edges(HAND_CONNECTIONS),
        Region::Face => Graph::Mesh,
    }
}

/// Returns a copy of `frame` with the regions selected by `filter` drawn on
/// top. Regions missing from `detection` are skipped.
pub fn render(frame: &Frame, detection: &DetectionResult, filter: RegionFilter) -> Frame {
    let mut out = frame.clone();
    if detection.is_empty() {
        return out;
    }
    for &region in filter.regions() {
        if let Some(landmarks) = detection.region(region) {
            draw_landmarks(
                &mut out.rgba,
                out.width,
                out.height,
                landmarks,
                region_graph(region),
                region_style(region),
            );
        }
    }
    out
}

fn is_drawable(landmark: &Landmark) -> bool {
    landmark
        .visibility
        .is_none_or(|visibility| visibility >= VISIBILITY_THRESHOLD)
}

fn draw_landmarks(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    landmarks: &[Landmark],
    graph: Graph,
    style: RegionStyle,
) {
    let points: Vec<Option<(f32, f32)>> = landmarks
        .iter()
        .map(|l| {
            if !is_drawable(l) {
                return None;
            }
            let (x, y) = l.to_pixel(width, height);
            (x.is_finite() && y.is_finite()).then_some((x, y))
        })
        .collect();

    let mesh;
    let connections = match graph {
        Graph::Edges(edges) => edges,
        Graph::Mesh => {
            mesh = tessellate(&points);
            mesh.as_slice()
        }
    };

    for &(a, b) in connections {
        if let (Some(Some(pa)), Some(Some(pb))) = (points.get(a), points.get(b)) {
            if let Some((p0, p1)) = clip_segment(*pa, *pb, width, height) {
                draw_line(buffer, width, height, p0, p1, style.connection);
            }
        }
    }

    let margin = style.landmark.radius as f32;
    for &(x, y) in points.iter().flatten() {
        let inside = (-margin..=width as f32 + margin).contains(&x)
            && (-margin..=height as f32 + margin).contains(&y);
        if inside {
            draw_circle(buffer, width, height, (x as i32, y as i32), style.landmark);
        }
    }
}

/// Clips a segment to the pixel grid of the frame (Liang-Barsky). `None`
/// when nothing of it is visible.
fn clip_segment(
    p0: (f32, f32),
    p1: (f32, f32),
    width: u32,
    height: u32,
) -> Option<((i32, i32), (i32, i32))> {
    let x_max = f64::from(width.saturating_sub(1));
    let y_max = f64::from(height.saturating_sub(1));
    let (x0, y0) = (f64::from(p0.0), f64::from(p0.1));
    let (x1, y1) = (f64::from(p1.0), f64::from(p1.1));
    let (dx, dy) = (x1 - x0, y1 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);

    for (p, q) in [(-dx, x0), (dx, x_max - x0), (-dy, y0), (dy, y_max - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    // Interpolate from the nearer end; far endpoints have coarse precision.
    let to_pixel = |t: f64| {
        let (x, y) = if t <= 0.5 {
            (x0 + t * dx, y0 + t * dy)
        } else {
            (x1 - (1.0 - t) * dx, y1 - (1.0 - t) * dy)
        };
        (x.is_finite() && y.is_finite()).then(|| {
            (
                x.clamp(0.0, x_max).round() as i32,
                y.clamp(0.0, y_max).round() as i32,
            )
        })
    };
    Some((to_pixel(t0)?, to_pixel(t1)?))
}

/// Bresenham between two in-frame pixels.
fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (i32, i32),
    p1: (i32, i32),
    style: LineStyle,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = style.thickness.max(1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, style.color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if ox == 0 && oy == 0 {
                        continue;
                    }
                    if ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, style.color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(buffer: &mut [u8], width: u32, height: u32, center: (i32, i32), style: PointStyle) {
    let (cx, cy) = center;
    let PointStyle { color, radius } = style;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FACE_LANDMARK_COUNT, HAND_LANDMARK_COUNT, POSE_LANDMARK_COUNT};

    const W: u32 = 64;
    const H: u32 = 48;

    fn blank() -> Frame {
        Frame::new(vec![0u8; (W * H * 4) as usize], W, H)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * frame.width + x) * 4) as usize;
        [
            frame.rgba[idx],
            frame.rgba[idx + 1],
            frame.rgba[idx + 2],
            frame.rgba[idx + 3],
        ]
    }

    fn at(count: usize, x: f32, y: f32) -> Vec<Landmark> {
        vec![Landmark::new(x, y, 0.0); count]
    }

    fn detection() -> DetectionResult {
        DetectionResult {
            pose: Some(at(POSE_LANDMARK_COUNT, 0.25, 0.25)),
            face: Some(at(FACE_LANDMARK_COUNT, 0.75, 0.25)),
            left_hand: Some(at(HAND_LANDMARK_COUNT, 0.25, 0.75)),
            right_hand: Some(at(HAND_LANDMARK_COUNT, 0.75, 0.75)),
        }
    }

    fn drawn(frame: &Frame, x: f32, y: f32) -> bool {
        pixel(frame, (x * W as f32) as u32, (y * H as f32) as u32) != [0, 0, 0, 0]
    }

    #[test]
    fn render_leaves_input_untouched() {
        let frame = blank();
        let out = render(&frame, &detection(), RegionFilter::WholeBody);
        assert!(frame.rgba.iter().all(|b| *b == 0));
        assert!(out.rgba.iter().any(|b| *b != 0));
    }

    #[test]
    fn filter_controls_drawn_regions() {
        let frame = blank();
        let detection = detection();

        let face = render(&frame, &detection, RegionFilter::Face);
        assert!(drawn(&face, 0.75, 0.25));
        assert!(!drawn(&face, 0.25, 0.25));
        assert!(!drawn(&face, 0.25, 0.75));

        let hands = render(&frame, &detection, RegionFilter::Hands);
        assert!(drawn(&hands, 0.25, 0.75));
        assert!(drawn(&hands, 0.75, 0.75));
        assert!(!drawn(&hands, 0.75, 0.25));

        let legs = render(&frame, &detection, RegionFilter::Legs);
        assert!(drawn(&legs, 0.25, 0.25));
        assert!(!drawn(&legs, 0.75, 0.75));

        let whole = render(&frame, &detection, RegionFilter::WholeBody);
        for (x, y) in [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)] {
            assert!(drawn(&whole, x, y));
        }
    }

    #[test]
    fn missing_regions_are_skipped() {
        let frame = blank();
        let out = render(&frame, &DetectionResult::default(), RegionFilter::WholeBody);
        assert_eq!(out.rgba, frame.rgba);
    }

    #[test]
    fn uses_landmark_color_for_points() {
        let frame = blank();
        let out = render(&frame, &detection(), RegionFilter::Legs);
        assert_eq!(pixel(&out, 16, 12), LIMB_STYLE.landmark.color);
    }

    #[test]
    fn hidden_points_are_not_drawn() {
        let frame = blank();
        let detection = DetectionResult {
            pose: Some(vec![
                Landmark::new(0.5, 0.5, 0.0).with_visibility(0.1);
                POSE_LANDMARK_COUNT
            ]),
            ..Default::default()
        };
        let out = render(&frame, &detection, RegionFilter::Legs);
        assert_eq!(out.rgba, frame.rgba);
    }

    #[test]
    fn out_of_frame_points_do_not_panic() {
        let frame = blank();
        let detection = DetectionResult {
            right_hand: Some(at(HAND_LANDMARK_COUNT, -0.5, 1.7)),
            ..Default::default()
        };
        let _ = render(&frame, &detection, RegionFilter::Hands);
    }

    #[test]
    fn connection_tables_stay_in_range() {
        for &(a, b) in POSE_CONNECTIONS {
            assert!(a < POSE_LANDMARK_COUNT && b < POSE_LANDMARK_COUNT);
        }
        for &(a, b) in HAND_CONNECTIONS {
            assert!(a < HAND_LANDMARK_COUNT && b < HAND_LANDMARK_COUNT);
        }
    }

    #[test]
    fn far_off_hand_points_are_clipped() {
        let frame = blank();
        let mut hand = at(HAND_LANDMARK_COUNT, 0.5, 0.5);
        hand[0] = Landmark::new(1e9, 0.5, 0.0);
        hand[1] = Landmark::new(-1e9, 0.5, 0.0);
        hand[5] = Landmark::new(2e5, -3e5, 0.0);
        hand[9] = Landmark::new(f32::NAN, 0.5, 0.0);
        hand[13] = Landmark::new(f32::INFINITY, f32::NEG_INFINITY, 0.0);
        let detection = DetectionResult {
            left_hand: Some(hand),
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let out = render(&frame, &detection, RegionFilter::Hands);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        // 0-1 runs straight through the middle row.
        assert_eq!(pixel(&out, 0, H / 2), LIMB_STYLE.connection.color);
        assert_eq!(pixel(&out, W - 1, H / 2), LIMB_STYLE.connection.color);
    }

    #[test]
    fn clip_keeps_visible_part_only() {
        assert_eq!(
            clip_segment((-100.0, 10.0), (100.0, 10.0), W, H),
            Some(((0, 10), (W as i32 - 1, 10)))
        );
        assert_eq!(
            clip_segment((5.0, 5.0), (10.0, 8.0), W, H),
            Some(((5, 5), (10, 8)))
        );
        assert_eq!(clip_segment((-10.0, -10.0), (-1.0, 100.0), W, H), None);
        assert_eq!(clip_segment((1e30, 0.0), (2e30, 1.0), W, H), None);
    }

    #[test]
    fn face_is_drawn_as_a_mesh() {
        let frame = blank();
        let mut face = vec![Landmark::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT];
        face[0] = Landmark::new(0.25, 0.25, 0.0);
        face[1] = Landmark::new(0.75, 0.25, 0.0);
        face[2] = Landmark::new(0.25, 0.75, 0.0);
        face[3] = Landmark::new(0.75, 0.75, 0.0);
        let detection = DetectionResult {
            face: Some(face),
            ..Default::default()
        };

        let out = render(&frame, &detection, RegionFilter::Face);
        // Square sides between the outer points, away from any landmark dot.
        assert_eq!(pixel(&out, W / 2, H / 4), FACE_STYLE.connection.color);
        assert_eq!(pixel(&out, W / 4, H / 2), FACE_STYLE.connection.color);
        assert_eq!(pixel(&out, W / 2, H / 2), FACE_STYLE.landmark.color);
    }
}
