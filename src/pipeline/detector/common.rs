use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark};

pub const POSE_INPUT_SIZE: u32 = 256;
pub const FACE_INPUT_SIZE: u32 = 192;
pub const HAND_INPUT_SIZE: u32 = 224;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

/// How a model wants its square input tensor laid out.
#[derive(Clone, Copy, Debug)]
pub struct InputSpec {
    pub size: u32,
    pub layout: TensorLayout,
    pub range: (f32, f32),
}

impl InputSpec {
    pub const POSE: InputSpec = InputSpec {
        size: POSE_INPUT_SIZE,
        layout: TensorLayout::Nhwc,
        range: (0.0, 1.0),
    };
    pub const FACE: InputSpec = InputSpec {
        size: FACE_INPUT_SIZE,
        layout: TensorLayout::Nchw,
        range: (-1.0, 1.0),
    };
    pub const HAND: InputSpec = InputSpec {
        size: HAND_INPUT_SIZE,
        layout: TensorLayout::Nhwc,
        range: (0.0, 1.0),
    };

    fn map(&self, unit: f32) -> f32 {
        self.range.0 + unit * (self.range.1 - self.range.0)
    }

    /// Builds the tensor from interleaved RGB values in `[0, 1]`.
    fn tensor(&self, rgb: Vec<f32>) -> Result<Array4<f32>> {
        let size = self.size as usize;
        let values: Vec<f32> = rgb.into_iter().map(|v| self.map(v)).collect();
        let nhwc = Array4::<f32>::from_shape_vec((1, size, size, 3), values)
            .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;
        Ok(match self.layout {
            TensorLayout::Nhwc => nhwc,
            TensorLayout::Nchw => nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().to_owned(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Maps a point from model input pixels back to normalized frame
    /// coordinates.
    pub fn unproject(&self, x: f32, y: f32, z: f32) -> Landmark {
        let px = (x - self.pad_x) / self.scale;
        let py = (y - self.pad_y) / self.scale;
        let pz = z / self.scale;
        Landmark::new(
            px / self.orig_w as f32,
            py / self.orig_h as f32,
            pz / self.orig_w as f32,
        )
    }
}

/// Square, rotated crop of the frame. `center` and `side` are in frame pixels.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let cos = self.angle.cos();
        let sin = self.angle.sin();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    pub fn unproject(&self, x: f32, y: f32, z: f32) -> Landmark {
        let (px, py) = self.project(x, y);
        let pz = z * self.side / self.output_size as f32;
        Landmark::new(
            px / self.orig_w as f32,
            py / self.orig_h as f32,
            pz / self.orig_w as f32,
        )
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resizes the whole frame into a square, padding the short side.
pub fn prepare_letterbox(frame: &Frame, spec: InputSpec) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;
    let target_size = spec.size;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let rgb: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((spec.tensor(rgb)?, letterbox))
}

pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    spec: InputSpec,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size: spec.size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = spec.size;
    let rgb: Vec<f32> = (0..size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let transform = &transform;
            (0..size).flat_map(move |x| {
                let (src_x, src_y) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
                sample_rgb(frame, src_x, src_y)
            })
        })
        .collect();

    Ok((spec.tensor(rgb)?, transform))
}

/// Splits a flat `[x, y, z, ...]` output into `count` points of `stride`
/// values each.
pub fn decode_points(flat: &[f32], count: usize, stride: usize) -> Result<Vec<&[f32]>> {
    if stride < 3 || flat.len() < count * stride {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * stride
        ));
    }
    Ok(flat.chunks_exact(stride).take(count).collect())
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = x0 + 1.0;
    let y1 = y0 + 1.0;

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x1, y0);
    let c01 = fetch(x0, y1);
    let c11 = fetch(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [
        lerp(lerp(c00[0], c10[0], fx), lerp(c01[0], c11[0], fx), fy),
        lerp(lerp(c00[1], c10[1], fx), lerp(c01[1], c11[1], fx), fy),
        lerp(lerp(c00[2], c10[2], fx), lerp(c01[2], c11[2], fx), fy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Frame::new(rgba, width, height)
    }

    #[test]
    fn letterbox_round_trips_frame_corners() {
        let frame = solid(640, 480, [255, 255, 255]);
        let (tensor, letterbox) = prepare_letterbox(&frame, InputSpec::POSE).unwrap();
        assert_eq!(tensor.shape(), &[1, 256, 256, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 32.0);

        // Padding rows stay black, image rows are white.
        assert_eq!(tensor[[0, 0, 128, 0]], 0.0);
        assert!(tensor[[0, 128, 128, 0]] > 0.99);

        let top_left = letterbox.unproject(0.0, 32.0, 0.0);
        assert!(top_left.x.abs() < 1e-4 && top_left.y.abs() < 1e-4);
        let bottom_right = letterbox.unproject(256.0, 224.0, 0.0);
        assert!((bottom_right.x - 1.0).abs() < 1e-4);
        assert!((bottom_right.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn nchw_layout_maps_value_range() {
        let frame = solid(32, 32, [255, 0, 0]);
        let (tensor, _) = prepare_letterbox(&frame, InputSpec::FACE).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 192, 192]);
        assert!((tensor[[0, 0, 96, 96]] - 1.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 96, 96]] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn crop_transform_center_maps_to_crop_center() {
        let transform = CropTransform {
            center: (100.0, 50.0),
            side: 40.0,
            angle: std::f32::consts::FRAC_PI_2,
            output_size: 224,
            orig_w: 200,
            orig_h: 100,
        };
        let (cx, cy) = transform.project(112.0, 112.0);
        assert!((cx - 100.0).abs() < 1e-4 && (cy - 50.0).abs() < 1e-4);

        // Quarter turn: crop "right" points down in the frame.
        let (rx, ry) = transform.project(224.0, 112.0);
        assert!((rx - 100.0).abs() < 1e-3);
        assert!((ry - 70.0).abs() < 1e-3);

        let landmark = transform.unproject(112.0, 112.0, 22.4);
        assert!((landmark.x - 0.5).abs() < 1e-4);
        assert!((landmark.y - 0.5).abs() < 1e-4);
        assert!((landmark.z - 0.02).abs() < 1e-4);
    }

    #[test]
    fn rotated_crop_samples_frame() {
        let frame = solid(64, 64, [0, 255, 0]);
        let (tensor, _) =
            prepare_rotated_crop(&frame, (32.0, 32.0), 16.0, 0.3, InputSpec::HAND).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor[[0, 112, 112, 1]] > 0.99);
        assert!(tensor[[0, 112, 112, 0]] < 0.01);
    }

    #[test]
    fn rejects_mismatched_frames() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(prepare_letterbox(&frame, InputSpec::POSE).is_err());
    }

    #[test]
    fn decode_points_checks_length() {
        let flat: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let points = decode_points(&flat, 2, 5).unwrap();
        assert_eq!(points[1], &[5.0_f32, 6.0, 7.0, 8.0, 9.0]);
        assert!(decode_points(&flat, 3, 5).is_err());
    }
}
