use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::{error::CaptureError, types::Frame};

/// Something that hands out frames on demand.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

pub struct CameraSource {
    camera: Camera,
    index: u32,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(CameraIndex::Index(index), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(Self { camera, index }),
                    Err(err) => last_err = Some(err.to_string()),
                },
                Err(err) => last_err = Some(err.to_string()),
            }
        }

        Err(CaptureError::DeviceUnavailable {
            index,
            reason: last_err.unwrap_or_else(|| "no supported format".to_string()),
        })
    }

    pub fn label(&self) -> String {
        self.camera.info().human_name()
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|err| CaptureError::Read(err.to_string()))?;
        rgba_converter::decode_camera_buffer(&buffer)
            .map_err(|err| CaptureError::Read(format!("{err:#}")))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera {}: {err}", self.index);
        } else {
            log::info!("camera {} released", self.index);
        }
    }
}

/// Opens and immediately releases the camera so startup can fail before any
/// pipeline thread exists.
pub fn probe_camera(index: u32) -> Result<String, CaptureError> {
    let source = CameraSource::open(index)?;
    Ok(source.label())
}
