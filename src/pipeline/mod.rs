pub mod camera;
pub mod detector;
pub mod export;
pub mod recording;
pub mod rgba_converter;
pub mod runner;
pub mod skeleton;
pub mod tessellation;

// Re-exports for convenience
pub use camera::{CameraSource, probe_camera};
pub use detector::Thresholds;
pub use recording::RecorderState;
pub use runner::{
    Command, Notice, NoticeLevel, PipelineEvent, PipelineHandle, PipelineSettings, PipelineStatus,
    open_holistic, start_pipeline,
};
