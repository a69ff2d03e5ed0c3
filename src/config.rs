use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{args::Args, model_download::ModelKind, pipeline::Thresholds, types::RegionFilter};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
    pub recording: RecordingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: u32,
    pub tick_interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub pose_model: ModelConfig,
    pub face_model: ModelConfig,
    pub hand_model: ModelConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Label of the region selected at startup, e.g. "Whole Body".
    pub region: String,
    pub output_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            tick_interval_ms: 33,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            pose_model: ModelConfig::for_kind(ModelKind::Pose),
            face_model: ModelConfig::for_kind(ModelKind::FaceMesh),
            hand_model: ModelConfig::for_kind(ModelKind::Hand),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            region: RegionFilter::default().label().to_string(),
            output_path: PathBuf::from("key_points.json"),
        }
    }
}

impl ModelConfig {
    pub fn for_kind(kind: ModelKind) -> Self {
        Self {
            path: kind.default_path(),
            url: kind.default_url().map(str::to_string),
        }
    }
}

impl CaptureConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl DetectorConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
        }
    }

    pub fn model(&self, kind: ModelKind) -> &ModelConfig {
        match kind {
            ModelKind::Pose => &self.pose_model,
            ModelKind::FaceMesh => &self.face_model,
            ModelKind::Hand => &self.hand_model,
        }
    }
}

impl AppConfig {
    const DEFAULT_PATH: &'static str = "config.json";

    /// Loads `path`, or `config.json` when no path is given. A missing default
    /// file or a malformed file yields the defaults; an explicitly named file
    /// that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(Self::DEFAULT_PATH), false),
        };

        if !explicit && !path.exists() {
            log::info!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                log::info!("loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(err) => {
                log::warn!(
                    "failed to parse configuration {}: {err}; using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(output) = &args.output {
            self.recording.output_path = output.clone();
        }
        if let Some(region) = &args.region {
            self.recording.region = region.clone();
        }
    }
}
