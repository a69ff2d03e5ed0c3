use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unable to open camera {index}: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    #[error("unable to read frame from camera: {0}")]
    Read(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown body part \"{0}\", expected one of Whole Body, Face, Hands, Legs")]
    UnknownRegion(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no key points recorded")]
    EmptyBuffer,

    #[error("failed to write key points to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode key points for {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
