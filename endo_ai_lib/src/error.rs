use std::path::PathBuf;

use crate::crop::CropRect;

/// Failures raised by the prediction pipeline.
///
/// Functions in this crate return `eyre::Result`; these values travel inside the
/// report and can be recovered with `downcast_ref::<PipelineError>()`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid crop rectangle {rect}: {reason}")]
    InvalidCrop { rect: CropRect, reason: String },

    #[error("Invalid target size {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("Sample index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Got {paths} paths but {crops} crops")]
    LengthMismatch { paths: usize, crops: usize },

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Frame {frame} is missing label '{label}'")]
    MissingLabel { frame: usize, label: String },

    #[error("Frame {frame} has label '{label}' outside the label set")]
    UnexpectedLabel { frame: usize, label: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model returned shape {got:?}, expected [{batch}, {labels}]")]
    ModelOutputShape {
        got: Vec<usize>,
        batch: usize,
        labels: usize,
    },

    #[error("Model returned {value} for label '{label}', expected a probability")]
    ModelOutputValue { label: String, value: f32 },

    #[error("Series value {value} at frame {index} is not finite")]
    NonFiniteValue { index: usize, value: f32 },

    #[error("No frames found in {0}")]
    NoFrames(PathBuf),

    #[error("Frame file name must look like frame_<index>.<ext>: {0}")]
    InvalidFrameName(PathBuf),

    #[error("Duplicate frame index {index}: {first} and {second}")]
    DuplicateFrameIndex {
        index: u64,
        first: PathBuf,
        second: PathBuf,
    },
}
