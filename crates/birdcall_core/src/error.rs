use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the classifier and the audio controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The model artifact is missing, corrupt, or inconsistent with the label table.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Number of labels doesn't match the model output width.
    #[error("label count mismatch: model expects {expected}, got {got}")]
    LabelCount {
        /// Output width declared by the model.
        expected: usize,
        /// Labels in the table.
        got: usize,
    },

    /// Labels file could not be read or parsed.
    #[error("failed to load labels from {path}: {reason}")]
    LabelLoad {
        /// Path that failed to load.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Input file is not a readable image in a supported raster format.
    #[error("cannot decode image {path}: {reason}")]
    ImageDecode {
        /// Image the caller asked about.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Model is unloaded or the run itself failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Audio file vanished between lookup and playback.
    #[error("audio resource missing: {}", .0.display())]
    ResourceMissing(PathBuf),

    /// Playback engine failure (codec, device, I/O).
    #[error("playback failed: {0}")]
    Playback(String),

    /// Operation needs a loaded audio resource.
    #[error("no audio resource loaded")]
    NoResource,

    /// Configuration file could not be read or holds invalid values.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
