use std::path::PathBuf;
use thiserror::Error;

/// Result type for pose repair operations
pub type Result<T> = std::result::Result<T, RepairError>;

/// Errors raised while loading, validating or repairing a detection stream.
#[derive(Error, Debug)]
pub enum RepairError {
    /// Reading or writing a file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input was not valid JSON or did not have the detection shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input contained no detections at all
    #[error("no frames found in input")]
    NoFrames,

    /// A keypoint array is not a sequence of (x, y, confidence) triples
    #[error("record {index} ({image_id}): keypoints length {len} is not divisible by 3")]
    MalformedKeypoints {
        index: usize,
        image_id: String,
        len: usize,
    },

    /// A record has no usable raw identity label where one is required
    #[error("record {index} ({image_id}): missing or unusable identity label")]
    MissingLabel { index: usize, image_id: String },

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl RepairError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepairError::Io {
            path: path.into(),
            source,
        }
    }
}
