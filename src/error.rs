//! Error taxonomy
//!
//! Geometric errors are local to a single view; the orchestrator decides
//! whether a failing view aborts the run or is skipped.

use thiserror::Error;

/// Errors produced by the projection, back-projection and pipeline stages
#[derive(Debug, Error)]
pub enum PanoOcrError {
    /// Camera field of view outside the open interval (0, π)
    #[error("invalid camera spec: {axis} field of view {fov_degrees:.3}° must lie strictly between 0° and 180°")]
    InvalidSpec {
        axis: &'static str,
        fov_degrees: f64,
    },

    /// A recognizer returned a box violating the normalized-box invariants
    #[error("malformed detection {text:?}: {reason}")]
    MalformedDetection { text: String, reason: String },

    /// The external recognition capability failed on one view
    #[error("recognition failed on view {view_index}: {source}")]
    RecognitionFailure {
        view_index: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A perspective set with no cameras
    #[error("perspective set must contain at least one camera")]
    EmptyPerspectiveSet,

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PanoOcrError>;

impl PanoOcrError {
    /// Wrap a recognizer error without altering its message
    pub fn recognition(view_index: usize, err: anyhow::Error) -> Self {
        Self::RecognitionFailure {
            view_index,
            source: err.into(),
        }
    }
}
