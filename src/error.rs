//! Error types shared by the geometry, grounding and integration modules.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = GroundingError> = std::result::Result<T, E>;

/// Input-contract violations raised while post-processing detections.
#[derive(Debug, Error)]
pub enum GroundingError {
    /// A rectangle was built from a negative width or height.
    #[error("width and height must be non-negative, got {width}x{height}")]
    InvalidDimension { width: f32, height: f32 },

    /// Word lengths do not add up to the caption length.
    #[error("word lengths sum to {words} characters but the caption has {caption}")]
    LengthMismatch { caption: usize, words: usize },

    /// A bounding box does not carry one probability per caption word.
    #[error("bounding box carries {got} word probabilities, expected {expected}")]
    WordCountMismatch { expected: usize, got: usize },

    /// A tokenizer byte offset does not land on a character boundary.
    #[error("token offset {offset} is not a character boundary of the caption")]
    InvalidTokenOffset { offset: usize },

    #[error("invalid caption: {0}")]
    InvalidCaption(String),

    /// Box arrays must have exactly four columns.
    #[error("boxes must have 4 columns, got {0}")]
    InvalidBoxShape(usize),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("null class index {index} is out of range for {classes} classes")]
    InvalidNullClass { index: usize, classes: usize },

    /// Image ids double as output file names, so they must be unique.
    #[error("image ids must be unique, `{0}` appears more than once")]
    DuplicateImageId(String),

    #[error("all images must share one size: expected {expected:?}, got {got:?} for `{image_id}`")]
    ImageSizeMismatch {
        image_id: String,
        expected: (u32, u32),
        got: (u32, u32),
    },

    #[error("batch size must be positive")]
    InvalidBatchSize,

    #[error("model returned {got} results for a batch of {expected} images")]
    BatchSizeMismatch { expected: usize, got: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure of a [`GroundingPipeline`](crate::GroundingPipeline) run.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    /// The external model failed.
    #[error("grounding model failed: {0}")]
    Model(#[source] E),

    #[error(transparent)]
    Grounding(#[from] GroundingError),
}
