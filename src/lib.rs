//! Post-processing for caption-grounded detection models such as MDETR.
//!
//! The detector itself is an external collaborator (see [`GroundingModel`]).
//! This crate turns its raw outputs into pixel-space rectangles with one
//! probability per caption word, and exports them as JSON.

pub mod error;
pub mod export;
pub mod geometry;
pub mod grounding;
pub mod integration;

pub use error::{GroundingError, PipelineError, Result};
pub use geometry::{Rectangle, iou, iou_batch};
pub use grounding::{BoundingBox, Caption, CharSpan, Prediction, TokenSpans, word_probabilities};
pub use integration::{
    GroundingConfig, GroundingModel, GroundingPipeline, ImageInput, ModelOutput, NullClass,
    PostProcessor, RecordedModel,
};
