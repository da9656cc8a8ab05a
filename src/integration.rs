//! Integration module for connecting grounding model backends with the
//! post-processing in this crate.
//!
//! The model is opaque: it takes a batch of images and a caption and returns
//! per-candidate logits over caption tokens plus normalized boxes. Everything
//! after that (confidence, rescaling, word probabilities) happens here.

mod detector;
mod pipeline;
mod postprocess;
mod recorded;

pub use detector::{GroundingModel, ImageInput, ModelOutput};
pub use pipeline::{GroundingConfig, GroundingPipeline};
pub use postprocess::{NullClass, PostProcessor, softmax_rows};
pub use recorded::{RecordedModel, Recording};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnGrounder, BurnGrounderError, BurnGroundingModel, BurnOutput, RgbFrame};
