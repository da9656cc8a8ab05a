//! GroundingPipeline for combining model inference with post-processing.

use std::collections::HashSet;

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GroundingError, PipelineError};
use crate::grounding::{Caption, Prediction};

use super::{GroundingModel, ImageInput, NullClass, PostProcessor};

/// Configuration for the GroundingPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Images per model call.
    pub batch_size: usize,
    /// Minimum confidence for a candidate to be kept at all.
    pub confidence_threshold: f32,
    /// Minimum confidence for a box to be displayed.
    pub display_threshold: f32,
    /// Minimum word probability for a word to appear in a box label.
    pub label_word_threshold: f32,
    pub null_class: NullClass,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            confidence_threshold: 0.0,
            display_threshold: 0.8,
            label_word_threshold: 0.1,
            null_class: NullClass::Last,
        }
    }
}

/// Bundles a [`GroundingModel`] with batching and post-processing.
pub struct GroundingPipeline<M: GroundingModel> {
    model: M,
    postprocessor: PostProcessor,
    config: GroundingConfig,
}

impl<M: GroundingModel> GroundingPipeline<M> {
    /// Create a new pipeline with the given model and config.
    pub fn new(model: M, config: GroundingConfig) -> Self {
        let postprocessor =
            PostProcessor::new(config.confidence_threshold).with_null_class(config.null_class);
        Self {
            model,
            postprocessor,
            config,
        }
    }

    /// Create a new pipeline with default configuration.
    pub fn with_default_config(model: M) -> Self {
        Self::new(model, GroundingConfig::default())
    }

    /// Ground `caption` in every image.
    ///
    /// Image ids must be unique and all images must share one size. Images
    /// are sent to the model in batches of `batch_size`; predictions come
    /// back in input order.
    pub fn predict(
        &mut self,
        images: &[ImageInput<M::Image>],
        caption: &Caption,
    ) -> Result<Vec<Prediction>, PipelineError<M::Error>> {
        let Some(first) = images.first() else {
            return Ok(Vec::new());
        };
        if self.config.batch_size == 0 {
            return Err(GroundingError::InvalidBatchSize.into());
        }
        check_unique_ids(images)?;

        let image_size = first.size;
        if let Some(other) = images.iter().find(|image| image.size != image_size) {
            return Err(GroundingError::ImageSizeMismatch {
                image_id: other.id.clone(),
                expected: image_size,
                got: other.size,
            }
            .into());
        }

        let mut predictions = Vec::with_capacity(images.len());
        for (batch_idx, batch) in images.chunks(self.config.batch_size).enumerate() {
            debug!(batch = batch_idx, images = batch.len(), "running grounding model");
            let output = self
                .model
                .forward(batch, caption.text())
                .map_err(PipelineError::Model)?;
            output.validate()?;
            if output.batch_len() != batch.len() {
                return Err(GroundingError::BatchSizeMismatch {
                    expected: batch.len(),
                    got: output.batch_len(),
                }
                .into());
            }

            for (i, image) in batch.iter().enumerate() {
                let prediction = self.postprocessor.process_image(
                    &image.id,
                    output.pred_logits.index_axis(Axis(0), i),
                    output.pred_boxes.index_axis(Axis(0), i),
                    image_size,
                    caption,
                    &output.token_spans,
                )?;
                predictions.push(prediction);
            }
        }
        Ok(predictions)
    }

    /// Get the pipeline configuration.
    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Get a reference to the underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a mutable reference to the underlying model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }
}

fn check_unique_ids<T>(images: &[ImageInput<T>]) -> Result<(), GroundingError> {
    let mut seen = HashSet::with_capacity(images.len());
    for image in images {
        if !seen.insert(image.id.as_str()) {
            return Err(GroundingError::DuplicateImageId(image.id.clone()));
        }
    }
    Ok(())
}
