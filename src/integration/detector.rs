//! Trait for caption-grounded detection backends.

use std::ops::Range;

use ndarray::{Array3, Axis, s};
use serde::{Deserialize, Serialize};

use crate::error::{GroundingError, Result};
use crate::grounding::TokenSpans;

/// One image handed to a [`GroundingModel`].
#[derive(Debug, Clone)]
pub struct ImageInput<T> {
    /// Unique id, also used as the export file name.
    pub id: String,
    /// `(width, height)` in pixels of the original image.
    pub size: (u32, u32),
    pub image: T,
}

impl<T> ImageInput<T> {
    pub fn new(id: impl Into<String>, size: (u32, u32), image: T) -> Self {
        Self {
            id: id.into(),
            size,
            image,
        }
    }
}

/// Raw outputs of a grounding model for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutput {
    /// (batch, candidate, token slots) logits; one slot is the null class.
    pub pred_logits: Array3<f32>,
    /// (batch, candidate, 4) boxes in normalized CXCYWH form.
    pub pred_boxes: Array3<f32>,
    /// Character span of each token slot of the encoded caption.
    pub token_spans: TokenSpans,
}

impl ModelOutput {
    pub fn new(
        pred_logits: Array3<f32>,
        pred_boxes: Array3<f32>,
        token_spans: TokenSpans,
    ) -> Result<Self> {
        let output = Self {
            pred_logits,
            pred_boxes,
            token_spans,
        };
        output.validate()?;
        Ok(output)
    }

    /// Check that logits and boxes agree on batch and candidate counts.
    pub fn validate(&self) -> Result<()> {
        let (batch, candidates, _) = self.pred_logits.dim();
        let (box_batch, box_candidates, coords) = self.pred_boxes.dim();
        if coords != 4 {
            return Err(GroundingError::InvalidBoxShape(coords));
        }
        if (batch, candidates) != (box_batch, box_candidates) {
            return Err(GroundingError::ShapeMismatch(format!(
                "logits cover {batch} images x {candidates} candidates, \
                 boxes cover {box_batch} x {box_candidates}"
            )));
        }
        Ok(())
    }

    /// Number of images in the batch.
    pub fn batch_len(&self) -> usize {
        self.pred_logits.len_of(Axis(0))
    }

    /// Outputs for the images in `range`.
    pub fn slice_batch(&self, range: Range<usize>) -> ModelOutput {
        ModelOutput {
            pred_logits: self.pred_logits.slice(s![range.clone(), .., ..]).to_owned(),
            pred_boxes: self.pred_boxes.slice(s![range, .., ..]).to_owned(),
            token_spans: self.token_spans.clone(),
        }
    }
}

/// Trait for grounding model inference backends.
///
/// Implement this trait to connect any MDETR-style model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use mdetr_rs::{GroundingModel, ImageInput, ModelOutput};
///
/// struct MyModel {
///     // Your model here
/// }
///
/// impl GroundingModel for MyModel {
///     type Image = Vec<u8>;
///     type Error = std::io::Error;
///
///     fn forward(&mut self, images: &[ImageInput<Vec<u8>>], caption: &str) -> Result<ModelOutput, Self::Error> {
///         // Run inference on the batch
///         todo!()
///     }
/// }
/// ```
pub trait GroundingModel {
    /// Pixel data the model consumes.
    type Image;
    /// Error type for inference failures.
    type Error;

    /// Run the model on a batch of images against one caption.
    ///
    /// The returned output must hold exactly one entry per input image, in
    /// input order.
    fn forward(
        &mut self,
        images: &[ImageInput<Self::Image>],
        caption: &str,
    ) -> std::result::Result<ModelOutput, Self::Error>;
}
