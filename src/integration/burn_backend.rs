//! Burn inference backend for grounding models.
//!
//! This module provides a `BurnGrounder` that implements `GroundingModel`
//! for running MDETR-style models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use mdetr_rs::integration::{BurnGrounder, BurnGroundingModel, BurnOutput};
//! use burn::backend::NdArray;
//!
//! // Implement BurnGroundingModel for your model
//! struct MyMdetr { /* ... */ }
//!
//! impl BurnGroundingModel<NdArray> for MyMdetr {
//!     fn forward(&self, images: Tensor<NdArray, 4>, caption: &str) -> BurnOutput<NdArray> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyMdetr::load("checkpoint.bin");
//! let grounder = BurnGrounder::new(model, Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::Array3;
use thiserror::Error;

use super::{GroundingModel, ImageInput, ModelOutput};
use crate::error::GroundingError;
use crate::grounding::TokenSpans;

/// Per-channel mean used to normalize RGB input.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviation used to normalize RGB input.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Error type for Burn grounding failures.
#[derive(Debug, Error)]
pub enum BurnGrounderError {
    /// Input image has invalid dimensions.
    #[error("invalid input dimensions: expected {expected:?}, got {got:?}")]
    InvalidInputDimensions {
        expected: (u32, u32, u32),
        got: (u32, u32, u32),
    },
    /// Reading model outputs back failed.
    #[error("postprocessing error: {0}")]
    PostprocessingError(String),
    #[error(transparent)]
    Grounding(#[from] GroundingError),
}

/// Interleaved 8-bit RGB pixels in row-major order.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Raw tensors produced by a Burn grounding model.
pub struct BurnOutput<B: Backend> {
    /// [batch, candidates, token slots]
    pub pred_logits: Tensor<B, 3>,
    /// [batch, candidates, 4] in normalized CXCYWH form
    pub pred_boxes: Tensor<B, 3>,
    /// Spans of the encoded caption tokens.
    pub token_spans: TokenSpans,
}

/// Trait for Burn-based grounding models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnGroundingModel<B: Backend>: Send + Sync {
    /// Run forward pass on the input tensor.
    ///
    /// # Arguments
    /// * `images` - Normalized tensor of shape [batch, channels, height, width]
    /// * `caption` - Caption text, encoded by the model's own tokenizer
    fn forward(&self, images: Tensor<B, 4>, caption: &str) -> BurnOutput<B>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (u32, u32, u32) {
        (3, 800, 800)
    }
}

/// Burn-based grounding model implementing `GroundingModel`.
pub struct BurnGrounder<B: Backend, M: BurnGroundingModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnGroundingModel<B>> BurnGrounder<B, M> {
    /// Create a new Burn grounder with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Normalize a batch of frames into a [batch, channels, height, width] tensor.
    ///
    /// Frames must already match the model input size; resizing is left to
    /// the caller.
    pub fn preprocess(
        &self,
        images: &[ImageInput<RgbFrame>],
    ) -> Result<Tensor<B, 4>, BurnGrounderError> {
        let (channels, target_h, target_w) = self.model.input_size();
        let plane = (target_h * target_w) as usize;
        let mut data = Vec::with_capacity(images.len() * channels as usize * plane);

        for input in images {
            let frame = &input.image;
            let expected_len = plane * channels as usize;
            if frame.width != target_w || frame.height != target_h || frame.data.len() != expected_len
            {
                return Err(BurnGrounderError::InvalidInputDimensions {
                    expected: (channels, target_h, target_w),
                    got: (channels, frame.height, frame.width),
                });
            }

            // HWC u8 -> CHW normalized f32
            for c in 0..channels as usize {
                let (mean, std) = (IMAGENET_MEAN[c % 3], IMAGENET_STD[c % 3]);
                data.extend(
                    frame
                        .data
                        .iter()
                        .skip(c)
                        .step_by(channels as usize)
                        .map(|&x| (x as f32 / 255.0 - mean) / std),
                );
            }
        }

        Ok(
            Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
                images.len(),
                channels as usize,
                target_h as usize,
                target_w as usize,
            ]),
        )
    }
}

fn to_array3<B: Backend>(tensor: Tensor<B, 3>) -> Result<Array3<f32>, BurnGrounderError> {
    let [d0, d1, d2] = tensor.dims();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| BurnGrounderError::PostprocessingError(format!("{err:?}")))?;
    Array3::from_shape_vec((d0, d1, d2), values)
        .map_err(|err| BurnGrounderError::PostprocessingError(err.to_string()))
}

impl<B: Backend, M: BurnGroundingModel<B>> GroundingModel for BurnGrounder<B, M> {
    type Image = RgbFrame;
    type Error = BurnGrounderError;

    fn forward(
        &mut self,
        images: &[ImageInput<RgbFrame>],
        caption: &str,
    ) -> Result<ModelOutput, Self::Error> {
        let tensor = self.preprocess(images)?;
        let raw = self.model.forward(tensor, caption);
        Ok(ModelOutput::new(
            to_array3(raw.pred_logits)?,
            to_array3(raw.pred_boxes)?,
            raw.token_spans,
        )?)
    }
}
