//! Turns one image's raw model outputs into a [`Prediction`].

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GroundingError, Result};
use crate::geometry::{Rectangle, rescale_boxes};
use crate::grounding::{BoundingBox, Caption, Prediction, TokenSpans};

/// Which logit slot means "this candidate refers to no caption text".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullClass {
    /// The last slot of each candidate's distribution.
    #[default]
    Last,
    Index(usize),
}

impl NullClass {
    /// Resolve to a concrete index into a distribution of `classes` slots.
    pub fn resolve(self, classes: usize) -> Result<usize> {
        match self {
            NullClass::Last if classes > 0 => Ok(classes - 1),
            NullClass::Index(index) if index < classes => Ok(index),
            NullClass::Last => Err(GroundingError::InvalidNullClass { index: 0, classes }),
            NullClass::Index(index) => Err(GroundingError::InvalidNullClass { index, classes }),
        }
    }
}

/// Softmax over the last axis of a (candidate, slot) logit matrix.
///
/// A row whose largest logit is `+inf` splits its mass evenly over the
/// infinite slots; a row of only `-inf` becomes uniform.
pub fn softmax_rows(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        if max == f32::INFINITY {
            row.mapv_inplace(|x| if x == f32::INFINITY { 1.0 } else { 0.0 });
        } else if max == f32::NEG_INFINITY {
            row.fill(1.0);
        } else {
            row.mapv_inplace(|x| (x - max).exp());
        }
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }
    probs
}

/// Confidence filtering and prediction assembly for grounding outputs.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    /// Candidates with confidence below this are dropped.
    pub confidence_threshold: f32,
    pub null_class: NullClass,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.0,
            null_class: NullClass::Last,
        }
    }
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            ..Self::default()
        }
    }

    pub fn with_null_class(mut self, null_class: NullClass) -> Self {
        self.null_class = null_class;
        self
    }

    /// Build the prediction for one image.
    ///
    /// `logits` is (candidate, slot) and `boxes` is (candidate, 4) in
    /// normalized CXCYWH form. A candidate's confidence is one minus the
    /// softmax mass on the null slot; its token probabilities are the full
    /// softmax row, aggregated onto the caption words through `spans`.
    pub fn process_image(
        &self,
        image_id: &str,
        logits: ArrayView2<'_, f32>,
        boxes: ArrayView2<'_, f32>,
        image_size: (u32, u32),
        caption: &Caption,
        spans: &TokenSpans,
    ) -> Result<Prediction> {
        if logits.nrows() != boxes.nrows() {
            return Err(GroundingError::ShapeMismatch(format!(
                "{} logit rows but {} boxes for image `{image_id}`",
                logits.nrows(),
                boxes.nrows()
            )));
        }

        let probs = softmax_rows(logits);
        let null = self.null_class.resolve(probs.ncols())?;

        let keep: Vec<usize> = probs
            .column(null)
            .iter()
            .enumerate()
            .filter(|&(_, &p)| 1.0 - p >= self.confidence_threshold)
            .map(|(candidate, _)| candidate)
            .collect();

        let kept_boxes = Array2::from_shape_fn((keep.len(), boxes.ncols()), |(i, j)| {
            boxes[[keep[i], j]]
        });
        let scaled = rescale_boxes(kept_boxes.view(), image_size)?;

        let caption_len = caption.char_len();
        let word_lens = caption.word_lens();
        let bounding_boxes = keep
            .iter()
            .zip(scaled.rows())
            .map(|(&candidate, corners)| {
                let token_probs = probs.row(candidate).to_vec();
                let word_probs = crate::grounding::word_probabilities(
                    caption_len,
                    &token_probs,
                    |token| spans.token_to_chars(token),
                    &word_lens,
                )?;
                Ok(BoundingBox {
                    image_id: image_id.to_owned(),
                    rect: Rectangle::from_xyxy(corners[0], corners[1], corners[2], corners[3]),
                    class_name: String::new(),
                    confidence: 1.0 - probs[[candidate, null]],
                    word_probs,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            image_id,
            candidates = logits.nrows(),
            kept = bounding_boxes.len(),
            "post-processed image"
        );

        Prediction::new(
            caption.doc_id(),
            image_id,
            bounding_boxes,
            caption.words().to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::CharSpan;
    use ndarray::array;

    fn caption() -> Caption {
        Caption::new("doc", vec!["AB".into(), "CDE".into()])
    }

    // [BOS] AB C DE [EOS]
    fn spans() -> TokenSpans {
        TokenSpans::new(vec![
            None,
            Some(CharSpan::new(0, 2)),
            Some(CharSpan::new(2, 3)),
            Some(CharSpan::new(3, 5)),
            None,
        ])
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let logits: Array2<f32> = array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]];
        let probs = softmax_rows(logits.view());
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert!((probs[[1, 0]] - 1.0 / 3.0).abs() < 1e-6);
        assert!(probs[[0, 2]] > probs[[0, 1]]);
    }

    #[test]
    fn test_softmax_rows_with_infinite_logits() {
        let logits: Array2<f32> = array![
            [f32::NEG_INFINITY, f32::NEG_INFINITY],
            [f32::INFINITY, 0.0],
            [f32::NEG_INFINITY, 0.0],
        ];
        let probs = softmax_rows(logits.view());
        assert!(probs.iter().all(|p| p.is_finite()));
        assert_eq!(probs.row(0).to_vec(), vec![0.5, 0.5]);
        assert_eq!(probs.row(1).to_vec(), vec![1.0, 0.0]);
        assert_eq!(probs.row(2).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_all_negative_infinite_candidate_stays_finite() {
        let logits = Array2::from_elem((1, 6), f32::NEG_INFINITY);
        let boxes: Array2<f32> = array![[0.5, 0.5, 0.5, 0.5]];
        let prediction = PostProcessor::default()
            .process_image(
                "img",
                logits.view(),
                boxes.view(),
                (10, 10),
                &caption(),
                &spans(),
            )
            .unwrap();
        let bbox = &prediction.bounding_boxes()[0];
        assert!(bbox.confidence.is_finite());
        assert!(bbox.word_probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_null_class_resolution() {
        assert_eq!(NullClass::Last.resolve(6).unwrap(), 5);
        assert_eq!(NullClass::Index(2).resolve(6).unwrap(), 2);
        assert!(NullClass::Index(6).resolve(6).is_err());
        assert!(NullClass::Last.resolve(0).is_err());
    }

    #[test]
    fn test_process_image() {
        // 6 slots: 5 caption tokens + null
        let logits: Array2<f32> = array![
            [0.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 8.0],
        ];
        let boxes: Array2<f32> = array![[0.5, 0.5, 0.5, 0.5], [0.25, 0.25, 0.5, 0.5]];

        let prediction = PostProcessor::default()
            .process_image(
                "img",
                logits.view(),
                boxes.view(),
                (200, 100),
                &caption(),
                &spans(),
            )
            .unwrap();

        assert_eq!(prediction.doc_id(), "doc");
        assert_eq!(prediction.image_id(), "img");
        assert_eq!(prediction.words(), ["AB", "CDE"]);
        assert_eq!(prediction.bounding_boxes().len(), 2);

        let first = &prediction.bounding_boxes()[0];
        assert_eq!(first.rect, Rectangle::new(50, 25, 150, 75));
        assert!(first.confidence > 0.9);
        assert!(first.word_probs[0] > 0.9);
        assert!(first.word_probs[1] < 0.05);

        let second = &prediction.bounding_boxes()[1];
        assert_eq!(second.rect, Rectangle::new(0, 0, 100, 50));
        assert!(second.confidence < 0.01);
    }

    #[test]
    fn test_confidence_threshold_filters() {
        let logits: Array2<f32> = array![
            [0.0, 4.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 8.0],
        ];
        let boxes: Array2<f32> = array![[0.5, 0.5, 0.5, 0.5], [0.25, 0.25, 0.5, 0.5]];

        let prediction = PostProcessor::new(0.5)
            .process_image(
                "img",
                logits.view(),
                boxes.view(),
                (200, 100),
                &caption(),
                &spans(),
            )
            .unwrap();
        assert_eq!(prediction.bounding_boxes().len(), 1);
        assert!(prediction.bounding_boxes()[0].confidence >= 0.5);
    }

    #[test]
    fn test_configurable_null_slot() {
        // Null slot first; candidate puts all mass on it.
        let logits: Array2<f32> = array![[9.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let boxes: Array2<f32> = array![[0.5, 0.5, 0.1, 0.1]];
        let prediction = PostProcessor::new(0.5)
            .with_null_class(NullClass::Index(0))
            .process_image(
                "img",
                logits.view(),
                boxes.view(),
                (10, 10),
                &caption(),
                &spans(),
            )
            .unwrap();
        assert!(prediction.bounding_boxes().is_empty());
    }

    #[test]
    fn test_mismatched_rows() {
        let logits = Array2::<f32>::zeros((2, 6));
        let boxes = Array2::<f32>::zeros((3, 4));
        let err = PostProcessor::default()
            .process_image(
                "img",
                logits.view(),
                boxes.view(),
                (10, 10),
                &caption(),
                &spans(),
            )
            .unwrap_err();
        assert!(matches!(err, GroundingError::ShapeMismatch(_)));
    }
}
