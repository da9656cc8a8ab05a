use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{GroundingError, Result};
use crate::geometry::Rectangle;

/// One grounded detection candidate.
///
/// Equality and hashing compare the floating point fields by bit pattern so
/// that `Eq` and `Hash` agree. This is meant for deduplication and tests; it
/// is not a tolerance-based comparison of scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub image_id: String,
    /// Corners in pixel coordinates.
    pub rect: Rectangle,
    /// Empty for caption-grounded models.
    pub class_name: String,
    pub confidence: f32,
    /// Probability of each caption word, in caption order.
    pub word_probs: Vec<f32>,
}

impl BoundingBox {
    /// Comma-separated words whose probability is at least `min_prob`.
    pub fn label(&self, words: &[String], min_prob: f32) -> String {
        words
            .iter()
            .zip(&self.word_probs)
            .filter(|&(_, &prob)| prob >= min_prob)
            .map(|(word, _)| word.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.image_id == other.image_id
            && self.rect == other.rect
            && self.class_name == other.class_name
            && self.confidence.to_bits() == other.confidence.to_bits()
            && self.word_probs.len() == other.word_probs.len()
            && self
                .word_probs
                .iter()
                .zip(&other.word_probs)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rect.hash(state);
        self.class_name.hash(state);
        self.confidence.to_bits().hash(state);
        for prob in &self.word_probs {
            prob.to_bits().hash(state);
        }
    }
}

/// All candidates for one image, with the caption words they refer to.
///
/// Every bounding box holds exactly one probability per word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PredictionRecord")]
pub struct Prediction {
    doc_id: String,
    image_id: String,
    bounding_boxes: Vec<BoundingBox>,
    words: Vec<String>,
}

impl Prediction {
    pub fn new(
        doc_id: impl Into<String>,
        image_id: impl Into<String>,
        bounding_boxes: Vec<BoundingBox>,
        words: Vec<String>,
    ) -> Result<Self> {
        if let Some(bbox) = bounding_boxes
            .iter()
            .find(|bbox| bbox.word_probs.len() != words.len())
        {
            return Err(GroundingError::WordCountMismatch {
                expected: words.len(),
                got: bbox.word_probs.len(),
            });
        }
        Ok(Self {
            doc_id: doc_id.into(),
            image_id: image_id.into(),
            bounding_boxes,
            words,
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.bounding_boxes
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Boxes confident enough to display.
    pub fn visible(&self, threshold: f32) -> impl Iterator<Item = &BoundingBox> + '_ {
        self.bounding_boxes
            .iter()
            .filter(move |bbox| bbox.confidence >= threshold)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionRecord {
    doc_id: String,
    image_id: String,
    bounding_boxes: Vec<BoundingBox>,
    words: Vec<String>,
}

impl TryFrom<PredictionRecord> for Prediction {
    type Error = GroundingError;

    fn try_from(record: PredictionRecord) -> Result<Self> {
        Prediction::new(
            record.doc_id,
            record.image_id,
            record.bounding_boxes,
            record.words,
        )
    }
}
