//! Replays detector outputs recorded from an earlier model run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GroundingError, Result};

use super::{GroundingModel, ImageInput, ModelOutput};

/// Detector outputs for a whole image list, plus what produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    #[serde(default)]
    pub backbone: Option<String>,
    #[serde(default)]
    pub text_encoder: Option<String>,
    /// Caption text the outputs were computed against.
    #[serde(default)]
    pub caption: Option<String>,
    pub output: ModelOutput,
}

/// A [`GroundingModel`] that hands out a recorded output batch by batch.
///
/// Image `i` of the input list maps to entry `i` of the recording, so the
/// images must be passed in recording order.
#[derive(Debug, Clone)]
pub struct RecordedModel {
    recording: Recording,
    cursor: usize,
}

impl RecordedModel {
    pub fn new(recording: Recording) -> Result<Self> {
        recording.output.validate()?;
        Ok(Self {
            recording,
            cursor: 0,
        })
    }

    /// Load a JSON recording.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| GroundingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recording: Recording = serde_json::from_str(&json)?;
        debug!(
            path = %path.display(),
            images = recording.output.batch_len(),
            "loaded recorded model outputs"
        );
        Self::new(recording)
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Warn when the recording was made with a different backbone or text
    /// encoder than requested. Returns whether everything matched.
    pub fn check_metadata(&self, backbone: &str, text_encoder: &str) -> bool {
        let mut matched = true;
        for (field, recorded, requested) in [
            ("backbone", &self.recording.backbone, backbone),
            ("text encoder", &self.recording.text_encoder, text_encoder),
        ] {
            if let Some(recorded) = recorded {
                if recorded != requested {
                    warn!(
                        recorded = recorded.as_str(),
                        requested,
                        "recording used a different {field}"
                    );
                    matched = false;
                }
            }
        }
        matched
    }

    /// Start replaying from the first image again.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl GroundingModel for RecordedModel {
    type Image = ();
    type Error = GroundingError;

    fn forward(&mut self, images: &[ImageInput<()>], caption: &str) -> Result<ModelOutput> {
        if let Some(recorded) = &self.recording.caption {
            if recorded != caption {
                warn!(
                    recorded = recorded.as_str(),
                    requested = caption,
                    "recording used a different caption"
                );
            }
        }

        let available = self.recording.output.batch_len();
        let end = self.cursor + images.len();
        if end > available {
            return Err(GroundingError::ShapeMismatch(format!(
                "recording holds {available} images, requested up to {end}"
            )));
        }
        let output = self.recording.output.slice_batch(self.cursor..end);
        self.cursor = end;
        Ok(output)
    }
}
