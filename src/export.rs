//! JSON export of predictions, one file per image.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{GroundingError, Result};
use crate::grounding::Prediction;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> GroundingError + '_ {
    move |source| GroundingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `<dir>/<image_id>.json` and return its path.
pub fn write_prediction(dir: &Path, prediction: &Prediction) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", prediction.image_id()));
    let json = serde_json::to_string_pretty(prediction)?;
    fs::write(&path, json).map_err(io_error(&path))?;
    info!(
        path = %path.display(),
        boxes = prediction.bounding_boxes().len(),
        "exported prediction"
    );
    Ok(path)
}

/// Write every prediction into `dir`, creating it if needed.
pub fn write_predictions(dir: &Path, predictions: &[Prediction]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    predictions
        .iter()
        .map(|prediction| write_prediction(dir, prediction))
        .collect()
}

pub fn read_prediction(path: &Path) -> Result<Prediction> {
    let json = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(serde_json::from_str(&json)?)
}
