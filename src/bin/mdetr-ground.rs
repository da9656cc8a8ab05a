use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mdetr_rs::export::write_predictions;
use mdetr_rs::{
    Caption, GroundingConfig, GroundingPipeline, ImageInput, NullClass, Prediction, RecordedModel,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mdetr-ground",
    about = "Ground a caption in images and export per-word box probabilities as JSON"
)]
struct Args {
    /// Recorded detector outputs (JSON) for the given images, in order.
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Image files; each file stem becomes the image id.
    #[arg(long = "image-files", visible_alias = "img", num_args = 1..)]
    image_files: Vec<PathBuf>,

    /// Caption, split on whitespace when no caption file is given.
    #[arg(long, default_value = "5 people each holding an umbrella")]
    text: String,

    /// Juman++ analysis of the caption; takes precedence over --text.
    #[arg(long)]
    caption_file: Option<PathBuf>,

    /// Backbone image encoder name.
    #[arg(long, default_value = "timm_tf_efficientnet_b3_ns")]
    backbone_name: String,

    /// Text encoder name.
    #[arg(long, default_value = "xlm-roberta-base")]
    text_encoder: String,

    #[arg(long, visible_alias = "bs", default_value_t = 32)]
    batch_size: usize,

    /// Directory to export results to.
    #[arg(long)]
    export_dir: PathBuf,

    /// Log the boxes above the display threshold with their word labels.
    #[arg(long)]
    plot: bool,

    #[arg(long, default_value_t = 0.8)]
    display_threshold: f32,

    /// Index of the "no object" logit slot; the last slot when omitted.
    #[arg(long)]
    null_class: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    fs::create_dir_all(&args.export_dir)
        .with_context(|| format!("failed to create {}", args.export_dir.display()))?;

    let images = args
        .image_files
        .iter()
        .map(|path| {
            let id = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .with_context(|| format!("no file name in {}", path.display()))?;
            let size = image::image_dimensions(path)
                .with_context(|| format!("failed to read image header of {}", path.display()))?;
            Ok(ImageInput::new(id, size, ()))
        })
        .collect::<Result<Vec<_>>>()?;
    if images.is_empty() {
        warn!("no image files given, nothing to export");
    }

    let caption = match &args.caption_file {
        Some(path) => {
            let input = fs::read_to_string(path)
                .with_context(|| format!("failed to read caption file {}", path.display()))?;
            Caption::from_jumanpp(&input)
                .with_context(|| format!("failed to parse caption file {}", path.display()))?
        }
        None => Caption::from_text("", &args.text),
    };
    info!(caption = caption.text(), words = caption.words().len(), "loaded caption");

    let model = RecordedModel::from_path(&args.model)
        .with_context(|| format!("failed to load model outputs from {}", args.model.display()))?;
    model.check_metadata(&args.backbone_name, &args.text_encoder);

    let config = GroundingConfig {
        batch_size: args.batch_size,
        display_threshold: args.display_threshold,
        null_class: args.null_class.map_or(NullClass::Last, NullClass::Index),
        ..GroundingConfig::default()
    };
    let mut pipeline = GroundingPipeline::new(model, config);
    let predictions = pipeline.predict(&images, &caption)?;

    if args.plot {
        for prediction in &predictions {
            report(prediction, pipeline.config());
        }
    }

    let paths = write_predictions(&args.export_dir, &predictions)?;
    info!(files = paths.len(), dir = %args.export_dir.display(), "done");
    Ok(())
}

fn report(prediction: &Prediction, config: &GroundingConfig) {
    for bbox in prediction.visible(config.display_threshold) {
        let label = bbox.label(prediction.words(), config.label_word_threshold);
        info!(
            image_id = prediction.image_id(),
            x = bbox.rect.x1,
            y = bbox.rect.y1,
            width = bbox.rect.width(),
            height = bbox.rect.height(),
            "{label}: {:.2}",
            bbox.confidence
        );
    }
}
