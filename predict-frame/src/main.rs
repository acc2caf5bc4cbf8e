use clap::{ArgAction, Parser};
use endo_ai_lib::{
    config::{InferenceConfig, parse_config_file},
    crop::CropRect,
    frames::{discover_frames, limit_frames},
    logging::init_logging,
    predictor::{
        Classifier, InferenceDataset, OnnxClassifier, OutputActivation,
        dataset::denormalize,
        labels::{default_labels, load_labels},
    },
};
use eyre::OptionExt;
use std::path::PathBuf;
use tracing::info;

/// Predict a handful of frames and save the model's view of the first one
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with the frames (frame_<index>.<ext>)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    frames: PathBuf,

    /// Path to the ONNX multi-label classification model
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    model: PathBuf,

    /// Label vocabulary in model output order (default: colonoscopy labels)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    labels: Option<PathBuf>,

    /// Whether the model emits probabilities or logits
    #[arg(long, default_value = "probabilities")]
    activation: OutputActivation,

    /// JSON config file, only its normalization and input size are used
    #[arg(long, value_parser = clap::value_parser!(PathBuf))]
    config: Option<PathBuf>,

    /// Crop string top:bottom:left:right
    #[arg(short, long, default_value = "0:1080:550:1900")]
    crop: CropRect,

    /// Suffix of the image files
    #[arg(long, default_value = ".jpg")]
    img_suffix: String,

    /// Maximum number of frames to predict
    #[arg(short = 'n', long, default_value_t = 10)]
    max_frames: usize,

    /// Where to save the de-normalized first sample
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    sample: Option<PathBuf>,

    /// Skip GPU acceleration
    #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
    cpu: bool,

    /// Enable verbose output
    #[arg(short, long, action = ArgAction::SetTrue, default_value_t = false)]
    verbose: bool,
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => parse_config_file(path)?.dataset,
        None => InferenceConfig::default(),
    };
    config.validate()?;
    let frames = limit_frames(
        discover_frames(&args.frames, &args.img_suffix)?,
        Some(args.max_frames),
    );
    let paths: Vec<PathBuf> = frames.iter().map(|f| f.path.clone()).collect();
    let crops = vec![args.crop; paths.len()];

    let first = frames.first().ok_or_eyre("No frames selected")?;
    info!("First image: {}, index: {}", first.path.display(), first.index);

    if let Some(sample_path) = &args.sample {
        let dataset = InferenceDataset::new(paths.clone(), crops.clone(), config.clone())?;
        let sample = dataset.get(0)?;
        info!("Sample shape: {:?}", sample.shape());
        denormalize(sample.view(), &config)?.save(sample_path)?;
        info!("Sample saved to {}", sample_path.display());
    }

    let labels = match &args.labels {
        Some(path) => load_labels(path)?,
        None => default_labels(),
    };
    let model = OnnxClassifier::new(&args.model, labels, args.cpu, args.activation)?;
    let mut classifier = Classifier::new(model, config, args.verbose);

    let predictions = classifier.pipe(&paths, &crops, paths.len().max(1))?;
    let readable: Vec<_> = predictions.iter().map(|p| classifier.readable(p)).collect();

    println!("{}", serde_json::to_string_pretty(&readable)?);

    Ok(())
}
