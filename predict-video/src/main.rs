use clap::{ArgAction, Parser};
use endo_ai_lib::{
    config::{PredictConfig, parse_config_file},
    crop::CropRect,
    frames::{discover_frames, frame_directories, limit_frames},
    logging::init_logging,
    output::OutputPaths,
    pipeline::run_prediction,
    predictor::{
        Classifier, OnnxClassifier, OutputActivation,
        labels::{default_labels, load_labels},
    },
};
use eyre::OptionExt;
use std::path::{Path, PathBuf, absolute};
use tracing::info;

/// Predict frame labels of a video and extract per-label sequences
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory with the extracted frames (frame_<index>.<ext>)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf), required_unless_present = "frames_root")]
    frames: Option<PathBuf>,

    /// Directory with one frame directory per video, each predicted in turn
    #[arg(long, value_parser = clap::value_parser!(PathBuf), conflicts_with_all = ["frames", "video_id"])]
    frames_root: Option<PathBuf>,

    /// Path to the ONNX multi-label classification model
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    model: PathBuf,

    /// Label vocabulary in model output order, JSON array or one per line (default: colonoscopy labels)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    labels: Option<PathBuf>,

    /// Whether the model emits probabilities or logits
    #[arg(long, default_value = "probabilities")]
    activation: OutputActivation,

    /// Directory for the JSON outputs (default: the frame directory's parent)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    output: Option<PathBuf>,

    /// Id used in the output file names (default: the frame directory name)
    #[arg(long)]
    video_id: Option<String>,

    /// JSON config file, command line values take priority
    #[arg(long, value_parser = clap::value_parser!(PathBuf))]
    config: Option<PathBuf>,

    /// Crop string top:bottom:left:right (e.g. 0:1080:550:1900)
    #[arg(short, long)]
    crop: Option<CropRect>,

    /// Frames per second of the source video
    #[arg(long)]
    fps: Option<f64>,

    /// Size of the smoothing window in seconds
    #[arg(long = "smooth-window-size-s")]
    smooth_window_s: Option<f64>,

    /// Threshold for binarization
    #[arg(long = "binarize-threshold")]
    threshold: Option<f32>,

    /// Drop sequences shorter than this many seconds
    #[arg(long = "min-seq-len-s")]
    min_seq_len_s: Option<f64>,

    /// Frames per inference batch
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    batch_size: Option<u32>,

    /// Suffix of the image files
    #[arg(long, default_value = ".jpg")]
    img_suffix: String,

    /// Only predict the first --n-test-frames frames
    #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
    test_run: bool,

    /// Number of frames used by --test-run
    #[arg(long, default_value_t = 100)]
    n_test_frames: usize,

    /// Skip GPU acceleration
    #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
    cpu: bool,

    /// Enable verbose output
    #[arg(short, long, action = ArgAction::SetTrue, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn resolve_config(&self) -> eyre::Result<PredictConfig> {
        let mut config = match &self.config {
            Some(path) => parse_config_file(path)?,
            None => PredictConfig::default(),
        };

        if let Some(crop) = self.crop {
            config.crop = crop;
        }
        if let Some(fps) = self.fps {
            config.postprocess.fps = fps;
        }
        if let Some(window) = self.smooth_window_s {
            config.postprocess.smooth_window_s = window;
        }
        if let Some(threshold) = self.threshold {
            config.postprocess.threshold = threshold;
        }
        if let Some(min_len) = self.min_seq_len_s {
            config.postprocess.min_seq_len_s = min_len;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size as usize;
        }

        config.validate()?;
        Ok(config)
    }
}

fn directory_name(dir: &Path) -> eyre::Result<String> {
    Ok(dir
        .file_name()
        .ok_or_eyre("No directory name")?
        .to_str()
        .ok_or_eyre("Invalid UTF-8 in frame directory")?
        .to_owned())
}

fn predict_video(
    classifier: &mut Classifier<OnnxClassifier>,
    args: &Args,
    config: &PredictConfig,
    frames_dir: &Path,
    video_id: &str,
) -> eyre::Result<()> {
    let output_dir = match &args.output {
        Some(dir) => dir.clone(),
        None => frames_dir
            .parent()
            .ok_or_eyre("Frame directory has no parent")?
            .to_owned(),
    };

    let frames = discover_frames(frames_dir, &args.img_suffix)?;
    let frames = limit_frames(frames, args.test_run.then_some(args.n_test_frames));

    let run = run_prediction(classifier, &frames, config)?;
    OutputPaths::for_video(&output_dir, video_id).write_run(&run)?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.resolve_config()?;

    let videos = match (&args.frames_root, &args.frames) {
        (Some(root), _) => frame_directories(&absolute(root)?)?
            .into_iter()
            .map(|dir| -> eyre::Result<(String, PathBuf)> { Ok((directory_name(&dir)?, dir)) })
            .collect::<eyre::Result<Vec<_>>>()?,
        (None, Some(frames)) => {
            let dir = absolute(frames)?;
            let video_id = match &args.video_id {
                Some(id) => id.clone(),
                None => directory_name(&dir)?,
            };
            vec![(video_id, dir)]
        }
        (None, None) => eyre::bail!("Either --frames or --frames-root is required"),
    };

    let labels = match &args.labels {
        Some(path) => load_labels(path)?,
        None => default_labels(),
    };

    info!(
        "{} video(s): model {}, crop {}, fps {}, smoothing {}s, threshold {}",
        videos.len(),
        args.model.display(),
        config.crop,
        config.postprocess.fps,
        config.postprocess.smooth_window_s,
        config.postprocess.threshold
    );

    let model = OnnxClassifier::new(&args.model, labels, args.cpu, args.activation)?;
    let mut classifier = Classifier::new(model, config.dataset.clone(), args.verbose);

    for (video_id, frames_dir) in &videos {
        info!("Video {video_id}: {}", frames_dir.display());
        predict_video(&mut classifier, &args, &config, frames_dir, video_id)?;
    }

    Ok(())
}
