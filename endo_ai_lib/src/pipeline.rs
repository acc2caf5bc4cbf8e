use std::path::PathBuf;

use eyre::Result;
use tracing::info;

use crate::{
    config::PredictConfig,
    frames::Frame,
    predictor::{
        BatchPredictor, Classifier, FramePrediction,
        classifier::ReadablePrediction,
        postprocess::{SequenceMap, extract_sequences},
    },
};

/// Everything produced for one video.
#[derive(Debug, Clone)]
pub struct PredictionRun {
    pub predictions: Vec<FramePrediction>,
    pub readable: Vec<ReadablePrediction>,
    pub sequences: SequenceMap,
}

/// Predicts every frame and turns the predictions into per-label sequences.
///
/// Sequence positions index into `frames`, not the parsed frame numbers.
pub fn run_prediction<M: BatchPredictor>(
    classifier: &mut Classifier<M>,
    frames: &[Frame],
    config: &PredictConfig,
) -> Result<PredictionRun> {
    config.validate()?;

    info!(
        "Predicting {} frames, crop {}, batch size {}",
        frames.len(),
        config.crop,
        config.batch_size
    );

    let paths: Vec<PathBuf> = frames.iter().map(|f| f.path.clone()).collect();
    let crops = vec![config.crop; paths.len()];

    let predictions = classifier.pipe(&paths, &crops, config.batch_size)?;
    let readable = predictions.iter().map(|p| classifier.readable(p)).collect();
    let sequences = extract_sequences(classifier.labels(), &predictions, &config.postprocess)?;
    let records = classifier.get_prediction_dict(&predictions, &paths)?;

    let total: usize = sequences.values().map(Vec::len).sum();
    info!("Found {total} sequences over {} labels", sequences.len());

    Ok(PredictionRun {
        predictions: records,
        readable,
        sequences,
    })
}
