use std::{collections::BTreeMap, path::PathBuf};

use eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use iter_chunks::IterChunks;
use ndarray::{Array2, Array3, Array4, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::InferenceConfig,
    crop::CropRect,
    error::PipelineError,
    predictor::dataset::InferenceDataset,
};

/// Label name to probability for a single frame.
pub type PredictionVector = BTreeMap<String, f32>;

/// Label name to probability rounded for reports.
pub type ReadablePrediction = BTreeMap<String, f32>;

/// A trained multi-label model.
///
/// `predict_batch` receives `(batch, 3, height, width)` normalized samples and
/// returns `(batch, labels().len())` probabilities in `[0, 1]`. Rows must not
/// depend on the other samples in the batch.
pub trait BatchPredictor {
    fn labels(&self) -> &[String];

    fn predict_batch(&mut self, batch: Array4<f32>) -> Result<Array2<f32>>;
}

/// Raw per-frame record written next to the readable predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePrediction {
    pub path: PathBuf,
    pub predictions: PredictionVector,
}

pub struct Classifier<M> {
    model: M,
    config: InferenceConfig,
    verbose: bool,
}

impl<M: BatchPredictor> Classifier<M> {
    pub fn new(model: M, config: InferenceConfig, verbose: bool) -> Self {
        Self {
            model,
            config,
            verbose,
        }
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs the model over every frame, returning one vector per path in input order.
    pub fn pipe(
        &mut self,
        paths: &[PathBuf],
        crops: &[CropRect],
        batch_size: usize,
    ) -> Result<Vec<PredictionVector>> {
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch size must be at least 1".into()).into());
        }

        let dataset = InferenceDataset::new(paths.to_vec(), crops.to_vec(), self.config.clone())?;
        let total = dataset.len();
        let mut predictions = Vec::with_capacity(total);

        if dataset.is_empty() {
            return Ok(predictions);
        }

        let pb = self.create_progress_bar(total, "Predicting frames");
        let mut chunks = (0..total).chunks(batch_size);

        while let Some(chunk) = chunks.next() {
            let indices: Vec<usize> = chunk.collect();
            let batch = load_batch(&dataset, &indices)?;
            debug!(
                "Batch {}..={} shape {:?}",
                indices[0],
                indices[indices.len() - 1],
                batch.shape()
            );

            let output = self.model.predict_batch(batch)?;
            predictions.extend(self.to_prediction_vectors(&output, indices.len())?);
            pb.inc(indices.len() as u64);
        }

        pb.finish_with_message("Inference complete");
        info!("Predicted {} frames", predictions.len());

        Ok(predictions)
    }

    fn to_prediction_vectors(
        &self,
        output: &Array2<f32>,
        batch: usize,
    ) -> Result<Vec<PredictionVector>> {
        let labels = self.model.labels();
        if output.dim() != (batch, labels.len()) {
            return Err(PipelineError::ModelOutputShape {
                got: output.shape().to_vec(),
                batch,
                labels: labels.len(),
            }
            .into());
        }

        output
            .axis_iter(Axis(0))
            .map(|row| {
                labels
                    .iter()
                    .zip(row.iter())
                    .map(|(label, &value)| -> Result<(String, f32)> {
                        if !(0.0..=1.0).contains(&value) {
                            return Err(PipelineError::ModelOutputValue {
                                label: label.clone(),
                                value,
                            }
                            .into());
                        }
                        Ok((label.clone(), value))
                    })
                    .collect::<Result<PredictionVector>>()
            })
            .collect()
    }

    /// Rounds every probability to three decimals for human consumption.
    pub fn readable(&self, prediction: &PredictionVector) -> ReadablePrediction {
        prediction
            .iter()
            .map(|(label, &value)| (label.clone(), (value * 1000.0).round() / 1000.0))
            .collect()
    }

    pub fn get_prediction_dict(
        &self,
        predictions: &[PredictionVector],
        paths: &[PathBuf],
    ) -> Result<Vec<FramePrediction>> {
        if predictions.len() != paths.len() {
            return Err(eyre::eyre!(
                "Got {} predictions for {} paths",
                predictions.len(),
                paths.len()
            ));
        }

        Ok(paths
            .iter()
            .zip(predictions)
            .map(|(path, prediction)| FramePrediction {
                path: path.clone(),
                predictions: prediction.clone(),
            })
            .collect())
    }

    fn create_progress_bar(&self, total: usize, message: &'static str) -> ProgressBar {
        if !self.verbose {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {prefix} {wide_bar} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb
    }
}

/// Loads the samples of one batch in parallel and stacks them in index order.
fn load_batch(dataset: &InferenceDataset, indices: &[usize]) -> Result<Array4<f32>> {
    let samples = indices
        .par_iter()
        .map(|&i| dataset.get(i))
        .collect::<Result<Vec<Array3<f32>>>>()?;

    let views: Vec<_> = samples.iter().map(|s| s.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| eyre::eyre!("Stacking batch failed: {}", e))
}
