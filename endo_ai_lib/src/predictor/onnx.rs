use eyre::{Result, eyre};
use ndarray::{Array2, Array4};
use ort::{
    execution_providers::ExecutionProviderDispatch,
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

#[cfg(target_os = "macos")]
use ort::execution_providers::CoreMLExecutionProvider;

#[cfg(windows)]
use ort::execution_providers::{
    CUDAExecutionProvider, DirectMLExecutionProvider, TensorRTExecutionProvider,
};

#[cfg(all(unix, not(target_os = "macos")))]
use ort::execution_providers::{CUDAExecutionProvider, ROCmExecutionProvider};

use clap::ValueEnum;
use std::path::Path;
use tracing::info;

use crate::{error::PipelineError, predictor::classifier::BatchPredictor};

/// How the model output is turned into probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputActivation {
    /// The exported graph already ends in a sigmoid.
    Probabilities,
    /// The graph emits logits; apply a sigmoid per label.
    Logits,
}

/// Multi-label classifier exported to ONNX.
#[derive(Debug)]
pub struct OnnxClassifier {
    pub session: Session,
    labels: Vec<String>,
    activation: OutputActivation,
}

impl OnnxClassifier {
    pub fn new(
        model_path: &Path,
        labels: Vec<String>,
        use_cpu: bool,
        activation: OutputActivation,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(PipelineError::InvalidConfig("label vocabulary is empty".into()).into());
        }

        let providers = if use_cpu {
            info!("GPU acceleration disabled, running on CPU");
            vec![]
        } else {
            accelerated_providers()
        };

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .with_execution_providers(providers)?
            .commit_from_file(model_path)
            .map_err(|e| eyre!("Failed to load classifier {}: {}", model_path.display(), e))?;

        let outputs = session.outputs.len();
        if outputs != 1 {
            return Err(eyre!(
                "Classifier {} must have exactly one output, found {outputs}",
                model_path.display()
            ));
        }
        info!(
            "Loaded model {} with {} labels",
            model_path.display(),
            labels.len()
        );

        Ok(Self {
            session,
            labels,
            activation,
        })
    }
}

/// GPU backends to try before ort falls back to the CPU.
fn accelerated_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();

    #[cfg(target_os = "macos")]
    {
        providers.push(CoreMLExecutionProvider::default().build());
    }

    #[cfg(windows)]
    {
        providers.push(CUDAExecutionProvider::default().build());
        providers.push(TensorRTExecutionProvider::default().build());
        providers.push(DirectMLExecutionProvider::default().build());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        providers.push(ROCmExecutionProvider::default().build());
        providers.push(CUDAExecutionProvider::default().build());
    }

    providers
}

impl BatchPredictor for OnnxClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict_batch(&mut self, batch: Array4<f32>) -> Result<Array2<f32>> {
        let batch_size = batch.shape()[0];
        let input_name = self.session.inputs[0].name.clone();
        let output_name = self.session.outputs[0].name.clone();

        let input_tensor = Tensor::from_array(batch)?;
        let outputs = self.session.run(vec![(&input_name, input_tensor)])?;
        let (_, data) = outputs
            .get(&output_name)
            .ok_or_else(|| eyre!("Output not found"))?
            .try_extract_tensor::<f32>()?;

        if data.len() != batch_size * self.labels.len() {
            return Err(PipelineError::ModelOutputShape {
                got: vec![data.len()],
                batch: batch_size,
                labels: self.labels.len(),
            }
            .into());
        }

        let logits = Array2::from_shape_vec((batch_size, self.labels.len()), data.to_vec())?;
        Ok(match self.activation {
            OutputActivation::Probabilities => logits,
            OutputActivation::Logits => logits.mapv(sigmoid),
        })
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
