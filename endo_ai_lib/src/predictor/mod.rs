pub mod classifier;
pub mod dataset;
pub mod labels;
pub mod onnx;
pub mod postprocess;

pub use classifier::{BatchPredictor, Classifier, FramePrediction, PredictionVector};
pub use dataset::InferenceDataset;
pub use onnx::{OnnxClassifier, OutputActivation};
pub use postprocess::{Sequence, SequenceMap};
