pub mod config;
pub mod crop;
pub mod error;
pub mod frames;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod predictor;
