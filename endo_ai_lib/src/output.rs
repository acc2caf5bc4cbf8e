use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::Result;
use serde::Serialize;
use tracing::info;

use crate::pipeline::PredictionRun;

/// Where the three records of a prediction run are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub predictions: PathBuf,
    pub readable_predictions: PathBuf,
    pub sequences: PathBuf,
}

impl OutputPaths {
    pub fn for_video(output_dir: &Path, video_id: &str) -> Self {
        Self {
            predictions: output_dir.join(format!("predictions_{video_id}.json")),
            readable_predictions: output_dir.join(format!("readable_predictions_{video_id}.json")),
            sequences: output_dir.join(format!("sequence_predictions_{video_id}.json")),
        }
    }

    pub fn write_run(&self, run: &PredictionRun) -> Result<()> {
        write_json(&self.predictions, &run.predictions)?;
        write_json(&self.readable_predictions, &run.readable)?;
        write_json(&self.sequences, &run.sequences)?;

        info!("Predictions saved to {}", self.predictions.display());
        info!(
            "Readable predictions saved to {}",
            self.readable_predictions.display()
        );
        info!("Sequence predictions saved to {}", self.sequences.display());
        Ok(())
    }
}

pub fn write_json<'a, T: Serialize + ?Sized>(path: &'a Path, value: &T) -> Result<&'a Path> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(path)
}
