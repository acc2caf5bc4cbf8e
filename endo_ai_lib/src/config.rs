use std::{fs, path::Path};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::{crop::CropRect, error::PipelineError};

/// Normalization statistics and model input size for the sample provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub size_x: u32,
    pub size_y: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            mean: [0.452_112_23, 0.271_396_44, 0.192_649_49],
            std: [0.314_180_97, 0.210_880_19, 0.160_594_52],
            size_x: 716,
            size_y: 716,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size_x == 0 || self.size_y == 0 {
            return Err(PipelineError::InvalidTargetSize {
                width: self.size_x,
                height: self.size_y,
            }
            .into());
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid(format!("std must be positive, got {:?}", self.std)));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(invalid(format!("mean must be finite, got {:?}", self.mean)));
        }
        Ok(())
    }

    /// Target `(width, height)` handed to the cropper.
    pub fn target_size(&self) -> (u32, u32) {
        (self.size_x, self.size_y)
    }
}

/// Parameters of the smoothing / thresholding / sequence extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub fps: f64,
    pub smooth_window_s: f64,
    pub threshold: f32,
    /// Sequences shorter than this are dropped. 0 keeps everything.
    pub min_seq_len_s: f64,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            fps: 50.0,
            smooth_window_s: 1.0,
            threshold: 0.5,
            min_seq_len_s: 0.0,
        }
    }
}

impl PostprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(invalid(format!("fps must be positive, got {}", self.fps)));
        }
        if !self.smooth_window_s.is_finite() || self.smooth_window_s <= 0.0 {
            return Err(invalid(format!(
                "smoothing window must be positive, got {}s",
                self.smooth_window_s
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(invalid(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !self.min_seq_len_s.is_finite() || self.min_seq_len_s < 0.0 {
            return Err(invalid(format!(
                "minimum sequence length must be >= 0, got {}s",
                self.min_seq_len_s
            )));
        }
        Ok(())
    }

    pub fn min_seq_len_frames(&self) -> usize {
        (self.min_seq_len_s * self.fps).round() as usize
    }
}

/// Everything a prediction run needs apart from the model and the frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub dataset: InferenceConfig,
    pub postprocess: PostprocessConfig,
    pub crop: CropRect,
    pub batch_size: usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            dataset: InferenceConfig::default(),
            postprocess: PostprocessConfig::default(),
            crop: CropRect::default(),
            batch_size: 16,
        }
    }
}

impl PredictConfig {
    pub fn validate(&self) -> Result<()> {
        self.dataset.validate()?;
        self.postprocess.validate()?;
        self.crop.validate()?;
        if self.batch_size == 0 {
            return Err(invalid("batch size must be at least 1".to_owned()));
        }
        Ok(())
    }
}

pub fn parse_config_file(json_path: &Path) -> Result<PredictConfig> {
    let json_data = fs::read_to_string(json_path)
        .wrap_err_with(|| format!("Failed to read config {}", json_path.display()))?;
    let config: PredictConfig = serde_json::from_str(&json_data)
        .wrap_err_with(|| format!("Failed to parse config {}", json_path.display()))?;
    Ok(config)
}

fn invalid(reason: String) -> eyre::Report {
    PipelineError::InvalidConfig(reason).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_error(result: Result<()>) -> bool {
        matches!(
            result.unwrap_err().downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig(_))
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        PredictConfig::default().validate().unwrap();
    }

    #[test]
    fn test_postprocess_validation() {
        let base = PostprocessConfig::default();

        assert!(config_error(
            PostprocessConfig { fps: 0.0, ..base.clone() }.validate()
        ));
        assert!(config_error(
            PostprocessConfig { smooth_window_s: -1.0, ..base.clone() }.validate()
        ));
        assert!(config_error(
            PostprocessConfig { threshold: 1.5, ..base.clone() }.validate()
        ));
        assert!(config_error(
            PostprocessConfig { min_seq_len_s: f64::NAN, ..base.clone() }.validate()
        ));

        PostprocessConfig { threshold: 1.0, ..base.clone() }
            .validate()
            .unwrap();
        PostprocessConfig { threshold: 0.0, ..base }.validate().unwrap();
    }

    #[test]
    fn test_min_seq_len_frames() {
        let config = PostprocessConfig {
            min_seq_len_s: 0.5,
            ..Default::default()
        };
        assert_eq!(config.min_seq_len_frames(), 25);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "crop": [0, 100, 10, 90], "postprocess": { "fps": 25 } }"#,
        )
        .unwrap();

        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.crop, CropRect::new(0, 100, 10, 90));
        assert_eq!(config.postprocess.fps, 25.0);
        assert_eq!(config.postprocess.threshold, 0.5);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.dataset, InferenceConfig::default());
    }

    #[test]
    fn test_dataset_section_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "dataset": { "mean": [0.5, 0.5, 0.5], "std": [0.25, 0.25, 0.25], "size_x": 224, "size_y": 224 },
                "crop": { "top": 0, "bottom": 100, "left": 10, "right": 90 }
            }"#,
        )
        .unwrap();

        let config = parse_config_file(&path).unwrap();
        config.dataset.validate().unwrap();
        assert_eq!(config.dataset.target_size(), (224, 224));
        assert_eq!(config.dataset.std, [0.25; 3]);
        assert_eq!(config.crop, CropRect::new(0, 100, 10, 90));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = PredictConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config_error(config.validate()));
    }
}
