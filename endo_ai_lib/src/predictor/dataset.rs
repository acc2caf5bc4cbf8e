use std::path::{Path, PathBuf};

use eyre::Result;
use image::{ImageReader, RgbImage};
use ndarray::{Array3, ArrayView3};

use crate::{
    config::InferenceConfig,
    crop::{CropRect, Cropper},
    error::PipelineError,
};

/// Normalized, cropped samples in CHW layout, one per frame path.
#[derive(Debug)]
pub struct InferenceDataset {
    paths: Vec<PathBuf>,
    crops: Vec<CropRect>,
    cropper: Cropper,
    config: InferenceConfig,
}

impl InferenceDataset {
    pub fn new(paths: Vec<PathBuf>, crops: Vec<CropRect>, config: InferenceConfig) -> Result<Self> {
        if paths.len() != crops.len() {
            return Err(PipelineError::LengthMismatch {
                paths: paths.len(),
                crops: crops.len(),
            }
            .into());
        }
        config.validate()?;

        Ok(Self {
            paths,
            crops,
            cropper: Cropper::new(),
            config,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Sample `index` as a `(3, size_y, size_x)` tensor.
    pub fn get(&self, index: usize) -> Result<Array3<f32>> {
        let (path, crop) = self
            .paths
            .get(index)
            .zip(self.crops.get(index))
            .ok_or(PipelineError::IndexOutOfRange {
                index,
                len: self.len(),
            })?;

        let image = load_rgb(path)?;
        let cropped = self
            .cropper
            .crop(&image, *crop, self.config.target_size())?;

        Ok(normalize(&cropped, &self.config))
    }
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    let read_error = |source| PipelineError::ImageRead {
        path: path.to_owned(),
        source,
    };

    let image = ImageReader::open(path)
        .map_err(|e| read_error(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| read_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(read_error)?;

    Ok(image.to_rgb8())
}

/// `(pixel / 255 - mean) / std` per channel, HWC image to CHW tensor.
pub fn normalize(image: &RgbImage, config: &InferenceConfig) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
        let value = image.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
        (value - config.mean[c]) / config.std[c]
    })
}

/// Inverse of [`normalize`], for looking at what the model was fed.
pub fn denormalize(sample: ArrayView3<f32>, config: &InferenceConfig) -> Result<RgbImage> {
    let (channels, height, width) = sample.dim();
    if channels != 3 {
        return Err(eyre::eyre!("Expected 3 channels (RGB), got {}", channels));
    }

    Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let pixel = [0, 1, 2].map(|c| {
            let value = sample[[c, y as usize, x as usize]] * config.std[c] + config.mean[c];
            (value * 255.0).round().clamp(0.0, 255.0) as u8
        });
        image::Rgb(pixel)
    }))
}
