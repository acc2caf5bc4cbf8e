use std::{fmt, str::FromStr};

use eyre::{Result, eyre};
use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Fixed sub-rectangle of a frame, in pixels.
///
/// `bottom` and `right` are exclusive, so `[0, 1080, 550, 1900]` keeps rows
/// `0..1080` and columns `550..1900`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CropRectRepr", into = "[u32; 4]")]
pub struct CropRect {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Default for CropRect {
    fn default() -> Self {
        Self {
            top: 0,
            bottom: 1080,
            left: 550,
            right: 1920 - 20,
        }
    }
}

impl CropRect {
    pub fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Checks the rectangle is non-empty, independent of any image.
    pub fn validate(&self) -> Result<()> {
        if self.top >= self.bottom {
            return Err(self.invalid("top must be smaller than bottom"));
        }
        if self.left >= self.right {
            return Err(self.invalid("left must be smaller than right"));
        }
        Ok(())
    }

    /// Checks the rectangle fits inside an image of the given size.
    pub fn validate_within(&self, width: u32, height: u32) -> Result<()> {
        self.validate()?;
        if self.bottom > height || self.right > width {
            return Err(self.invalid(&format!("exceeds image bounds {width}x{height}")));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> eyre::Report {
        PipelineError::InvalidCrop {
            rect: *self,
            reason: reason.to_owned(),
        }
        .into()
    }
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.top, self.bottom, self.left, self.right
        )
    }
}

impl From<[u32; 4]> for CropRect {
    fn from(values: [u32; 4]) -> Self {
        CropRect::new(values[0], values[1], values[2], values[3])
    }
}

/// Config files may spell a crop as `[top, bottom, left, right]` or as an
/// object with named edges.
#[derive(Deserialize)]
#[serde(untagged)]
enum CropRectRepr {
    Array([u32; 4]),
    Object {
        top: u32,
        bottom: u32,
        left: u32,
        right: u32,
    },
}

impl From<CropRectRepr> for CropRect {
    fn from(repr: CropRectRepr) -> Self {
        match repr {
            CropRectRepr::Array(values) => values.into(),
            CropRectRepr::Object {
                top,
                bottom,
                left,
                right,
            } => CropRect::new(top, bottom, left, right),
        }
    }
}

impl From<CropRect> for [u32; 4] {
    fn from(rect: CropRect) -> Self {
        [rect.top, rect.bottom, rect.left, rect.right]
    }
}

impl FromStr for CropRect {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(eyre!("Crop string must be in format top:bottom:left:right"));
        }

        let rect = CropRect {
            top: parts[0].trim().parse()?,
            bottom: parts[1].trim().parse()?,
            left: parts[2].trim().parse()?,
            right: parts[3].trim().parse()?,
        };
        rect.validate()?;
        Ok(rect)
    }
}

/// Crops a frame to a [`CropRect`] and rescales it to the model input size.
#[derive(Debug, Clone, Copy)]
pub struct Cropper {
    pub filter: FilterType,
}

impl Default for Cropper {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

impl Cropper {
    pub fn new() -> Self {
        Self::default()
    }

    /// `size` is `(width, height)` of the returned image.
    pub fn crop(&self, image: &RgbImage, rect: CropRect, size: (u32, u32)) -> Result<RgbImage> {
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidTargetSize { width, height }.into());
        }
        rect.validate_within(image.width(), image.height())?;

        let cropped =
            imageops::crop_imm(image, rect.left, rect.top, rect.width(), rect.height()).to_image();

        if cropped.dimensions() == size {
            return Ok(cropped);
        }
        Ok(imageops::resize(&cropped, width, height, self.filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]))
    }

    #[test]
    fn test_parse_crop_string() {
        let rect: CropRect = "0:1080:550:1900".parse().unwrap();
        assert_eq!(rect, CropRect::new(0, 1080, 550, 1900));
        assert_eq!(rect.width(), 1350);
        assert_eq!(rect.height(), 1080);

        assert!("0:1080:550".parse::<CropRect>().is_err());
        assert!("10:5:0:4".parse::<CropRect>().is_err());
        assert!("a:b:c:d".parse::<CropRect>().is_err());
    }

    #[test]
    fn test_crop_without_resize_keeps_pixels() {
        let image = gradient(10, 8);
        let out = Cropper::new()
            .crop(&image, CropRect::new(2, 6, 3, 7), (4, 4))
            .unwrap();

        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(0, 0), &Rgb([3, 2, 7]));
        assert_eq!(out.get_pixel(3, 3), &Rgb([6, 5, 7]));
    }

    #[test]
    fn test_crop_resizes_to_target() {
        let image = gradient(64, 48);
        let out = Cropper::new()
            .crop(&image, CropRect::new(0, 48, 16, 64), (12, 20))
            .unwrap();
        assert_eq!(out.dimensions(), (12, 20));
    }

    #[test]
    fn test_crop_out_of_bounds_fails() {
        let image = gradient(10, 8);
        let err = Cropper::new()
            .crop(&image, CropRect::new(0, 9, 0, 10), (4, 4))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidCrop { .. })
        ));
    }

    #[test]
    fn test_crop_zero_target_fails() {
        let image = gradient(10, 8);
        let err = Cropper::new()
            .crop(&image, CropRect::new(0, 8, 0, 10), (0, 4))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidTargetSize { width: 0, height: 4 })
        ));
    }

    #[test]
    fn test_crop_rect_serializes_as_array() {
        let rect = CropRect::new(0, 1080, 550, 1900);
        let json = serde_json::to_string(&rect).unwrap();
        assert_eq!(json, "[0,1080,550,1900]");
        let back: CropRect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rect);
    }

    #[test]
    fn test_crop_rect_deserializes_named_edges() {
        let rect: CropRect =
            serde_json::from_str(r#"{"top": 0, "bottom": 10, "left": 2, "right": 8}"#).unwrap();
        assert_eq!(rect, CropRect::new(0, 10, 2, 8));

        assert!(serde_json::from_str::<CropRect>(r#"{"top": 0, "bottom": 10}"#).is_err());
        assert!(serde_json::from_str::<CropRect>("[0, 10, 2]").is_err());
    }
}
