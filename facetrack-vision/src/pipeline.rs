use image::{imageops::FilterType, DynamicImage};
use log::debug;
use thiserror::Error;

use crate::face::Embedding;

/// Side length of the square grayscale grid a template is sampled from
pub const TEMPLATE_SIZE: u32 = 32;

/// Minimum luminance standard deviation for a frame to count as containing a face
pub const MIN_CONTRAST: f32 = 4.0;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("no face detected in image (contrast {contrast:.2}, need {min:.2})")]
    NoFace { contrast: f32, min: f32 },
}

/// Full pipeline: decode → sample → encode
#[derive(Debug, Clone)]
pub struct Pipeline {
    size: u32,
    min_contrast: f32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_params(TEMPLATE_SIZE, MIN_CONTRAST)
    }

    pub fn with_params(size: u32, min_contrast: f32) -> Self {
        Self {
            size: size.max(1),
            min_contrast,
        }
    }

    pub fn template_len(&self) -> usize {
        (self.size * self.size) as usize
    }

    /// Decode still-image bytes (format sniffed from content)
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, VisionError> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Process an image and return its template embedding.
    ///
    /// The frame is resampled to a fixed grayscale grid and mean-centred, so a uniform
    /// brightness shift between captures does not move the template. Frames whose
    /// luminance is too flat to carry a face are rejected with [`VisionError::NoFace`].
    pub fn process_image(&self, img: &DynamicImage) -> Result<Embedding, VisionError> {
        let gray = img
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_luma8();

        let values: Vec<f32> = gray.as_raw().iter().map(|&p| p as f32).collect();
        let count = values.len() as f32;
        let mean = values.iter().sum::<f32>() / count;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / count;
        let contrast = variance.sqrt();

        debug!("frame sampled: mean {:.2}, contrast {:.2}", mean, contrast);

        let no_face = VisionError::NoFace {
            contrast,
            min: self.min_contrast,
        };
        if contrast < self.min_contrast {
            return Err(no_face);
        }

        let centred = values.into_iter().map(|v| v - mean).collect();
        Embedding::from_raw(centred).ok_or(no_face)
    }

    /// Decode and process in one step (convenience method)
    pub fn extract_embedding(&self, bytes: &[u8]) -> Result<Embedding, VisionError> {
        let img = self.decode(bytes)?;
        self.process_image(&img)
    }
}
