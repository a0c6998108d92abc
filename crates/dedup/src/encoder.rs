//! Visual embedding encoder.
//!
//! One frozen CLIP-style image encoder loaded once at startup and shared
//! read-only across the pipeline. The trait is the seam: production uses the
//! candle-backed [`ClipEncoder`], tests substitute deterministic stubs.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip;
use image::{imageops, DynamicImage, RgbImage};
use std::path::Path;

use dejavu_core::constants::{CHANNEL_MEAN, CHANNEL_STD, EMBEDDING_DIM, ENCODER_IMAGE_SIDE};
use dejavu_core::{Error, Result};

/// A frozen image encoder: image in, unit-norm embedding out.
pub trait VisionEncoder: Send + Sync {
    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Encode one image into a unit-norm embedding.
    fn encode(&self, image: &DynamicImage) -> Result<Vec<f32>>;
}

/// Resize with aspect-preserving padding to the encoder input square and
/// normalize per channel. Returns CHW floats.
pub fn preprocess(image: &DynamicImage) -> Vec<f32> {
    let side = ENCODER_IMAGE_SIDE;
    let resized = image
        .resize(side, side, imageops::FilterType::Triangle)
        .to_rgb8();

    let mut canvas = RgbImage::new(side, side);
    let x_off = (side - resized.width()) / 2;
    let y_off = (side - resized.height()) / 2;
    imageops::overlay(&mut canvas, &resized, x_off as i64, y_off as i64);

    let side = side as usize;
    let mut pixels = vec![0.0f32; 3 * side * side];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            pixels[channel * side * side + y as usize * side + x as usize] =
                (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }
    pixels
}

/// Scale a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// CLIP vision encoder running on candle.
pub struct ClipEncoder {
    model: clip::ClipModel,
    device: Device,
}

impl ClipEncoder {
    /// Load the frozen weights from a safetensors file.
    pub fn load(weights: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| Error::Inference(format!("load encoder weights: {}", e)))?
        };
        let config = clip::ClipConfig::vit_base_patch32();
        let model = clip::ClipModel::new(vb, &config)
            .map_err(|e| Error::Inference(format!("build encoder: {}", e)))?;
        Ok(Self { model, device })
    }
}

impl VisionEncoder for ClipEncoder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let side = ENCODER_IMAGE_SIDE as usize;
        let pixels = preprocess(image);
        let input = Tensor::from_vec(pixels, (1, 3, side, side), &self.device)
            .map_err(|e| Error::Inference(format!("build input tensor: {}", e)))?;

        let features = self
            .model
            .get_image_features(&input)
            .map_err(|e| Error::Inference(format!("encoder forward: {}", e)))?;
        let features = features
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::Inference(format!("read encoder output: {}", e)))?;

        Ok(l2_normalize(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_padding() {
        // A wide image letterboxes vertically; the output is always a full
        // normalized CHW square.
        let image = DynamicImage::new_rgb8(400, 100);
        let pixels = preprocess(&image);
        let side = ENCODER_IMAGE_SIDE as usize;
        assert_eq!(pixels.len(), 3 * side * side);

        // Top-left corner is padding (black), normalized per channel.
        let expected = (0.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        assert!((pixels[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);

        let zero = l2_normalize(vec![0.0, 0.0]);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
