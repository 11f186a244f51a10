// ============================================================
// Layer 4 - Image Preprocessor
// ============================================================
// The deterministic half of the image pipeline, shared by
// validation and inference (and by the tail of augmentation):
//
//   1. Decode bytes into RGB        (inference / collector)
//   2. Resize to image_size square  (bilinear, aspect ignored)
//   3. Scale to [0,1], subtract the ImageNet channel mean,
//      divide by the channel std
//   4. Lay out as CHW f32, the order every model expects
//
// Training images go through augment.rs first, which ends in
// `to_chw` so the tensor layout is identical on every path.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

/// Channel means of the corpus the backbone was pretrained on.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Channel standard deviations of the same corpus.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Side length of the square network input
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Preprocessor {
    pub fn new(image_size: u32) -> Self {
        Self {
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Decode raw bytes in any format the `image` crate understands.
    /// Zero-sized images are rejected as well as undecodable ones.
    pub fn decode(bytes: &[u8]) -> PipelineResult<DynamicImage> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidImage("no image data received".into()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::InvalidImage(format!("cannot decode image: {e}")))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "image has zero spatial dimension ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(image)
    }

    pub fn resize(&self, image: &RgbImage) -> RgbImage {
        if image.dimensions() == (self.image_size, self.image_size) {
            return image.clone();
        }
        image::imageops::resize(image, self.image_size, self.image_size, FilterType::Triangle)
    }

    /// Normalise an `image_size` square image into a CHW buffer.
    pub fn to_chw(&self, image: &RgbImage) -> Vec<f32> {
        debug_assert_eq!(image.dimensions(), (self.image_size, self.image_size));
        let (w, h) = image.dimensions();
        let plane = (w * h) as usize;
        let mut out = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * w as usize + x as usize;
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                out[c * plane + offset] = (value - self.mean[c]) / self.std[c];
            }
        }
        out
    }

    /// Resize + normalise: the full validation/inference transform.
    pub fn prepare(&self, image: &RgbImage) -> Vec<f32> {
        self.to_chw(&self.resize(image))
    }

    /// Number of f32 values in one prepared image.
    pub fn tensor_len(&self) -> usize {
        3 * (self.image_size as usize) * (self.image_size as usize)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn test_prepare_has_chw_length() {
        let p = Preprocessor::new(16);
        let tensor = p.prepare(&solid(40, 20, [10, 20, 30]));
        assert_eq!(tensor.len(), p.tensor_len());
    }

    #[test]
    fn test_normalises_per_channel() {
        let p = Preprocessor::new(8);
        let tensor = p.prepare(&solid(8, 8, [255, 0, 128]));
        let plane = 64;

        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        let blue = (128.0 / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];

        assert!((tensor[0] - red).abs() < 1e-5);
        assert!((tensor[plane] - green).abs() < 1e-5);
        assert!((tensor[2 * plane] - blue).abs() < 1e-5);
    }

    #[test]
    fn test_decode_round_trips_png() {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(solid(12, 7, [1, 2, 3]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let decoded = Preprocessor::decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Preprocessor::decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
        assert!(matches!(Preprocessor::decode(&[]), Err(PipelineError::InvalidImage(_))));
    }
}
