// ============================================================
// Layer 4 - Augmentation Pipeline
// ============================================================
// Stochastic transforms applied to TRAINING samples only.
// Validation and inference go straight through Preprocessor.
//
// Order of operations (all randomness drawn from one RNG):
//
//   resize to resize_to x resize_to   (256 by default)
//       │
//       ▼
//   random resized crop → image_size  (scale 0.8..1.0, ratio 3/4..4/3)
//       │
//       ▼
//   horizontal flip (p = 0.5), vertical flip (p = 0.1)
//       │
//       ▼
//   rotation ±20° and translation ±5% in one bilinear warp
//       │
//       ▼
//   brightness / contrast jitter (±10%)
//       │
//       ▼
//   Preprocessor::to_chw              (normalise, CHW layout)
//
// Determinism: `transform_rng(seed, fold, epoch, sample)` keys a
// ChaCha stream on all four values, so replaying a run replays
// every transform exactly, while each epoch still sees fresh
// randomness.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::Preprocessor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Square size images are resized to before cropping
    pub resize_to: u32,

    /// Fraction of the image area kept by the random crop
    pub crop_scale: (f32, f32),

    /// Aspect-ratio range of the random crop
    pub crop_ratio: (f32, f32),

    /// Probability of a left-right mirror
    pub horizontal_flip: f32,

    /// Probability of an upside-down mirror
    pub vertical_flip: f32,

    pub max_rotation_degrees: f32,

    /// Maximum shift as a fraction of width / height
    pub max_translate: f32,

    /// Brightness factor is drawn from 1 ± brightness
    pub brightness: f32,

    /// Contrast factor is drawn from 1 ± contrast
    pub contrast: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            resize_to: 256,
            crop_scale: (0.8, 1.0),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            horizontal_flip: 0.5,
            vertical_flip: 0.1,
            max_rotation_degrees: 20.0,
            max_translate: 0.05,
            brightness: 0.1,
            contrast: 0.1,
        }
    }
}

impl AugmentConfig {
    /// A configuration whose transforms leave a square image unchanged
    /// apart from the final resize.
    pub fn identity(resize_to: u32) -> Self {
        Self {
            resize_to,
            crop_scale: (1.0, 1.0),
            crop_ratio: (1.0, 1.0),
            horizontal_flip: 0.0,
            vertical_flip: 0.0,
            max_rotation_degrees: 0.0,
            max_translate: 0.0,
            brightness: 0.0,
            contrast: 0.0,
        }
    }
}

/// RNG for one sample in one epoch of one fold.
pub fn transform_rng(seed: u64, fold: usize, epoch: usize, sample: usize) -> ChaCha8Rng {
    let mut key = [0u8; 32];
    key[0..8].copy_from_slice(&seed.to_le_bytes());
    key[8..16].copy_from_slice(&(fold as u64).to_le_bytes());
    key[16..24].copy_from_slice(&(epoch as u64).to_le_bytes());
    key[24..32].copy_from_slice(&(sample as u64).to_le_bytes());
    ChaCha8Rng::from_seed(key)
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
    preprocessor: Preprocessor,
}

impl Augmenter {
    pub fn new(config: AugmentConfig, preprocessor: Preprocessor) -> Self {
        Self {
            config,
            preprocessor,
        }
    }

    /// Apply one randomly drawn transform; output is image_size square.
    pub fn augment<R: Rng>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        let cfg = &self.config;
        let base = if image.dimensions() == (cfg.resize_to, cfg.resize_to) {
            image.clone()
        } else {
            imageops::resize(image, cfg.resize_to, cfg.resize_to, FilterType::Triangle)
        };

        let mut out = self.random_resized_crop(&base, rng);

        if rng.gen::<f32>() < cfg.horizontal_flip {
            imageops::flip_horizontal_in_place(&mut out);
        }
        if rng.gen::<f32>() < cfg.vertical_flip {
            imageops::flip_vertical_in_place(&mut out);
        }

        let angle = uniform(rng, -cfg.max_rotation_degrees, cfg.max_rotation_degrees);
        let (w, h) = out.dimensions();
        let dx = uniform(rng, -cfg.max_translate, cfg.max_translate) * w as f32;
        let dy = uniform(rng, -cfg.max_translate, cfg.max_translate) * h as f32;
        if angle != 0.0 || dx != 0.0 || dy != 0.0 {
            out = affine_warp(&out, angle.to_radians(), dx, dy);
        }

        let brightness = uniform(rng, 1.0 - cfg.brightness, 1.0 + cfg.brightness);
        let contrast = uniform(rng, 1.0 - cfg.contrast, 1.0 + cfg.contrast);
        if brightness != 1.0 || contrast != 1.0 {
            color_jitter(&mut out, brightness, contrast);
        }

        out
    }

    /// Augment then normalise into the CHW layout used by every model.
    pub fn augment_tensor<R: Rng>(&self, image: &RgbImage, rng: &mut R) -> Vec<f32> {
        self.preprocessor.to_chw(&self.augment(image, rng))
    }

    fn random_resized_crop<R: Rng>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        let size = self.preprocessor.image_size;
        let (w, h) = image.dimensions();
        let area = (w * h) as f32;
        let (scale_lo, scale_hi) = self.config.crop_scale;
        let (log_lo, log_hi) = (self.config.crop_ratio.0.ln(), self.config.crop_ratio.1.ln());

        for _ in 0..10 {
            let target = area * uniform(rng, scale_lo, scale_hi);
            let aspect = uniform(rng, log_lo, log_hi).exp();
            let cw = (target * aspect).sqrt().round() as u32;
            let ch = (target / aspect).sqrt().round() as u32;

            if cw > 0 && ch > 0 && cw <= w && ch <= h {
                let x = rng.gen_range(0..=w - cw);
                let y = rng.gen_range(0..=h - ch);
                let crop = imageops::crop_imm(image, x, y, cw, ch).to_image();
                return imageops::resize(&crop, size, size, FilterType::Triangle);
            }
        }

        // No valid crop in 10 draws: fall back to the whole image
        imageops::resize(image, size, size, FilterType::Triangle)
    }
}

fn uniform<R: Rng>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Rotate about the centre by `angle` radians, then shift by (dx, dy).
/// Pixels mapped from outside the source are black.
fn affine_warp(image: &RgbImage, angle: f32, dx: f32, dy: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();

    RgbImage::from_fn(w, h, |x, y| {
        // Inverse mapping: output pixel → source coordinate
        let px = x as f32 - cx - dx;
        let py = y as f32 - cy - dy;
        let sx = cos * px + sin * py + cx;
        let sy = -sin * px + cos * py + cy;
        bilinear(image, sx, sy)
    })
}

fn bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = f32::from(p00[c]) * (1.0 - fx) + f32::from(p10[c]) * fx;
        let bottom = f32::from(p01[c]) * (1.0 - fx) + f32::from(p11[c]) * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn color_jitter(image: &mut RgbImage, brightness: f32, contrast: f32) {
    for pixel in image.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (f32::from(pixel[c]) * brightness).round().clamp(0.0, 255.0) as u8;
        }
    }

    // Contrast blends towards the mean grey level of the image
    let count = (image.width() * image.height()).max(1) as f32;
    let mean_grey = image
        .pixels()
        .map(|p| 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]))
        .sum::<f32>()
        / count;

    for pixel in image.pixels_mut() {
        for c in 0..3 {
            let v = (f32::from(pixel[c]) - mean_grey) * contrast + mean_grey;
            pixel[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8]))
    }

    fn augmenter(config: AugmentConfig, size: u32) -> Augmenter {
        Augmenter::new(config, Preprocessor::new(size))
    }

    #[test]
    fn test_output_is_network_input_size() {
        let aug = augmenter(AugmentConfig::default(), 32);
        for (w, h) in [(300, 200), (40, 90), (256, 256)] {
            let mut rng = transform_rng(42, 0, 1, 0);
            assert_eq!(aug.augment(&gradient(w, h), &mut rng).dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_same_seed_replays_same_transform() {
        let aug = augmenter(AugmentConfig::default(), 24);
        let image = gradient(64, 48);
        let a = aug.augment(&image, &mut transform_rng(7, 1, 3, 5));
        let b = aug.augment(&image, &mut transform_rng(7, 1, 3, 5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_each_epoch_draws_fresh_randomness() {
        let aug = augmenter(AugmentConfig::default(), 24);
        let image = gradient(64, 48);
        let epoch1 = aug.augment(&image, &mut transform_rng(7, 0, 1, 0));
        let epoch2 = aug.augment(&image, &mut transform_rng(7, 0, 2, 0));
        assert_ne!(epoch1, epoch2);
    }

    #[test]
    fn test_forced_horizontal_flip_mirrors() {
        let config = AugmentConfig {
            horizontal_flip: 1.0,
            ..AugmentConfig::identity(16)
        };
        let aug = augmenter(config, 16);
        let image = gradient(16, 16);
        let out = aug.augment(&image, &mut transform_rng(0, 0, 0, 0));
        assert_eq!(out, imageops::flip_horizontal(&image));
    }

    #[test]
    fn test_identity_config_keeps_square_image() {
        let aug = augmenter(AugmentConfig::identity(16), 16);
        let image = gradient(16, 16);
        assert_eq!(aug.augment(&image, &mut transform_rng(1, 2, 3, 4)), image);
    }

    #[test]
    fn test_tensor_layout_matches_preprocessor() {
        let pre = Preprocessor::new(20);
        let aug = Augmenter::new(AugmentConfig::default(), pre);
        let tensor = aug.augment_tensor(&gradient(50, 50), &mut transform_rng(3, 0, 0, 0));
        assert_eq!(tensor.len(), pre.tensor_len());
    }
}
