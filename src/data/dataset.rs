use burn::data::dataset::Dataset;

use crate::{data::preprocessor::Preprocessor, domain::sample::Sample};

/// One network-ready example: CHW pixels plus class index.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
    pub target: usize,
}

impl ImageItem {
    pub fn new(pixels: Vec<f32>, target: usize) -> Self {
        Self { pixels, target }
    }
}

/// Deterministically preprocessed samples, used for validation.
pub struct ImageDataset {
    items: Vec<ImageItem>,
}

impl ImageDataset {
    pub fn new(items: Vec<ImageItem>) -> Self {
        Self { items }
    }

    /// Resize + normalise every sample once, with no augmentation.
    pub fn preprocessed(samples: &[&Sample], preprocessor: &Preprocessor) -> Self {
        let items = samples
            .iter()
            .map(|s| ImageItem::new(preprocessor.prepare(&s.image), s.label.class_index()))
            .collect();
        Self::new(items)
    }

    /// Fraction of items in the most common class.
    pub fn majority_fraction(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let positives = self.items.iter().filter(|i| i.target == 0).count();
        let majority = positives.max(self.items.len() - positives);
        majority as f64 / self.items.len() as f64
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::SampleLoader;
    use crate::domain::traits::SampleSource;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_majority_fraction() {
        let items = vec![
            ImageItem::new(vec![], 0),
            ImageItem::new(vec![], 1),
            ImageItem::new(vec![], 1),
            ImageItem::new(vec![], 1),
        ];
        assert!((ImageDataset::new(items).majority_fraction() - 0.75).abs() < 1e-12);
        assert_eq!(ImageDataset::new(Vec::new()).majority_fraction(), 0.0);
    }

    #[test]
    fn test_validation_tensor_matches_inference_tensor() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("match_ready");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ball.png");
        RgbImage::from_fn(300, 200, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        })
        .save(&path)
        .unwrap();

        let preprocessor = Preprocessor::new(224);
        let samples = SampleLoader::new(root.path()).snapshot().unwrap();
        let refs: Vec<&Sample> = samples.iter().collect();
        let validation = ImageDataset::preprocessed(&refs, &preprocessor).get(0).unwrap();

        // the path an uploaded photo takes through the ensemble
        let bytes = fs::read(&path).unwrap();
        let inference = preprocessor.prepare(&Preprocessor::decode(&bytes).unwrap().to_rgb8());
        assert_eq!(validation.pixels, inference);
    }
}
