// ============================================================
// Layer 4 - Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack ImageItems into one
// [N, 3, H, W] float tensor plus an [N] Int target tensor.
//
// Every item is already a CHW buffer of the same size, so
// batching is a flat concatenation followed by a reshape:
//
//   [img1_c0..., img1_c1..., img1_c2..., img2_c0..., ...] → [N, 3, S, S]
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::ImageItem;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalised pixels - shape: [batch_size, 3, image_size, image_size]
    pub images: Tensor<B, 4>,

    /// Class indices - shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
    pub image_size: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let s = self.image_size;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().copied())
            .collect();
        let targets: Vec<i64> = items.iter().map(|item| item.target as i64).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, s, s]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]),
            &self.device,
        );

        ImageBatch { images, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes() {
        let device = Default::default();
        let batcher = ImageBatcher::<NdArray>::new(device, 4);
        let items = vec![
            ImageItem::new(vec![0.5; 3 * 4 * 4], 0),
            ImageItem::new(vec![-0.5; 3 * 4 * 4], 1),
            ImageItem::new(vec![1.0; 3 * 4 * 4], 1),
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [3]);

        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 1]);
    }
}
