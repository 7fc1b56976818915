// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ImageItem>
// into device tensors.
//
// Per item (already augmented by the loader when training):
//   1. pixel / 255, then (x - mean[c]) / std[c]
//   2. soft target row from the label-smoothing loss
//
// Output shapes:
//   images:  [batch, channels, size, size]  (float)
//   targets: [batch, classes]               (float)
//   labels:  [batch]                        (int)
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use crate::domain::image::{DatasetInfo, ImageItem};
use crate::ml::loss::LabelSmoothingCrossEntropy;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
/// A batch of normalised images with hard and soft labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch, channels, height, width]
    pub images: Tensor<B, 4>,

    /// Smoothed target distribution — shape: [batch, classes]
    pub targets: Tensor<B, 2>,

    /// Class indices — shape: [batch]
    pub labels: Tensor<B, 1, Int>,
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    device:  B::Device,
    info:    DatasetInfo,
    loss:    LabelSmoothingCrossEntropy,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, info: DatasetInfo, loss: LabelSmoothingCrossEntropy) -> Self {
        Self { device, info, loss }
    }

    /// Normalised CHW floats for one image.
    fn normalise(&self, pixels: &[u8], out: &mut Vec<f32>) {
        let plane = self.info.image_size * self.info.image_size;
        for (i, &p) in pixels.iter().enumerate() {
            let c = (i / plane).min(2);
            out.push((p as f32 / 255.0 - self.info.mean[c]) / self.info.std[c]);
        }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let size       = self.info.image_size;
        let channels   = self.info.channels;

        let mut pixels = Vec::with_capacity(batch_size * self.info.pixels_per_image());

        for item in &items {
            self.normalise(&item.pixels, &mut pixels);
        }

        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let targets            = self.loss.targets(&labels);
        let label_ints: Vec<i32> = labels.iter().map(|&l| l as i32).collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, channels, size, size]);

        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
            .reshape([batch_size, self.loss.num_classes()]);

        let labels = Tensor::<B, 1, Int>::from_ints(label_ints.as_slice(), &self.device);

        ImageBatch { images, targets, labels }
    }
}
