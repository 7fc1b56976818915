use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::image::{DatasetInfo, ImageItem};

/// In-memory image dataset behind the epoch loaders.
pub struct ImageDataset {
    items: Vec<ImageItem>,
}

impl ImageDataset {
    pub fn new(items: Vec<ImageItem>) -> Self { Self { items } }

    /// `count` random images with labels cycling through the classes.
    pub fn synthetic(count: usize, info: &DatasetInfo, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let items = (0..count)
            .map(|i| {
                let pixels = (0..info.pixels_per_image()).map(|_| rng.gen()).collect();
                ImageItem::new(pixels, i % info.num_classes)
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[ImageItem] { &self.items }

    pub fn into_items(self) -> Vec<ImageItem> { self.items }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
