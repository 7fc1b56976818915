// ============================================================
// Layer 4 — Epoch Loaders as Batch Sources
// ============================================================
// Hands the trainer one epoch of batches per `batches()` call.
//
// Every random choice is keyed, never drawn from shared state:
//
//   order of epoch e   ← StdRng(seed, e)         (train only)
//   crop/flip of item i ← StdRng(seed, e, i)      (train only)
//
// Item preparation runs on a rayon pool of `num_workers`
// threads; `par_iter().collect()` keeps input order, so batch
// contents and batch order are the same for any worker count.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::data::{
    augment::Augmenter,
    batcher::{ImageBatch, ImageBatcher},
    dataset::ImageDataset,
};
use crate::domain::{
    image::{DatasetInfo, ImageItem},
    traits::BatchSource,
};
use crate::ml::loss::LabelSmoothingCrossEntropy;

/// Settings shared by both loaders of a run.
#[derive(Debug, Clone, Copy)]
pub struct LoaderSettings {
    pub batch_size:  usize,
    pub num_workers: usize,
    pub seed:        u64,
    pub augment:     bool,
}

/// SplitMix64 finaliser; spreads neighbouring keys across the seed space.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the RNG stream for `(seed, epoch, index)`.
pub fn stream_seed(seed: u64, epoch: u64, index: Option<usize>) -> u64 {
    let base = mix(mix(seed) ^ epoch);
    match index {
        Some(i) => mix(base ^ (i as u64).wrapping_add(1)),
        None    => base,
    }
}

// ─── EpochLoader ──────────────────────────────────────────────────────────────
pub struct EpochLoader<B: Backend> {
    dataset:    ImageDataset,
    batcher:    ImageBatcher<B>,
    info:       DatasetInfo,
    batch_size: usize,
    seed:       u64,
    shuffle:    bool,
    augmenter:  Option<Augmenter>,
    pool:       rayon::ThreadPool,
    /// Number of epochs handed out so far
    epoch:      AtomicU64,
}

impl<B: Backend> EpochLoader<B> {
    fn build(
        items:     Vec<ImageItem>,
        batcher:   ImageBatcher<B>,
        info:      DatasetInfo,
        settings:  LoaderSettings,
        shuffle:   bool,
        augmenter: Option<Augmenter>,
    ) -> Result<Self> {
        let workers = settings.num_workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .with_context(|| format!("Cannot start {workers} data-loading threads"))?;

        Ok(Self {
            dataset:    ImageDataset::new(items),
            batcher,
            info,
            batch_size: settings.batch_size.max(1),
            seed:       settings.seed,
            shuffle,
            augmenter,
            pool,
            epoch:      AtomicU64::new(0),
        })
    }

    /// Example indices of `epoch`, in visiting order.
    pub fn epoch_order(&self, epoch: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(stream_seed(self.seed, epoch, None));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Augmented (or plain) copies of `indices`, in the given order.
    fn prepare(&self, epoch: u64, indices: &[usize]) -> Vec<ImageItem> {
        let items     = self.dataset.items();
        let augmenter = self.augmenter;
        let seed      = self.seed;
        let channels  = self.info.channels;
        let size      = self.info.image_size;

        self.pool.install(|| {
            indices
                .par_iter()
                .map(|&i| {
                    let item = &items[i];
                    match augmenter {
                        Some(aug) => {
                            let mut rng = StdRng::seed_from_u64(stream_seed(seed, epoch, Some(i)));
                            let pixels  = aug.apply(&item.pixels, channels, size, &mut rng);
                            ImageItem::new(pixels, item.label)
                        }
                        None => item.clone(),
                    }
                })
                .collect()
        })
    }
}

impl<B: Backend> BatchSource<ImageBatch<B>> for EpochLoader<B> {
    fn batches(&self) -> Box<dyn Iterator<Item = ImageBatch<B>> + '_> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let order = self.epoch_order(epoch);
        let size  = self.batch_size;
        let count = order.len().div_ceil(size);

        Box::new((0..count).map(move |b| {
            let end   = ((b + 1) * size).min(order.len());
            let items = self.prepare(epoch, &order[b * size..end]);
            self.batcher.batch(items)
        }))
    }
}

/// Shuffled (and optionally augmented) loader for the training split.
pub fn train_loader<B: Backend>(
    items:    Vec<ImageItem>,
    info:     DatasetInfo,
    loss:     LabelSmoothingCrossEntropy,
    settings: LoaderSettings,
    device:   B::Device,
) -> Result<EpochLoader<B>> {
    let batcher   = ImageBatcher::<B>::new(device, info, loss);
    let augmenter = settings.augment.then(Augmenter::standard);
    EpochLoader::build(items, batcher, info, settings, true, augmenter)
}

/// In-order loader for the validation split.
pub fn valid_loader<B: Backend>(
    items:    Vec<ImageItem>,
    info:     DatasetInfo,
    loss:     LabelSmoothingCrossEntropy,
    settings: LoaderSettings,
    device:   B::Device,
) -> Result<EpochLoader<B>> {
    let batcher = ImageBatcher::<B>::new(device, info, loss);
    EpochLoader::build(items, batcher, info, settings, false, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn settings(batch_size: usize, num_workers: usize) -> LoaderSettings {
        LoaderSettings { batch_size, num_workers, seed: 42, augment: true }
    }

    fn loader(count: usize, s: LoaderSettings) -> EpochLoader<B> {
        let info  = DatasetInfo::synthetic(10, 4);
        let items = ImageDataset::synthetic(count, &info, 0).into_items();
        let loss  = LabelSmoothingCrossEntropy::new(10, 0.1);
        train_loader::<B>(items, info, loss, s, Default::default()).unwrap()
    }

    fn epoch_images(loader: &EpochLoader<B>) -> Vec<Vec<f32>> {
        loader
            .batches()
            .map(|b| b.images.into_data().to_vec::<f32>().unwrap())
            .collect()
    }

    #[test]
    fn test_loader_source_yields_every_example_once_per_epoch() {
        let loader = loader(10, settings(4, 1));
        for _ in 0..2 {
            let sizes: Vec<usize> = loader.batches().map(|b| b.labels.dims()[0]).collect();
            assert_eq!(sizes, vec![4, 4, 2]);
        }
    }

    #[test]
    fn test_batch_larger_than_dataset_gives_one_partial_batch() {
        let info   = DatasetInfo::synthetic(10, 4);
        let items  = ImageDataset::synthetic(2, &info, 0).into_items();
        let loss   = LabelSmoothingCrossEntropy::new(10, 0.1);
        let loader = valid_loader::<B>(items, info, loss, settings(128, 2), Default::default()).unwrap();

        let sizes: Vec<usize> = loader.batches().map(|b| b.labels.dims()[0]).collect();
        assert_eq!(sizes, vec![2]);
    }

    #[test]
    fn test_epoch_order_is_a_seeded_permutation() {
        let loader = loader(20, settings(4, 1));
        let first  = loader.epoch_order(0);
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
        assert_eq!(first, loader.epoch_order(0));
        assert_ne!(first, loader.epoch_order(1));
    }

    #[test]
    fn test_worker_count_does_not_change_batches() {
        let single = loader(24, settings(5, 1));
        let multi  = loader(24, settings(5, 4));
        for _ in 0..3 {
            assert_eq!(epoch_images(&single), epoch_images(&multi));
        }
    }

    #[test]
    fn test_validation_keeps_dataset_order() {
        let info   = DatasetInfo::synthetic(10, 4);
        let items  = ImageDataset::synthetic(7, &info, 0).into_items();
        let loss   = LabelSmoothingCrossEntropy::new(10, 0.0);
        let loader = valid_loader::<B>(items, info, loss, settings(3, 3), Default::default()).unwrap();

        let labels: Vec<i64> = loader
            .batches()
            .flat_map(|b| b.labels.into_data().convert::<i64>().to_vec::<i64>().unwrap())
            .collect();
        assert_eq!(labels, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
