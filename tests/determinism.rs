use vit_cifar::application::train_use_case::{TrainConfig, TrainUseCase};
use vit_cifar::data::dataset::ImageDataset;
use vit_cifar::domain::image::DatasetInfo;
use vit_cifar::ml::runner::BackendKind;

type EpochTuple = (f64, f64, f64, f64);

// Single test in this binary: the NdArray seed is process-wide.
#[test]
fn same_seed_gives_same_epoch_metrics_for_any_worker_count() {
    let info  = DatasetInfo::synthetic(10, 32);
    let train = ImageDataset::synthetic(64, &info, 1).into_items();
    let valid = ImageDataset::synthetic(16, &info, 2).into_items();

    let run = |num_workers: usize| -> Vec<EpochTuple> {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            checkpoint_dir: tmp.path().to_path_buf(),
            patch_size:     8,
            embed_dim:      16,
            num_layers:     2,
            num_heads:      2,
            epochs:         3,
            batch_size:     8,
            warmup_epochs:  1,
            num_workers,
            seed:           7,
            backend:        BackendKind::NdArray,
            ..TrainConfig::default()
        };
        let history = TrainUseCase::new(cfg)
            .train_on_items(info, train.clone(), valid.clone())
            .unwrap();
        history
            .epochs
            .iter()
            .map(|m| (m.train_loss, m.train_accuracy, m.val_loss, m.val_accuracy))
            .collect()
    };

    let reference = run(1);
    assert_eq!(reference.len(), 3);

    let default_workers = TrainConfig::default().num_workers;
    for workers in [1, 4, default_workers, default_workers] {
        assert_eq!(run(workers), reference, "num_workers = {workers}");
    }
}
