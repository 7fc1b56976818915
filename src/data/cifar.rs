// ============================================================
// Layer 4 — CIFAR Binary Loader
// ============================================================
// Reads the "binary version" of CIFAR-10 / CIFAR-100.
//
// Record layout (fixed size, no header):
//   CIFAR-10:  <1 x label> <3072 x pixel>
//   CIFAR-100: <1 x coarse label> <1 x fine label> <3072 x pixel>
//
// The 3072 pixel bytes are the red plane, then green, then
// blue, each 32x32 row-major — already the CHW order the
// model expects. For CIFAR-100 the fine (100-class) label is
// used.
//
// Expected files:
//   cifar-10-batches-bin/data_batch_{1..5}.bin, test_batch.bin
//   cifar-100-binary/train.bin, test.bin
//
// `--dir` may point at the extracted folder itself or at its
// parent.
//
// Reference: https://www.cs.toronto.edu/~kriz/cifar.html

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::PathBuf,
};

use crate::domain::image::{DatasetKind, ImageItem};

/// Which half of the dataset to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test  => "test",
        }
    }
}

/// Loads CIFAR records from a directory on disk.
pub struct CifarLoader {
    root: PathBuf,
    kind: DatasetKind,
}

impl CifarLoader {
    pub fn new(root: impl Into<PathBuf>, kind: DatasetKind) -> Self {
        Self { root: root.into(), kind }
    }

    /// Read every record of `split`. Fails on the first missing or
    /// malformed file.
    pub fn load(&self, split: Split) -> Result<Vec<ImageItem>> {
        let dir = self.resolve_dir();
        let mut items = Vec::new();

        for name in split_files(self.kind, split) {
            let path  = dir.join(name);
            let bytes = fs::read(&path).with_context(|| {
                format!(
                    "Cannot read '{}'. Extract the binary version of {} into '{}'",
                    path.display(),
                    self.kind.name(),
                    self.root.display(),
                )
            })?;

            let records = parse_records(&bytes, self.kind)
                .with_context(|| format!("Malformed CIFAR file '{}'", path.display()))?;
            tracing::debug!("Read {} records from '{}'", records.len(), path.display());
            items.extend(records);
        }

        tracing::info!(
            "Loaded {} {} images of {} from '{}'",
            items.len(),
            split.name(),
            self.kind.name(),
            dir.display(),
        );
        Ok(items)
    }

    fn resolve_dir(&self) -> PathBuf {
        let nested = self.root.join(archive_dir(self.kind));
        if nested.is_dir() { nested } else { self.root.clone() }
    }
}

fn archive_dir(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::Cifar10  => "cifar-10-batches-bin",
        DatasetKind::Cifar100 => "cifar-100-binary",
    }
}

fn split_files(kind: DatasetKind, split: Split) -> &'static [&'static str] {
    match (kind, split) {
        (DatasetKind::Cifar10, Split::Train) => &[
            "data_batch_1.bin",
            "data_batch_2.bin",
            "data_batch_3.bin",
            "data_batch_4.bin",
            "data_batch_5.bin",
        ],
        (DatasetKind::Cifar10, Split::Test)   => &["test_batch.bin"],
        (DatasetKind::Cifar100, Split::Train) => &["train.bin"],
        (DatasetKind::Cifar100, Split::Test)  => &["test.bin"],
    }
}

fn label_bytes(kind: DatasetKind) -> usize {
    match kind {
        DatasetKind::Cifar10  => 1,
        DatasetKind::Cifar100 => 2,
    }
}

/// Decode a whole CIFAR binary file into images.
pub fn parse_records(bytes: &[u8], kind: DatasetKind) -> Result<Vec<ImageItem>> {
    let info        = kind.info();
    let label_bytes = label_bytes(kind);
    let record_len  = label_bytes + info.pixels_per_image();

    if bytes.is_empty() {
        bail!("file is empty");
    }
    if bytes.len() % record_len != 0 {
        bail!(
            "file size {} is not a multiple of the {}-byte record size",
            bytes.len(),
            record_len,
        );
    }

    bytes
        .chunks_exact(record_len)
        .enumerate()
        .map(|(index, record)| {
            // the last label byte is the one we train on (fine label for CIFAR-100)
            let label = record[label_bytes - 1] as usize;
            if label >= info.num_classes {
                bail!("record {} has label {} (expected < {})", index, label, info.num_classes);
            }
            Ok(ImageItem::new(record[label_bytes..].to_vec(), label))
        })
        .collect()
}
