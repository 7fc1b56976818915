// ============================================================
// Layer 3 — Image Domain Types
// ============================================================
// An ImageItem is one labelled picture exactly as it sits on
// disk: raw 8-bit pixels in channel-major (CHW) order plus the
// integer class label. Normalisation happens later, in the
// batcher, so the same items can feed any backend.
//
// DatasetKind / DatasetInfo describe the two supported
// datasets: class count, native resolution and the per-channel
// statistics used to normalise pixels to zero mean, unit std.
//
// Reference: Krizhevsky (2009) Learning Multiple Layers of
//            Features from Tiny Images (CIFAR-10/100)

use serde::{Deserialize, Serialize};

/// The datasets the trainer knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    #[serde(rename = "CIFAR10")]
    Cifar10,
    #[serde(rename = "CIFAR100")]
    Cifar100,
}

impl DatasetKind {
    /// Shape and normalisation statistics for this dataset.
    pub fn info(self) -> DatasetInfo {
        match self {
            DatasetKind::Cifar10 => DatasetInfo {
                num_classes: 10,
                image_size:  32,
                channels:    3,
                mean:        [0.4914, 0.4822, 0.4465],
                std:         [0.2470, 0.2435, 0.2616],
            },
            DatasetKind::Cifar100 => DatasetInfo {
                num_classes: 100,
                image_size:  32,
                channels:    3,
                mean:        [0.5071, 0.4865, 0.4409],
                std:         [0.2673, 0.2564, 0.2762],
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Cifar10  => "CIFAR10",
            DatasetKind::Cifar100 => "CIFAR100",
        }
    }
}

/// Static facts about a dataset, needed before any file is read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub num_classes: usize,
    pub image_size:  usize,
    pub channels:    usize,
    pub mean:        [f32; 3],
    pub std:         [f32; 3],
}

impl DatasetInfo {
    /// Neutral statistics for generated data (pixels spread over 0..=255).
    pub fn synthetic(num_classes: usize, image_size: usize) -> Self {
        Self {
            num_classes,
            image_size,
            channels: 3,
            mean:     [0.5; 3],
            std:      [0.25; 3],
        }
    }

    /// Number of bytes in one image.
    pub fn pixels_per_image(&self) -> usize {
        self.channels * self.image_size * self.image_size
    }
}

/// One labelled image, pixels stored as CHW bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub pixels: Vec<u8>,
    pub label:  usize,
}

impl ImageItem {
    pub fn new(pixels: Vec<u8>, label: usize) -> Self {
        Self { pixels, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cifar_class_counts() {
        assert_eq!(DatasetKind::Cifar10.info().num_classes, 10);
        assert_eq!(DatasetKind::Cifar100.info().num_classes, 100);
    }

    #[test]
    fn test_pixels_per_image() {
        assert_eq!(DatasetKind::Cifar10.info().pixels_per_image(), 3 * 32 * 32);
    }

    #[test]
    fn test_dataset_kind_serialises_with_upper_case_name() {
        let json = serde_json::to_string(&DatasetKind::Cifar100).unwrap();
        assert_eq!(json, "\"CIFAR100\"");
    }
}
