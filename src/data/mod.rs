// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the CIFAR binary files
// all the way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   CIFAR .bin files
//       │
//       ▼
//   CifarLoader       → parses fixed-size records into ImageItems
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   EpochLoader       → seeded per-epoch order; (train) Augmenter
//       │               random crop + flip, keyed per item
//       ▼
//   ImageBatcher      → normalise, soft targets, stack into tensors
//                       handed to the training loop as a BatchSource
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the CIFAR-10 / CIFAR-100 binary format
pub mod cifar;

/// Random crop and horizontal flip on raw pixels
pub mod augment;

/// Implements Burn's Dataset trait for labelled images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Builds the train / validation epoch loaders
pub mod source;
