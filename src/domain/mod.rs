// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system: images, datasets, metrics and the seams of
// the training loop.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Labelled images and dataset descriptions
pub mod image;

// Batch, epoch and checkpoint records
pub mod metrics;

// Core abstractions (traits) that other layers implement
pub mod traits;
