// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from NumPy files on disk to tensor batches.
//
//   .npz / .npy bundles
//       │
//       ▼
//   npz              → reads named float arrays
//       │
//       ▼
//   SpectrumDataset  → one split in memory, Burn's Dataset trait
//       │                (applies the transform to features)
//       ▼
//   SpectrumBatcher  → stacks items into tensors
//       │
//       ▼
//   DataLoader       → feeds batches to the training loop
//                      (validation through Cyclic)

/// Reads NumPy .npz archives and .npy files
pub mod npz;

/// Per-sample normalisation and augmentation
pub mod transforms;

/// Implements Burn's Dataset trait for the SDSS bundles
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Restarting iterator for the per-epoch validation batch
pub mod cyclic;
