// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence that more than one layer needs:
//
//   checkpoint.rs   model + optimizer records and the
//                   {params, epoch} meta file. Used by the
//                   trainer to save/resume and by the
//                   reconstruction workflow to load weights.
//
//   metrics.rs      per-epoch CSV rows (loss phase, training
//                   and validation loss, learning rate)

/// Model/optimizer checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
