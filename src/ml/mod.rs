// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Networks, losses, optimization and the training loop.
//
//   model.rs          conv / fc encoders and decoders, the
//                     projection head, SpectralAutoencoder
//
//   loss.rs           MSE, L1, masked MSE, masked χ² and the
//                     NT-Xent contrastive loss behind one
//                     compute(output, target, context) call
//
//   optim.rs          Adam / AdamW / SGD behind an object-safe
//                     trait, epoch-indexed LR schedules
//
//   trainer.rs        the Autoencoder: construction from a run
//                     configuration, reconstruction and
//                     contrastive training loops, checkpoints
//
//   reconstructor.rs  bulk reconstruction of a split for a
//                     second-stage model
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Chen et al. (2020) SimCLR

/// Encoder / decoder architectures
pub mod model;

/// Reconstruction and contrastive loss criteria
pub mod loss;

/// Optimizer selection and learning-rate schedules
pub mod optim;

/// Training orchestrator with validation, early stopping and checkpointing
pub mod trainer;

/// Writes reconstructions of a whole split to disk
pub mod reconstructor;
