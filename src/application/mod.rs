// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only. Each use case reads a run
// configuration, asks the lower layers to do the work, and
// adds context to their errors.
//
//   train_use_case.rs        build an Autoencoder, optionally
//                            resume it, train it
//
//   reconstruct_use_case.rs  load a trained model and write a
//                            split's reconstructions
//
// No ML math and no printing here (that's Layers 5 and 1).

use serde::{Deserialize, Serialize};

/// The training workflow
pub mod train_use_case;

/// The bulk reconstruction workflow
pub mod reconstruct_use_case;

/// Compute backend a use case runs on. Training wraps it in Autodiff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// GPU through wgpu
    Wgpu,
    /// CPU through ndarray
    #[value(name = "ndarray")]
    NdArray,
}
