// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Seams the other layers program against.
//
//   SpectrumTransform: a per-spectrum transform (normalisation,
//                      augmentation). Data loaders may call it from
//                      several prefetch workers at once, hence
//                      Send + Sync and &self.

use std::fmt::Debug;

// ─── SpectrumTransform ────────────────────────────────────────────────────────
/// Maps one flattened, channel-first feature vector to a new one.
///
/// Implementations:
///   - Standardize, GaussianNoise, RandomMask (data/transforms.rs)
///   - Compose → applies a sequence of transforms in order
pub trait SpectrumTransform: Send + Sync + Debug {
    fn transform(&self, features: &[f32]) -> Vec<f32>;
}
