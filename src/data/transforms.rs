// ============================================================
// Layer 4 — Spectrum Transforms
// ============================================================
// Per-sample transforms applied by the dataset adapters to the
// `features` entry of a spectrum.
//
//   Standardize    → (x - mean(x)) / std(x) per spectrum
//   GaussianNoise  → x + N(0, sigma²) per bin
//   RandomMask     → zero a random fraction of the bins
//   Compose        → apply a list of transforms in order
//
// SampleTransform decides how many outputs an item gets:
//
//   Single       one transformed view
//   Contrastive  n independent draws of the same stochastic
//                transform (n = 2 for SimCLR-style pairs)
//
// Randomness comes from rand::thread_rng(), so each loader worker
// draws from its own generator.

use std::sync::Arc;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::domain::{config::TransformSpec, traits::SpectrumTransform};

// ─── Standardize ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct Standardize;

impl SpectrumTransform for Standardize {
    fn transform(&self, features: &[f32]) -> Vec<f32> {
        if features.is_empty() {
            return Vec::new();
        }
        let n    = features.len() as f32;
        let mean = features.iter().sum::<f32>() / n;
        let var  = features.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
        let std  = var.sqrt();

        if std <= f32::EPSILON {
            return features.iter().map(|x| x - mean).collect();
        }
        features.iter().map(|x| (x - mean) / std).collect()
    }
}

// ─── GaussianNoise ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    sigma: f32,
}

impl GaussianNoise {
    pub fn new(sigma: f32) -> Self {
        Self { sigma: sigma.abs() }
    }
}

impl SpectrumTransform for GaussianNoise {
    fn transform(&self, features: &[f32]) -> Vec<f32> {
        // Normal::new only fails for a non-finite sigma
        let normal = match Normal::new(0.0f32, self.sigma) {
            Ok(n)  => n,
            Err(_) => return features.to_vec(),
        };
        let mut rng = rand::thread_rng();
        features.iter().map(|x| x + normal.sample(&mut rng)).collect()
    }
}

// ─── RandomMask ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct RandomMask {
    fraction: f32,
}

impl RandomMask {
    pub fn new(fraction: f32) -> Self {
        Self { fraction: fraction.clamp(0.0, 1.0) }
    }
}

impl SpectrumTransform for RandomMask {
    fn transform(&self, features: &[f32]) -> Vec<f32> {
        let mut rng = rand::thread_rng();
        features
            .iter()
            .map(|&x| if rng.gen::<f32>() < self.fraction { 0.0 } else { x })
            .collect()
    }
}

// ─── Compose ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct Compose {
    steps: Vec<Arc<dyn SpectrumTransform>>,
}

impl Compose {
    pub fn new(steps: Vec<Arc<dyn SpectrumTransform>>) -> Self {
        Self { steps }
    }

    /// Build the pipeline described by the run configuration.
    pub fn from_specs(specs: &[TransformSpec]) -> Self {
        let steps = specs
            .iter()
            .map(|spec| -> Arc<dyn SpectrumTransform> {
                match spec {
                    TransformSpec::Standardize              => Arc::new(Standardize),
                    TransformSpec::GaussianNoise { sigma }  => Arc::new(GaussianNoise::new(*sigma)),
                    TransformSpec::RandomMask { fraction }  => Arc::new(RandomMask::new(*fraction)),
                }
            })
            .collect();
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl SpectrumTransform for Compose {
    fn transform(&self, features: &[f32]) -> Vec<f32> {
        self.steps
            .iter()
            .fold(features.to_vec(), |x, step| step.transform(&x))
    }
}

// ─── SampleTransform ──────────────────────────────────────────────────────────
/// The transform a dataset applies to each item's features.
#[derive(Debug, Clone)]
pub enum SampleTransform {
    Single(Arc<dyn SpectrumTransform>),
    Contrastive {
        base:    Arc<dyn SpectrumTransform>,
        n_views: usize,
    },
}

impl SampleTransform {
    pub fn single(transform: impl SpectrumTransform + 'static) -> Self {
        SampleTransform::Single(Arc::new(transform))
    }

    /// Wrap `base` so every item yields `n_views` independent draws.
    pub fn contrastive(base: Arc<dyn SpectrumTransform>, n_views: usize) -> Self {
        SampleTransform::Contrastive { base, n_views }
    }

    pub fn apply(&self, features: &[f32]) -> Vec<Vec<f32>> {
        match self {
            SampleTransform::Single(t) => vec![t.transform(features)],
            SampleTransform::Contrastive { base, n_views } => {
                (0..*n_views).map(|_| base.transform(features)).collect()
            }
        }
    }
}
