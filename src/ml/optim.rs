// ============================================================
// Layer 5 — Optimizers and Learning-Rate Schedules
// ============================================================
// Burn's optimizers are generic types, one per algorithm. The
// trainer holds whichever one the run configuration names behind
// the object-safe ModelOptimizer trait, which also knows how to
// persist the optimizer's state next to the model weights.
//
//   Adam   β1 = 0.9, β2 = 0.999, ε = 1e-8
//   AdamW  same moments, decoupled weight decay
//   SGD    plain gradient descent
//
// Schedules follow the epoch-indexed closed forms:
//
//   StepLR             lr0 · γ^⌊epoch / step_size⌋
//   ExponentialLR      lr0 · γ^epoch
//   CosineAnnealingLR  η_min + (lr0 − η_min) · (1 + cos(π · epoch / T_max)) / 2

use std::{f64::consts::PI, path::Path};

use burn::{
    optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig},
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::domain::{
    config::{OptimizerKind, SchedulerKind, SchedulerParams, TrainingParams},
    error::Result,
};
use crate::ml::model::SpectralAutoencoder;

type StateRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

// ─── ModelOptimizer ───────────────────────────────────────────────────────────
pub trait ModelOptimizer<B: AutodiffBackend>: Send {
    fn step(
        &mut self,
        lr:    f64,
        model: SpectralAutoencoder<B>,
        grads: GradientsParams,
    ) -> SpectralAutoencoder<B>;

    /// Write the optimizer state to `path` (extension replaced by the recorder).
    fn save(&self, path: &Path) -> Result<()>;

    /// Replace the optimizer state with the one stored at `path`.
    fn load(&mut self, path: &Path, device: &B::Device) -> Result<()>;
}

/// A Burn optimizer plus the constructor that made it. Loading a
/// record rebuilds from `init`, so `inner` is always present.
struct Adapted<O> {
    inner: O,
    init:  fn() -> O,
}

impl<O> Adapted<O> {
    fn new(init: fn() -> O) -> Self {
        Self { inner: init(), init }
    }
}

impl<B, O> ModelOptimizer<B> for Adapted<O>
where
    B: AutodiffBackend,
    O: Optimizer<SpectralAutoencoder<B>, B> + 'static,
{
    fn step(
        &mut self,
        lr:    f64,
        model: SpectralAutoencoder<B>,
        grads: GradientsParams,
    ) -> SpectralAutoencoder<B> {
        self.inner.step(lr, model, grads)
    }

    fn save(&self, path: &Path) -> Result<()> {
        Recorder::<B>::record(&StateRecorder::new(), self.inner.to_record(), path.to_path_buf())?;
        Ok(())
    }

    /// On error the current state is kept.
    fn load(&mut self, path: &Path, device: &B::Device) -> Result<()> {
        let record = Recorder::<B>::load(&StateRecorder::new(), path.to_path_buf(), device)?;
        self.inner = (self.init)().load_record(record);
        Ok(())
    }
}

/// A fresh optimizer of the requested kind (no accumulated state).
pub fn build_optimizer<B: AutodiffBackend>(kind: OptimizerKind) -> Box<dyn ModelOptimizer<B>> {
    match kind {
        OptimizerKind::Adam => Box::new(Adapted::new(|| {
            AdamConfig::new().with_epsilon(1e-8).init::<B, SpectralAutoencoder<B>>()
        })),
        OptimizerKind::AdamW => Box::new(Adapted::new(|| {
            AdamWConfig::new().with_epsilon(1e-8).init::<B, SpectralAutoencoder<B>>()
        })),
        OptimizerKind::Sgd => Box::new(Adapted::new(|| SgdConfig::new().init::<B, SpectralAutoencoder<B>>())),
    }
}

// ─── LrScheduler ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct LrScheduler {
    kind:       SchedulerKind,
    params:     SchedulerParams,
    initial_lr: f64,
    epoch:      usize,
}

impl LrScheduler {
    pub fn new(kind: SchedulerKind, params: SchedulerParams, initial_lr: f64) -> Result<Self> {
        kind.check(&params)?;
        Ok(Self { kind, params, initial_lr, epoch: 0 })
    }

    pub fn from_training(training: &TrainingParams) -> Result<Self> {
        Self::new(training.scheduler, training.scheduler_params.clone(), training.initial_lr)
    }

    /// Learning rate for the current epoch.
    pub fn lr(&self) -> f64 {
        let p      = &self.params;
        let gamma  = p.gamma.unwrap_or(1.0);
        let epoch  = self.epoch as f64;
        match self.kind {
            SchedulerKind::StepLR => {
                let step = p.step_size.unwrap_or(1).max(1);
                self.initial_lr * gamma.powi((self.epoch / step) as i32)
            }
            SchedulerKind::ExponentialLR => self.initial_lr * gamma.powf(epoch),
            SchedulerKind::CosineAnnealingLR => {
                let t_max   = p.t_max.unwrap_or(1).max(1) as f64;
                let eta_min = p.eta_min.unwrap_or(0.0);
                eta_min + (self.initial_lr - eta_min) * (1.0 + (PI * epoch / t_max).cos()) / 2.0
            }
        }
    }

    /// Advance one epoch and return the new rate.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.lr()
    }

    /// Jump to `epoch`, as if `step` had been called that many times.
    pub fn at_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        config::{tests::sample_json, RunConfig},
        error::Error,
    };
    use burn::{
        backend::{Autodiff, NdArray},
        module::AutodiffModule,
        prelude::*,
    };

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_failed_load_keeps_a_working_optimizer() {
        let device = Default::default();
        let cfg    = RunConfig::from_json(&sample_json("fc", "fc")).unwrap();
        let (model, _) = SpectralAutoencoder::<TestBackend>::init(&cfg, &device).unwrap();
        let mut optim  = build_optimizer::<TestBackend>(OptimizerKind::Adam);

        let dir = tempfile::tempdir().unwrap();
        assert!(optim.load(&dir.path().join("missing_optim"), &device).is_err());

        let x     = Tensor::<TestBackend, 3>::ones([2, 1, 32], &device);
        let loss  = (model.forward(x.clone()) - x).powf_scalar(2.0).mean();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let before  = model.valid().decoder.linears[0].weight.val();
        let updated = optim.step(1e-2, model, grads);
        let after   = updated.valid().decoder.linears[0].weight.val();

        let moved = (after - before).abs().max().into_scalar();
        assert!(moved > 0.0, "the optimizer step left the weights unchanged");
    }

    fn params(step_size: Option<usize>, gamma: Option<f64>, t_max: Option<usize>) -> SchedulerParams {
        SchedulerParams { step_size, gamma, t_max, eta_min: None }
    }

    #[test]
    fn test_step_lr_decays_every_step_size_epochs() {
        let mut s = LrScheduler::new(SchedulerKind::StepLR, params(Some(2), Some(0.5), None), 1.0).unwrap();
        let lrs: Vec<f64> = (0..5).map(|_| s.step()).collect();
        assert_eq!(lrs, vec![1.0, 0.5, 0.5, 0.25, 0.25]);
    }

    #[test]
    fn test_at_epoch_matches_stepping() {
        let p = params(Some(3), Some(0.1), None);
        let mut stepped = LrScheduler::new(SchedulerKind::StepLR, p.clone(), 1.0).unwrap();
        (0..7).for_each(|_| { stepped.step(); });
        let mut jumped = LrScheduler::new(SchedulerKind::StepLR, p, 1.0).unwrap();
        jumped.at_epoch(7);
        assert_eq!(jumped, stepped);
        assert!((jumped.lr() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_exponential_lr() {
        let mut s = LrScheduler::new(SchedulerKind::ExponentialLR, params(None, Some(0.1), None), 1.0).unwrap();
        assert_eq!(s.lr(), 1.0);
        s.step();
        s.step();
        assert!((s.lr() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_reaches_eta_min_at_t_max() {
        let mut p = params(None, None, Some(4));
        p.eta_min = Some(0.1);
        let mut s = LrScheduler::new(SchedulerKind::CosineAnnealingLR, p, 1.0).unwrap();
        s.step();
        s.step();
        assert!((s.lr() - 0.55).abs() < 1e-12);
        s.step();
        s.step();
        assert!((s.lr() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_missing_scheduler_param_is_rejected() {
        let err = LrScheduler::new(SchedulerKind::ExponentialLR, SchedulerParams::default(), 1.0);
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }
}
