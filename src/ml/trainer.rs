// ============================================================
// Layer 5 — Autoencoder Trainer
// ============================================================
// The Autoencoder owns everything a run needs: the network, the
// optimizer and schedule, both loss criteria, the three data
// loaders and the epoch counter.
//
// Backends:
//   - training runs on B (an AutodiffBackend) for gradients
//   - model.valid() gives the same weights on B::InnerBackend,
//     so the valid/test loaders batch on the inner backend and
//     validation builds no autodiff graph
//
// Reconstruction mode, per epoch:
//   1. criterion1 while epoch < ann_epoch, criterion2 afterwards
//   2. every training batch: forward, loss, backward, optimizer step
//   3. ONE validation batch from a cyclic iterator
//   4. early stopping: loss < best + threshold is the new best,
//      otherwise the non-improvement counter grows
//   5. epoch += 1; checkpoint at multiples of 10, at the last
//      epoch and when stopping early
//   6. log, then step the learning-rate schedule
//
// Contrastive mode, per epoch: all views stacked along the batch
// axis through the projection head, NT-Xent loss, schedule step,
// one validation batch. The epoch counter does not move and no
// checkpoint is written.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{SpectrumBatch, SpectrumBatcher},
    cyclic::Cyclic,
    dataset::SpectrumDataset,
    transforms::{Compose, SampleTransform},
};
use crate::domain::{
    config::{ConvGeometry, OptimizerKind, RunConfig, SchedulerKind, SchedulerParams},
    error::{Error, Result},
    sample::Split,
    traits::SpectrumTransform,
};
use crate::infra::{
    checkpoint::{self, CheckpointMeta, CheckpointPaths},
    metrics::{EpochMetrics, LossPhase, MetricsLogger},
};
use crate::ml::{
    loss::{Criterion, LossContext},
    model::SpectralAutoencoder,
    optim::{build_optimizer, LrScheduler, ModelOptimizer},
};

type TrainLoader<B> = Arc<dyn DataLoader<SpectrumBatch<B>>>;
type EvalLoader<B>  = Arc<dyn DataLoader<SpectrumBatch<<B as AutodiffBackend>::InnerBackend>>>;

// ─── History ──────────────────────────────────────────────────────────────────
/// What train_model reports, one entry per completed epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_loss:    Vec<f64>,
    pub valid_loss:    Vec<f64>,
    pub phases:        Vec<LossPhase>,
    /// Epoch counter values at which a checkpoint was written
    pub checkpoints:   Vec<usize>,
    pub early_stopped: bool,
}

// ─── Early stopping ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    best:      f64,
    counter:   usize,
    patience:  usize,
    threshold: f64,
}

impl EarlyStopping {
    pub fn new(patience: usize, threshold: f64) -> Self {
        Self { best: 1000.0, counter: 0, patience, threshold }
    }

    /// Record one validation loss. Returns true if it became the new best.
    pub fn update(&mut self, loss: f64) -> bool {
        if loss < self.best + self.threshold {
            self.best    = loss;
            self.counter = 0;
            true
        } else {
            self.counter += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.counter >= self.patience
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

/// Periodic checkpoint rule, `epoch` counted from 1.
pub fn should_checkpoint(epoch: usize, nepochs: usize) -> bool {
    epoch % 10 == 0 || epoch == nepochs
}

// ─── Autoencoder ──────────────────────────────────────────────────────────────
pub struct Autoencoder<B: AutodiffBackend> {
    config:     RunConfig,
    model:      SpectralAutoencoder<B>,
    geometry:   Option<ConvGeometry>,
    optimizer:  Box<dyn ModelOptimizer<B>>,
    scheduler:  LrScheduler,
    criterion1: Criterion,
    criterion2: Criterion,
    datasets:   [Arc<SpectrumDataset>; 3],
    train:      TrainLoader<B>,
    valid:      EvalLoader<B>,
    test:       EvalLoader<B>,
    device:     B::Device,
    epoch:      usize,
    name:       String,
    save_dir:   PathBuf,
    metrics:    Option<MetricsLogger>,
}

impl<B: AutodiffBackend> Autoencoder<B> {
    /// Assemble networks, optimizer, schedule, criteria and loaders.
    /// In contrastive mode `transform` becomes the base of the
    /// n-view generator; otherwise it is applied as is.
    pub fn new(
        config:    RunConfig,
        device:    B::Device,
        transform: Option<Arc<dyn SpectrumTransform>>,
        name:      impl Into<String>,
        save_dir:  impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        let (model, geometry) = SpectralAutoencoder::<B>::init(&config, &device)?;
        if let Some(g) = &geometry {
            tracing::debug!("conv encoder output lengths {:?}, channels {:?}", g.out_dims(), &g.channels[1..]);
        }
        tracing::info!(
            "Model ready: {}/{} encoder/decoder, {} parameters",
            config.params.encoder_type,
            config.params.decoder_type,
            model.num_params()
        );

        let optimizer  = build_optimizer::<B>(config.training.optimizer);
        let scheduler  = LrScheduler::from_training(&config.training)?;
        let criterion1 = Criterion::resolve(config.training.criterion1, &config.params)?;
        let criterion2 = Criterion::resolve(config.training.criterion2, &config.params)?;

        let transform = match (config.params.contrastive, transform) {
            (true, base) => {
                let base = base.unwrap_or_else(|| {
                    tracing::warn!("contrastive mode without transforms: all views are identical");
                    Arc::new(Compose::default()) as Arc<dyn SpectrumTransform>
                });
                Some(SampleTransform::contrastive(base, config.params.n_views))
            }
            (false, Some(t)) => Some(SampleTransform::Single(t)),
            (false, None)    => None,
        };

        let open = |split| SpectrumDataset::open(&config.data, split, &name, transform.clone()).map(Arc::new);
        let datasets = [open(Split::Train)?, open(Split::Valid)?, open(Split::Test)?];
        if datasets[0].is_empty() {
            return Err(Error::EmptyLoader("train"));
        }
        if datasets[1].is_empty() {
            return Err(Error::EmptyLoader("valid"));
        }
        let (channels, length) = datasets[0].item_shape();
        if channels * length != config.params.input_dim {
            return Err(Error::ShapeMismatch(format!(
                "dataset spectra have {channels} x {length} bins, input_dim is {}",
                config.params.input_dim
            )));
        }
        let (train, valid, test) = build_loaders::<B>(&config, &datasets, &device);

        Ok(Self {
            config,
            model,
            geometry,
            optimizer,
            scheduler,
            criterion1,
            criterion2,
            datasets,
            train,
            valid,
            test,
            device,
            epoch: 0,
            name,
            save_dir: save_dir.into(),
            metrics: None,
        })
    }

    /// Append one CSV row per epoch to `logger`.
    pub fn with_metrics(mut self, logger: MetricsLogger) -> Self {
        self.metrics = Some(logger);
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────
    pub fn model(&self) -> &SpectralAutoencoder<B> { &self.model }
    pub fn config(&self) -> &RunConfig { &self.config }
    pub fn geometry(&self) -> Option<&ConvGeometry> { self.geometry.as_ref() }
    pub fn epoch(&self) -> usize { self.epoch }
    pub fn name(&self) -> &str { &self.name }
    pub fn save_dir(&self) -> &Path { &self.save_dir }
    pub fn device(&self) -> &B::Device { &self.device }
    pub fn learning_rate(&self) -> f64 { self.scheduler.lr() }

    pub fn dataset(&self, split: Split) -> Arc<SpectrumDataset> {
        match split {
            Split::Train => Arc::clone(&self.datasets[0]),
            Split::Valid => Arc::clone(&self.datasets[1]),
            Split::Test  => Arc::clone(&self.datasets[2]),
        }
    }

    /// Reconstruction [B,1,L], or projection [B,1,P] in contrastive mode.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.model.forward(x)
    }

    // ── Training ──────────────────────────────────────────────────────────────
    pub fn train_model(&mut self, nepochs: usize) -> Result<TrainingHistory> {
        if self.config.params.contrastive {
            self.train_contrastive(nepochs)
        } else {
            self.train_autoencoder(nepochs)
        }
    }

    /// Train until the epoch counter reaches `nepochs` or validation
    /// stops improving. A resumed model continues from its counter.
    pub fn train_autoencoder(&mut self, nepochs: usize) -> Result<TrainingHistory> {
        let ann_epoch   = self.config.training.ann_epoch;
        let patience    = self.config.training.patience;
        let mut stopper = EarlyStopping::new(patience, self.config.training.patience_threshold);
        let mut history = TrainingHistory::default();

        let valid_loader = Arc::clone(&self.valid);
        let mut valid    = Cyclic::new(|| valid_loader.iter());
        let save_dir     = self.save_dir.clone();

        while self.epoch < nepochs {
            let phase = LossPhase::for_epoch(self.epoch, ann_epoch);
            let criterion = match phase {
                LossPhase::Pretrain => self.criterion1,
                _                   => self.criterion2,
            };
            let lr = self.scheduler.lr();

            let train_loss = self.train_epoch(&criterion, lr)?;
            let batch      = valid.next_batch().ok_or(Error::EmptyLoader("valid"))?;
            let valid_loss = self.validation_loss(&criterion, batch)?;

            history.train_loss.push(train_loss);
            history.valid_loss.push(valid_loss);
            history.phases.push(phase);
            stopper.update(valid_loss);

            self.epoch += 1;
            let stop = stopper.should_stop();
            if should_checkpoint(self.epoch, nepochs) || stop {
                self.save_model(&save_dir, None)?;
                history.checkpoints.push(self.epoch);
            }
            self.log_metrics(self.epoch, phase, train_loss, valid_loss, lr)?;

            if stop {
                tracing::info!(
                    "early stop at epoch {}: no improvement on {:.4e} for {} epochs",
                    self.epoch,
                    stopper.best(),
                    patience
                );
                history.early_stopped = true;
                break;
            }

            tracing::info!(
                "epoch: {}, training loss: {:.4e}, validation loss: {:.4e}, learning rate: {:.4e}",
                self.epoch, train_loss, valid_loss, lr,
            );
            self.scheduler.step();
        }
        Ok(history)
    }

    /// `nepochs` epochs of NT-Xent training on the projection head.
    pub fn train_contrastive(&mut self, nepochs: usize) -> Result<TrainingHistory> {
        let criterion   = self.criterion1;
        let mut history = TrainingHistory::default();

        let valid_loader = Arc::clone(&self.valid);
        let mut valid    = Cyclic::new(|| valid_loader.iter());

        for epoch in 0..nepochs {
            let lr         = self.scheduler.lr();
            let train_loss = self.train_epoch(&criterion, lr)?;
            let next_lr    = self.scheduler.step();

            let batch      = valid.next_batch().ok_or(Error::EmptyLoader("valid"))?;
            let valid_loss = self.validation_loss(&criterion, batch)?;

            history.train_loss.push(train_loss);
            history.valid_loss.push(valid_loss);
            history.phases.push(LossPhase::Contrastive);
            self.log_metrics(epoch + 1, LossPhase::Contrastive, train_loss, valid_loss, lr)?;

            tracing::info!(
                "epoch: {}, training loss: {:.4e}, validation loss: {:.4e}, learning rate: {:.4e}",
                epoch, train_loss, valid_loss, next_lr,
            );
        }
        Ok(history)
    }

    /// One pass over the training loader. Returns the mean batch loss.
    fn train_epoch(&mut self, criterion: &Criterion, lr: f64) -> Result<f64> {
        let input_dim = self.config.params.input_dim;
        let loader    = Arc::clone(&self.train);
        let mut model = self.model.clone();
        let mut total = 0.0f64;
        let mut count = 0usize;

        for batch in loader.iter() {
            let (x, ctx) = model_input(batch, input_dim)?;
            let output   = model.forward(x.clone());
            let loss     = criterion.compute(output, x, &ctx);

            total += loss.clone().into_scalar().elem::<f64>();
            count += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = self.optimizer.step(lr, model, grads);
        }
        self.model = model;

        if count == 0 {
            return Err(Error::EmptyLoader("train"));
        }
        Ok(total / count as f64)
    }

    fn validation_loss(
        &self,
        criterion: &Criterion,
        batch:     SpectrumBatch<B::InnerBackend>,
    ) -> Result<f64> {
        let model    = self.model.valid();
        let (x, ctx) = model_input(batch, self.config.params.input_dim)?;
        let output   = model.forward(x.clone());
        Ok(criterion.compute(output, x, &ctx).into_scalar().elem::<f64>())
    }

    fn log_metrics(&self, epoch: usize, phase: LossPhase, train_loss: f64, val_loss: f64, lr: f64) -> Result<()> {
        match &self.metrics {
            Some(logger) => logger.log(&EpochMetrics { epoch, phase, train_loss, val_loss, lr }),
            None         => Ok(()),
        }
    }

    // ── Checkpoints ───────────────────────────────────────────────────────────
    /// Write model, optimizer state, architecture and epoch to
    /// `dir/<name>` or to `loc` when given.
    pub fn save_model(&self, dir: &Path, loc: Option<&Path>) -> Result<CheckpointPaths> {
        let paths = CheckpointPaths::resolve(dir, &self.name, loc);
        let meta  = CheckpointMeta { params: self.config.params.clone(), epoch: self.epoch };
        checkpoint::save_model(&paths, &self.model, self.optimizer.as_ref(), &meta)?;
        Ok(paths)
    }

    /// Replace parameters, optimizer state, epoch counter and
    /// architecture parameters with the checkpoint's. The schedule
    /// moves to the restored epoch.
    pub fn load_model(&mut self, dir: &Path, loc: Option<&Path>) -> Result<()> {
        let paths = CheckpointPaths::resolve(dir, &self.name, loc);
        let (model, meta) =
            checkpoint::load_model(&paths, self.model.clone(), self.optimizer.as_mut(), &self.device)?;
        self.scheduler.at_epoch(meta.epoch);
        self.model          = model;
        self.epoch          = meta.epoch;
        self.config.params  = meta.params;
        Ok(())
    }

    // ── Updates ───────────────────────────────────────────────────────────────
    /// Move the model to `device` and rebuild the loaders for it.
    pub fn update_device(&mut self, device: B::Device) {
        self.model  = self.model.clone().fork(&device);
        let (train, valid, test) = build_loaders::<B>(&self.config, &self.datasets, &device);
        self.train  = train;
        self.valid  = valid;
        self.test   = test;
        self.device = device;
    }

    /// Fresh optimizer and schedule starting at `lr`.
    pub fn update_lr(&mut self, lr: f64) -> Result<()> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::invalid(format!("learning rate must be positive, got {lr}")));
        }
        self.config.training.initial_lr = lr;
        self.rebuild_optimizer()
    }

    /// Fresh optimizer of another kind, and a fresh schedule.
    pub fn update_optimizer(&mut self, kind: OptimizerKind) -> Result<()> {
        self.config.training.optimizer = kind;
        self.rebuild_optimizer()
    }

    /// New schedule over the current optimizer.
    pub fn update_scheduler(&mut self, kind: SchedulerKind, params: SchedulerParams) -> Result<()> {
        self.scheduler = LrScheduler::new(kind, params.clone(), self.config.training.initial_lr)?;
        self.config.training.scheduler        = kind;
        self.config.training.scheduler_params = params;
        Ok(())
    }

    fn rebuild_optimizer(&mut self) -> Result<()> {
        self.optimizer = build_optimizer::<B>(self.config.training.optimizer);
        self.scheduler = LrScheduler::from_training(&self.config.training)?;
        Ok(())
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────
fn build_loaders<B: AutodiffBackend>(
    config:   &RunConfig,
    datasets: &[Arc<SpectrumDataset>; 3],
    device:   &B::Device,
) -> (TrainLoader<B>, EvalLoader<B>, EvalLoader<B>) {
    let data = &config.data;

    let train = DataLoaderBuilder::new(SpectrumBatcher::<B>::new(device.clone()))
        .batch_size(data.batchsize)
        .shuffle(data.shuffle_seed)
        .num_workers(data.num_workers)
        .build(Arc::clone(&datasets[0]));

    let eval = |dataset: &Arc<SpectrumDataset>| {
        DataLoaderBuilder::new(SpectrumBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(data.batchsize_valid)
            .num_workers(data.num_workers)
            .build(Arc::clone(dataset))
    };
    (train, eval(&datasets[1]), eval(&datasets[2]))
}

/// Model input [N, 1, input_dim] and loss context for one batch.
/// Records flatten their channels; views are stacked along the batch
/// axis (view k of item i lands at row i + k * B).
pub fn model_input<BK: Backend>(
    batch:     SpectrumBatch<BK>,
    input_dim: usize,
) -> Result<(Tensor<BK, 3>, LossContext<BK>)> {
    let check = |len: usize| {
        if len == input_dim {
            Ok(())
        } else {
            Err(Error::ShapeMismatch(format!(
                "batch spectra have {len} bins, the model expects input_dim = {input_dim}"
            )))
        }
    };

    match batch {
        SpectrumBatch::Record { features, mask, noise, .. } => {
            let [b, c, l] = features.dims();
            check(c * l)?;
            Ok((features.reshape([b, 1, c * l]), LossContext::new(mask, noise)))
        }
        SpectrumBatch::Views(views) => {
            if views.is_empty() {
                return Err(Error::ShapeMismatch("batch carries no views".into()));
            }
            let x      = Tensor::cat(views, 0);
            let [n, l] = x.dims();
            check(l)?;
            Ok((x.reshape([n, 1, l]), LossContext::empty()))
        }
    }
}
