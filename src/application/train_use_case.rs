// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Read and validate the run configuration   (Layer 3 - domain)
//   Step 2: Build the augmentation pipeline           (Layer 4 - data)
//   Step 3: Assemble the Autoencoder and its loaders  (Layer 5 - ml)
//   Step 4: Attach the metrics CSV                    (Layer 6 - infra)
//   Step 5: Resume from a checkpoint if asked         (Layer 6 - infra)
//   Step 6: Train and save the final checkpoint       (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::application::BackendChoice;
use crate::data::transforms::Compose;
use crate::domain::{config::RunConfig, traits::SpectrumTransform};
use crate::infra::{checkpoint::CheckpointPaths, metrics::MetricsLogger};
use crate::ml::trainer::{Autoencoder, TrainingHistory};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything about a run that is not part of the model's own
// configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub config_path: PathBuf,
    pub epochs:      usize,
    pub name:        String,
    pub save_dir:    PathBuf,
    pub metrics:     bool,
    pub resume:      bool,
    pub backend:     BackendChoice,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.json"),
            epochs:      100,
            name:        "AE".to_string(),
            save_dir:    PathBuf::from("./"),
            metrics:     false,
            resume:      false,
            backend:     BackendChoice::Wgpu,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the configured training on the chosen backend.
    pub fn execute(&self) -> Result<TrainingHistory> {
        match self.config.backend {
            BackendChoice::Wgpu => self.run::<burn::backend::Autodiff<burn::backend::Wgpu>>(Default::default()),
            BackendChoice::NdArray => {
                self.run::<burn::backend::Autodiff<burn::backend::NdArray>>(Default::default())
            }
        }
    }

    pub fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingHistory> {
        let cfg = &self.config;

        // ── Step 1: Run configuration ─────────────────────────────────────────
        let run = RunConfig::from_file(&cfg.config_path)
            .with_context(|| format!("loading run configuration '{}'", cfg.config_path.display()))?;

        // ── Step 2: Augmentations ─────────────────────────────────────────────
        let compose = Compose::from_specs(&run.transforms);
        let transform = if compose.is_empty() {
            None
        } else {
            Some(Arc::new(compose) as Arc<dyn SpectrumTransform>)
        };

        // ── Step 3: Autoencoder ───────────────────────────────────────────────
        let mut ae = Autoencoder::<B>::new(run, device, transform, cfg.name.clone(), cfg.save_dir.clone())
            .context("building the autoencoder")?;

        // ── Step 4: Metrics ───────────────────────────────────────────────────
        if cfg.metrics {
            let logger = MetricsLogger::new(&cfg.save_dir, &cfg.name).context("opening metrics file")?;
            tracing::info!("Logging metrics to '{}'", logger.csv_path().display());
            ae = ae.with_metrics(logger);
        }

        // ── Step 5: Resume ────────────────────────────────────────────────────
        if cfg.resume {
            let paths = CheckpointPaths::resolve(&cfg.save_dir, &cfg.name, None);
            if !paths.exists() {
                bail!("no checkpoint to resume: expected {:?}", paths.files());
            }
            ae.load_model(&cfg.save_dir, None)
                .with_context(|| format!("resuming '{}' from '{}'", cfg.name, cfg.save_dir.display()))?;
            tracing::info!("Resumed '{}' at epoch {}", cfg.name, ae.epoch());
        }

        // ── Step 6: Train ─────────────────────────────────────────────────────
        let history = ae.train_model(cfg.epochs).context("training")?;
        if let (Some(t), Some(v)) = (history.train_loss.last(), history.valid_loss.last()) {
            tracing::info!("Final losses: train {t:.6}, valid {v:.6}");
        }
        Ok(history)
    }
}
