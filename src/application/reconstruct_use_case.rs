// ============================================================
// Layer 2 — ReconstructUseCase
// ============================================================
// Loads a trained reconstruction model and writes
// <name>_recons_<split>.npz for one split. Pointing a second
// run's configuration at the `encoded_spectra` dataset (with the
// same name) then trains on these reconstructions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::prelude::Backend;

use crate::application::BackendChoice;
use crate::data::dataset::SpectrumDataset;
use crate::domain::{config::RunConfig, sample::Split};
use crate::infra::checkpoint::CheckpointPaths;
use crate::ml::reconstructor::Reconstructor;

#[derive(Debug, Clone)]
pub struct ReconstructConfig {
    pub config_path: PathBuf,
    pub name:        String,
    pub save_dir:    PathBuf,
    pub split:       Split,
    /// Defaults to the dataset directory so encoded_spectra finds it.
    pub out_dir:     Option<PathBuf>,
    pub backend:     BackendChoice,
}

pub struct ReconstructUseCase {
    config: ReconstructConfig,
}

impl ReconstructUseCase {
    pub fn new(config: ReconstructConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<PathBuf> {
        match self.config.backend {
            BackendChoice::Wgpu    => self.run::<burn::backend::Wgpu>(Default::default()),
            BackendChoice::NdArray => self.run::<burn::backend::NdArray>(Default::default()),
        }
    }

    pub fn run<B: Backend>(&self, device: B::Device) -> Result<PathBuf> {
        let cfg = &self.config;
        let run = RunConfig::from_file(&cfg.config_path)
            .with_context(|| format!("loading run configuration '{}'", cfg.config_path.display()))?;

        let paths = CheckpointPaths::resolve(&cfg.save_dir, &cfg.name, None);
        let reconstructor = Reconstructor::<B>::from_checkpoint(&run, &paths, device)
            .with_context(|| format!("loading checkpoint '{}'", paths.stem.display()))?;

        let dataset = SpectrumDataset::open(&run.data, cfg.split, &cfg.name, None)?;
        let out_dir = cfg.out_dir.clone().unwrap_or_else(|| run.data.loc.clone());
        let written = reconstructor
            .write_split(dataset, run.data.batchsize_valid, &out_dir, &cfg.name, cfg.split)
            .context("writing reconstructions")?;
        Ok(written)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};
    use crate::data::dataset::fixtures::write_sdss_all;
    use crate::domain::config::tests::sample_json;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_trained_model_reconstructs_into_dataset_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_all(dir.path(), 6, 32);
        let mut run = RunConfig::from_json(&sample_json("conv", "conv")).unwrap();
        run.data.loc = dir.path().to_path_buf();
        let config_path = dir.path().join("run.json");
        std::fs::write(&config_path, run.to_json().unwrap()).unwrap();

        let train = TrainConfig {
            config_path: config_path.clone(),
            epochs:      1,
            save_dir:    dir.path().join("models"),
            backend:     BackendChoice::NdArray,
            ..Default::default()
        };
        TrainUseCase::new(train).run::<Autodiff<NdArray>>(Default::default()).unwrap();

        let recon = ReconstructConfig {
            config_path,
            name:     "AE".to_string(),
            save_dir: dir.path().join("models"),
            split:    Split::Valid,
            out_dir:  None,
            backend:  BackendChoice::NdArray,
        };
        let path = ReconstructUseCase::new(recon).run::<NdArray>(Default::default()).unwrap();
        assert_eq!(path, dir.path().join("AE_recons_valid.npz"));

        let encoded = SpectrumDataset::encoded_spectra(dir.path(), Split::Valid, "AE", None).unwrap();
        assert_eq!(burn::data::dataset::Dataset::len(&encoded), 6);
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = RunConfig::from_json(&sample_json("fc", "fc")).unwrap();
        run.data.loc = dir.path().to_path_buf();
        let config_path = dir.path().join("run.json");
        std::fs::write(&config_path, run.to_json().unwrap()).unwrap();

        let recon = ReconstructConfig {
            config_path,
            name:     "AE".to_string(),
            save_dir: dir.path().to_path_buf(),
            split:    Split::Test,
            out_dir:  None,
            backend:  BackendChoice::NdArray,
        };
        let err = ReconstructUseCase::new(recon).run::<NdArray>(Default::default()).unwrap_err();
        assert!(format!("{err:#}").contains("loading checkpoint"));
    }
}
