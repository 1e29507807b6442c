// ============================================================
// Layer 5 — Bulk Reconstructor
// ============================================================
// Runs a trained autoencoder over a whole split and stores the
// reconstructions as <name>_recons_<split>.npz (array `recons`,
// shape (N, 1, input_dim)). The encoded_spectra dataset reads
// these back as features for a second-stage model.
//
// Inference needs no gradients, so any plain Backend works.
// Batches are read in order (single-threaded loader) so row i
// of the output belongs to spectrum i of the split.

use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    prelude::*,
};
use ndarray::Array3;

use crate::data::{batcher::SpectrumBatcher, dataset::SpectrumDataset, npz::write_npz};
use crate::domain::{
    config::RunConfig,
    error::{Error, Result},
    sample::Split,
};
use crate::infra::checkpoint::{load_weights, CheckpointPaths};
use crate::ml::{model::SpectralAutoencoder, trainer::model_input};

pub struct Reconstructor<B: Backend> {
    model:     SpectralAutoencoder<B>,
    input_dim: usize,
    device:    B::Device,
}

impl<B: Backend> Reconstructor<B> {
    pub fn new(model: SpectralAutoencoder<B>, input_dim: usize, device: B::Device) -> Self {
        Self { model, input_dim, device }
    }

    /// Rebuild the architecture from `config` and load the weights
    /// stored at `paths`.
    pub fn from_checkpoint(config: &RunConfig, paths: &CheckpointPaths, device: B::Device) -> Result<Self> {
        if config.params.contrastive {
            return Err(Error::invalid("contrastive models project spectra, they do not reconstruct them"));
        }
        let (model, _) = SpectralAutoencoder::<B>::init(config, &device)?;
        let model      = load_weights(&paths.model, model, &device)?;
        tracing::info!("Reconstructor ready from '{}'", paths.stem.display());
        Ok(Self::new(model, config.params.input_dim, device))
    }

    /// Reconstruct every spectrum of `dataset`, in order.
    pub fn reconstruct(&self, dataset: SpectrumDataset, batch_size: usize) -> Result<Array3<f32>> {
        let n = dataset.len();
        if n == 0 {
            return Err(Error::EmptyLoader("reconstruction"));
        }
        let loader = DataLoaderBuilder::new(SpectrumBatcher::<B>::new(self.device.clone()))
            .batch_size(batch_size.max(1))
            .build(dataset);

        let mut flat = Vec::with_capacity(n * self.input_dim);
        for batch in loader.iter() {
            let (x, _) = model_input(batch, self.input_dim)?;
            let recon  = self.model.forward(x);
            let values = recon
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| Error::ShapeMismatch(format!("{e:?}")))?;
            flat.extend(values);
        }

        Array3::from_shape_vec((n, 1, self.input_dim), flat)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))
    }

    /// `<dir>/<name>_recons_<split>.npz`
    pub fn output_path(dir: &Path, name: &str, split: Split) -> PathBuf {
        dir.join(format!("{name}_recons_{split}.npz"))
    }

    /// Reconstruct `dataset` and write the archive. Returns its path.
    pub fn write_split(
        &self,
        dataset:    SpectrumDataset,
        batch_size: usize,
        dir:        &Path,
        name:       &str,
        split:      Split,
    ) -> Result<PathBuf> {
        let recons = self.reconstruct(dataset, batch_size)?;
        let path   = Self::output_path(dir, name, split);
        write_npz(&path, "recons", &recons)?;
        tracing::info!("Wrote {} reconstructions to '{}'", recons.dim().0, path.display());
        Ok(path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures::write_sdss_split;
    use crate::domain::config::tests::{contrastive_sample, sample_json};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn reconstructor(input_dim: usize) -> Reconstructor<TestBackend> {
        let json = sample_json("fc", "conv").replace("\"input_dim\": 32", &format!("\"input_dim\": {input_dim}"));
        let cfg  = RunConfig::from_json(&json).unwrap();
        let (model, _) = SpectralAutoencoder::<TestBackend>::init(&cfg, &Default::default()).unwrap();
        Reconstructor::new(model, input_dim, Default::default())
    }

    #[test]
    fn test_reconstructions_feed_the_encoded_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "test", 5, 32, 1);
        let ds  = SpectrumDataset::sdss_dr16(dir.path(), Split::Test, None).unwrap();

        let path = reconstructor(32).write_split(ds, 2, dir.path(), "AE", Split::Test).unwrap();
        assert!(path.ends_with("AE_recons_test.npz"));

        let encoded = SpectrumDataset::encoded_spectra(dir.path(), Split::Test, "AE", None).unwrap();
        assert_eq!(encoded.len(), 5);
        assert_eq!(encoded.item_shape(), (1, 32));
    }

    #[test]
    fn test_input_dim_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "train", 3, 16, 1);
        let ds  = SpectrumDataset::sdss_dr16(dir.path(), Split::Train, None).unwrap();
        let err = reconstructor(32).reconstruct(ds, 4).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_contrastive_models_are_refused() {
        let paths = CheckpointPaths::for_stem("unused");
        let err = Reconstructor::<TestBackend>::from_checkpoint(&contrastive_sample(), &paths, Default::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
