// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// A checkpoint is three sibling files sharing one stem:
//
//   <stem>_model.mpk.gz   model parameters
//   <stem>_optim.mpk.gz   optimizer state (Adam moments etc.)
//   <stem>_meta.json      { "params": architecture, "epoch": n }
//
// The stem is <save_dir>/<model name> unless the caller passes an
// explicit location. Writes overwrite in place.
//
// Burn's NamedMpkGzFileRecorder (full precision):
//   - MessagePack with parameter names, gzip compressed
//   - replaces the path's extension, so the stem itself must
//     not carry one
//
// Burn happily loads a record whose tensors have other shapes than
// the model it is loaded into. load_model compares the parameter
// shapes before and after loading and refuses the checkpoint when
// they differ.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::{
    config::ArchitectureParams,
    error::{Error, Result},
};
use crate::ml::{model::SpectralAutoencoder, optim::ModelOptimizer};

type ModelRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

// ─── Paths ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub stem:  PathBuf,
    /// Model record path, without the extension the recorder appends
    pub model: PathBuf,
    pub optim: PathBuf,
    pub meta:  PathBuf,
}

impl CheckpointPaths {
    pub fn for_stem(stem: impl Into<PathBuf>) -> Self {
        let stem = stem.into();
        let with = |suffix: &str| {
            let mut name = stem.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(suffix);
            stem.with_file_name(name)
        };
        Self {
            model: with("_model"),
            optim: with("_optim"),
            meta:  with("_meta.json"),
            stem,
        }
    }

    /// `<dir>/<name>` unless an explicit location is given.
    pub fn resolve(dir: &Path, name: &str, loc: Option<&Path>) -> Self {
        match loc {
            Some(loc) => Self::for_stem(loc),
            None      => Self::for_stem(dir.join(name)),
        }
    }

    /// Files as they appear on disk.
    pub fn files(&self) -> [PathBuf; 3] {
        [
            self.model.with_extension("mpk.gz"),
            self.optim.with_extension("mpk.gz"),
            self.meta.clone(),
        ]
    }

    pub fn exists(&self) -> bool {
        self.files().iter().all(|f| f.exists())
    }
}

// ─── Meta ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub params: ArchitectureParams,
    pub epoch:  usize,
}

// ─── Save / load ──────────────────────────────────────────────────────────────
pub fn save_model<B: AutodiffBackend>(
    paths:     &CheckpointPaths,
    model:     &SpectralAutoencoder<B>,
    optimizer: &dyn ModelOptimizer<B>,
    meta:      &CheckpointMeta,
) -> Result<()> {
    if let Some(parent) = paths.stem.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    ModelRecorder::new().record(model.clone().into_record(), paths.model.clone())?;
    optimizer.save(&paths.optim)?;

    let json = serde_json::to_string_pretty(meta).map_err(|e| Error::Recorder(e.to_string()))?;
    fs::write(&paths.meta, json)?;

    tracing::info!("saved model to '{}' (epoch {})", paths.stem.display(), meta.epoch);
    Ok(())
}

/// Load parameters into `model` and state into `optimizer`. Returns
/// the updated model and the stored meta.
pub fn load_model<B: AutodiffBackend>(
    paths:     &CheckpointPaths,
    model:     SpectralAutoencoder<B>,
    optimizer: &mut dyn ModelOptimizer<B>,
    device:    &B::Device,
) -> Result<(SpectralAutoencoder<B>, CheckpointMeta)> {
    let meta: CheckpointMeta = serde_json::from_str(&fs::read_to_string(&paths.meta)?)
        .map_err(|e| Error::Decode { path: paths.meta.clone(), message: e.to_string() })?;

    let model = load_weights(&paths.model, model, device)?;
    optimizer.load(&paths.optim, device)?;

    tracing::info!("loaded model from '{}' (epoch {})", paths.stem.display(), meta.epoch);
    Ok((model, meta))
}

/// Parameters only, for inference on any backend.
pub fn load_weights<B: Backend>(
    path:   &Path,
    model:  SpectralAutoencoder<B>,
    device: &B::Device,
) -> Result<SpectralAutoencoder<B>> {
    let expected = param_shapes(&model);
    let record   = ModelRecorder::new().load(path.to_path_buf(), device)?;
    let model    = model.load_record(record);

    let found = param_shapes(&model);
    if found != expected {
        return Err(Error::ShapeMismatch(describe_mismatch(&expected, &found)));
    }
    Ok(model)
}

// ─── Shape check ──────────────────────────────────────────────────────────────
#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend>(model: &SpectralAutoencoder<B>) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    model.visit(&mut collector);
    collector.shapes
}

fn describe_mismatch(expected: &[Vec<usize>], found: &[Vec<usize>]) -> String {
    if expected.len() != found.len() {
        return format!("model has {} parameters, checkpoint {}", expected.len(), found.len());
    }
    expected
        .iter()
        .zip(found)
        .enumerate()
        .find(|(_, (e, f))| e != f)
        .map(|(i, (e, f))| format!("parameter {i}: model {e:?}, checkpoint {f:?}"))
        .unwrap_or_else(|| "parameter shapes differ".to_string())
}
