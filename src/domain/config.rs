// ============================================================
// Layer 3 — Run Configuration
// ============================================================
// One JSON document describes a run:
//
//   {
//     "params":     { architecture: network kinds, sizes, contrastive },
//     "data":       { dataset kind, location, batch sizes },
//     "training":   { optimizer, scheduler, criteria, annealing },
//     "encoder":    { conv_layers, dims, projection_dims },
//     "decoder":    { conv_layers, dims },
//     "transforms": [ { "type": "standardize" }, ... ]
//   }
//
// Every name (network kind, optimizer, scheduler, criterion) is a
// closed enum, so an unknown name fails while parsing, before any
// model parameter exists.

use std::{fmt, fs, path::{Path, PathBuf}, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::{Error, Result};

// ─── Network kinds ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NetworkKind {
    Conv,
    Fc,
}

impl FromStr for NetworkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(s.to_string()).map_err(Error::InvalidConfig)
    }
}

impl TryFrom<String> for NetworkKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        match s.as_str() {
            "conv" => Ok(NetworkKind::Conv),
            "fc"   => Ok(NetworkKind::Fc),
            other  => Err(format!("invalid network type '{other}', expected 'conv' or 'fc'")),
        }
    }
}

impl From<NetworkKind> for String {
    fn from(kind: NetworkKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Conv => f.write_str("conv"),
            NetworkKind::Fc   => f.write_str("fc"),
        }
    }
}

// ─── Architecture parameters ──────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureParams {
    pub encoder_type: NetworkKind,
    pub decoder_type: NetworkKind,
    /// Train the projection head with a contrastive loss instead of
    /// reconstructing the input.
    #[serde(default)]
    pub contrastive:  bool,
    /// Temperature of the contrastive loss
    #[serde(default = "default_tau")]
    pub tau:          f64,
    /// Number of augmented views per spectrum in contrastive mode
    #[serde(default = "default_n_views")]
    pub n_views:      usize,
    /// Number of flux bins per spectrum (all channels flattened)
    pub input_dim:    usize,
    pub latent_dim:   usize,
}

fn default_tau() -> f64 { 0.1 }
fn default_n_views() -> usize { 2 }

/// One 1-D convolution of a conv encoder (or the mirrored transposed
/// convolution of a conv decoder). Padding is always `kernel_size / 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayer {
    pub out_channels: usize,
    pub kernel_size:  usize,
    #[serde(default = "default_stride")]
    pub stride:       usize,
}

fn default_stride() -> usize { 2 }

impl ConvLayer {
    pub fn padding(&self) -> usize {
        self.kernel_size / 2
    }
}

/// Per-network layer description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Convolutions in encoder order. Ignored by fc networks.
    #[serde(default)]
    pub conv_layers:     Vec<ConvLayer>,
    /// Hidden sizes of the fully-connected stack between the
    /// (flattened) spectrum or conv features and the latent space.
    #[serde(default)]
    pub dims:            Vec<usize>,
    /// Projection head sizes (encoder only, contrastive mode).
    #[serde(default)]
    pub projection_dims: Vec<usize>,
}

// ─── Conv geometry ────────────────────────────────────────────────────────────
/// Lengths and channel counts through a conv stack. Computed once by
/// the encoder and handed to the decoder so both agree on the shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvGeometry {
    /// lengths[0] is the input length, lengths[i + 1] the output of layer i
    pub lengths:  Vec<usize>,
    /// channels[0] is the single input channel
    pub channels: Vec<usize>,
}

impl ConvGeometry {
    pub fn compute(input_dim: usize, layers: &[ConvLayer]) -> Result<Self> {
        let mut lengths  = vec![input_dim];
        let mut channels = vec![1];

        for (i, layer) in layers.iter().enumerate() {
            if layer.kernel_size == 0 || layer.stride == 0 || layer.out_channels == 0 {
                return Err(Error::invalid(format!(
                    "conv layer {i} needs positive out_channels, kernel_size and stride"
                )));
            }
            let len    = lengths[i];
            let padded = len + 2 * layer.padding();
            if padded < layer.kernel_size {
                return Err(Error::invalid(format!(
                    "conv layer {i}: kernel {} does not fit a length-{len} input",
                    layer.kernel_size
                )));
            }
            lengths.push((padded - layer.kernel_size) / layer.stride + 1);
            channels.push(layer.out_channels);
        }

        Ok(Self { lengths, channels })
    }

    pub fn out_dims(&self) -> &[usize] {
        &self.lengths[1..]
    }

    pub fn final_dim(&self) -> usize {
        self.lengths[self.lengths.len() - 1]
    }

    pub fn final_c(&self) -> usize {
        self.channels[self.channels.len() - 1]
    }

    pub fn flat_dim(&self) -> usize {
        self.final_dim() * self.final_c()
    }
}

// ─── Dataset parameters ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// SDSS_DR16_preprocessed_<split>.npz
    SdssDr16,
    /// SDSS_DR16 masks/noise with <model>_recons_<split>.npz as features
    EncodedSpectra,
    /// DR16_denoised_inpainted_<train|test>.npy, normalised in memory
    SdssDr16Simple,
    /// DR16_<train|test>.npz with labels and redshifts
    SdssDr16SmallLabeled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetParams {
    pub dataset:         DatasetKind,
    pub loc:             PathBuf,
    pub batchsize:       usize,
    pub batchsize_valid: usize,
    #[serde(default = "default_shuffle_seed")]
    pub shuffle_seed:    u64,
    #[serde(default = "default_num_workers")]
    pub num_workers:     usize,
}

fn default_shuffle_seed() -> u64 { 42 }
fn default_num_workers() -> usize { 1 }

// ─── Training parameters ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    #[serde(rename = "SGD")]
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerKind {
    StepLR,
    ExponentialLR,
    CosineAnnealingLR,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma:     Option<f64>,
    #[serde(default, alias = "T_max", skip_serializing_if = "Option::is_none")]
    pub t_max:     Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_min:   Option<f64>,
}

impl SchedulerKind {
    /// Check that `params` carries what this scheduler needs.
    pub fn check(&self, params: &SchedulerParams) -> Result<()> {
        let missing = |key: &str| Error::invalid(format!("{self:?} requires scheduler_params.{key}"));
        match self {
            SchedulerKind::StepLR => {
                let step = params.step_size.ok_or_else(|| missing("step_size"))?;
                params.gamma.ok_or_else(|| missing("gamma"))?;
                if step == 0 {
                    return Err(Error::invalid("StepLR step_size must be positive"));
                }
            }
            SchedulerKind::ExponentialLR => {
                params.gamma.ok_or_else(|| missing("gamma"))?;
            }
            SchedulerKind::CosineAnnealingLR => {
                let t_max = params.t_max.ok_or_else(|| missing("T_max"))?;
                if t_max == 0 {
                    return Err(Error::invalid("CosineAnnealingLR T_max must be positive"));
                }
            }
        }
        Ok(())
    }
}

/// Loss criteria by name. Standard losses only compare reconstruction
/// and target; custom losses also read the mask/noise context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionName {
    #[serde(rename = "MSELoss")]
    Mse,
    #[serde(rename = "L1Loss")]
    L1,
    #[serde(rename = "masked_mse")]
    MaskedMse,
    #[serde(rename = "masked_chi2")]
    MaskedChi2,
    #[serde(rename = "contrastive_loss")]
    Contrastive,
}

impl CriterionName {
    pub fn is_contrastive(&self) -> bool {
        matches!(self, CriterionName::Contrastive)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub optimizer:          OptimizerKind,
    pub initial_lr:         f64,
    pub scheduler:          SchedulerKind,
    #[serde(default)]
    pub scheduler_params:   SchedulerParams,
    pub criterion1:         CriterionName,
    pub criterion2:         CriterionName,
    /// First epoch trained with criterion2
    #[serde(default)]
    pub ann_epoch:          usize,
    #[serde(default = "default_patience")]
    pub patience:           usize,
    #[serde(default = "default_patience_threshold")]
    pub patience_threshold: f64,
}

fn default_patience() -> usize { 5 }
fn default_patience_threshold() -> f64 { 3e-2 }

// ─── Transforms ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Per-spectrum zero mean, unit standard deviation
    Standardize,
    /// Additive Gaussian noise with the given standard deviation
    GaussianNoise { sigma: f32 },
    /// Zero a random fraction of the flux bins
    RandomMask { fraction: f32 },
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub params:     ArchitectureParams,
    pub data:       DatasetParams,
    pub training:   TrainingParams,
    #[serde(default)]
    pub encoder:    NetworkParams,
    #[serde(default)]
    pub decoder:    NetworkParams,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

impl RunConfig {
    /// Read and validate a JSON run configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: RunConfig = serde_json::from_str(json)
            .map_err(|e| Error::invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid(e.to_string()))
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let p = &self.params;
        let t = &self.training;

        if p.input_dim == 0 || p.latent_dim == 0 {
            return Err(Error::invalid("input_dim and latent_dim must be positive"));
        }
        if self.data.batchsize == 0 || self.data.batchsize_valid == 0 {
            return Err(Error::invalid("batch sizes must be positive"));
        }
        if !(t.initial_lr.is_finite() && t.initial_lr > 0.0) {
            return Err(Error::invalid(format!("initial_lr must be positive, got {}", t.initial_lr)));
        }
        t.scheduler.check(&t.scheduler_params)?;

        if p.contrastive {
            if !t.criterion1.is_contrastive() {
                return Err(Error::invalid("contrastive mode trains with criterion1 = contrastive_loss"));
            }
            if !(p.tau.is_finite() && p.tau > 0.0) {
                return Err(Error::invalid("tau must be positive"));
            }
            if p.n_views < 2 {
                return Err(Error::invalid("contrastive mode needs at least two views"));
            }
            if self.encoder.projection_dims.is_empty() {
                return Err(Error::invalid("contrastive mode needs encoder.projection_dims"));
            }
        } else if t.criterion1.is_contrastive() || t.criterion2.is_contrastive() {
            return Err(Error::invalid("contrastive_loss is only valid with params.contrastive = true"));
        }

        if p.encoder_type == NetworkKind::Conv {
            if self.encoder.conv_layers.is_empty() {
                return Err(Error::invalid("conv encoder needs at least one conv layer"));
            }
            ConvGeometry::compute(p.input_dim, &self.encoder.conv_layers)?;
        }
        if p.decoder_type == NetworkKind::Conv && p.encoder_type == NetworkKind::Fc {
            if self.decoder.conv_layers.is_empty() {
                return Err(Error::invalid(
                    "conv decoder after an fc encoder needs its own conv layers",
                ));
            }
            ConvGeometry::compute(p.input_dim, &self.decoder.conv_layers)?;
        }
        Ok(())
    }
}
