// ============================================================
// Layer 5 — Loss Criteria
// ============================================================
// One calling convention for every reconstruction loss:
//
//   compute(reconstruction, target, context) → scalar [1]
//
//   Standard  MSELoss, L1Loss     context is ignored
//   Custom    masked_mse          mean squared error over mask == 1
//             masked_chi2         squared error / noise² over mask == 1
//
// Context tensors (mask, noise) come straight from the batch in
// [batch, channels, length] and are reshaped to the reconstruction's
// [batch, 1, channels * length]. A missing mask means every bin
// counts; a missing noise means unit noise.
//
// The contrastive criterion (NT-Xent) scores projections instead of
// reconstructions and lives in ContrastiveLoss below. Criterion puts
// both behind the same compute() so the training loop never asks
// which family it holds.

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::{activation::log_softmax, TensorData},
};

use crate::domain::{
    config::{ArchitectureParams, CriterionName},
    error::{Error, Result},
};

/// Floor for noise² so masked-out zero-noise bins stay finite
const NOISE_FLOOR: f64 = 1e-12;

// ─── LossContext ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct LossContext<B: Backend> {
    pub mask:  Option<Tensor<B, 3>>,
    pub noise: Option<Tensor<B, 3>>,
}

impl<B: Backend> LossContext<B> {
    pub fn empty() -> Self {
        Self { mask: None, noise: None }
    }

    pub fn new(mask: Tensor<B, 3>, noise: Tensor<B, 3>) -> Self {
        Self { mask: Some(mask), noise: Some(noise) }
    }
}

// ─── ReconstructionLoss ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardLoss {
    Mse,
    L1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomLoss {
    MaskedMse,
    MaskedChi2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionLoss {
    Standard(StandardLoss),
    Custom(CustomLoss),
}

impl ReconstructionLoss {
    pub fn from_name(name: CriterionName) -> Result<Self> {
        Ok(match name {
            CriterionName::Mse        => Self::Standard(StandardLoss::Mse),
            CriterionName::L1         => Self::Standard(StandardLoss::L1),
            CriterionName::MaskedMse  => Self::Custom(CustomLoss::MaskedMse),
            CriterionName::MaskedChi2 => Self::Custom(CustomLoss::MaskedChi2),
            CriterionName::Contrastive => {
                return Err(Error::invalid("contrastive_loss is not a reconstruction loss"))
            }
        })
    }

    pub fn compute<B: Backend>(
        &self,
        recon:  Tensor<B, 3>,
        target: Tensor<B, 3>,
        ctx:    &LossContext<B>,
    ) -> Tensor<B, 1> {
        match self {
            Self::Standard(StandardLoss::Mse) => MseLoss::new().forward(recon, target, Reduction::Mean),
            Self::Standard(StandardLoss::L1)  => (recon - target).abs().mean(),
            Self::Custom(kind) => {
                let shape = recon.dims();
                let sq    = (recon - target).powf_scalar(2.0);
                let sq = match (kind, &ctx.noise) {
                    (CustomLoss::MaskedChi2, Some(noise)) => {
                        let var = noise.clone().reshape(shape).powf_scalar(2.0).clamp_min(NOISE_FLOOR);
                        sq / var
                    }
                    _ => sq,
                };
                match &ctx.mask {
                    Some(mask) => {
                        let mask  = mask.clone().reshape(shape);
                        let count = mask.clone().sum().clamp_min(1.0);
                        (sq * mask).sum() / count
                    }
                    None => sq.mean(),
                }
            }
        }
    }
}

// ─── ContrastiveLoss ──────────────────────────────────────────────────────────
/// NT-Xent over `n_views` stacked views of the same mini-batch.
///
/// Projections arrive as `[n_views * B, 1, P]` with view k of item i at
/// row `i + k * B`. Rows with equal `row % B` are positives; everything
/// else in the combined batch is a negative. The loss is the mean
/// negative log-probability of the positives under a softmax over
/// cosine similarities divided by `tau`, self-similarity excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastiveLoss {
    pub tau:     f64,
    pub n_views: usize,
}

impl ContrastiveLoss {
    pub fn new(tau: f64, n_views: usize) -> Self {
        Self { tau, n_views }
    }

    pub fn compute<B: Backend>(&self, projections: Tensor<B, 3>) -> Tensor<B, 1> {
        let [n, _, p] = projections.dims();
        let device    = projections.device();
        let batch     = (n / self.n_views.max(1)).max(1);

        let z    = projections.reshape([n, p]);
        let norm = z.clone().powf_scalar(2.0).sum_dim(1).sqrt().clamp_min(1e-8);
        let z    = z / norm;

        let sim = z.clone().matmul(z.transpose()).div_scalar(self.tau);

        let mut eye = vec![0.0f32; n * n];
        let mut pos = vec![0.0f32; n * n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    eye[i * n + j] = 1.0;
                } else if i % batch == j % batch {
                    pos[i * n + j] = 1.0;
                }
            }
        }
        let eye = Tensor::<B, 2>::from_data(TensorData::new(eye, [n, n]), &device);
        let pos = Tensor::<B, 2>::from_data(TensorData::new(pos, [n, n]), &device);

        let log_prob = log_softmax(sim - eye * 1e9, 1);
        let n_pos    = pos.clone().sum().clamp_min(1.0);
        (log_prob * pos).sum().neg() / n_pos
    }
}

// ─── Criterion ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    Reconstruction(ReconstructionLoss),
    Contrastive(ContrastiveLoss),
}

impl Criterion {
    pub fn resolve(name: CriterionName, params: &ArchitectureParams) -> Result<Self> {
        match name {
            CriterionName::Contrastive => Ok(Self::Contrastive(ContrastiveLoss::new(params.tau, params.n_views))),
            other => ReconstructionLoss::from_name(other).map(Self::Reconstruction),
        }
    }

    /// `output` is the model output for `target`. The contrastive loss
    /// only reads the output.
    pub fn compute<B: Backend>(
        &self,
        output: Tensor<B, 3>,
        target: Tensor<B, 3>,
        ctx:    &LossContext<B>,
    ) -> Tensor<B, 1> {
        match self {
            Self::Reconstruction(loss) => loss.compute(output, target, ctx),
            Self::Contrastive(loss)    => loss.compute(output),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn t3(values: Vec<f32>, shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_standard_losses_ignore_context() {
        let recon  = t3(vec![1.0, 2.0, 3.0, 4.0], [1, 1, 4]);
        let target = t3(vec![0.0, 2.0, 3.0, 6.0], [1, 1, 4]);
        let ctx    = LossContext::new(t3(vec![0.0; 4], [1, 1, 4]), t3(vec![1.0; 4], [1, 1, 4]));

        let mse = ReconstructionLoss::from_name(CriterionName::Mse).unwrap();
        assert!((scalar(mse.compute(recon.clone(), target.clone(), &ctx)) - 1.25).abs() < 1e-6);

        let l1 = ReconstructionLoss::from_name(CriterionName::L1).unwrap();
        assert!((scalar(l1.compute(recon, target, &LossContext::empty())) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_masked_mse_skips_masked_bins() {
        let recon  = t3(vec![1.0, 5.0, 3.0, 9.0], [1, 2, 2]).reshape([1, 1, 4]);
        let target = t3(vec![0.0; 4], [1, 1, 4]);
        // mask arrives channel-first [1, 2, 2]
        let ctx = LossContext::new(t3(vec![1.0, 0.0, 1.0, 0.0], [1, 2, 2]), t3(vec![1.0; 4], [1, 2, 2]));

        let loss = ReconstructionLoss::Custom(CustomLoss::MaskedMse).compute(recon, target, &ctx);
        // (1 + 9) / 2
        assert!((scalar(loss) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_masked_chi2_weights_by_noise() {
        let recon  = t3(vec![2.0, 2.0], [1, 1, 2]);
        let target = t3(vec![0.0, 0.0], [1, 1, 2]);
        let ctx    = LossContext::new(t3(vec![1.0, 1.0], [1, 1, 2]), t3(vec![1.0, 2.0], [1, 1, 2]));

        let loss = ReconstructionLoss::Custom(CustomLoss::MaskedChi2).compute(recon, target, &ctx);
        // (4/1 + 4/4) / 2
        assert!((scalar(loss) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_contrastive_name_is_not_a_reconstruction_loss() {
        assert!(ReconstructionLoss::from_name(CriterionName::Contrastive).is_err());
    }

    #[test]
    fn test_criterion_resolves_every_name() {
        let json   = crate::domain::config::tests::sample_json("fc", "fc");
        let params = crate::domain::config::RunConfig::from_json(&json).unwrap().params;
        assert!(matches!(
            Criterion::resolve(CriterionName::MaskedChi2, &params).unwrap(),
            Criterion::Reconstruction(ReconstructionLoss::Custom(CustomLoss::MaskedChi2))
        ));
        let Criterion::Contrastive(c) = Criterion::resolve(CriterionName::Contrastive, &params).unwrap() else {
            panic!("expected the contrastive criterion")
        };
        assert_eq!((c.tau, c.n_views), (0.1, 2));
    }

    #[test]
    fn test_nt_xent_prefers_aligned_views() {
        let loss = ContrastiveLoss::new(0.1, 2);
        // Two items, views in rows [item0, item1, item0', item1']
        let aligned    = t3(vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0], [4, 1, 2]);
        let misaligned = t3(vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0], [4, 1, 2]);

        let good = scalar(loss.compute(aligned));
        let bad  = scalar(loss.compute(misaligned));
        assert!(good.is_finite() && bad.is_finite());
        assert!(good < 0.01, "aligned views should score near zero, got {good}");
        assert!(bad > good);
    }
}
