// ============================================================
// Layer 5 — Autoencoder Networks
// ============================================================
// Encoder and decoder for 1-D spectra, each either convolutional
// ("conv") or fully connected ("fc"). Any pairing works.
//
//   conv encoder   [B,1,L] → Conv1d stack (ReLU) → flatten
//                          → Linear stack → latent [B,D]
//   fc encoder     [B,1,L] → flatten → Linear stack → latent
//   projection g   latent → Linear stack → [B,P]   (contrastive only)
//
//   conv decoder   latent → Linear stack → [B, final_c, final_dim]
//                          → ConvTranspose1d stack → [B,1,L]
//   fc decoder     latent → Linear stack → [B,1,L]
//
// The conv encoder returns its ConvGeometry. A conv decoder
// mirrors that geometry (or computes its own from decoder.conv_layers
// when the encoder is fc), picking each transposed convolution's
// output padding so the lengths come back exactly.

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig},
        Linear, LinearConfig, PaddingConfig1d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::{
    config::{ConvGeometry, ConvLayer, NetworkKind, RunConfig},
    error::{Error, Result},
};

// ─── Shared helpers ───────────────────────────────────────────────────────────
fn linear_stack<B: Backend>(sizes: &[usize], device: &B::Device) -> Vec<Linear<B>> {
    sizes
        .windows(2)
        .map(|w| LinearConfig::new(w[0], w[1]).init(device))
        .collect()
}

/// ReLU between layers, none after the last one.
fn run_stack<B: Backend, const D: usize>(layers: &[Linear<B>], mut x: Tensor<B, D>) -> Tensor<B, D> {
    let last = layers.len().saturating_sub(1);
    for (i, layer) in layers.iter().enumerate() {
        x = layer.forward(x);
        if i < last {
            x = relu(x);
        }
    }
    x
}

fn sizes(first: usize, hidden: &[usize], last: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(hidden.len() + 2);
    out.push(first);
    out.extend_from_slice(hidden);
    out.push(last);
    out
}

// ─── Encoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub convs:   Vec<Conv1d<B>>,
    pub linears: Vec<Linear<B>>,
    /// Projection head, empty outside contrastive mode
    pub g:       Vec<Linear<B>>,
}

impl<B: Backend> Encoder<B> {
    /// Build the encoder. Conv encoders also return the shapes their
    /// convolutions produce.
    pub fn init(cfg: &RunConfig, device: &B::Device) -> Result<(Self, Option<ConvGeometry>)> {
        let p   = &cfg.params;
        let net = &cfg.encoder;

        let (convs, geometry, flat_dim) = match p.encoder_type {
            NetworkKind::Conv => {
                let geometry = ConvGeometry::compute(p.input_dim, &net.conv_layers)?;
                let convs = net
                    .conv_layers
                    .iter()
                    .enumerate()
                    .map(|(i, layer)| {
                        Conv1dConfig::new(geometry.channels[i], layer.out_channels, layer.kernel_size)
                            .with_stride(layer.stride)
                            .with_padding(PaddingConfig1d::Explicit(layer.padding()))
                            .init(device)
                    })
                    .collect();
                let flat = geometry.flat_dim();
                (convs, Some(geometry), flat)
            }
            NetworkKind::Fc => (Vec::new(), None, p.input_dim),
        };

        let linears = linear_stack(&sizes(flat_dim, &net.dims, p.latent_dim), device);
        let g = if p.contrastive {
            let mut head = vec![p.latent_dim];
            head.extend_from_slice(&net.projection_dims);
            linear_stack(&head, device)
        } else {
            Vec::new()
        };

        Ok((Self { convs, linears, g }, geometry))
    }

    /// x: [batch, 1, input_dim] → latent [batch, latent_dim]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut x = x;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        run_stack(&self.linears, x.flatten::<2>(1, 2))
    }

    /// latent → projection space [batch, P]
    pub fn project(&self, h: Tensor<B, 2>) -> Tensor<B, 2> {
        run_stack(&self.g, h)
    }

    pub fn has_projection_head(&self) -> bool {
        !self.g.is_empty()
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub linears:    Vec<Linear<B>>,
    pub deconvs:    Vec<ConvTranspose1d<B>>,
    pub final_c:    usize,
    pub final_dim:  usize,
    pub output_len: usize,
}

impl<B: Backend> Decoder<B> {
    /// Build the decoder. `encoder_geometry` is what a conv encoder
    /// returned; a conv decoder mirrors it.
    pub fn init(
        cfg:              &RunConfig,
        encoder_geometry: Option<&ConvGeometry>,
        device:           &B::Device,
    ) -> Result<Self> {
        let p   = &cfg.params;
        let net = &cfg.decoder;

        match p.decoder_type {
            NetworkKind::Fc => Ok(Self {
                linears:    linear_stack(&sizes(p.latent_dim, &net.dims, p.input_dim), device),
                deconvs:    Vec::new(),
                final_c:    1,
                final_dim:  p.input_dim,
                output_len: p.input_dim,
            }),
            NetworkKind::Conv => {
                let (geometry, layers) = match encoder_geometry {
                    Some(g) => (g.clone(), cfg.encoder.conv_layers.as_slice()),
                    None => (
                        ConvGeometry::compute(p.input_dim, &net.conv_layers)?,
                        net.conv_layers.as_slice(),
                    ),
                };
                let deconvs = (0..layers.len())
                    .rev()
                    .map(|i| transposed_layer(&geometry, &layers[i], i, device))
                    .collect::<Result<Vec<_>>>()?;

                Ok(Self {
                    linears:    linear_stack(&sizes(p.latent_dim, &net.dims, geometry.flat_dim()), device),
                    deconvs,
                    final_c:    geometry.final_c(),
                    final_dim:  geometry.final_dim(),
                    output_len: p.input_dim,
                })
            }
        }
    }

    /// latent [batch, latent_dim] → reconstruction [batch, 1, input_dim]
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 3> {
        let [batch, _] = z.dims();
        let h = run_stack(&self.linears, z);
        if self.deconvs.is_empty() {
            return h.reshape([batch, 1, self.output_len]);
        }

        let mut x = relu(h).reshape([batch, self.final_c, self.final_dim]);
        let last  = self.deconvs.len() - 1;
        for (i, deconv) in self.deconvs.iter().enumerate() {
            x = deconv.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        x
    }
}

/// Inverse of conv layer `i`: lengths[i + 1] → lengths[i],
/// channels[i + 1] → channels[i].
fn transposed_layer<B: Backend>(
    geometry: &ConvGeometry,
    layer:    &ConvLayer,
    i:        usize,
    device:   &B::Device,
) -> Result<ConvTranspose1d<B>> {
    let (k, s, pad) = (layer.kernel_size, layer.stride, layer.padding());
    let len_in  = geometry.lengths[i + 1];
    let target  = geometry.lengths[i];

    // (len_in - 1) * s - 2p + k, before output padding
    let base = ((len_in - 1) * s + k)
        .checked_sub(2 * pad)
        .ok_or_else(|| Error::invalid(format!("decoder layer {i}: padding exceeds kernel")))?;
    let padding_out = target
        .checked_sub(base)
        .filter(|po| *po < s.max(1))
        .ok_or_else(|| {
            Error::invalid(format!(
                "decoder layer {i}: cannot map length {len_in} back to {target}"
            ))
        })?;

    Ok(ConvTranspose1dConfig::new([geometry.channels[i + 1], geometry.channels[i]], k)
        .with_stride(s)
        .with_padding(pad)
        .with_padding_out(padding_out)
        .init(device))
}

// ─── SpectralAutoencoder ──────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SpectralAutoencoder<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> SpectralAutoencoder<B> {
    /// Build encoder then decoder, threading the encoder's geometry
    /// into the decoder.
    pub fn init(cfg: &RunConfig, device: &B::Device) -> Result<(Self, Option<ConvGeometry>)> {
        let (encoder, geometry) = Encoder::init(cfg, device)?;
        let decoder = Decoder::init(cfg, geometry.as_ref(), device)?;
        Ok((Self { encoder, decoder }, geometry))
    }

    /// x: [batch, 1, input_dim]
    ///   → [batch, 1, input_dim]  reconstruction
    ///   → [batch, 1, P]          projection (contrastive mode)
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = self.encoder.forward(x);
        if self.encoder.has_projection_head() {
            self.encoder.project(h).unsqueeze_dim::<3>(1)
        } else {
            self.decoder.forward(h)
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::tests::{contrastive_sample, sample_json};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn build(encoder: &str, decoder: &str) -> (SpectralAutoencoder<TestBackend>, Option<ConvGeometry>) {
        let cfg = RunConfig::from_json(&sample_json(encoder, decoder)).unwrap();
        SpectralAutoencoder::init(&cfg, &Default::default()).unwrap()
    }

    #[test]
    fn test_all_network_pairs_reconstruct_input_shape() {
        for (enc, dec) in [("conv", "conv"), ("conv", "fc"), ("fc", "conv"), ("fc", "fc")] {
            let (model, _) = build(enc, dec);
            let x   = Tensor::<TestBackend, 3>::ones([3, 1, 32], &Default::default());
            let out = model.forward(x);
            assert_eq!(out.dims(), [3, 1, 32], "{enc}/{dec}");
        }
    }

    #[test]
    fn test_conv_encoder_returns_geometry() {
        let (model, geometry) = build("conv", "fc");
        let g = geometry.unwrap();
        assert_eq!(g.out_dims(), &[16, 8]);
        assert_eq!(g.final_c(), 8);
        assert_eq!(model.encoder.convs.len(), 2);

        let (model, geometry) = build("fc", "conv");
        assert!(geometry.is_none());
        assert!(model.encoder.convs.is_empty());
        assert_eq!(model.decoder.deconvs.len(), 1);
    }

    #[test]
    fn test_odd_lengths_come_back_exactly() {
        let json = sample_json("conv", "conv").replace("\"input_dim\": 32", "\"input_dim\": 37");
        let cfg  = RunConfig::from_json(&json).unwrap();
        let (model, _) = SpectralAutoencoder::<TestBackend>::init(&cfg, &Default::default()).unwrap();
        let x = Tensor::<TestBackend, 3>::zeros([2, 1, 37], &Default::default());
        assert_eq!(model.forward(x).dims(), [2, 1, 37]);
    }

    #[test]
    fn test_contrastive_forward_uses_projection_head() {
        let cfg = contrastive_sample();
        let (model, _) = SpectralAutoencoder::<TestBackend>::init(&cfg, &Default::default()).unwrap();

        let x = Tensor::<TestBackend, 3>::ones([5, 1, 32], &Default::default());
        assert_eq!(model.forward(x.clone()).dims(), [5, 1, 6]);
        assert_eq!(model.encoder.forward(x).dims(), [5, 4]);
    }
}
