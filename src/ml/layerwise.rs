// ============================================================
// Layer 5 — Layer Aggregator
// ============================================================
// Turns the encoder's per-layer token states into the single
// [batch, seq_len, hidden] tensor the pooler consumes.
//
//   LayerSelector::Mix      → LayerwiseAttention (learned mix)
//   LayerSelector::Fixed(i) → all_layers[i], verbatim
//
// Learned mix (scalar mix over layers):
//   s     = softmax(w)              one weight per layer
//   mix   = γ · Σ_i s_i · LN_mask(h_i)
// LN_mask normalises each layer with mean/variance taken over all
// unmasked elements of the batch. In training, layer dropout sets
// a dropped weight to -1e20 before the softmax.

use burn::{
    module::Param,
    prelude::*,
    tensor::{activation, Distribution},
};

use crate::domain::error::{ModelError, ModelResult};

const DROPPED_WEIGHT: f32 = -1.0e20;
const NORM_EPS: f64 = 1e-12;

#[derive(Config, Debug)]
pub struct LayerwiseAttentionConfig {
    pub num_layers: usize,
    #[config(default = 0.1)]
    pub dropout:    f64,
    #[config(default = true)]
    pub layer_norm: bool,
}

impl LayerwiseAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LayerwiseAttention<B> {
        LayerwiseAttention {
            scalar_parameters: Param::from_tensor(Tensor::zeros([self.num_layers], device)),
            gamma:             Param::from_tensor(Tensor::ones([1], device)),
            dropout:           self.dropout,
            layer_norm:        self.layer_norm,
        }
    }
}

#[derive(Module, Debug)]
pub struct LayerwiseAttention<B: Backend> {
    pub scalar_parameters: Param<Tensor<B, 1>>,
    pub gamma:             Param<Tensor<B, 1>>,
    pub dropout:           f64,
    pub layer_norm:        bool,
}

impl<B: Backend> LayerwiseAttention<B> {
    /// `mask`: [batch, seq_len], 1 for real tokens.
    pub fn forward(&self, layers: &[Tensor<B, 3>], mask: Tensor<B, 2, Int>) -> ModelResult<Tensor<B, 3>> {
        let weights = self.scalar_parameters.val();
        let [num_weights] = weights.dims();
        if layers.len() != num_weights {
            return Err(ModelError::InvalidConfiguration(format!(
                "layerwise attention expects {num_weights} layers, encoder produced {}",
                layers.len()
            )));
        }

        let weights = if B::ad_enabled() && self.dropout > 0.0 {
            let draw = Tensor::<B, 1>::random([num_weights], Distribution::Uniform(0.0, 1.0), &weights.device());
            weights.mask_fill(draw.lower_equal_elem(self.dropout), DROPPED_WEIGHT)
        } else {
            weights
        };
        let normed_weights = activation::softmax(weights, 0);

        let [batch_size, seq_len] = mask.dims();
        let mask = mask.float().reshape([batch_size, seq_len, 1]);

        let mut mixed: Option<Tensor<B, 3>> = None;
        for (i, layer) in layers.iter().enumerate() {
            let layer = if self.layer_norm {
                masked_layer_norm(layer.clone(), mask.clone())
            } else {
                layer.clone()
            };
            let w = normed_weights.clone().slice([i..i + 1]).reshape([1, 1, 1]);
            let piece = layer * w;
            mixed = Some(match mixed {
                Some(acc) => acc + piece,
                None => piece,
            });
        }

        let gamma = self.gamma.val().reshape([1, 1, 1]);
        mixed
            .map(|m| m * gamma)
            .ok_or_else(|| ModelError::InvalidConfiguration("encoder produced no layers".to_string()))
    }
}

/// Layer norm over the unmasked elements of the whole batch.
/// `mask`: [batch, seq_len, 1] of 0.0 / 1.0.
fn masked_layer_norm<B: Backend>(tensor: Tensor<B, 3>, mask: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, _, hidden] = tensor.dims();
    let count = mask.clone().sum().mul_scalar(hidden as f64).clamp_min(1.0);

    let mean = (tensor.clone() * mask.clone()).sum() / count.clone();
    let mean = mean.reshape([1, 1, 1]);
    let centered = tensor - mean;

    let masked = centered.clone() * mask;
    let variance = (masked.clone() * masked).sum() / count;
    let std = variance.add_scalar(NORM_EPS).sqrt().reshape([1, 1, 1]);

    centered / std
}

/// Pick the token states the pooler works on.
pub fn select_layer<B: Backend>(
    layerwise:  Option<&LayerwiseAttention<B>>,
    fixed:      Option<i64>,
    all_layers: &[Tensor<B, 3>],
    mask:       Tensor<B, 2, Int>,
) -> ModelResult<Tensor<B, 3>> {
    if let Some(mix) = layerwise {
        return mix.forward(all_layers, mask);
    }
    match fixed {
        Some(index) if index >= 0 && (index as usize) < all_layers.len() => {
            Ok(all_layers[index as usize].clone())
        }
        Some(index) => Err(ModelError::InvalidConfiguration(format!(
            "invalid model layer {index} (encoder has {} layers)",
            all_layers.len()
        ))),
        None => Err(ModelError::InvalidConfiguration(
            "layer 'mix' selected but no layerwise attention was built".to_string(),
        )),
    }
}
