// ============================================================
// Layer 5 — Referenceless Regression Model
// ============================================================
// Scores a translation from its source alone (no reference):
//
//   src, mt ──encoder──▶ all_layers ──aggregator──▶ tokens
//           ──pooler──▶ sentence vectors  s, m       [batch, d]
//   features = [m, s, m ⊙ s, |m − s|]               [batch, 4d]
//   score    = FeedForward(features)                [batch, 1]
//
// The trainer sees the model through two capability traits:
//   ScoreModel    — forward pass, any backend
//   FineTuneModel — splits gradients into optimizer groups,
//                   each with its own learning rate. Groups the
//                   freeze schedule holds back are never returned,
//                   so their parameters never move.
//
// Learning rates:
//   aggregator + estimator      learning_rate
//   encoder group i             encoder_learning_rate × decay^(top − i)
//   (embeddings i = 0, blocks 1..=N, pooler top = N + 1)

use std::collections::BTreeMap;

use burn::{
    module::{AutodiffModule, Ignored},
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    optim::GradientsParams,
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::domain::{
    error::{ModelError, ModelResult},
    hparams::{HyperParams, LayerSelector, PoolingStrategy},
};
use crate::ml::{
    encoder::{EncoderAdapter, EncoderParams, TransformerEncoder, TransformerEncoderConfig},
    freeze::FreezeScheduler,
    layerwise::{select_layer, LayerwiseAttention, LayerwiseAttentionConfig},
    pooling::pool,
};

/// Text fields the referenceless model reads.
pub const INPUT_FIELDS: &[&str] = &["src", "mt"];

// ─── Inputs ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TokenizedField<B: Backend> {
    /// [batch, seq_len]
    pub input_ids:      Tensor<B, 2, Int>,
    /// [batch, seq_len], 1 for real tokens
    pub attention_mask: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct ModelInput<B: Backend> {
    pub fields: BTreeMap<String, TokenizedField<B>>,
}

impl<B: Backend> ModelInput<B> {
    pub fn field(&self, name: &str) -> ModelResult<&TokenizedField<B>> {
        self.fields
            .get(name)
            .ok_or_else(|| ModelError::MissingField(name.to_string()))
    }

    pub fn batch_size(&self) -> usize {
        self.fields
            .values()
            .next()
            .map(|f| f.input_ids.dims()[0])
            .unwrap_or(0)
    }
}

// ─── Capability traits ────────────────────────────────────────────────────────
pub trait ScoreModel<B: Backend>: Module<B> {
    /// Returns scores of shape [batch, 1].
    fn forward(&self, input: &ModelInput<B>) -> ModelResult<Tensor<B, 2>>;
}

/// Gradients for one slice of the model and the rate to apply them at.
pub struct ParamGroup {
    pub name:  String,
    pub lr:    f64,
    pub grads: GradientsParams,
}

pub trait FineTuneModel<B: AutodiffBackend>: AutodiffModule<B> + ScoreModel<B> {
    fn param_groups(
        &self,
        grads:  B::Gradients,
        freeze: &FreezeScheduler,
        hp:     &HyperParams,
    ) -> Vec<ParamGroup>;
}

/// One rate per encoder group, bottom (embeddings) to top (pooler).
pub fn layerwise_learning_rates(base: f64, decay: f64, num_blocks: usize) -> Vec<f64> {
    let top = num_blocks + 1;
    (0..=top).map(|i| base * decay.powi((top - i) as i32)).collect()
}

// ─── FeedForward estimator ────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct FeedForwardConfig {
    pub in_dim:       usize,
    pub hidden_sizes: Vec<usize>,
    #[config(default = 1)]
    pub out_dim:      usize,
    #[config(default = 0.1)]
    pub dropout:      f64,
}

impl FeedForwardConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeedForward<B> {
        let mut dims = vec![self.in_dim];
        dims.extend(&self.hidden_sizes);
        dims.push(self.out_dim);
        let layers = dims
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init(device))
            .collect();
        FeedForward { layers, dropout: DropoutConfig::new(self.dropout).init() }
    }
}

#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub layers:  Vec<Linear<B>>,
    pub dropout: Dropout,
}

impl<B: Backend> FeedForward<B> {
    /// Linear → tanh → dropout for every hidden layer, then a bare Linear.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = x;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.dropout.forward(activation::tanh(x));
            }
        }
        x
    }
}

// ─── ReferencelessRegression ──────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ReferencelessRegression<B: Backend> {
    pub encoder:             TransformerEncoder<B>,
    pub layerwise_attention: Option<LayerwiseAttention<B>>,
    pub estimator:           FeedForward<B>,
    pub pool:                Ignored<PoolingStrategy>,
    pub layer:               Ignored<LayerSelector>,
}

impl<B: Backend> ReferencelessRegression<B> {
    /// Build a freshly initialised model. Fails on an unknown encoder family
    /// or invalid hyperparameters.
    pub fn from_hparams(hp: &HyperParams, device: &B::Device) -> ModelResult<Self> {
        hp.validate()?;
        let encoder: TransformerEncoder<B> =
            TransformerEncoderConfig::from_spec(&hp.encoder_model, &hp.encoder, hp.dropout)?.init(device);

        let layerwise_attention = match hp.layer {
            LayerSelector::Mix => Some(
                LayerwiseAttentionConfig::new(encoder.num_layers())
                    .with_dropout(hp.dropout)
                    .init(device),
            ),
            LayerSelector::Fixed(_) => None,
        };

        let estimator = FeedForwardConfig::new(hp.encoder.d_model * 4, hp.hidden_sizes.clone())
            .with_dropout(hp.dropout)
            .init(device);

        Ok(Self {
            encoder,
            layerwise_attention,
            estimator,
            pool:  Ignored(hp.pool),
            layer: Ignored(hp.layer),
        })
    }

    /// Encoder → aggregator → pooler for one text field. [batch, d_model]
    pub fn sentence_embedding(&self, field: &TokenizedField<B>) -> ModelResult<Tensor<B, 2>> {
        let out = self.encoder.forward(field.input_ids.clone(), field.attention_mask.clone());
        let fixed = match self.layer.0 {
            LayerSelector::Fixed(index) => Some(index),
            LayerSelector::Mix => None,
        };
        let tokens = select_layer(
            self.layerwise_attention.as_ref(),
            fixed,
            &out.all_layers,
            field.attention_mask.clone(),
        )?;
        pool(
            self.pool.0,
            field.input_ids.clone(),
            tokens,
            field.attention_mask.clone(),
            self.encoder.pad_token_id(),
            out.sentemb,
        )
    }
}

impl<B: Backend> ScoreModel<B> for ReferencelessRegression<B> {
    fn forward(&self, input: &ModelInput<B>) -> ModelResult<Tensor<B, 2>> {
        let src = self.sentence_embedding(input.field("src")?)?;
        let mt  = self.sentence_embedding(input.field("mt")?)?;

        let diff = (mt.clone() - src.clone()).abs();
        let prod = mt.clone() * src.clone();
        let features = Tensor::cat(vec![mt, src, prod, diff], 1);

        Ok(self.estimator.forward(features))
    }
}

impl<B: AutodiffBackend> FineTuneModel<B> for ReferencelessRegression<B> {
    fn param_groups(
        &self,
        mut grads: B::Gradients,
        freeze:    &FreezeScheduler,
        hp:        &HyperParams,
    ) -> Vec<ParamGroup> {
        let mut groups = Vec::new();
        if let Some(mix) = &self.layerwise_attention {
            groups.push(ParamGroup {
                name:  "layerwise_attention".to_string(),
                lr:    hp.learning_rate,
                grads: GradientsParams::from_module(&mut grads, mix),
            });
        }
        groups.push(ParamGroup {
            name:  "estimator".to_string(),
            lr:    hp.learning_rate,
            grads: GradientsParams::from_module(&mut grads, &self.estimator),
        });

        if freeze.is_frozen() {
            return groups;
        }

        let encoder_grads = self.encoder.grouped_gradients(&mut grads);
        let rates = layerwise_learning_rates(
            hp.encoder_learning_rate,
            hp.layerwise_decay,
            encoder_grads.blocks.len(),
        );

        if freeze.embeddings_trainable() {
            groups.push(ParamGroup {
                name:  "encoder.embeddings".to_string(),
                lr:    rates[0],
                grads: encoder_grads.embeddings,
            });
        }
        for (i, block) in encoder_grads.blocks.into_iter().enumerate() {
            groups.push(ParamGroup {
                name:  format!("encoder.layers.{i}"),
                lr:    rates[i + 1],
                grads: block,
            });
        }
        groups.push(ParamGroup {
            name:  "encoder.pooler".to_string(),
            lr:    rates[rates.len() - 1],
            grads: encoder_grads.pooler,
        });
        groups
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend     = NdArray;
    type TestAutodiff    = Autodiff<NdArray>;

    fn field<B: Backend>(ids: [[i32; 4]; 2], mask: [[i32; 4]; 2]) -> TokenizedField<B> {
        let device = Default::default();
        TokenizedField {
            input_ids:      Tensor::from_ints(ids, &device),
            attention_mask: Tensor::from_ints(mask, &device),
        }
    }

    fn input<B: Backend>() -> ModelInput<B> {
        let mut fields = BTreeMap::new();
        fields.insert("src".to_string(), field([[2, 5, 6, 3], [2, 7, 3, 0]], [[1, 1, 1, 1], [1, 1, 1, 0]]));
        fields.insert("mt".to_string(), field([[2, 9, 3, 0], [2, 4, 8, 3]], [[1, 1, 1, 0], [1, 1, 1, 1]]));
        ModelInput { fields }
    }

    #[test]
    fn test_forward_scores_one_value_per_example() {
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&HyperParams::tiny(), &Default::default())
            .unwrap();
        let scores = model.forward(&input()).unwrap();
        assert_eq!(scores.dims(), [2, 1]);
    }

    #[test]
    fn test_every_pool_and_layer_choice_runs() {
        for pool in [PoolingStrategy::Default, PoolingStrategy::Max, PoolingStrategy::Avg, PoolingStrategy::Cls] {
            for layer in [LayerSelector::Mix, LayerSelector::Fixed(0), LayerSelector::Fixed(2)] {
                let hp = HyperParams { pool, layer, ..HyperParams::tiny() };
                let model = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &Default::default())
                    .unwrap();
                assert_eq!(model.forward(&input()).unwrap().dims(), [2, 1]);
            }
        }
    }

    #[test]
    fn test_out_of_range_layer_fails_at_forward() {
        let hp = HyperParams { layer: LayerSelector::Fixed(3), ..HyperParams::tiny() };
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &Default::default()).unwrap();
        let err = model.forward(&input()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfiguration(msg) if msg.contains('3')));
    }

    #[test]
    fn test_unknown_encoder_family_fails_at_construction() {
        let hp = HyperParams { encoder_model: "lstm".to_string(), ..HyperParams::tiny() };
        let err = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &Default::default()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_field() {
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&HyperParams::tiny(), &Default::default())
            .unwrap();
        let mut inp = input::<TestBackend>();
        inp.fields.remove("mt");
        assert_eq!(model.forward(&inp).unwrap_err(), ModelError::MissingField("mt".to_string()));
    }

    #[test]
    fn test_layerwise_learning_rates() {
        let rates = layerwise_learning_rates(1.0, 0.5, 2);
        assert_eq!(rates, vec![0.125, 0.25, 0.5, 1.0]);
    }

    fn group_names(freeze: &FreezeScheduler) -> Vec<String> {
        let hp = HyperParams::tiny();
        let model = ReferencelessRegression::<TestAutodiff>::from_hparams(&hp, &Default::default()).unwrap();
        let loss = model.forward(&input()).unwrap().sum();
        model
            .param_groups(loss.backward(), freeze, &hp)
            .into_iter()
            .map(|g| g.name)
            .collect()
    }

    #[test]
    fn test_frozen_encoder_contributes_no_groups() {
        let names = group_names(&FreezeScheduler::new(1.0, false));
        assert_eq!(names, vec!["layerwise_attention", "estimator"]);
    }

    #[test]
    fn test_unfrozen_groups_respect_embedding_freeze() {
        let all = group_names(&FreezeScheduler::new(0.0, false));
        assert_eq!(all, vec![
            "layerwise_attention", "estimator",
            "encoder.embeddings", "encoder.layers.0", "encoder.layers.1", "encoder.pooler",
        ]);

        let without = group_names(&FreezeScheduler::new(0.0, true));
        assert!(!without.iter().any(|n| n == "encoder.embeddings"));
        assert!(without.iter().any(|n| n == "encoder.pooler"));
    }
}
