// ============================================================
// Layer 5 — Encoder Adapter
// ============================================================
// The model core talks to its text encoder through two traits:
//
//   EncoderAdapter — forward pass returning every layer's token
//                    states plus an optional native sentence
//                    embedding; layer count; pad-token id.
//   EncoderParams  — splits the encoder's gradients into groups
//                    (embeddings, one per block, pooler) so the
//                    freeze schedule and layer-wise learning
//                    rates can decide which groups get updated.
//
// TransformerEncoder is the built-in BERT-style implementation:
//   token + position embeddings → LayerNorm → dropout
//   N post-norm self-attention blocks (padding masked)
//   pooler: tanh(Linear(h[:, 0]))  → native sentence embedding
//
// all_layers[0] is the embedding output, all_layers[i] the
// output of block i, so num_layers() == blocks + 1.
//
// Reference: Devlin et al. (2019) BERT

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    optim::GradientsParams,
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::domain::{
    error::{ModelError, ModelResult},
    hparams::EncoderSpec,
};

/// Encoder families this build knows how to construct.
pub const ENCODER_FAMILIES: &[&str] = &["transformer"];

// ─── EncoderOutput ────────────────────────────────────────────────────────────
pub struct EncoderOutput<B: Backend> {
    /// One [batch, seq_len, hidden] tensor per layer, embeddings first.
    pub all_layers: Vec<Tensor<B, 3>>,
    /// [batch, hidden], for encoders that define one.
    pub sentemb: Option<Tensor<B, 2>>,
}

// ─── Capability traits ────────────────────────────────────────────────────────
pub trait EncoderAdapter<B: Backend> {
    fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> EncoderOutput<B>;

    /// Number of entries in `EncoderOutput::all_layers`.
    fn num_layers(&self) -> usize;

    fn pad_token_id(&self) -> u32;
}

/// Gradients of one encoder, grouped bottom to top.
pub struct EncoderGrads {
    pub embeddings: GradientsParams,
    /// One entry per block, in depth order.
    pub blocks:     Vec<GradientsParams>,
    pub pooler:     GradientsParams,
}

pub trait EncoderParams<B: AutodiffBackend> {
    /// Moves this encoder's gradients out of `grads`.
    fn grouped_gradients(&self, grads: &mut B::Gradients) -> EncoderGrads;
}

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TransformerEncoderConfig {
    pub vocab_size:   usize,
    pub max_seq_len:  usize,
    pub d_model:      usize,
    pub num_heads:    usize,
    pub num_layers:   usize,
    pub d_ff:         usize,
    pub pad_token_id: usize,
    #[config(default = 0.1)]
    pub dropout:      f64,
}

impl TransformerEncoderConfig {
    /// Resolve an encoder family name and architecture into a config.
    pub fn from_spec(family: &str, spec: &EncoderSpec, dropout: f64) -> ModelResult<Self> {
        if !ENCODER_FAMILIES.contains(&family.to_ascii_lowercase().as_str()) {
            return Err(ModelError::InvalidConfiguration(format!(
                "unknown encoder model '{family}' (available: {})",
                ENCODER_FAMILIES.join(", ")
            )));
        }
        Ok(Self::new(
            spec.vocab_size, spec.max_seq_len, spec.d_model,
            spec.num_heads, spec.num_layers, spec.d_ff,
            spec.pad_token_id as usize,
        )
        .with_dropout(dropout))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerEncoder<B> {
        let embeddings = EncoderEmbeddings {
            token:    EmbeddingConfig::new(self.vocab_size, self.d_model).init(device),
            position: EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device),
            norm:     LayerNormConfig::new(self.d_model).init(device),
            dropout:  DropoutConfig::new(self.dropout).init(),
        };
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let pooler = LinearConfig::new(self.d_model, self.d_model).init(device);
        TransformerEncoder {
            embeddings, layers, pooler,
            pad_token_id: self.pad_token_id,
            max_seq_len:  self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

// ─── Modules ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderEmbeddings<B: Backend> {
    pub token:    Embedding<B>,
    pub position: Embedding<B>,
    pub norm:     LayerNorm<B>,
    pub dropout:  Dropout,
}

impl<B: Backend> EncoderEmbeddings<B> {
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [_, seq_len] = input_ids.dims();
        let tok_emb = self.token.forward(input_ids);

        // [1, seq_len] positions, broadcast over the batch on addition.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>();
        let pos_emb = self.position.forward(positions);

        self.dropout.forward(self.norm.forward(tok_emb + pos_emb))
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `mask_pad`: [batch, seq_len], true at padding positions.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_input  = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(attn_input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TransformerEncoder<B: Backend> {
    pub embeddings:   EncoderEmbeddings<B>,
    pub layers:       Vec<EncoderBlock<B>>,
    pub pooler:       Linear<B>,
    pub pad_token_id: usize,
    pub max_seq_len:  usize,
}

impl<B: Backend> EncoderAdapter<B> for TransformerEncoder<B> {
    fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> EncoderOutput<B> {
        let [batch_size, _] = input_ids.dims();
        let mask_pad = attention_mask.equal_elem(0);

        let mut x = self.embeddings.forward(input_ids);
        let [_, _, d_model] = x.dims();

        let mut all_layers = Vec::with_capacity(self.layers.len() + 1);
        all_layers.push(x.clone());
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
            all_layers.push(x.clone());
        }

        let first = x
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);
        let sentemb = activation::tanh(self.pooler.forward(first));

        EncoderOutput { all_layers, sentemb: Some(sentemb) }
    }

    fn num_layers(&self) -> usize {
        self.layers.len() + 1
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_token_id as u32
    }
}

impl<B: AutodiffBackend> EncoderParams<B> for TransformerEncoder<B> {
    fn grouped_gradients(&self, grads: &mut B::Gradients) -> EncoderGrads {
        EncoderGrads {
            embeddings: GradientsParams::from_module(grads, &self.embeddings),
            blocks: self
                .layers
                .iter()
                .map(|layer| GradientsParams::from_module(grads, layer))
                .collect(),
            pooler: GradientsParams::from_module(grads, &self.pooler),
        }
    }
}
