// ============================================================
// Layer 4 — Regression Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks EncodedSamples into
// one RegressionBatch.
//
// Dynamic padding: every text field is padded to the longest
// sequence of that field within the batch (not to max_seq_len),
// with the pad-token id. The attention mask is 1 for real
// tokens, 0 for padding.
//
//   ids   [[2, 17, 9, 3], [2, 40, 3, 0]]
//   mask  [[1,  1, 1, 1], [1,  1, 1, 0]]
//
// In inference mode targets are dropped: the batch carries
// inputs only, and samples without a score are accepted.

use std::collections::BTreeMap;

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::EncodedSample;
use crate::ml::model::{ModelInput, TokenizedField};

// ─── RegressionBatch ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct RegressionBatch<B: Backend> {
    pub inputs:  ModelInput<B>,
    /// [batch_size]; `None` in inference mode.
    pub targets: Option<Tensor<B, 1>>,
}

impl<B: Backend> RegressionBatch<B> {
    pub fn len(&self) -> usize {
        self.inputs.batch_size()
    }
}

// ─── RegressionBatcher ────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct RegressionBatcher<B: Backend> {
    pub device:       B::Device,
    pub pad_token_id: u32,
    pub inference:    bool,
}

impl<B: Backend> RegressionBatcher<B> {
    pub fn new(device: B::Device, pad_token_id: u32) -> Self {
        Self { device, pad_token_id, inference: false }
    }

    pub fn inference(device: B::Device, pad_token_id: u32) -> Self {
        Self { device, pad_token_id, inference: true }
    }

    fn pad_field(&self, sequences: &[&[u32]]) -> TokenizedField<B> {
        let batch_size = sequences.len();
        let seq_len = sequences.iter().map(|s| s.len()).max().unwrap_or(0).max(1);

        let mut ids  = Vec::with_capacity(batch_size * seq_len);
        let mut mask = Vec::with_capacity(batch_size * seq_len);
        for seq in sequences {
            ids.extend(seq.iter().map(|&t| t as i32));
            ids.extend(std::iter::repeat(self.pad_token_id as i32).take(seq_len - seq.len()));
            mask.extend(std::iter::repeat(1i32).take(seq.len()));
            mask.extend(std::iter::repeat(0i32).take(seq_len - seq.len()));
        }

        let input_ids = Tensor::<B, 1, Int>::from_ints(
            ids.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(
            mask.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        TokenizedField { input_ids, attention_mask }
    }
}

impl<B: Backend> Batcher<EncodedSample, RegressionBatch<B>> for RegressionBatcher<B> {
    fn batch(&self, items: Vec<EncodedSample>) -> RegressionBatch<B> {
        let names: Vec<&String> = items
            .first()
            .map(|s| s.fields.keys().collect())
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        for name in names {
            let sequences: Vec<&[u32]> = items
                .iter()
                .map(|s| s.fields.get(name).map(Vec::as_slice).unwrap_or(&[]))
                .collect();
            fields.insert(name.clone(), self.pad_field(&sequences));
        }

        let targets = if self.inference {
            None
        } else {
            // Encoding with require_score guarantees every training sample has one.
            let scores: Vec<f32> = items.iter().map(|s| s.score.unwrap_or(0.0)).collect();
            Some(Tensor::<B, 1>::from_floats(scores.as_slice(), &self.device))
        };

        RegressionBatch { inputs: ModelInput { fields }, targets }
    }
}
