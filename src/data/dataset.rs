// ============================================================
// Layer 4 — Encoded Dataset
// ============================================================
// Samples after tokenization: one id sequence per text field,
// [CLS] tokens… [SEP], truncated to the encoder's max_seq_len.
// Padding is left to the batcher, which pads each batch only
// as far as its longest sequence.
//
//   Sample { src: "…", mt: "…", score: 0.8 }
//       │  SampleEncoder
//       ▼
//   EncodedSample { src: [2, 17, 9, 3], mt: [2, 40, 3], score: 0.8 }
//
// EncodedDataset implements Burn's Dataset trait and is cheap
// to clone (shared storage), so the trainer can hand a fresh
// copy to every DataLoader it builds.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::domain::{
    error::ModelError,
    sample::Sample,
};

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const PAD_TOKEN: &str = "[PAD]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedSample {
    /// Field name → token ids, special tokens included.
    pub fields: BTreeMap<String, Vec<u32>>,
    pub score:  Option<f32>,
}

// ─── SampleEncoder ────────────────────────────────────────────────────────────
#[derive(Clone)]
pub struct SampleEncoder {
    tokenizer:   Tokenizer,
    text_fields: Vec<String>,
    max_seq_len: usize,
    cls_id:      u32,
    sep_id:      u32,
}

impl SampleEncoder {
    /// `vocab_size` and `pad_token_id` are the encoder's; the tokenizer must
    /// agree with both.
    pub fn new(
        tokenizer:    Tokenizer,
        text_fields:  &[&str],
        max_seq_len:  usize,
        vocab_size:   usize,
        pad_token_id: u32,
    ) -> Result<Self> {
        let special = |token: &str| {
            tokenizer.token_to_id(token).ok_or_else(|| {
                ModelError::InvalidConfiguration(format!("tokenizer has no {token} token"))
            })
        };
        let cls_id = special(CLS_TOKEN)?;
        let sep_id = special(SEP_TOKEN)?;
        let pad_id = special(PAD_TOKEN)?;

        if pad_id != pad_token_id {
            return Err(ModelError::InvalidConfiguration(format!(
                "tokenizer pads with id {pad_id}, encoder expects {pad_token_id}"
            ))
            .into());
        }
        let tokenizer_vocab = tokenizer.get_vocab_size(true);
        if tokenizer_vocab > vocab_size {
            return Err(ModelError::InvalidConfiguration(format!(
                "tokenizer vocabulary ({tokenizer_vocab}) exceeds encoder vocab_size ({vocab_size})"
            ))
            .into());
        }

        Ok(Self {
            tokenizer,
            text_fields: text_fields.iter().map(|f| f.to_string()).collect(),
            max_seq_len,
            cls_id,
            sep_id,
        })
    }

    /// `[CLS] tokens… [SEP]`, at most `max_seq_len` ids.
    pub fn encode_text(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation failed: {e}"))?;
        let budget = self.max_seq_len.saturating_sub(2);

        let mut ids = Vec::with_capacity(budget + 2);
        ids.push(self.cls_id);
        ids.extend(encoding.get_ids().iter().take(budget));
        ids.push(self.sep_id);
        Ok(ids)
    }

    /// With `require_score`, a sample without a numeric score is an error.
    pub fn encode(&self, sample: &Sample, require_score: bool) -> Result<EncodedSample> {
        let mut fields = BTreeMap::new();
        for name in &self.text_fields {
            fields.insert(name.clone(), self.encode_text(&sample.text(name)?)?);
        }
        let score = sample.score().map(|s| s as f32);
        if require_score && score.is_none() {
            return Err(ModelError::MissingField("score".to_string()).into());
        }
        Ok(EncodedSample { fields, score })
    }

    pub fn encode_all(&self, samples: &[Sample], require_score: bool) -> Result<EncodedDataset> {
        let encoded = samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                self.encode(s, require_score)
                    .with_context(|| format!("Cannot encode sample {i}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EncodedDataset::new(encoded))
    }
}

// ─── EncodedDataset ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct EncodedDataset {
    samples: Arc<Vec<EncodedSample>>,
}

impl EncodedDataset {
    pub fn new(samples: Vec<EncodedSample>) -> Self {
        Self { samples: Arc::new(samples) }
    }

    /// New dataset holding the samples at `indices`, in that order.
    /// Out-of-range indices are skipped.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self::new(indices.iter().filter_map(|&i| self.samples.get(i).cloned()).collect())
    }
}

impl Dataset<EncodedSample> for EncodedDataset {
    fn get(&self, index: usize) -> Option<EncodedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::SampleValue;
    use crate::infra::tokenizer_store::build_word_level;

    fn encoder(max_seq_len: usize) -> SampleEncoder {
        let tokenizer = build_word_level(&["the red house".to_string()], 32).unwrap();
        SampleEncoder::new(tokenizer, &["src", "mt"], max_seq_len, 32, 0).unwrap()
    }

    fn sample(score: Option<f64>) -> Sample {
        let s = Sample::new()
            .with("src", SampleValue::Text("the house".into()))
            .with("mt", SampleValue::Text("the red red house".into()));
        match score {
            Some(v) => s.with("score", SampleValue::Number(v)),
            None => s,
        }
    }

    #[test]
    fn test_sequences_are_wrapped_and_truncated() {
        let enc = encoder(4);
        let out = enc.encode(&sample(Some(0.5)), true).unwrap();
        let (cls, sep) = (enc.cls_id, enc.sep_id);

        assert_eq!(out.fields["src"].len(), 4);
        assert_eq!(out.fields["mt"].len(), 4);
        assert_eq!(out.fields["mt"][0], cls);
        assert_eq!(*out.fields["mt"].last().unwrap(), sep);
        assert_eq!(out.score, Some(0.5));
    }

    #[test]
    fn test_score_required_for_training() {
        let enc = encoder(16);
        assert!(enc.encode(&sample(None), true).is_err());
        assert_eq!(enc.encode(&sample(None), false).unwrap().score, None);
    }

    #[test]
    fn test_tokenizer_must_fit_encoder_vocab() {
        let tokenizer = build_word_level(&["a b c d e f g".to_string()], 32).unwrap();
        assert!(SampleEncoder::new(tokenizer.clone(), &["src"], 16, 6, 0).is_err());
        assert!(SampleEncoder::new(tokenizer, &["src"], 16, 32, 1).is_err());
    }

    #[test]
    fn test_subset_keeps_requested_order() {
        let items: Vec<EncodedSample> = (0..5)
            .map(|i| EncodedSample { fields: BTreeMap::new(), score: Some(i as f32) })
            .collect();
        let ds = EncodedDataset::new(items);
        let sub = ds.subset(&[3, 1, 9]);
        assert_eq!(sub.len(), 2);
        let scores: Vec<_> = sub.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![Some(3.0), Some(1.0)]);
    }
}
