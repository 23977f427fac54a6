// ============================================================
// Layer 3 — Hyperparameters
// ============================================================
// Immutable configuration captured when a model is built and
// written next to its weights as hparams.json, so a checkpoint
// can be rebuilt without the training data.
//
// The enum-valued options (pooling, layer, optimizer) are parsed
// eagerly: an unknown name is rejected while reading the config,
// never halfway through an epoch.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::{ModelError, ModelResult};

// ─── PoolingStrategy ──────────────────────────────────────────────────────────
/// How token embeddings are reduced to one vector per example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PoolingStrategy {
    /// The encoder's own sentence embedding.
    Default,
    /// Elementwise max over non-padding tokens.
    Max,
    /// Mean over non-padding tokens.
    Avg,
    /// The embedding at position 0.
    Cls,
}

impl PoolingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolingStrategy::Default => "default",
            PoolingStrategy::Max     => "max",
            PoolingStrategy::Avg     => "avg",
            PoolingStrategy::Cls     => "cls",
        }
    }
}

impl FromStr for PoolingStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PoolingStrategy::Default),
            "max"     => Ok(PoolingStrategy::Max),
            "avg"     => Ok(PoolingStrategy::Avg),
            "cls"     => Ok(PoolingStrategy::Cls),
            other => Err(ModelError::InvalidConfiguration(format!(
                "invalid pooling technique '{other}' (expected default, max, avg or cls)"
            ))),
        }
    }
}

impl TryFrom<String> for PoolingStrategy {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PoolingStrategy> for String {
    fn from(p: PoolingStrategy) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for PoolingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── LayerSelector ────────────────────────────────────────────────────────────
/// Which encoder layer(s) feed the pooler.
///
/// `Fixed` keeps the raw (possibly negative) index: the range check needs
/// the encoder's layer count and happens at forward time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayerRepr", into = "LayerRepr")]
pub enum LayerSelector {
    Mix,
    Fixed(i64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LayerRepr {
    Index(i64),
    Name(String),
}

impl TryFrom<LayerRepr> for LayerSelector {
    type Error = ModelError;

    fn try_from(value: LayerRepr) -> Result<Self, Self::Error> {
        match value {
            LayerRepr::Index(i) => Ok(LayerSelector::Fixed(i)),
            LayerRepr::Name(name) => name.parse(),
        }
    }
}

impl From<LayerSelector> for LayerRepr {
    fn from(l: LayerSelector) -> Self {
        match l {
            LayerSelector::Mix => LayerRepr::Name("mix".to_string()),
            LayerSelector::Fixed(i) => LayerRepr::Index(i),
        }
    }
}

impl FromStr for LayerSelector {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "mix" {
            return Ok(LayerSelector::Mix);
        }
        s.trim().parse::<i64>().map(LayerSelector::Fixed).map_err(|_| {
            ModelError::InvalidConfiguration(format!(
                "invalid model layer '{s}' (expected \"mix\" or a layer index)"
            ))
        })
    }
}

impl fmt::Display for LayerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSelector::Mix => f.write_str("mix"),
            LayerSelector::Fixed(i) => write!(f, "{i}"),
        }
    }
}

// ─── OptimizerKind ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    AdamW,
}

impl FromStr for OptimizerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Adam"  => Ok(OptimizerKind::Adam),
            "AdamW" => Ok(OptimizerKind::AdamW),
            other => Err(ModelError::InvalidConfiguration(format!(
                "unsupported optimizer '{other}' (expected Adam or AdamW)"
            ))),
        }
    }
}

// ─── EncoderSpec ──────────────────────────────────────────────────────────────
/// Architecture of the built-in transformer encoder.
/// `vocab_size` and `pad_token_id` must agree with the tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub vocab_size:   usize,
    pub max_seq_len:  usize,
    pub d_model:      usize,
    pub num_heads:    usize,
    pub num_layers:   usize,
    pub d_ff:         usize,
    pub pad_token_id: u32,
}

impl Default for EncoderSpec {
    fn default() -> Self {
        Self {
            vocab_size:   30522,
            max_seq_len:  128,
            d_model:      128,
            num_heads:    2,
            num_layers:   2,
            d_ff:         512,
            pad_token_id: 0,
        }
    }
}

// ─── HyperParams ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Epochs (possibly fractional) during which the encoder stays frozen.
    pub nr_frozen_epochs:       f64,
    pub keep_embeddings_frozen: bool,
    pub optimizer:              OptimizerKind,
    pub encoder_learning_rate:  f64,
    /// Learning rate of the layer aggregator and estimator head.
    pub learning_rate:          f64,
    pub layerwise_decay:        f64,
    pub encoder_model:          String,
    /// Directory holding `tokenizer.json` and an `encoder.mpk` record.
    #[serde(default)]
    pub pretrained_model:       Option<String>,
    pub pool:                   PoolingStrategy,
    pub layer:                  LayerSelector,
    pub dropout:                f64,
    pub batch_size:             usize,
    pub hidden_sizes:           Vec<usize>,
    #[serde(default)]
    pub train_data:             Option<PathBuf>,
    #[serde(default)]
    pub validation_data:        Option<PathBuf>,
    pub encoder:                EncoderSpec,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            nr_frozen_epochs:       0.4,
            keep_embeddings_frozen: false,
            optimizer:              OptimizerKind::AdamW,
            encoder_learning_rate:  1e-5,
            learning_rate:          3e-5,
            layerwise_decay:        0.95,
            encoder_model:          "transformer".to_string(),
            pretrained_model:       None,
            pool:                   PoolingStrategy::Avg,
            layer:                  LayerSelector::Mix,
            dropout:                0.1,
            batch_size:             8,
            hidden_sizes:           vec![256],
            train_data:             None,
            validation_data:        None,
            encoder:                EncoderSpec::default(),
        }
    }
}

impl HyperParams {
    pub fn validate(&self) -> ModelResult<()> {
        let invalid = |msg: String| Err(ModelError::InvalidConfiguration(msg));

        if !self.nr_frozen_epochs.is_finite() {
            return invalid("nr_frozen_epochs must be finite".to_string());
        }
        for (name, lr) in [
            ("learning_rate", self.learning_rate),
            ("encoder_learning_rate", self.encoder_learning_rate),
        ] {
            if !lr.is_finite() || lr <= 0.0 {
                return invalid(format!("{name} must be > 0"));
            }
        }
        if !(self.layerwise_decay > 0.0 && self.layerwise_decay <= 1.0) {
            return invalid("layerwise_decay must be in (0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be >= 1".to_string());
        }
        if self.hidden_sizes.iter().any(|&h| h == 0) {
            return invalid("hidden_sizes must be non-zero".to_string());
        }
        let enc = &self.encoder;
        if enc.num_heads == 0 || enc.d_model % enc.num_heads != 0 {
            return invalid(format!(
                "encoder d_model ({}) must be divisible by num_heads ({})",
                enc.d_model, enc.num_heads
            ));
        }
        if enc.max_seq_len < 2 {
            return invalid("encoder max_seq_len must be >= 2".to_string());
        }
        if enc.pad_token_id as usize >= enc.vocab_size {
            return invalid("encoder pad_token_id must be inside the vocabulary".to_string());
        }
        Ok(())
    }

    /// A model small enough for CPU unit tests.
    #[cfg(test)]
    pub(crate) fn tiny() -> Self {
        Self {
            nr_frozen_epochs: 0.0,
            dropout:          0.0,
            batch_size:       4,
            hidden_sizes:     vec![6],
            learning_rate:    1e-2,
            encoder_learning_rate: 1e-2,
            encoder: EncoderSpec {
                vocab_size:   32,
                max_seq_len:  16,
                d_model:      8,
                num_heads:    2,
                num_layers:   2,
                d_ff:         16,
                pad_token_id: 0,
            },
            ..Self::default()
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pooling_rejected_at_parse() {
        let mut json = serde_json::to_value(HyperParams::default()).unwrap();
        json["pool"] = serde_json::json!("median");
        let err = serde_json::from_value::<HyperParams>(json).unwrap_err();
        assert!(err.to_string().contains("invalid pooling technique"));
    }

    #[test]
    fn test_layer_selector_accepts_mix_and_index() {
        let mut hp = HyperParams::default();
        hp.layer = LayerSelector::Fixed(1);
        let json = serde_json::to_string(&hp).unwrap();
        assert!(json.contains("\"layer\":1"));
        let back: HyperParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.layer, LayerSelector::Fixed(1));

        assert_eq!("mix".parse::<LayerSelector>().unwrap(), LayerSelector::Mix);
        assert_eq!("-1".parse::<LayerSelector>().unwrap(), LayerSelector::Fixed(-1));
        assert!("top".parse::<LayerSelector>().is_err());
    }

    #[test]
    fn test_hparams_json_round_trip() {
        let mut hp = HyperParams::default();
        hp.nr_frozen_epochs = 1.5;
        hp.pool = PoolingStrategy::Max;
        hp.pretrained_model = Some("models/tiny".to_string());
        let json = serde_json::to_string_pretty(&hp).unwrap();
        let back: HyperParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hp);
    }

    #[test]
    fn test_validate() {
        assert!(HyperParams::default().validate().is_ok());

        let mut hp = HyperParams::default();
        hp.batch_size = 0;
        assert!(hp.validate().is_err());

        let mut hp = HyperParams::default();
        hp.encoder.num_heads = 3;
        assert!(hp.validate().is_err());

        let mut hp = HyperParams::default();
        hp.layerwise_decay = 0.0;
        assert!(hp.validate().is_err());
    }
}
