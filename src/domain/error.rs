// ============================================================
// Layer 3 — Model Error Taxonomy
// ============================================================
// Errors the model core can raise on its own. Everything else
// (I/O, tokenizer, recorder failures) travels as anyhow::Error
// with context attached by the layer that hit it.
//
//   InvalidConfiguration — bad pooling name, encoder family, or
//                          a fixed layer index outside the encoder.
//                          Fatal: the run stops at the forward pass
//                          (or config parse) that hits it.
//   DegenerateBatch      — a validation batch of one example. The
//                          trainer absorbs it: loss is still logged,
//                          metrics accumulation is skipped.
//   MissingField         — a batch or sample lacks a field the
//                          model variant reads (e.g. "mt").

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("degenerate batch: {size} example(s), correlation metrics are undefined")]
    DegenerateBatch { size: usize },

    #[error("missing field '{0}'")]
    MissingField(String),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
