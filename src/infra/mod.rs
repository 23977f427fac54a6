// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence and reporting used by the training and scoring
// paths:
//
//   checkpoint.rs      — hparams.json + full-precision weight
//                        records per epoch, latest-epoch pointer,
//                        pretrained encoder records
//
//   tokenizer_store.rs — builds a word-level tokenizer from the
//                        training texts or loads a stored one, so
//                        training and scoring share a vocabulary
//
//   metrics.rs         — CsvLogSink: every logged scalar, step or
//                        epoch granularity, appended to metrics.csv
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// CSV metrics sink
pub mod metrics;
