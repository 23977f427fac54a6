// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model, training protocol and scoring, all in Burn.
//
//   encoder.rs   — EncoderAdapter trait + built-in BERT-style
//                  TransformerEncoder (every layer exposed)
//   layerwise.rs — learned scalar mix over encoder layers, or
//                  a fixed layer
//   pooling.rs   — token states → one vector per sentence
//   model.rs     — referenceless regression head and the
//                  ScoreModel / FineTuneModel capability traits
//   freeze.rs    — when the encoder starts receiving updates
//   metrics.rs   — per-stream correlation accumulators
//   trainer.rs   — training / validation loop
//   predictor.rs — scores samples from a checkpoint
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Rei et al. (2020) COMET
//            Devlin et al. (2019) BERT

pub mod encoder;
pub mod layerwise;
pub mod pooling;
pub mod model;
pub mod freeze;
pub mod metrics;
pub mod trainer;
pub mod predictor;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;
