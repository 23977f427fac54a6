// ============================================================
// Layer 5 — Predictor
// ============================================================
// Scores samples with a trained checkpoint, in inference mode:
// the batcher drops targets, so samples without a gold score
// are fine. Scores come back flattened, one per sample, in
// input order.
use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

use crate::data::{batcher::RegressionBatcher, dataset::SampleEncoder};
use crate::domain::{hparams::HyperParams, sample::Sample};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    model::{ReferencelessRegression, INPUT_FIELDS},
    trainer::predict,
};

pub struct Predictor<B: Backend> {
    model:      ReferencelessRegression<B>,
    encoder:    SampleEncoder,
    batcher:    RegressionBatcher<B>,
    batch_size: usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: ReferencelessRegression<B>, encoder: SampleEncoder, hp: &HyperParams, device: B::Device) -> Self {
        Self {
            model,
            encoder,
            batcher:    RegressionBatcher::inference(device, hp.encoder.pad_token_id),
            batch_size: hp.batch_size,
        }
    }

    /// Rebuild model and tokenizer from a checkpoint directory.
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device) -> Result<Self> {
        let (model, hp) = ckpt.load_scorer::<B>(&device)?;
        let tokenizer = ckpt.tokenizer_store().load()?;
        let encoder = SampleEncoder::new(
            tokenizer, INPUT_FIELDS,
            hp.encoder.max_seq_len, hp.encoder.vocab_size, hp.encoder.pad_token_id,
        )?;
        tracing::info!("Model loaded from checkpoint '{}'", ckpt.dir().display());
        Ok(Self::new(model, encoder, &hp, device))
    }

    pub fn score(&self, samples: &[Sample]) -> Result<Vec<f32>> {
        let dataset = self.encoder.encode_all(samples, false)?;
        let items: Vec<_> = dataset.iter().collect();

        let mut scores = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size.max(1)) {
            let batch = self.batcher.batch(chunk.to_vec());
            scores.extend(predict(&self.model, batch)?);
        }
        tracing::debug!("Scored {} samples", scores.len());
        Ok(scores)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::{hparams::LayerSelector, sample::SampleValue};
    use crate::infra::tokenizer_store::build_word_level;

    type TestBackend = NdArray;

    fn sample(src: &str, mt: &str) -> Sample {
        Sample::new()
            .with("src", SampleValue::Text(src.into()))
            .with("mt", SampleValue::Text(mt.into()))
    }

    #[test]
    fn test_checkpoint_scores_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        // A fixed layer keeps each example's score independent of its batch.
        let hp = HyperParams { batch_size: 2, layer: LayerSelector::Fixed(2), ..HyperParams::tiny() };

        let texts = vec!["der hund".to_string(), "the dog barks".to_string()];
        let tokenizer = build_word_level(&texts, hp.encoder.vocab_size).unwrap();
        ckpt.tokenizer_store().save(&tokenizer).unwrap();
        ckpt.save_hparams(&hp).unwrap();
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &device).unwrap();
        ckpt.save_model(&model, 1).unwrap();

        let predictor = Predictor::<TestBackend>::from_checkpoint(&ckpt, device).unwrap();
        let samples = vec![
            sample("der hund", "the dog"),
            sample("hund", "the dog barks"),
            sample("der", "barks"),
        ];
        let all = predictor.score(&samples).unwrap();
        assert_eq!(all.len(), 3);

        let first_alone = predictor.score(&samples[..1]).unwrap();
        assert!((all[0] - first_alone[0]).abs() < 1e-5);
    }
}
