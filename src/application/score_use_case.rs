// ============================================================
// Layer 2 — Score Use Case
// ============================================================
// Loads a trained checkpoint and scores every row of a CSV.
// When every row carries a gold score, the Pearson correlation
// between predictions and gold scores is reported too.

use std::path::Path;

use anyhow::Result;
use burn::prelude::Backend;

use crate::data::reader::CsvSampleReader;
use crate::domain::traits::SampleReader;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{metrics::pearson, predictor::Predictor};

#[derive(Debug, Clone)]
pub struct ScoreReport {
    pub scores:  Vec<f32>,
    /// Present only when every sample has a gold score.
    pub pearson: Option<f64>,
}

pub struct ScoreUseCase<B: Backend> {
    predictor: Predictor<B>,
}

impl<B: Backend> ScoreUseCase<B> {
    pub fn new(checkpoint_dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let ckpt = CheckpointManager::open(checkpoint_dir)?;
        Ok(Self { predictor: Predictor::from_checkpoint(&ckpt, device)? })
    }

    pub fn score_file(&self, data: &Path) -> Result<ScoreReport> {
        let samples = CsvSampleReader::default().read_samples(data)?;
        let scores = self.predictor.score(&samples)?;

        let gold: Option<Vec<f64>> = samples.iter().map(|s| s.score()).collect();
        let pearson = gold.map(|gold| {
            let preds: Vec<f64> = scores.iter().map(|&s| s as f64).collect();
            pearson(&preds, &gold)
        });
        Ok(ScoreReport { scores, pearson })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use burn::backend::NdArray;

    use crate::domain::hparams::HyperParams;
    use crate::infra::tokenizer_store::build_word_level;
    use crate::ml::model::ReferencelessRegression;

    type TestBackend = NdArray;

    fn checkpoint(dir: &Path) {
        let hp = HyperParams::tiny();
        let ckpt = CheckpointManager::new(dir).unwrap();
        let tokenizer = build_word_level(&["a b c".to_string()], hp.encoder.vocab_size).unwrap();
        ckpt.tokenizer_store().save(&tokenizer).unwrap();
        ckpt.save_hparams(&hp).unwrap();
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &Default::default()).unwrap();
        ckpt.save_model(&model, 1).unwrap();
    }

    #[test]
    fn test_scores_with_and_without_gold() {
        let dir = tempfile::tempdir().unwrap();
        checkpoint(&dir.path().join("ckpt"));
        let use_case = ScoreUseCase::<TestBackend>::new(dir.path().join("ckpt"), Default::default()).unwrap();

        let with_gold = dir.path().join("gold.csv");
        fs::write(&with_gold, "src,mt,score\na b,b a,0.1\nc,a c,0.9\nb,c,0.4\n").unwrap();
        let report = use_case.score_file(&with_gold).unwrap();
        assert_eq!(report.scores.len(), 3);
        assert!(report.pearson.is_some());

        let without_gold = dir.path().join("plain.csv");
        fs::write(&without_gold, "src,mt\na b,b a\n").unwrap();
        let report = use_case.score_file(&without_gold).unwrap();
        assert_eq!(report.scores.len(), 1);
        assert!(report.pearson.is_none());
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ScoreUseCase::<TestBackend>::new(dir.path().join("nothing"), Default::default()).is_err());
    }
}
