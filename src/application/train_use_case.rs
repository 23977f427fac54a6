// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Read train / validation CSVs     (Layer 4 - data)
//   Step 2: Load or build tokenizer          (Layer 6 - infra)
//   Step 3: Encode samples, draw subset      (Layer 4 - data)
//   Step 4: Build model, seed encoder        (Layer 5 - ml)
//   Step 5: Save hparams + tokenizer         (Layer 6 - infra)
//   Step 6: Run training loop                (Layer 5 - ml)
//   Step 7: Export the trained encoder       (Layer 6 - infra)
//
// After step 7 the checkpoint directory holds encoder.mpk and
// tokenizer.json, so it can be named as `pretrained_model` of
// a later run.
//
// Reference: Burn Book §5 (Training)

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::data::{dataset::SampleEncoder, reader::CsvSampleReader};
use crate::domain::hparams::HyperParams;
use crate::infra::{
    checkpoint::{load_pretrained_encoder, save_encoder, CheckpointManager},
    metrics::CsvLogSink,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    model::{ReferencelessRegression, INPUT_FIELDS},
    trainer::{SampleSplits, Trainer, TrainerConfig},
};

// ─── TrainRequest ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub hparams:        HyperParams,
    pub trainer:        TrainerConfig,
    pub checkpoint_dir: PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase<B: AutodiffBackend> {
    request: TrainRequest,
    device:  B::Device,
}

impl<B: AutodiffBackend> TrainUseCase<B> {
    pub fn new(request: TrainRequest, device: B::Device) -> Self {
        Self { request, device }
    }

    /// Execute the full training pipeline end to end.
    /// Returns the checkpoint directory.
    pub fn execute(&self) -> Result<PathBuf> {
        let hp  = &self.request.hparams;
        let cfg = &self.request.trainer;
        hp.validate()?;

        // ── Step 1: Read raw samples ──────────────────────────────────────────
        let splits = SampleSplits::read(&CsvSampleReader::default(), hp)?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        // A pretrained model brings its own vocabulary; otherwise one is
        // built from the training texts (or reused from the checkpoint dir).
        let ckpt = CheckpointManager::new(&self.request.checkpoint_dir)?;
        let tokenizer = match &hp.pretrained_model {
            Some(dir) => {
                let tokenizer = TokenizerStore::new(dir).load()?;
                ckpt.tokenizer_store().save(&tokenizer)?;
                tokenizer
            }
            None => ckpt
                .tokenizer_store()
                .load_or_build(&splits.train_texts(INPUT_FIELDS), hp.encoder.vocab_size)?,
        };

        // ── Step 3: Encode ────────────────────────────────────────────────────
        let encoder = SampleEncoder::new(
            tokenizer, INPUT_FIELDS,
            hp.encoder.max_seq_len, hp.encoder.vocab_size, hp.encoder.pad_token_id,
        )?;
        let data = splits.encode(&encoder, cfg.seed)?;

        // ── Step 4: Model ─────────────────────────────────────────────────────
        let mut model = ReferencelessRegression::<B>::from_hparams(hp, &self.device)?;
        if let Some(dir) = &hp.pretrained_model {
            model.encoder = load_pretrained_encoder(model.encoder, &PathBuf::from(dir), &self.device)?;
        }
        tracing::info!(
            "Model ready: {} encoder layers, d_model={}, pool={}, layer={}",
            hp.encoder.num_layers, hp.encoder.d_model, hp.pool, hp.layer,
        );

        // ── Step 5: Persist what scoring needs ────────────────────────────────
        ckpt.save_hparams(hp)?;

        // ── Step 6: Train ─────────────────────────────────────────────────────
        let sink = Arc::new(CsvLogSink::new(ckpt.dir())?);
        tracing::info!("Logging metrics to '{}'", sink.csv_path().display());
        let mut trainer = Trainer::<B>::setup(hp.clone(), cfg.clone(), data, self.device.clone(), sink)?;
        let model = trainer
            .fit(model, Some(&ckpt))
            .context("Training failed")?;
        tracing::info!("{} optimizer steps taken", trainer.state().global_step);

        // ── Step 7: Export encoder ────────────────────────────────────────────
        save_encoder(&model.encoder, ckpt.dir())?;

        Ok(ckpt.dir().to_path_buf())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::Path};

    use burn::backend::{Autodiff, NdArray};

    type TestAutodiff = Autodiff<NdArray>;

    fn write_csv(path: &Path, rows: usize) {
        let mut content = String::from("src,mt,score\n");
        let words = ["haus", "rot", "blau", "hund", "katze", "baum"];
        for i in 0..rows {
            let a = words[i % words.len()];
            let b = words[(i + 2) % words.len()];
            content.push_str(&format!("{a} {b},the {b} {a},{}\n", (i % 5) as f64 / 5.0));
        }
        fs::write(path, content).unwrap();
    }

    fn request(dir: &Path) -> TrainRequest {
        write_csv(&dir.join("train.csv"), 10);
        write_csv(&dir.join("dev.csv"), 4);
        TrainRequest {
            hparams: HyperParams {
                train_data:      Some(dir.join("train.csv")),
                validation_data: Some(dir.join("dev.csv")),
                ..HyperParams::tiny()
            },
            trainer: TrainerConfig { max_epochs: 1, seed: 1, num_devices: 1 },
            checkpoint_dir: dir.join("ckpt"),
        }
    }

    #[test]
    fn test_execute_writes_a_loadable_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let out = TrainUseCase::<TestAutodiff>::new(request(dir.path()), Default::default())
            .execute()
            .unwrap();

        for file in [
            "hparams.json", "tokenizer.json", "latest_epoch.json",
            "model_epoch_1.mpk", "metrics.csv", "encoder.mpk",
        ] {
            assert!(out.join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn test_pretrained_encoder_and_tokenizer_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());

        let pretrained = dir.path().join("pretrained");
        let source = ReferencelessRegression::<NdArray>::from_hparams(&req.hparams, &Default::default()).unwrap();
        save_encoder(&source.encoder, &pretrained).unwrap();
        let tokenizer = crate::infra::tokenizer_store::build_word_level(&["haus hund".to_string()], 32).unwrap();
        TokenizerStore::new(&pretrained).save(&tokenizer).unwrap();
        req.hparams.pretrained_model = Some(pretrained.to_string_lossy().into_owned());

        let out = TrainUseCase::<TestAutodiff>::new(req, Default::default()).execute().unwrap();
        let copied = TokenizerStore::new(&out).load().unwrap();
        assert_eq!(copied.get_vocab_size(true), tokenizer.get_vocab_size(true));
    }

    #[test]
    fn test_missing_validation_path_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path());
        req.hparams.validation_data = None;
        let err = TrainUseCase::<TestAutodiff>::new(req, Default::default()).execute().unwrap_err();
        assert!(err.to_string().contains("validation_data"));
    }
}
