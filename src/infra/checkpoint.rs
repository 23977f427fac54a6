// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's full-precision
// named MessagePack recorder, so a reloaded model reproduces
// its predictions exactly.
//
// Layout of a checkpoint directory:
//   checkpoints/
//     hparams.json         ← everything needed to rebuild the model
//     tokenizer.json       ← vocabulary used in training
//     model_epoch_1.mpk    ← weights after epoch 1
//     model_epoch_2.mpk
//     ...
//     latest_epoch.json    ← number of the newest epoch file
//     metrics.csv          ← written by CsvLogSink
//     encoder.mpk          ← final encoder weights only
//
// A pretrained-model directory holds an `encoder.mpk` record
// and its `tokenizer.json`; any finished checkpoint directory
// qualifies.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::domain::hparams::HyperParams;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::{encoder::TransformerEncoder, model::ReferencelessRegression};

pub const HPARAMS_FILE:      &str = "hparams.json";
pub const LATEST_EPOCH_FILE: &str = "latest_epoch.json";
pub const ENCODER_RECORD:    &str = "encoder";

type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating anything.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            anyhow::bail!("Checkpoint directory '{}' does not exist. Have you run 'train' first?", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tokenizer_store(&self) -> TokenizerStore {
        TokenizerStore::new(&self.dir)
    }

    // ── Weights ──────────────────────────────────────────────────────────────
    /// Writes `model_epoch_{epoch}.mpk` and moves the latest-epoch pointer.
    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        WeightsRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_EPOCH_FILE);
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {LATEST_EPOCH_FILE}"))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load the weights of `epoch` into `model`.
    pub fn load_epoch<B: Backend, M: Module<B>>(&self, model: M, epoch: usize, device: &B::Device) -> Result<M> {
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        let record = WeightsRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    pub fn load_model<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let epoch = self.latest_epoch()?;
        tracing::info!("Loading checkpoint from epoch {}", epoch);
        self.load_epoch(model, epoch, device)
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_EPOCH_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    // ── Hyperparameters ──────────────────────────────────────────────────────
    pub fn save_hparams(&self, hp: &HyperParams) -> Result<()> {
        let path = self.dir.join(HPARAMS_FILE);
        fs::write(&path, serde_json::to_string_pretty(hp)?)
            .with_context(|| format!("Cannot write hyperparameters to '{}'", path.display()))?;
        tracing::debug!("Saved hyperparameters to '{}'", path.display());
        Ok(())
    }

    pub fn load_hparams(&self) -> Result<HyperParams> {
        read_hparams(&self.dir.join(HPARAMS_FILE))
    }

    /// Rebuild the model from `hparams.json` and load the newest weights.
    pub fn load_scorer<B: Backend>(&self, device: &B::Device) -> Result<(ReferencelessRegression<B>, HyperParams)> {
        let hp = self.load_hparams()?;
        let model = ReferencelessRegression::from_hparams(&hp, device)?;
        let model = self.load_model(model, device)?;
        Ok((model, hp))
    }
}

pub fn read_hparams(path: &Path) -> Result<HyperParams> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read hyperparameters from '{}'", path.display()))?;
    let hp: HyperParams = serde_json::from_str(&json)
        .with_context(|| format!("Invalid hyperparameters in '{}'", path.display()))?;
    hp.validate()?;
    Ok(hp)
}

// ─── Pretrained encoders ──────────────────────────────────────────────────────
pub fn save_encoder<B: Backend>(encoder: &TransformerEncoder<B>, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
    let path = dir.join(ENCODER_RECORD);
    WeightsRecorder::new()
        .record(encoder.clone().into_record(), path.clone())
        .with_context(|| format!("Failed to save encoder to '{}'", path.display()))?;
    Ok(())
}

/// Seed `encoder` with the weights stored under `dir`. The architecture in
/// the hyperparameters must match the one the record was written from.
pub fn load_pretrained_encoder<B: Backend>(
    encoder: TransformerEncoder<B>,
    dir:     &Path,
    device:  &B::Device,
) -> Result<TransformerEncoder<B>> {
    let path = dir.join(ENCODER_RECORD);
    let record = WeightsRecorder::new()
        .load(path.clone(), device)
        .with_context(|| format!("Cannot load pretrained encoder '{}'", path.display()))?;
    tracing::info!("Loaded pretrained encoder from '{}'", dir.display());
    Ok(encoder.load_record(record))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};

    use crate::data::{batcher::RegressionBatcher, dataset::EncodedSample};
    use crate::ml::{encoder::EncoderAdapter, model::ScoreModel};

    type TestBackend = NdArray;

    fn batch() -> crate::data::batcher::RegressionBatch<TestBackend> {
        let item = |src: &[u32], mt: &[u32]| {
            let mut fields = BTreeMap::new();
            fields.insert("src".to_string(), src.to_vec());
            fields.insert("mt".to_string(), mt.to_vec());
            EncodedSample { fields, score: None }
        };
        RegressionBatcher::<TestBackend>::inference(Default::default(), 0)
            .batch(vec![item(&[2, 9, 11, 3], &[2, 7, 3]), item(&[2, 5, 3], &[2, 6, 8, 12, 3])])
    }

    fn scores(model: &ReferencelessRegression<TestBackend>) -> Vec<f32> {
        model.forward(&batch().inputs).unwrap().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_round_trip_gives_identical_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let hp = HyperParams::tiny();

        let trained = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &device).unwrap();
        ckpt.save_hparams(&hp).unwrap();
        ckpt.save_model(&trained, 3).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 3);

        let (restored, restored_hp) = ckpt.load_scorer::<TestBackend>(&device).unwrap();
        assert_eq!(restored_hp, hp);
        assert_eq!(scores(&trained), scores(&restored));
    }

    #[test]
    fn test_latest_epoch_follows_saves() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let model = ReferencelessRegression::<TestBackend>::from_hparams(&HyperParams::tiny(), &Default::default())
            .unwrap();
        ckpt.save_model(&model, 1).unwrap();
        ckpt.save_model(&model, 2).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 2);
        assert!(dir.path().join("model_epoch_1.mpk").exists());
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.load_hparams().is_err());
        assert!(CheckpointManager::open(dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_pretrained_encoder_seeds_weights() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let hp = HyperParams::tiny();

        let source = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &device).unwrap();
        save_encoder(&source.encoder, dir.path()).unwrap();

        let fresh = ReferencelessRegression::<TestBackend>::from_hparams(&hp, &device).unwrap();
        let seeded = load_pretrained_encoder(fresh.encoder, dir.path(), &device).unwrap();

        let b = batch();
        let field = &b.inputs.fields["src"];
        let expected = source.encoder.forward(field.input_ids.clone(), field.attention_mask.clone());
        let actual = seeded.forward(field.input_ids.clone(), field.attention_mask.clone());
        let last = |o: crate::ml::encoder::EncoderOutput<TestBackend>| {
            o.all_layers.last().cloned().unwrap().into_data().to_vec::<f32>().unwrap()
        };
        assert_eq!(last(expected), last(actual));
    }
}
