// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation protocol for any FineTuneModel, using
// Burn's DataLoader and a per-group optimizer pass.
//
// One epoch:
//   1. freeze check at the epoch boundary
//   2. for every train batch:
//        training_step   → forward, Σ(ŷ − y)², step freeze check
//        backward        → gradients
//        param_groups    → only the groups the schedule allows
//        optimizer       → one step per group at its own lr
//   3. model.valid()     → inner backend, dropout off
//   4. validation_step over the train subset, then the
//      validation set, each routed to its own accumulator
//   5. validation_epoch_end → compute, log, reset both
//   6. epoch losses logged, checkpoint written
//
// Training uses B (Autodiff); validation runs on
// B::InnerBackend, which shares B's device type.
//
// Loaders run on the calling thread (no worker pool): every
// batch but the last holds batch_size items, and batch order
// depends on the seed alone.
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, AdamWConfig, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{RegressionBatch, RegressionBatcher},
    dataset::{EncodedDataset, SampleEncoder},
    splitter::{sample_subset_indices, OVERFIT_SUBSET_SIZE},
};
use crate::domain::{
    error::ModelError,
    hparams::{HyperParams, OptimizerKind},
    sample::Sample,
    traits::{LogPoint, LogSink, SampleReader},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    freeze::FreezeScheduler,
    metrics::{DualStreamMetrics, Stream},
    model::{FineTuneModel, ScoreModel},
};

// ─── TrainerConfig ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub max_epochs:  usize,
    pub seed:        u64,
    /// Devices the effective batch is spread over; 0 counts as 1.
    pub num_devices: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self { max_epochs: 2, seed: 12, num_devices: 1 }
    }
}

// ─── Datasets ─────────────────────────────────────────────────────────────────
/// Raw samples of both splits, before tokenization.
pub struct SampleSplits {
    pub train:      Vec<Sample>,
    pub validation: Vec<Sample>,
}

impl SampleSplits {
    pub fn read(reader: &dyn SampleReader, hp: &HyperParams) -> Result<Self> {
        let train_path = hp.train_data.as_ref().ok_or_else(|| {
            ModelError::InvalidConfiguration("train_data is not set".to_string())
        })?;
        let val_path = hp.validation_data.as_ref().ok_or_else(|| {
            ModelError::InvalidConfiguration("validation_data is not set".to_string())
        })?;
        Ok(Self {
            train:      reader.read_samples(train_path)?,
            validation: reader.read_samples(val_path)?,
        })
    }

    /// Every text of the training split, for building a vocabulary.
    pub fn train_texts(&self, fields: &[&str]) -> Vec<String> {
        self.train
            .iter()
            .flat_map(|s| fields.iter().filter_map(|f| s.text(f).ok()))
            .collect()
    }

    pub fn encode(&self, encoder: &SampleEncoder, seed: u64) -> Result<Datasets> {
        let train = encoder
            .encode_all(&self.train, true)
            .context("Cannot encode training data")?;
        let validation = encoder
            .encode_all(&self.validation, true)
            .context("Cannot encode validation data")?;
        Ok(Datasets::new(train, validation, seed))
    }
}

#[derive(Debug, Clone)]
pub struct Datasets {
    pub train:        EncodedDataset,
    /// Small seeded draw from `train`, scored every epoch.
    pub train_subset: EncodedDataset,
    pub validation:   EncodedDataset,
}

impl Datasets {
    pub fn new(train: EncodedDataset, validation: EncodedDataset, seed: u64) -> Self {
        let indices = sample_subset_indices(train.len(), OVERFIT_SUBSET_SIZE, seed);
        let train_subset = train.subset(&indices);
        Self { train, train_subset, validation }
    }
}

// ─── TrainingState ────────────────────────────────────────────────────────────
#[derive(Debug)]
pub struct TrainingState {
    pub epoch:             usize,
    pub freeze:            FreezeScheduler,
    pub epoch_total_steps: usize,
    pub total_steps:       usize,
    /// Optimizer steps taken so far in the run.
    pub global_step:       u64,
    /// Validation batches seen so far in the run.
    pub val_step:          u64,
    /// Global step whose update first reached the encoder.
    pub unfrozen_at:       Option<u64>,
    pub metrics:           DualStreamMetrics,
    train_loss_sum:        f64,
    train_batches:         usize,
    val_loss_sum:          f64,
    val_batches:           usize,
}

impl TrainingState {
    fn reset_epoch_losses(&mut self) {
        self.train_loss_sum = 0.0;
        self.train_batches  = 0;
        self.val_loss_sum   = 0.0;
        self.val_batches    = 0;
    }

    fn mean(sum: f64, count: usize) -> f64 {
        if count > 0 { sum / count as f64 } else { f64::NAN }
    }
}

// ─── Loss ─────────────────────────────────────────────────────────────────────
/// Σ (ŷ − y)² over the batch. `scores`: [batch, 1], `targets`: [batch].
pub fn sum_squared_error<B: Backend>(scores: Tensor<B, 2>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let [batch_size, _] = scores.dims();
    MseLoss::new().forward(scores.reshape([batch_size]), targets, Reduction::Sum)
}

fn to_f32_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor values: {e:?}"))
}

/// Forward pass on an input-only batch. One score per example, batch order.
pub fn predict<B: Backend, M: ScoreModel<B>>(model: &M, batch: RegressionBatch<B>) -> Result<Vec<f32>> {
    let scores = model.forward(&batch.inputs)?;
    to_f32_vec(scores.flatten::<1>(0, 1))
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B: AutodiffBackend> {
    hp:           HyperParams,
    cfg:          TrainerConfig,
    device:       B::Device,
    data:         Datasets,
    pad_token_id: u32,
    sink:         Arc<dyn LogSink>,
    state:        TrainingState,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Seeds the backend and derives the step counts from the train split.
    pub fn setup(
        hp:     HyperParams,
        cfg:    TrainerConfig,
        data:   Datasets,
        device: B::Device,
        sink:   Arc<dyn LogSink>,
    ) -> Result<Self> {
        hp.validate()?;
        B::seed(cfg.seed);

        let devices = cfg.num_devices.max(1);
        let epoch_total_steps = data.train.len() / (hp.batch_size * devices);
        let total_steps = epoch_total_steps * cfg.max_epochs;

        tracing::info!(
            "Train: {} examples ({} steps/epoch, {} total) | overfit subset: {} | validation: {}",
            data.train.len(), epoch_total_steps, total_steps,
            data.train_subset.len(), data.validation.len(),
        );

        let state = TrainingState {
            epoch:          0,
            freeze:         FreezeScheduler::new(hp.nr_frozen_epochs, hp.keep_embeddings_frozen),
            epoch_total_steps,
            total_steps,
            global_step:    0,
            val_step:       0,
            unfrozen_at:    None,
            metrics:        DualStreamMetrics::new(),
            train_loss_sum: 0.0,
            train_batches:  0,
            val_loss_sum:   0.0,
            val_batches:    0,
        };

        let pad_token_id = hp.encoder.pad_token_id;
        Ok(Self { hp, cfg, device, data, pad_token_id, sink, state })
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Forward + loss for one training batch, plus the step-level freeze
    /// check. `step` is the batch index within the current epoch.
    pub fn training_step<M: ScoreModel<B>>(
        &mut self,
        model: &M,
        batch: RegressionBatch<B>,
        step:  usize,
    ) -> Result<Tensor<B, 1>> {
        let targets = batch.targets.ok_or_else(|| ModelError::MissingField("score".to_string()))?;
        let scores  = model.forward(&batch.inputs)?;
        let loss    = sum_squared_error(scores, targets);

        if self.state.freeze.on_train_step(self.state.epoch, step, self.state.epoch_total_steps) {
            self.state.unfrozen_at = Some(self.state.global_step);
        }

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        self.sink.log_scalar("train_loss", loss_value, LogPoint::Step(self.state.global_step));
        self.state.train_loss_sum += loss_value;
        self.state.train_batches  += 1;
        Ok(loss)
    }

    /// Forward + loss on a held-out batch, routed to `stream`'s accumulator.
    /// Returns the batch loss.
    pub fn validation_step<V: ScoreModel<B::InnerBackend>>(
        &mut self,
        model:  &V,
        batch:  RegressionBatch<B::InnerBackend>,
        stream: Stream,
    ) -> Result<f64> {
        let size    = batch.len();
        let targets = batch.targets.ok_or_else(|| ModelError::MissingField("score".to_string()))?;
        let scores  = model.forward(&batch.inputs)?;
        let loss    = sum_squared_error(scores.clone(), targets.clone())
            .into_scalar()
            .elem::<f64>();

        self.sink.log_scalar("val_loss", loss, LogPoint::Step(self.state.val_step));
        self.state.val_step += 1;
        if stream == Stream::Validation {
            self.state.val_loss_sum += loss;
            self.state.val_batches  += 1;
        }

        if size > 1 {
            let preds   = to_f32_vec(scores.flatten::<1>(0, 1))?;
            let targets = to_f32_vec(targets)?;
            self.state.metrics.update(stream, &preds, &targets);
        } else {
            tracing::debug!("{} ({} stream), skipping metrics", ModelError::DegenerateBatch { size }, stream.prefix());
        }
        Ok(loss)
    }

    /// Compute, log and reset both accumulators.
    pub fn validation_epoch_end(&mut self) -> BTreeMap<String, f64> {
        for stream in [Stream::TrainSubset, Stream::Validation] {
            let acc = self.state.metrics.get(stream);
            if acc.is_empty() {
                tracing::debug!("No scored pairs in '{}' stream this epoch", acc.prefix());
            }
        }
        let values = self.state.metrics.compute_all();
        for (name, value) in &values {
            self.sink.log_scalar(name, *value, LogPoint::Epoch(self.state.epoch));
        }
        self.state.metrics.reset();
        values
    }

    /// Shuffled with the run seed (AutodiffBackend).
    fn train_loader(&self) -> Arc<dyn DataLoader<RegressionBatch<B>>> {
        DataLoaderBuilder::new(RegressionBatcher::<B>::new(self.device.clone(), self.pad_token_id))
            .batch_size(self.hp.batch_size)
            .shuffle(self.cfg.seed)
            .build(self.data.train.clone())
    }

    /// In dataset order (InnerBackend, no autodiff overhead).
    fn held_out_loader(&self, dataset: EncodedDataset) -> Arc<dyn DataLoader<RegressionBatch<B::InnerBackend>>> {
        DataLoaderBuilder::new(RegressionBatcher::<B::InnerBackend>::new(self.device.clone(), self.pad_token_id))
            .batch_size(self.hp.batch_size)
            .build(dataset)
    }

    /// Run the whole protocol for `max_epochs`. With a checkpoint manager,
    /// weights are saved after every epoch as `model_epoch_{epoch + 1}`.
    pub fn fit<M>(&mut self, model: M, ckpt: Option<&CheckpointManager>) -> Result<M>
    where
        M: FineTuneModel<B>,
        M::InnerModule: ScoreModel<B::InnerBackend>,
    {
        match self.hp.optimizer {
            OptimizerKind::Adam => {
                let optim = AdamConfig::new().with_epsilon(1e-8).init::<B, M>();
                self.fit_with(model, optim, ckpt)
            }
            OptimizerKind::AdamW => {
                let optim = AdamWConfig::new().with_epsilon(1e-8).init::<B, M>();
                self.fit_with(model, optim, ckpt)
            }
        }
    }

    fn fit_with<M, O>(&mut self, mut model: M, mut optim: O, ckpt: Option<&CheckpointManager>) -> Result<M>
    where
        M: FineTuneModel<B>,
        M::InnerModule: ScoreModel<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        let train_loader  = self.train_loader();
        let subset_loader = self.held_out_loader(self.data.train_subset.clone());
        let val_loader    = self.held_out_loader(self.data.validation.clone());

        for epoch in 0..self.cfg.max_epochs {
            self.state.epoch = epoch;
            self.state.reset_epoch_losses();
            if self.state.freeze.on_epoch_start(epoch) {
                self.state.unfrozen_at = Some(self.state.global_step);
            }

            // ── Training phase ────────────────────────────────────────────────
            for (step, batch) in train_loader.iter().enumerate() {
                let loss = self.training_step(&model, batch, step)?;
                let grads = loss.backward();
                for group in model.param_groups(grads, &self.state.freeze, &self.hp) {
                    model = optim.step(group.lr, model, group.grads);
                }
                self.state.global_step += 1;
            }

            // ── Validation phase ──────────────────────────────────────────────
            let model_valid = model.valid();
            for batch in subset_loader.iter() {
                self.validation_step(&model_valid, batch, Stream::TrainSubset)?;
            }
            for batch in val_loader.iter() {
                self.validation_step(&model_valid, batch, Stream::Validation)?;
            }
            let metrics = self.validation_epoch_end();

            let train_loss = TrainingState::mean(self.state.train_loss_sum, self.state.train_batches);
            let val_loss   = TrainingState::mean(self.state.val_loss_sum, self.state.val_batches);
            self.sink.log_scalar("train_loss_epoch", train_loss, LogPoint::Epoch(epoch));
            self.sink.log_scalar("val_loss_epoch", val_loss, LogPoint::Epoch(epoch));

            tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_pearson={:.4} | train_pearson={:.4} | encoder={:?}",
                epoch + 1, self.cfg.max_epochs, train_loss, val_loss,
                metrics.get("val_pearson").copied().unwrap_or(f64::NAN),
                metrics.get("train_pearson").copied().unwrap_or(f64::NAN),
                self.state.freeze.state(),
            );

            if let Some(ckpt) = ckpt {
                ckpt.save_model(&model, epoch + 1)?;
                tracing::info!("Checkpoint saved for epoch {}", epoch + 1);
            }
        }

        tracing::info!("Training complete!");
        Ok(model)
    }
}
