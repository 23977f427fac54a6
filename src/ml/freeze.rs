// ============================================================
// Layer 5 — Freeze Scheduler
// ============================================================
// Decides when the encoder starts receiving updates.
//
//   UnfrozenDisabled  nr_frozen_epochs <= 0, encoder trains from
//                     step 0 and the scheduler never acts
//   Frozen            encoder parameters get no updates
//   Unfrozen          terminal for the run
//
// Two triggers move Frozen → Unfrozen:
//   epoch check  start of epoch e:  e >= nr_frozen_epochs
//   step check   inside epoch floor(nr_frozen_epochs), once
//                step > epoch_total_steps × fractional part
//
// For 0 < n < 1 the step check fires inside epoch 0; for integer
// n only the epoch check can fire. keep_embeddings_frozen holds the
// embedding group out of every update, frozen or not.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeState {
    UnfrozenDisabled,
    Frozen,
    Unfrozen,
}

#[derive(Debug, Clone)]
pub struct FreezeScheduler {
    nr_frozen_epochs:       f64,
    keep_embeddings_frozen: bool,
    state:                  FreezeState,
}

impl FreezeScheduler {
    pub fn new(nr_frozen_epochs: f64, keep_embeddings_frozen: bool) -> Self {
        let state = if nr_frozen_epochs > 0.0 {
            FreezeState::Frozen
        } else {
            FreezeState::UnfrozenDisabled
        };
        Self { nr_frozen_epochs, keep_embeddings_frozen, state }
    }

    pub fn state(&self) -> FreezeState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == FreezeState::Frozen
    }

    /// Whether the embedding parameters may be updated right now.
    pub fn embeddings_trainable(&self) -> bool {
        !self.is_frozen() && !self.keep_embeddings_frozen
    }

    /// Run before the steps of `epoch`. Returns true if this call unfroze
    /// the encoder.
    pub fn on_epoch_start(&mut self, epoch: usize) -> bool {
        if self.is_frozen() && epoch as f64 >= self.nr_frozen_epochs {
            self.unfreeze();
            return true;
        }
        false
    }

    /// Run inside every training step. `step` is the batch index within
    /// the epoch. Returns true if this call unfroze the encoder.
    pub fn on_train_step(&mut self, epoch: usize, step: usize, epoch_total_steps: usize) -> bool {
        if !self.is_frozen() {
            return false;
        }
        let whole    = self.nr_frozen_epochs.floor();
        let fraction = self.nr_frozen_epochs - whole;
        if fraction > 0.0
            && epoch as f64 == whole
            && step as f64 > epoch_total_steps as f64 * fraction
        {
            self.unfreeze();
            return true;
        }
        false
    }

    fn unfreeze(&mut self) {
        tracing::info!("Encoder model fine-tuning");
        self.state = FreezeState::Unfrozen;
    }
}
