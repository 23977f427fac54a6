// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `score`, and their
// flags. Model hyperparameters live in a JSON file (the same
// format written as hparams.json next to every checkpoint);
// the flags cover the run itself.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainRequest;
use crate::domain::hparams::HyperParams;
use crate::infra::checkpoint::read_hparams;
use crate::ml::trainer::TrainerConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a quality-estimation model on CSV data
    Train(TrainArgs),

    /// Score a CSV file with a trained checkpoint
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON hyperparameter file; defaults are used when omitted
    #[arg(long)]
    pub hparams: Option<PathBuf>,

    /// Training CSV (src,mt,score); overrides `train_data` in the hparams file
    #[arg(long)]
    pub train_data: Option<PathBuf>,

    /// Validation CSV; overrides `validation_data` in the hparams file
    #[arg(long)]
    pub validation_data: Option<PathBuf>,

    /// Directory for checkpoints, tokenizer and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 2)]
    pub max_epochs: usize,

    /// Seed for the backend RNG, shuffling and the overfit subset
    #[arg(long, default_value_t = 12)]
    pub seed: u64,
}

impl TrainArgs {
    pub fn into_request(self) -> Result<TrainRequest> {
        let mut hparams = match &self.hparams {
            Some(path) => read_hparams(path)?,
            None => HyperParams::default(),
        };
        if let Some(path) = self.train_data {
            hparams.train_data = Some(path);
        }
        if let Some(path) = self.validation_data {
            hparams.validation_data = Some(path);
        }

        let trainer = TrainerConfig {
            max_epochs:  self.max_epochs,
            seed:        self.seed,
            num_devices: 1,
        };
        Ok(TrainRequest { hparams, trainer, checkpoint_dir: self.checkpoint_dir })
    }
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// CSV file to score (src,mt and optionally score)
    #[arg(long)]
    pub data: PathBuf,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    #[test]
    fn test_train_flags_override_data_paths() {
        let cli = Cli::try_parse_from([
            "qe-estimator", "train",
            "--train-data", "train.csv",
            "--validation-data", "dev.csv",
            "--seed", "3",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let req = args.into_request().unwrap();

        assert_eq!(req.hparams.train_data, Some(PathBuf::from("train.csv")));
        assert_eq!(req.trainer.seed, 3);
        assert_eq!(req.trainer.max_epochs, 2);
    }

    #[test]
    fn test_hparams_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hp.json");
        let mut json = serde_json::to_value(HyperParams::default()).unwrap();
        json["batch_size"] = serde_json::json!(0);
        std::fs::write(&path, json.to_string()).unwrap();

        let cli = Cli::try_parse_from(["qe-estimator", "train", "--hparams", path.to_str().unwrap()]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert!(args.into_request().is_err());
    }

    #[test]
    fn test_score_requires_data() {
        assert!(Cli::try_parse_from(["qe-estimator", "score"]).is_err());
    }
}
