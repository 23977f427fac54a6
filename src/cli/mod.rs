// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — fine-tunes a scorer on CSV data
//   2. `score` — loads a checkpoint and scores a CSV file
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::prelude::Backend;
use clap::Parser;
use commands::{Commands, ScoreArgs, TrainArgs};

use crate::ml::{InferBackend, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "qe-estimator",
    version = "0.1.0",
    about = "Fine-tune a transformer encoder into a translation quality estimator, then score with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Score(args) => run_score(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let device = <TrainBackend as Backend>::Device::default();
    tracing::info!("Using device: {:?}", device);

    let use_case = TrainUseCase::<TrainBackend>::new(args.into_request()?, device);
    let dir = use_case.execute()?;

    println!("Training complete. Checkpoints saved to '{}'.", dir.display());
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<()> {
    use crate::application::score_use_case::ScoreUseCase;

    let device = <InferBackend as Backend>::Device::default();
    let use_case = ScoreUseCase::<InferBackend>::new(&args.checkpoint_dir, device)?;
    let report = use_case.score_file(&args.data)?;

    for score in &report.scores {
        println!("{score:.6}");
    }
    if let Some(r) = report.pearson {
        println!("pearson: {r:.4}");
    }
    Ok(())
}
