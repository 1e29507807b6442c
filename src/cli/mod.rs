// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and routes to a use case.
// All business logic is delegated to Layer 2 (application).
//
//   `train`        trains a model from a JSON run configuration
//   `reconstruct`  writes a trained model's reconstructions
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ReconstructArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "spectral-ae",
    version,
    about = "Train autoencoders on SDSS spectra, then write their reconstructions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case for the subcommand.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)       => run_train(args),
            Commands::Reconstruct(args) => run_reconstruct(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training '{}' from '{}'", args.name, args.config.display());
    let history = TrainUseCase::new(args.into()).execute()?;

    match (history.train_loss.last(), history.valid_loss.last()) {
        (Some(t), Some(v)) => println!(
            "Training complete: {} epochs, train loss {t:.6}, valid loss {v:.6}",
            history.train_loss.len()
        ),
        _                  => println!("Training complete: nothing left to train."),
    }
    if history.early_stopped {
        println!("Stopped early: validation loss stopped improving.");
    }
    Ok(())
}

fn run_reconstruct(args: ReconstructArgs) -> Result<()> {
    use crate::application::reconstruct_use_case::ReconstructUseCase;

    let path = ReconstructUseCase::new(args.into()).execute()?;
    println!("Reconstructions written to {}", path.display());
    Ok(())
}
