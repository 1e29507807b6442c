// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `reconstruct`,
// and all their configurable flags. Everything about the
// network, data and optimizer lives in the JSON run
// configuration; flags only cover the run itself.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::{
    reconstruct_use_case::ReconstructConfig,
    train_use_case::TrainConfig,
    BackendChoice,
};
use crate::domain::sample::Split;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an autoencoder (or a contrastive encoder) from a run configuration
    Train(TrainArgs),

    /// Write a trained model's reconstructions of one split
    Reconstruct(ReconstructArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON run configuration (params, data, training, encoder, decoder, transforms)
    #[arg(long)]
    pub config: PathBuf,

    /// Epoch counter value to train up to
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Model name; checkpoints are written as <save-dir>/<name>.*
    #[arg(long, default_value = "AE")]
    pub name: String,

    /// Directory for checkpoints and the metrics CSV
    #[arg(long, default_value = "./")]
    pub save_dir: PathBuf,

    /// Write <save-dir>/<name>_metrics.csv with one row per epoch
    #[arg(long)]
    pub metrics: bool,

    /// Continue from the checkpoint <save-dir>/<name>
    #[arg(long)]
    pub resume: bool,

    #[arg(long, value_enum, default_value_t = BackendChoice::Wgpu)]
    pub backend: BackendChoice,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            config_path: a.config,
            epochs:      a.epochs,
            name:        a.name,
            save_dir:    a.save_dir,
            metrics:     a.metrics,
            resume:      a.resume,
            backend:     a.backend,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReconstructArgs {
    /// The run configuration the model was trained with
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long, default_value = "AE")]
    pub name: String,

    /// Directory holding the <name> checkpoint
    #[arg(long, default_value = "./")]
    pub save_dir: PathBuf,

    /// train, valid or test
    #[arg(long, value_parser = parse_split, default_value = "test")]
    pub split: Split,

    /// Output directory (defaults to the dataset directory)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Wgpu)]
    pub backend: BackendChoice,
}

impl From<ReconstructArgs> for ReconstructConfig {
    fn from(a: ReconstructArgs) -> Self {
        ReconstructConfig {
            config_path: a.config,
            name:        a.name,
            save_dir:    a.save_dir,
            split:       a.split,
            out_dir:     a.out_dir,
            backend:     a.backend,
        }
    }
}

fn parse_split(s: &str) -> Result<Split, String> {
    match s {
        "train" => Ok(Split::Train),
        "valid" => Ok(Split::Valid),
        "test"  => Ok(Split::Test),
        other   => Err(format!("unknown split '{other}' (expected train, valid or test)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["spectral-ae", "train", "--config", "run.json"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.name, "AE");
        assert_eq!(cfg.epochs, 100);
        assert_eq!(cfg.backend, BackendChoice::Wgpu);
        assert!(!cfg.resume && !cfg.metrics);
    }

    #[test]
    fn test_reconstruct_parses_split_and_backend() {
        let cli = Cli::try_parse_from([
            "spectral-ae", "reconstruct", "--config", "run.json", "--split", "valid", "--backend", "ndarray",
        ])
        .unwrap();
        let Commands::Reconstruct(args) = cli.command else { panic!("expected reconstruct") };
        assert_eq!(args.split, Split::Valid);
        assert_eq!(args.backend, BackendChoice::NdArray);
        assert!(Cli::try_parse_from(["spectral-ae", "reconstruct", "--config", "r.json", "--split", "dev"]).is_err());
    }
}
