// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per training epoch.
//
// Columns:
//   epoch       epoch number after the update (1, 2, 3, ...)
//   phase       criterion in use: pretrain, refine or contrastive
//   train_loss  mean loss over the epoch's training batches
//   val_loss    loss on the single validation batch of the epoch
//   lr          learning rate the epoch trained with
//
// Example:
//   epoch,phase,train_loss,val_loss,lr
//   1,pretrain,0.912345,0.887001,0.001000
//   2,pretrain,0.604112,0.611209,0.001000
//
// The file is appended to, so a resumed run continues the log.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;

/// Which criterion an epoch trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossPhase {
    /// criterion1, epochs before ann_epoch
    Pretrain,
    /// criterion2, from ann_epoch on
    Refine,
    Contrastive,
}

impl LossPhase {
    pub fn for_epoch(epoch: usize, ann_epoch: usize) -> Self {
        if epoch < ann_epoch {
            LossPhase::Pretrain
        } else {
            LossPhase::Refine
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LossPhase::Pretrain    => "pretrain",
            LossPhase::Refine      => "refine",
            LossPhase::Contrastive => "contrastive",
        }
    }
}

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub phase:      LossPhase,
    pub train_loss: f64,
    pub val_loss:   f64,
    pub lr:         f64,
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `<dir>/<name>_metrics.csv`, writing the header if the file is new.
    pub fn new(dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(format!("{name}_metrics.csv"));

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,phase,train_loss,val_loss,lr")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6}",
            m.epoch,
            m.phase.as_str(),
            m.train_loss,
            m.val_loss,
            m.lr,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_switches_at_ann_epoch() {
        assert_eq!(LossPhase::for_epoch(0, 2), LossPhase::Pretrain);
        assert_eq!(LossPhase::for_epoch(1, 2), LossPhase::Pretrain);
        assert_eq!(LossPhase::for_epoch(2, 2), LossPhase::Refine);
        // ann_epoch = 0 skips pretraining
        assert_eq!(LossPhase::for_epoch(0, 0), LossPhase::Refine);
    }

    #[test]
    fn test_rows_are_appended_after_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path(), "AE").unwrap();
        for epoch in 1..=2 {
            logger
                .log(&EpochMetrics { epoch, phase: LossPhase::Refine, train_loss: 0.5, val_loss: 0.25, lr: 1e-3 })
                .unwrap();
        }
        // Reopening keeps existing rows
        let again = MetricsLogger::new(dir.path(), "AE").unwrap();

        let text  = fs::read_to_string(again.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,phase,train_loss,val_loss,lr");
        assert_eq!(lines[2], "2,refine,0.500000,0.250000,0.001000");
        assert_eq!(lines.len(), 3);
    }
}
