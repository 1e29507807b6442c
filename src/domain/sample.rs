// ============================================================
// Layer 3 — Spectrum Samples
// ============================================================
// What a dataset adapter hands to the batcher.
//
// Without a transform every item is a full Record: flux,
// mask and noise in channel-first (channels, length) order,
// plus labels and redshift when the bundle carries them.
//
// With a transform the transform's output REPLACES the record:
// the item becomes a list of feature views (one view for a plain
// transform, n views for the contrastive view generator). Mask and
// noise are dropped at that point. The training loop relies on it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which on-disk split to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
    Valid,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test  => "test",
            Split::Valid => "valid",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spectrum with its per-bin mask and noise, channel-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSample {
    pub features: Vec<f32>,
    pub mask:     Vec<f32>,
    pub noise:    Vec<f32>,
    pub labels:   Option<Vec<f32>>,
    pub z:        Option<f32>,
    pub channels: usize,
    pub length:   usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetItem {
    Record(SpectrumSample),
    Views(Vec<Vec<f32>>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names_match_file_suffixes() {
        assert_eq!(Split::Train.to_string(), "train");
        assert_eq!(Split::Valid.as_str(), "valid");
    }
}
