//! Typed rows of the explorer datasets

use serde::{Deserialize, Serialize};

use crate::sae::{Latent, SaeId};

/// One row of the SAE/letter split-feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitFeatRow {
    pub sae: SaeId,
    pub letter: char,
    /// Ranked split latents; index 0 is the primary
    pub split_feats: Vec<Latent>,
    pub num_true_positives: u64,
}

/// One row of the feature-absorption results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsorptionRecord {
    pub sae: SaeId,
    pub letter: char,
    pub ablation_feat: Latent,
    pub token: String,
    pub feat_order: u32,
    pub is_absorption: bool,
}

impl AbsorptionRecord {
    /// Only first-order absorptions count as evidence for an absorbing latent.
    pub fn is_evidence(&self) -> bool {
        self.feat_order == 0 && self.is_absorption
    }
}

/// One row of the English-token-by-letter table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterToken {
    pub token: String,
    pub letter: char,
}

/// Precision, recall and F1 of one classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// One row of the k-sparse-probe statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStatsRow {
    pub sae: SaeId,
    pub letter: char,
    pub split_feats: Vec<Latent>,
    /// Top SAE latent used as a 1-sparse classifier
    pub sae_metrics: ClassifierMetrics,
    /// Logistic-regression probe
    pub probe_metrics: ClassifierMetrics,
}

/// Normalise a letter cell: exactly one character, lowercased.
pub fn parse_letter(value: &str) -> Option<char> {
    let mut chars = value.trim().chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    c.to_lowercase().next()
}
