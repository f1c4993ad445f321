//! SAE latent vs. linear probe comparison
//!
//! Looks up precision/recall/F1 of the top SAE latent used as a 1-sparse
//! classifier and of a logistic-regression probe trained on the same task.

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::records::{ClassifierMetrics, ProbeStatsRow};
use crate::sae::{Latent, SaeId};
use crate::source::DataSource;
use crate::store::DataStore;

/// Probe comparison for one `(layer, letter, sae_l0, sae_width)` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeStats {
    pub sae: SaeId,
    pub letter: char,
    pub split_feats: Vec<Latent>,
    pub sae_metrics: ClassifierMetrics,
    pub probe_metrics: ClassifierMetrics,
}

impl ProbeStats {
    /// How far the SAE latent's F1 trails the probe's
    pub fn f1_gap(&self) -> f64 {
        self.probe_metrics.f1 - self.sae_metrics.f1
    }

    /// Recall the SAE latent misses relative to the probe.
    ///
    /// Absorption shows up as recall loss: tokens the probe still classifies
    /// but the split latent no longer fires on.
    pub fn recall_gap(&self) -> f64 {
        self.probe_metrics.recall - self.sae_metrics.recall
    }
}

impl From<&ProbeStatsRow> for ProbeStats {
    fn from(row: &ProbeStatsRow) -> Self {
        Self {
            sae: row.sae,
            letter: row.letter,
            split_feats: row.split_feats.clone(),
            sae_metrics: row.sae_metrics,
            probe_metrics: row.probe_metrics,
        }
    }
}

/// First row matching `(sae, letter)`; extra matches are logged, not fatal.
pub fn find_probe_stats(rows: &[ProbeStatsRow], sae: &SaeId, letter: char) -> Option<ProbeStats> {
    let mut matching = rows.iter().filter(|r| r.sae == *sae && r.letter == letter);
    let first = matching.next()?;
    let extra = matching.count();
    if extra > 0 {
        warn!(
            "{} duplicate probe-stat rows for {} letter '{}', using the first",
            extra, sae, letter
        );
    }
    Some(ProbeStats::from(first))
}

/// Probe-stat lookups through a [`DataStore`].
pub struct ProbeStatsLookup<'a, S: DataSource> {
    store: &'a DataStore<S>,
}

impl<'a, S: DataSource> ProbeStatsLookup<'a, S> {
    pub fn new(store: &'a DataStore<S>) -> Self {
        Self { store }
    }

    /// `None` means the table has no row for this key.
    pub fn lookup(&self, sae: &SaeId, letter: char) -> Result<Option<ProbeStats>> {
        let rows = self.store.probe_stats()?;
        Ok(find_probe_stats(&rows, sae, letter))
    }
}
