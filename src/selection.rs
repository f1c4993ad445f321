//! Selection resolution: validate a partial selection and fill in defaults
//!
//! The UI layer owns "currently selected" state and passes it in as a
//! [`SelectionRequest`]; nothing here is remembered between calls.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::absorption::{absorbing_counts, orphan_evidence_letters};
use crate::error::Result;
use crate::records::SplitFeatRow;
use crate::sae::{canonical_l0, SaeId};
use crate::source::DataSource;
use crate::store::DataStore;

/// A possibly partial selection from the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub layer: Option<u32>,
    pub sae_width: Option<u32>,
    pub sae_l0: Option<u32>,
    pub letter: Option<char>,
}

impl SelectionRequest {
    pub fn new(layer: u32, sae_width: u32, sae_l0: u32, letter: char) -> Self {
        Self {
            layer: Some(layer),
            sae_width: Some(sae_width),
            sae_l0: Some(sae_l0),
            letter: Some(letter),
        }
    }
}

/// A fully resolved selection plus the choices each dimension offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSelection {
    pub sae: SaeId,
    /// `None` only when the resolved SAE has no letters at all
    pub letter: Option<char>,
    pub is_canonical: bool,
    pub available_layers: Vec<u32>,
    pub available_widths: Vec<u32>,
    pub available_l0s: Vec<u32>,
    pub available_letters: Vec<char>,
    /// Distinct absorbing latents per available letter
    pub absorbing_counts: BTreeMap<char, usize>,
    /// Letters with absorption evidence but no split-feature row (bad data)
    pub orphan_letters: BTreeSet<char>,
}

/// Pick `requested` if it is one of `available`, else `fallback`.
fn choose<T: Copy + PartialEq + std::fmt::Debug>(
    dimension: &str,
    requested: Option<T>,
    available: &[T],
    fallback: Option<T>,
) -> Option<T> {
    match requested {
        Some(value) if available.contains(&value) => Some(value),
        other => {
            if let Some(value) = other {
                debug!("Requested {} {:?} not available, using default", dimension, value);
            }
            fallback
        }
    }
}

fn sorted_unique<T: Ord + Copy>(values: impl Iterator<Item = T>) -> Vec<T> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Resolve `request` against the split-feature table alone.
///
/// Returns `None` when the table is empty. Absorbing counts are left empty;
/// [`SelectionResolver::resolve`] fills them in.
pub fn resolve_rows(rows: &[SplitFeatRow], request: &SelectionRequest) -> Option<ResolvedSelection> {
    let available_layers = sorted_unique(rows.iter().map(|r| r.sae.layer));
    let available_widths = sorted_unique(rows.iter().map(|r| r.sae.sae_width));

    let layer = choose(
        "layer",
        request.layer,
        &available_layers,
        available_layers.first().copied(),
    )?;
    let sae_width = choose(
        "sae_width",
        request.sae_width,
        &available_widths,
        available_widths.first().copied(),
    )?;

    let available_l0s = sorted_unique(
        rows.iter()
            .filter(|r| r.sae.layer == layer && r.sae.sae_width == sae_width)
            .map(|r| r.sae.sae_l0),
    );
    let default_l0 = canonical_l0(sae_width, layer)
        .filter(|l0| available_l0s.contains(l0))
        .or_else(|| available_l0s.first().copied());
    // A (layer, width) pair with no rows still resolves, to the canonical L0
    let sae_l0 = choose("sae_l0", request.sae_l0, &available_l0s, default_l0)
        .or_else(|| canonical_l0(sae_width, layer))?;

    let sae = SaeId::new(layer, sae_width, sae_l0);

    // Letters keep table order, deduplicated
    let mut available_letters = Vec::new();
    for row in rows.iter().filter(|r| r.sae == sae) {
        if !available_letters.contains(&row.letter) {
            available_letters.push(row.letter);
        }
    }
    let requested_letter = request.letter.and_then(|c| c.to_lowercase().next());
    let letter = choose(
        "letter",
        requested_letter,
        &available_letters,
        available_letters.first().copied(),
    );

    Some(ResolvedSelection {
        sae,
        letter,
        is_canonical: sae.is_canonical(),
        available_layers,
        available_widths,
        available_l0s,
        available_letters,
        absorbing_counts: BTreeMap::new(),
        orphan_letters: BTreeSet::new(),
    })
}

/// Resolves partial selections against the datasets in a [`DataStore`].
pub struct SelectionResolver<'a, S: DataSource> {
    store: &'a DataStore<S>,
}

impl<'a, S: DataSource> SelectionResolver<'a, S> {
    pub fn new(store: &'a DataStore<S>) -> Self {
        Self { store }
    }

    /// Resolve `request`, substituting defaults for absent or invalid values.
    ///
    /// Returns `None` when no SAE is available at all.
    pub fn resolve(&self, request: &SelectionRequest) -> Result<Option<ResolvedSelection>> {
        let rows = self.store.available_sae_configs()?;
        let Some(mut resolved) = resolve_rows(&rows, request) else {
            return Ok(None);
        };

        if !resolved.available_letters.is_empty() {
            let records = self.store.absorption_records(&resolved.sae)?;
            resolved.absorbing_counts = absorbing_counts(&rows, &records, &resolved.sae);
            resolved.orphan_letters = orphan_evidence_letters(&rows, &records, &resolved.sae);
            for letter in &resolved.orphan_letters {
                warn!(
                    "Absorption evidence for {} letter '{}' has no split-feature row",
                    resolved.sae, letter
                );
            }
        }

        debug!(
            "Resolved selection {} letter {:?} (canonical: {})",
            resolved.sae, resolved.letter, resolved.is_canonical
        );
        Ok(Some(resolved))
    }
}
