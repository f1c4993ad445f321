//! Absorption aggregation for one resolved selection
//!
//! Joins the split-feature table with the absorption results:
//!
//! ```text
//! split rows   ──filter (sae, letter)──> split latents, num_true_positives
//! absorption   ──filter letter, feat_order == 0, is_absorption──>
//!              ──group by ablation_feat──> distinct tokens per latent
//!              ──union──> all absorbed tokens
//!              ──cap (ascending latent id)──> display set
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::config::MAX_ABSORBING_LATENTS;
use crate::error::{ExplorerError, Result};
use crate::records::{AbsorptionRecord, SplitFeatRow};
use crate::sae::{Latent, SaeId};
use crate::selection::ResolvedSelection;
use crate::source::DataSource;
use crate::store::DataStore;

/// Facts about one letter under one SAE.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AbsorptionView {
    /// Ranked split latents; empty if the letter has no rows
    pub split_latents: Vec<Latent>,
    pub num_true_positives: u64,
    /// Absorbing latent -> distinct tokens it absorbs, capped for display
    pub absorbing_latents: BTreeMap<Latent, BTreeSet<String>>,
    /// Union of tokens over every absorbing latent, including ones cut by the cap
    pub all_absorbed_tokens: BTreeSet<String>,
    pub truncated: bool,
    /// Absorbing latent count before the cap
    pub total_absorbing_latents: usize,
}

impl AbsorptionView {
    pub fn primary_latent(&self) -> Option<Latent> {
        self.split_latents.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.split_latents.is_empty() && self.absorbing_latents.is_empty()
    }
}

/// Split latents and true-positive count for `(sae, letter)`.
///
/// Returns `None` when no row matches. Every matching row must agree on both
/// fields.
pub fn letter_facts(
    rows: &[SplitFeatRow],
    sae: &SaeId,
    letter: char,
) -> Result<Option<(Vec<Latent>, u64)>> {
    let mut matching = rows.iter().filter(|r| r.sae == *sae && r.letter == letter);
    let Some(first) = matching.next() else {
        return Ok(None);
    };

    for row in matching {
        if row.split_feats != first.split_feats {
            return Err(ExplorerError::InconsistentData(format!(
                "split_feats for {sae} letter '{letter}' disagree: {:?} vs {:?}",
                first.split_feats, row.split_feats
            )));
        }
        if row.num_true_positives != first.num_true_positives {
            return Err(ExplorerError::InconsistentData(format!(
                "num_true_positives for {sae} letter '{letter}' disagree: {} vs {}",
                first.num_true_positives, row.num_true_positives
            )));
        }
    }

    Ok(Some((first.split_feats.clone(), first.num_true_positives)))
}

/// Distinct absorbed tokens per absorbing latent for `(sae, letter)`.
///
/// Only first-order absorption rows count. Absorption is measured by ablating
/// the primary split latent, so `primary` is never its own absorber; secondary
/// split latents can still absorb and are kept.
pub fn group_absorbed_tokens(
    records: &[AbsorptionRecord],
    sae: &SaeId,
    letter: char,
    primary: Option<Latent>,
) -> BTreeMap<Latent, BTreeSet<String>> {
    let mut grouped: BTreeMap<Latent, BTreeSet<String>> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.sae == *sae && r.letter == letter && r.is_evidence())
        .filter(|r| Some(r.ablation_feat) != primary)
    {
        grouped
            .entry(record.ablation_feat)
            .or_default()
            .insert(record.token.clone());
    }
    grouped
}

/// Letters with absorption evidence under `sae` but no split-feature row.
pub fn orphan_evidence_letters(
    split_rows: &[SplitFeatRow],
    records: &[AbsorptionRecord],
    sae: &SaeId,
) -> BTreeSet<char> {
    let known: BTreeSet<char> = split_rows
        .iter()
        .filter(|r| r.sae == *sae)
        .map(|r| r.letter)
        .collect();
    records
        .iter()
        .filter(|r| r.sae == *sae && r.is_evidence() && !known.contains(&r.letter))
        .map(|r| r.letter)
        .collect()
}

/// Number of distinct absorbing latents per letter, for every letter that has
/// a split-feature row under `sae`.
///
/// Evidence for letters without a split row is not counted here; see
/// [`orphan_evidence_letters`].
pub fn absorbing_counts(
    split_rows: &[SplitFeatRow],
    records: &[AbsorptionRecord],
    sae: &SaeId,
) -> BTreeMap<char, usize> {
    let mut primary_by_letter: BTreeMap<char, Option<Latent>> = BTreeMap::new();
    for row in split_rows.iter().filter(|r| r.sae == *sae) {
        primary_by_letter
            .entry(row.letter)
            .or_insert(row.split_feats.first().copied());
    }

    let mut absorbers: BTreeMap<char, BTreeSet<Latent>> = primary_by_letter
        .keys()
        .map(|&letter| (letter, BTreeSet::new()))
        .collect();

    for record in records.iter().filter(|r| r.sae == *sae && r.is_evidence()) {
        let Some(primary) = primary_by_letter.get(&record.letter) else {
            continue;
        };
        if *primary == Some(record.ablation_feat) {
            continue;
        }
        if let Some(set) = absorbers.get_mut(&record.letter) {
            set.insert(record.ablation_feat);
        }
    }

    absorbers
        .into_iter()
        .map(|(letter, set)| (letter, set.len()))
        .collect()
}

/// Build the view for `(sae, letter)` from already loaded rows.
///
/// A letter with no split row and no evidence is the empty view. Evidence
/// without a split row is `InconsistentData`.
pub fn aggregate_rows(
    split_rows: &[SplitFeatRow],
    records: &[AbsorptionRecord],
    sae: &SaeId,
    letter: char,
    max_latents: usize,
) -> Result<AbsorptionView> {
    let Some((split_latents, num_true_positives)) = letter_facts(split_rows, sae, letter)? else {
        let orphans = records
            .iter()
            .filter(|r| r.sae == *sae && r.letter == letter && r.is_evidence())
            .count();
        if orphans > 0 {
            return Err(ExplorerError::InconsistentData(format!(
                "{orphans} absorption rows for {sae} letter '{letter}' have no split-feature row"
            )));
        }
        debug!("No split-feature rows for {} letter '{}'", sae, letter);
        return Ok(AbsorptionView::default());
    };

    let mut absorbing =
        group_absorbed_tokens(records, sae, letter, split_latents.first().copied());

    let all_absorbed_tokens: BTreeSet<String> = absorbing.values().flatten().cloned().collect();
    let total_absorbing_latents = absorbing.len();

    let truncated = total_absorbing_latents > max_latents;
    if truncated {
        // BTreeMap iterates in ascending latent order
        absorbing = absorbing.into_iter().take(max_latents).collect();
        debug!(
            "Truncated absorbing latents for {} letter '{}': {} -> {}",
            sae,
            letter,
            total_absorbing_latents,
            absorbing.len()
        );
    }

    Ok(AbsorptionView {
        split_latents,
        num_true_positives,
        absorbing_latents: absorbing,
        all_absorbed_tokens,
        truncated,
        total_absorbing_latents,
    })
}

/// Produces [`AbsorptionView`]s from a [`DataStore`].
pub struct AbsorptionAggregator<'a, S: DataSource> {
    store: &'a DataStore<S>,
    max_latents: usize,
}

impl<'a, S: DataSource> AbsorptionAggregator<'a, S> {
    pub fn new(store: &'a DataStore<S>) -> Self {
        Self {
            store,
            max_latents: MAX_ABSORBING_LATENTS,
        }
    }

    pub fn with_max_latents(mut self, max_latents: usize) -> Self {
        self.max_latents = max_latents;
        self
    }

    pub fn aggregate(&self, selection: &ResolvedSelection) -> Result<AbsorptionView> {
        let Some(letter) = selection.letter else {
            return Ok(AbsorptionView::default());
        };
        let split_rows = self.store.available_sae_configs()?;
        let records = self.store.absorption_records(&selection.sae)?;
        aggregate_rows(
            &split_rows,
            &records,
            &selection.sae,
            letter,
            self.max_latents,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sae() -> SaeId {
        SaeId::new(0, 16_000, 105)
    }

    fn split(letter: char, feats: Vec<Latent>, tp: u64) -> SplitFeatRow {
        SplitFeatRow {
            sae: sae(),
            letter,
            split_feats: feats,
            num_true_positives: tp,
        }
    }

    fn absorbed(letter: char, feat: Latent, token: &str) -> AbsorptionRecord {
        AbsorptionRecord {
            sae: sae(),
            letter,
            ablation_feat: feat,
            token: token.into(),
            feat_order: 0,
            is_absorption: true,
        }
    }

    #[test]
    fn test_mango_melon_dedup() {
        let rows = vec![split('m', vec![42], 10)];
        let records = vec![
            absorbed('m', 99, "mango"),
            absorbed('m', 99, "melon"),
            absorbed('m', 99, "mango"),
        ];
        let view = aggregate_rows(&rows, &records, &sae(), 'm', 20).unwrap();

        assert_eq!(view.split_latents, vec![42]);
        assert_eq!(view.num_true_positives, 10);
        let expected: BTreeSet<String> = ["mango", "melon"].iter().map(|s| s.to_string()).collect();
        assert_eq!(view.absorbing_latents.len(), 1);
        assert_eq!(view.absorbing_latents[&99], expected);
        assert_eq!(view.all_absorbed_tokens, expected);
        assert!(!view.truncated);
    }

    #[test]
    fn test_missing_letter_is_empty_view() {
        let rows = vec![split('m', vec![42], 10)];
        let records = vec![absorbed('m', 99, "mango")];
        let view = aggregate_rows(&rows, &records, &sae(), 'z', 20).unwrap();
        assert_eq!(view, AbsorptionView::default());
        assert!(view.is_empty());
    }

    #[test]
    fn test_cap_keeps_lowest_ids() {
        let rows = vec![split('s', vec![1], 3)];
        let records: Vec<_> = (0..25u32)
            .rev()
            .map(|i| absorbed('s', 1000 + i, &format!("s{i}")))
            .collect();
        let view = aggregate_rows(&rows, &records, &sae(), 's', 20).unwrap();

        assert!(view.truncated);
        assert_eq!(view.total_absorbing_latents, 25);
        let keys: Vec<Latent> = view.absorbing_latents.keys().copied().collect();
        assert_eq!(keys, (1000..1020).collect::<Vec<_>>());
        // Union still covers every absorber
        assert_eq!(view.all_absorbed_tokens.len(), 25);
    }

    #[test]
    fn test_exactly_cap_not_truncated() {
        let rows = vec![split('s', vec![1], 3)];
        let records: Vec<_> = (0..20u32).map(|i| absorbed('s', 100 + i, "sun")).collect();
        let view = aggregate_rows(&rows, &records, &sae(), 's', 20).unwrap();
        assert!(!view.truncated);
        assert_eq!(view.absorbing_latents.len(), 20);
    }

    #[test]
    fn test_non_evidence_rows_ignored() {
        let rows = vec![split('b', vec![5], 2)];
        let mut second_order = absorbed('b', 7, "bee");
        second_order.feat_order = 1;
        let mut not_absorbed = absorbed('b', 8, "bat");
        not_absorbed.is_absorption = false;
        let records = vec![second_order, not_absorbed, absorbed('b', 9, "bird")];

        let view = aggregate_rows(&rows, &records, &sae(), 'b', 20).unwrap();
        assert_eq!(view.absorbing_latents.keys().copied().collect::<Vec<_>>(), vec![9]);
        assert!(view.absorbing_latents.values().all(|tokens| !tokens.is_empty()));
    }

    #[test]
    fn test_primary_latent_not_its_own_absorber() {
        let rows = vec![split('c', vec![11, 12], 4)];
        let records = vec![
            absorbed('c', 11, "cat"),
            absorbed('c', 12, "cup"),
            absorbed('c', 30, "cow"),
        ];
        let view = aggregate_rows(&rows, &records, &sae(), 'c', 20).unwrap();
        assert!(!view.absorbing_latents.contains_key(&11));
        assert!(view.absorbing_latents.contains_key(&12));
        assert!(view.absorbing_latents.contains_key(&30));
    }

    #[test]
    fn test_evidence_without_split_row_is_inconsistent() {
        let rows = vec![split('m', vec![42], 10)];
        let records = vec![absorbed('m', 99, "mango"), absorbed('q', 7, "queen")];
        let err = aggregate_rows(&rows, &records, &sae(), 'q', 20).unwrap_err();
        assert!(matches!(err, ExplorerError::InconsistentData(_)));

        // Evidence under another SAE with the same letter
        let mut other = absorbed('m', 5, "moss");
        other.sae = SaeId::new(0, 16_000, 40);
        let err = aggregate_rows(&rows, &[other], &SaeId::new(0, 16_000, 40), 'm', 20)
            .unwrap_err();
        assert!(matches!(err, ExplorerError::InconsistentData(_)));
    }

    #[test]
    fn test_non_evidence_without_split_row_is_empty() {
        let rows = vec![split('m', vec![42], 10)];
        let mut record = absorbed('q', 7, "queen");
        record.feat_order = 2;
        let view = aggregate_rows(&rows, &[record], &sae(), 'q', 20).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_orphan_evidence_letters() {
        let rows = vec![split('m', vec![42], 10)];
        let records = vec![
            absorbed('m', 99, "mango"),
            absorbed('q', 7, "queen"),
            absorbed('q', 8, "quail"),
        ];
        let orphans = orphan_evidence_letters(&rows, &records, &sae());
        assert_eq!(orphans.into_iter().collect::<Vec<_>>(), vec!['q']);
    }

    #[test]
    fn test_inconsistent_split_feats() {
        let rows = vec![split('d', vec![1, 2], 4), split('d', vec![2, 1], 4)];
        let err = aggregate_rows(&rows, &[], &sae(), 'd', 20).unwrap_err();
        assert!(matches!(err, ExplorerError::InconsistentData(_)));

        let rows = vec![split('d', vec![1], 4), split('d', vec![1], 5)];
        let err = aggregate_rows(&rows, &[], &sae(), 'd', 20).unwrap_err();
        assert!(matches!(err, ExplorerError::InconsistentData(_)));
    }

    #[test]
    fn test_agreeing_duplicate_rows_are_fine() {
        let rows = vec![split('d', vec![1], 4), split('d', vec![1], 4)];
        let view = aggregate_rows(&rows, &[], &sae(), 'd', 20).unwrap();
        assert_eq!(view.split_latents, vec![1]);
        assert!(view.absorbing_latents.is_empty());
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let rows = vec![split('m', vec![42], 10)];
        let records = vec![
            absorbed('m', 5, "moon"),
            absorbed('m', 3, "mill"),
            absorbed('m', 5, "mud"),
        ];
        let a = aggregate_rows(&rows, &records, &sae(), 'm', 20).unwrap();
        let b = aggregate_rows(&rows, &records, &sae(), 'm', 20).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_absorbing_counts_per_letter() {
        let rows = vec![split('a', vec![1], 1), split('b', vec![2], 1), split('c', vec![3], 1)];
        let records = vec![
            absorbed('a', 10, "ant"),
            absorbed('a', 10, "ape"),
            absorbed('a', 11, "axe"),
            absorbed('a', 1, "arm"),
            absorbed('b', 20, "bus"),
            absorbed('z', 30, "zoo"),
        ];
        let counts = absorbing_counts(&rows, &records, &sae());
        assert_eq!(counts[&'a'], 2);
        assert_eq!(counts[&'b'], 1);
        assert_eq!(counts[&'c'], 0);
        assert!(!counts.contains_key(&'z'));
    }
}
