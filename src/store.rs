//! Memoized, read-only access to the explorer datasets
//!
//! ## Caching Strategy
//!
//! Every accessor is memoized by its full argument tuple. Loaded data is held
//! behind `Arc`, so repeated calls hand out shallow clones of the same
//! in-memory snapshot without touching the source again.
//!
//! All caches live in one [`Snapshot`]. [`DataStore::invalidate`] swaps in a
//! fresh empty snapshot in a single step; readers holding the old one keep a
//! consistent view until they drop it.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::error::Result;
use crate::records::{AbsorptionRecord, LetterToken, ProbeStatsRow, SplitFeatRow};
use crate::sae::{Latent, SaeId};
use crate::source::DataSource;

/// Memo table keyed by call arguments
type Memo<K, V> = Mutex<HashMap<K, Arc<V>>>;

#[derive(Default)]
struct Snapshot {
    split_feats: Memo<(), Vec<SplitFeatRow>>,
    absorption_all: Memo<(), Vec<AbsorptionRecord>>,
    absorption_by_sae: Memo<SaeId, Vec<AbsorptionRecord>>,
    tokens: Memo<(), Vec<LetterToken>>,
    probe_stats: Memo<(), Vec<ProbeStatsRow>>,
    cosine: Memo<(SaeId, char), Vec<f32>>,
    html: Memo<PathBuf, String>,
}

impl Snapshot {
    fn len(&self) -> usize {
        fn count<K, V>(memo: &Memo<K, V>) -> usize {
            memo.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
        count(&self.split_feats)
            + count(&self.absorption_all)
            + count(&self.absorption_by_sae)
            + count(&self.tokens)
            + count(&self.probe_stats)
            + count(&self.cosine)
            + count(&self.html)
    }
}

/// Look up `key`, loading and inserting on a miss.
///
/// Loads run outside the lock; if two callers race, the first insert wins and
/// both get the same `Arc`.
fn memoize<K, V>(memo: &Memo<K, V>, key: K, load: impl FnOnce() -> Result<V>) -> Result<Arc<V>>
where
    K: Eq + Hash,
{
    {
        let cache = memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&key) {
            debug!("Dataset cache hit");
            return Ok(Arc::clone(cached));
        }
    }

    let value = Arc::new(load()?);

    let mut cache = memo.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(cache.entry(key).or_insert(value)))
}

/// Read-only dataset accessors over a [`DataSource`].
pub struct DataStore<S: DataSource> {
    source: S,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl<S: DataSource> DataStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop every memoized dataset. The next call to any accessor reloads.
    pub fn invalidate(&self) {
        let fresh = Arc::new(Snapshot::default());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        debug!("Dataset caches invalidated");
    }

    /// Number of memoized entries across all accessors.
    pub fn cache_size(&self) -> usize {
        self.snapshot().len()
    }

    /// All `(layer, sae_width, sae_l0, letter)` rows with their split latents.
    pub fn available_sae_configs(&self) -> Result<Arc<Vec<SplitFeatRow>>> {
        memoize(&self.snapshot().split_feats, (), || self.source.split_feats())
    }

    /// Absorption rows for one SAE with `is_absorption == true`, all letters.
    pub fn absorption_records(&self, sae: &SaeId) -> Result<Arc<Vec<AbsorptionRecord>>> {
        let snapshot = self.snapshot();
        memoize(&snapshot.absorption_by_sae, *sae, || {
            let all = memoize(&snapshot.absorption_all, (), || {
                self.source.absorption_records()
            })?;
            Ok(all
                .iter()
                .filter(|r| r.sae == *sae && r.is_absorption)
                .cloned()
                .collect())
        })
    }

    pub fn english_tokens_by_letter(&self) -> Result<Arc<Vec<LetterToken>>> {
        memoize(&self.snapshot().tokens, (), || self.source.english_tokens())
    }

    /// Per-latent cosine similarity with the letter's probe direction.
    ///
    /// A missing array surfaces as `NotFound` and is not cached.
    pub fn cosine_similarities(&self, sae: &SaeId, letter: char) -> Result<Arc<Vec<f32>>> {
        memoize(&self.snapshot().cosine, (*sae, letter), || {
            self.source.cosine_similarities(sae, letter)
        })
    }

    pub fn probe_stats(&self) -> Result<Arc<Vec<ProbeStatsRow>>> {
        memoize(&self.snapshot().probe_stats, (), || self.source.probe_stats())
    }

    /// Where the non-canonical dashboard for `latent` is stored.
    pub fn dashboard_path(&self, sae: &SaeId, latent: Latent) -> PathBuf {
        self.source.dashboard_path(sae, latent)
    }

    pub fn raw_dashboard_html(&self, path: &Path) -> Result<Arc<String>> {
        memoize(&self.snapshot().html, path.to_path_buf(), || {
            self.source.read_html(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn record(sae: SaeId, letter: char, feat: Latent, is_absorption: bool) -> AbsorptionRecord {
        AbsorptionRecord {
            sae,
            letter,
            ablation_feat: feat,
            token: "tok".into(),
            feat_order: 0,
            is_absorption,
        }
    }

    #[test]
    fn test_tables_loaded_once() {
        let store = DataStore::new(MemorySource::new());
        let a = store.available_sae_configs().unwrap();
        let b = store.available_sae_configs().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.source().table_reads(), 1);
    }

    #[test]
    fn test_absorption_filtered_per_sae() {
        let sae = SaeId::new(0, 16_000, 105);
        let other = SaeId::new(0, 16_000, 40);
        let store = DataStore::new(MemorySource::new().with_absorption(vec![
            record(sae, 'a', 1, true),
            record(sae, 'b', 2, false),
            record(other, 'a', 3, true),
        ]));

        let rows = store.absorption_records(&sae).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ablation_feat, 1);

        let rows = store.absorption_records(&other).unwrap();
        assert_eq!(rows.len(), 1);
        // Full table read once, shared by both keys
        assert_eq!(store.source().table_reads(), 1);
    }

    #[test]
    fn test_missing_cosine_not_cached() {
        let sae = SaeId::new(0, 16_000, 105);
        let store = DataStore::new(MemorySource::new());
        assert!(store.cosine_similarities(&sae, 'a').unwrap_err().is_not_found());
        assert!(store.cosine_similarities(&sae, 'a').unwrap_err().is_not_found());
        assert_eq!(store.source().cosine_reads(), 2);
        assert_eq!(store.cache_size(), 0);
    }

    #[test]
    fn test_invalidate_reloads() {
        let sae = SaeId::new(2, 65_000, 77);
        let store = DataStore::new(MemorySource::new().with_cosine(sae, 'c', vec![0.5]));

        let first = store.cosine_similarities(&sae, 'c').unwrap();
        store.cosine_similarities(&sae, 'c').unwrap();
        assert_eq!(store.source().cosine_reads(), 1);
        assert_eq!(store.cache_size(), 1);

        store.invalidate();
        assert_eq!(store.cache_size(), 0);

        let second = store.cosine_similarities(&sae, 'c').unwrap();
        assert_eq!(store.source().cosine_reads(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        // Old snapshot data stays readable
        assert_eq!(*first, vec![0.5]);
    }

    #[test]
    fn test_html_memoized_by_path() {
        let sae = SaeId::new(1, 16_000, 50);
        let store = DataStore::new(MemorySource::new().with_dashboard(sae, 9, "<p>x</p>"));
        let path = store.dashboard_path(&sae, 9);
        store.raw_dashboard_html(&path).unwrap();
        store.raw_dashboard_html(&path).unwrap();
        assert_eq!(store.source().html_reads(), 1);
    }
}
