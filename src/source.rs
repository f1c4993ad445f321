//! Dataset sources behind the [`DataStore`](crate::store::DataStore)
//!
//! [`FsSource`] reads parquet tables, `.npy` arrays and HTML files from the
//! layout described by [`ExplorerConfig`]. [`MemorySource`] serves the same
//! data from memory and counts every read, which makes it usable both as a
//! preview backend and as an access spy in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array1;
use ndarray_npy::{read_npy, ReadNpyError};
use tracing::debug;

use crate::columnar::{read_rows, ColumnarRow};
use crate::config::{dashboard_relative_path, ExplorerConfig, DEFAULT_DASHBOARDS_DIR};
use crate::error::{ExplorerError, Result};
use crate::records::{AbsorptionRecord, ClassifierMetrics, LetterToken, ProbeStatsRow, SplitFeatRow};
use crate::sae::{Latent, SaeId};

/// Raw access to the explorer datasets. Implementations do no caching.
pub trait DataSource: Send + Sync {
    fn split_feats(&self) -> Result<Vec<SplitFeatRow>>;

    fn absorption_records(&self) -> Result<Vec<AbsorptionRecord>>;

    fn english_tokens(&self) -> Result<Vec<LetterToken>>;

    fn probe_stats(&self) -> Result<Vec<ProbeStatsRow>>;

    /// One float per latent; fails with `NotFound` when the array is absent.
    fn cosine_similarities(&self, sae: &SaeId, letter: char) -> Result<Vec<f32>>;

    /// Location of a non-canonical dashboard for `latent`.
    fn dashboard_path(&self, sae: &SaeId, latent: Latent) -> PathBuf {
        dashboard_relative_path(DEFAULT_DASHBOARDS_DIR, sae, latent)
    }

    /// Raw dashboard HTML; fails with `NotFound` when the file is absent.
    fn read_html(&self, path: &Path) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Filesystem source
// ---------------------------------------------------------------------------

/// Reads datasets from disk.
#[derive(Debug, Clone)]
pub struct FsSource {
    config: ExplorerConfig,
}

impl FsSource {
    pub fn new(config: ExplorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }
}

fn sae_from_row(row: &ColumnarRow<'_>) -> Result<SaeId> {
    Ok(SaeId::new(
        row.u32("layer")?,
        row.u32("sae_width")?,
        row.u32("sae_l0")?,
    ))
}

impl DataSource for FsSource {
    fn split_feats(&self) -> Result<Vec<SplitFeatRow>> {
        read_rows(&self.config.split_feats_path(), "sae_split_feats", |row| {
            Ok(SplitFeatRow {
                sae: sae_from_row(row)?,
                letter: row.letter("letter")?,
                split_feats: row.u32_list("split_feats")?,
                num_true_positives: row.u64("num_true_positives")?,
            })
        })
    }

    fn absorption_records(&self) -> Result<Vec<AbsorptionRecord>> {
        read_rows(
            &self.config.absorption_path(),
            "feature_absorption_results",
            |row| {
                Ok(AbsorptionRecord {
                    sae: sae_from_row(row)?,
                    letter: row.letter("letter")?,
                    ablation_feat: row.u32("ablation_feat")?,
                    token: row.string("token")?,
                    feat_order: row.u32("feat_order")?,
                    is_absorption: row.bool("is_absorption")?,
                })
            },
        )
    }

    fn english_tokens(&self) -> Result<Vec<LetterToken>> {
        read_rows(
            &self.config.english_tokens_path(),
            "english_tokens_by_letter",
            |row| {
                Ok(LetterToken {
                    token: row.string("token")?,
                    letter: row.letter("letter")?,
                })
            },
        )
    }

    fn probe_stats(&self) -> Result<Vec<ProbeStatsRow>> {
        read_rows(&self.config.probe_stats_path(), "k_sparse_probe_stats", |row| {
            Ok(ProbeStatsRow {
                sae: sae_from_row(row)?,
                letter: row.letter("letter")?,
                split_feats: row.u32_list("split_feats")?,
                sae_metrics: ClassifierMetrics {
                    precision: row.float("precision_sparse_sae_1")?,
                    recall: row.float("recall_sparse_sae_1")?,
                    f1: row.float("f1_sparse_sae_1")?,
                },
                probe_metrics: ClassifierMetrics {
                    precision: row.float("precision_probe")?,
                    recall: row.float("recall_probe")?,
                    f1: row.float("f1_probe")?,
                },
            })
        })
    }

    fn cosine_similarities(&self, sae: &SaeId, letter: char) -> Result<Vec<f32>> {
        let path = self.config.cosine_path(sae, letter);
        if !path.is_file() {
            return Err(ExplorerError::not_found("cosine similarity array", path));
        }
        debug!("Reading cosine similarities from {}", path.display());

        // Arrays are saved as float32, but accept float64 dumps too
        match read_npy::<_, Array1<f32>>(&path) {
            Ok(values) => Ok(values.to_vec()),
            Err(ReadNpyError::WrongDescriptor(_)) => {
                let values: Array1<f64> = read_npy(&path)?;
                Ok(values.iter().map(|&v| v as f32).collect())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn dashboard_path(&self, sae: &SaeId, latent: Latent) -> PathBuf {
        self.config.dashboard_relative_path(sae, latent)
    }

    fn read_html(&self, path: &Path) -> Result<String> {
        let full = self.config.data_dir.join(path);
        match std::fs::read_to_string(&full) {
            Ok(html) => Ok(html),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ExplorerError::not_found("dashboard", full))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Serves datasets from memory and counts reads per kind.
#[derive(Debug, Default)]
pub struct MemorySource {
    split_feats: Vec<SplitFeatRow>,
    absorption: Vec<AbsorptionRecord>,
    tokens: Vec<LetterToken>,
    probe_stats: Vec<ProbeStatsRow>,
    cosine: HashMap<(SaeId, char), Vec<f32>>,
    html: HashMap<PathBuf, String>,
    table_reads: AtomicUsize,
    cosine_reads: AtomicUsize,
    html_reads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_feats(mut self, rows: Vec<SplitFeatRow>) -> Self {
        self.split_feats = rows;
        self
    }

    pub fn with_absorption(mut self, rows: Vec<AbsorptionRecord>) -> Self {
        self.absorption = rows;
        self
    }

    pub fn with_tokens(mut self, rows: Vec<LetterToken>) -> Self {
        self.tokens = rows;
        self
    }

    pub fn with_probe_stats(mut self, rows: Vec<ProbeStatsRow>) -> Self {
        self.probe_stats = rows;
        self
    }

    pub fn with_cosine(mut self, sae: SaeId, letter: char, values: Vec<f32>) -> Self {
        self.cosine.insert((sae, letter), values);
        self
    }

    /// Register dashboard HTML at the path [`DataSource::dashboard_path`] yields.
    pub fn with_dashboard(mut self, sae: SaeId, latent: Latent, html: impl Into<String>) -> Self {
        let path = self.dashboard_path(&sae, latent);
        self.html.insert(path, html.into());
        self
    }

    /// Number of whole-table reads served so far.
    pub fn table_reads(&self) -> usize {
        self.table_reads.load(Ordering::SeqCst)
    }

    pub fn cosine_reads(&self) -> usize {
        self.cosine_reads.load(Ordering::SeqCst)
    }

    /// Number of dashboard HTML reads, including misses.
    pub fn html_reads(&self) -> usize {
        self.html_reads.load(Ordering::SeqCst)
    }

    fn count_table(&self) {
        self.table_reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl DataSource for MemorySource {
    fn split_feats(&self) -> Result<Vec<SplitFeatRow>> {
        self.count_table();
        Ok(self.split_feats.clone())
    }

    fn absorption_records(&self) -> Result<Vec<AbsorptionRecord>> {
        self.count_table();
        Ok(self.absorption.clone())
    }

    fn english_tokens(&self) -> Result<Vec<LetterToken>> {
        self.count_table();
        Ok(self.tokens.clone())
    }

    fn probe_stats(&self) -> Result<Vec<ProbeStatsRow>> {
        self.count_table();
        Ok(self.probe_stats.clone())
    }

    fn cosine_similarities(&self, sae: &SaeId, letter: char) -> Result<Vec<f32>> {
        self.cosine_reads.fetch_add(1, Ordering::SeqCst);
        self.cosine.get(&(*sae, letter)).cloned().ok_or_else(|| {
            ExplorerError::not_found(
                "cosine similarity array",
                format!("memory://{sae}/{letter}"),
            )
        })
    }

    fn read_html(&self, path: &Path) -> Result<String> {
        self.html_reads.fetch_add(1, Ordering::SeqCst);
        self.html
            .get(path)
            .cloned()
            .ok_or_else(|| ExplorerError::not_found("dashboard", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_counts_reads() {
        let sae = SaeId::new(1, 16_000, 50);
        let source = MemorySource::new()
            .with_cosine(sae, 'a', vec![0.1, 0.2])
            .with_dashboard(sae, 7, "<html></html>");

        assert_eq!(source.cosine_similarities(&sae, 'a').unwrap(), vec![0.1, 0.2]);
        assert!(source.cosine_similarities(&sae, 'b').unwrap_err().is_not_found());
        assert_eq!(source.cosine_reads(), 2);

        let path = source.dashboard_path(&sae, 7);
        assert_eq!(source.read_html(&path).unwrap(), "<html></html>");
        let missing = source.dashboard_path(&sae, 8);
        assert!(source.read_html(&missing).unwrap_err().is_not_found());
        assert_eq!(source.html_reads(), 2);

        source.split_feats().unwrap();
        assert_eq!(source.table_reads(), 1);
    }

    #[test]
    fn test_fs_source_missing_cosine() {
        let source = FsSource::new(ExplorerConfig::default().with_data_dir("/nonexistent"));
        let err = source
            .cosine_similarities(&SaeId::new(0, 16_000, 105), 'a')
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound { .. }));
    }

    #[test]
    fn test_fs_source_missing_html() {
        let source = FsSource::new(ExplorerConfig::default().with_data_dir("/nonexistent"));
        let path = source.dashboard_path(&SaeId::new(0, 16_000, 40), 3);
        assert!(source.read_html(&path).unwrap_err().is_not_found());
    }

    #[test]
    fn test_fs_source_narrows_f64_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExplorerConfig::default().with_data_dir(dir.path());
        let sae = SaeId::new(0, 16_000, 105);
        let path = config.cosine_path(&sae, 'm');
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        ndarray_npy::write_npy(&path, &ndarray::arr1(&[0.25f64, -0.5])).unwrap();

        let source = FsSource::new(config);
        assert_eq!(source.cosine_similarities(&sae, 'm').unwrap(), vec![0.25f32, -0.5]);
    }

    #[test]
    fn test_default_dashboard_path_matches_default_config() {
        let sae = SaeId::new(2, 65_000, 30);
        let fs = FsSource::new(ExplorerConfig::default());
        assert_eq!(
            MemorySource::new().dashboard_path(&sae, 11),
            fs.dashboard_path(&sae, 11)
        );
        assert!(MemorySource::new()
            .dashboard_path(&sae, 11)
            .starts_with(DEFAULT_DASHBOARDS_DIR));
    }
}
