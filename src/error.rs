//! Error kinds surfaced by the explorer core
//!
//! Missing precomputed artifacts and inconsistent upstream rows are distinct
//! kinds so the UI layer can render a notice for the first and flag a data
//! bug for the second. Empty results are never errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading or joining explorer datasets.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// A required file (array data or dashboard HTML) is absent
    #[error("{what} not found at {}", path.display())]
    NotFound {
        /// Human-readable name of the artifact
        what: String,
        /// Path that was looked up
        path: PathBuf,
    },

    /// Rows that must agree disagree
    #[error("Inconsistent data: {0}")]
    InconsistentData(String),

    /// A dataset is missing a column or holds an unexpected value type
    #[error("Schema error in {dataset}.{column}: {reason}")]
    Schema {
        /// Dataset name without extension, e.g. `sae_split_feats`
        dataset: String,
        /// Column that failed to decode
        column: String,
        /// What was expected versus what was found
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ExplorerError {
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn schema(
        dataset: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Schema {
            dataset: dataset.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means a precomputed artifact is missing on disk.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ExplorerError>;
