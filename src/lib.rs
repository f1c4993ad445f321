// Pedantic clippy configuration for a data-analysis codebase
#![allow(clippy::cast_precision_loss)] // usize→f32 for latent ids is intentional
#![allow(clippy::cast_possible_truncation)] // usize→u32 latent indexing
#![allow(clippy::module_name_repetitions)] // DashboardArtifact in dashboard.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns

//! Absorption explorer: feature absorption results for Gemma Scope SAEs
//!
//! For a chosen layer, SAE width, L0 and letter, finds the latents that encode
//! "this token starts with the letter" and the latents that absorb that
//! signal on specific tokens, then resolves dashboards and probe statistics
//! for display by a UI layer.
//!
//! ## Architecture
//!
//! - `store`: memoized, read-only dataset snapshot over a `DataSource`
//! - `source`: filesystem (parquet, npy, HTML) and in-memory sources
//! - `selection`: validation and defaulting of partial selections
//! - `absorption`: split/absorbing latent joins with deduplication and capping
//! - `dashboard`: canonical URL vs. patched local HTML resolution
//! - `probe`: SAE latent vs. linear probe precision/recall/F1
//! - `cosine`: decoder/probe cosine similarity ranking
//! - `tokens`: seeded letter and non-letter token sampling
//! - `explorer`: one-call view composition for the UI layer

pub mod absorption;
pub mod columnar;
pub mod config;
pub mod cosine;
pub mod dashboard;
pub mod error;
pub mod explorer;
pub mod probe;
pub mod records;
pub mod sae;
pub mod selection;
pub mod source;
pub mod store;
pub mod tokens;

pub use absorption::{aggregate_rows, AbsorptionAggregator, AbsorptionView};
pub use config::{ExplorerConfig, DEFAULT_DASHBOARDS_DIR, MAX_ABSORBING_LATENTS};
pub use cosine::{CosineProfile, LatentCosine};
pub use dashboard::{
    canonical_url, escape_html, inject_css_override, DashboardArtifact, DashboardResolver,
    EMBED_CSS_OVERRIDE,
};
pub use error::{ExplorerError, Result};
pub use explorer::{CosineSlot, DashboardSlot, Explorer, ExplorerView, ProbeSlot};
pub use probe::{ProbeStats, ProbeStatsLookup};
pub use records::{AbsorptionRecord, ClassifierMetrics, LetterToken, ProbeStatsRow, SplitFeatRow};
pub use sae::{canonical_l0, is_canonical, Latent, SaeId};
pub use selection::{ResolvedSelection, SelectionRequest, SelectionResolver};
pub use source::{DataSource, FsSource, MemorySource};
pub use store::DataStore;
pub use tokens::TokenSampler;
