//! Explorer facade for the UI layer
//!
//! Coordinates selection resolution, absorption aggregation, probe lookup,
//! cosine profiles and dashboard resolution into one serializable view.

use serde::Serialize;
use tracing::{info, warn};

use crate::absorption::{AbsorptionAggregator, AbsorptionView};
use crate::config::ExplorerConfig;
use crate::cosine::{CosineProfile, LatentCosine};
use crate::dashboard::{DashboardArtifact, DashboardResolver};
use crate::error::Result;
use crate::probe::{ProbeStats, ProbeStatsLookup};
use crate::sae::{Latent, SaeId};
use crate::selection::{ResolvedSelection, SelectionRequest, SelectionResolver};
use crate::source::{DataSource, FsSource};
use crate::store::DataStore;
use crate::tokens::TokenSampler;

/// Dashboard outcome for one latent.
///
/// A missing file is carried as a message so the caller can show a notice and
/// keep rendering the other latents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSlot {
    pub latent: Latent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<DashboardArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

/// Cosine similarities for the latents in view, or where the array should be.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CosineSlot {
    Available {
        split: Vec<LatentCosine>,
        absorbing: Vec<LatentCosine>,
    },
    Missing {
        message: String,
    },
}

/// Probe comparison for the selected letter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeSlot {
    Available { stats: ProbeStats },
    /// The table loaded but has no row for this selection
    NoData,
    /// The probe statistics table itself is absent
    Missing { message: String },
}

impl ProbeSlot {
    pub fn stats(&self) -> Option<&ProbeStats> {
        match self {
            Self::Available { stats } => Some(stats),
            Self::NoData | Self::Missing { .. } => None,
        }
    }
}

/// Everything the UI layer renders for one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplorerView {
    pub selection: ResolvedSelection,
    pub absorption: AbsorptionView,
    /// `None` only when the selection has no letter
    pub probe: Option<ProbeSlot>,
    pub cosine: Option<CosineSlot>,
    pub split_dashboards: Vec<DashboardSlot>,
    pub absorbing_dashboards: Vec<DashboardSlot>,
}

/// Main entry point for a UI layer.
pub struct Explorer<S: DataSource> {
    store: DataStore<S>,
    max_absorbing_latents: usize,
}

impl Explorer<FsSource> {
    /// Explorer over the on-disk layout described by `config`.
    pub fn open(config: ExplorerConfig) -> Self {
        info!("Opening explorer datasets under {}", config.data_dir.display());
        let max = config.max_absorbing_latents;
        Self::with_source(FsSource::new(config)).with_max_absorbing_latents(max)
    }
}

impl<S: DataSource> Explorer<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            store: DataStore::new(source),
            max_absorbing_latents: crate::config::MAX_ABSORBING_LATENTS,
        }
    }

    pub fn with_max_absorbing_latents(mut self, max: usize) -> Self {
        self.max_absorbing_latents = max;
        self
    }

    pub fn store(&self) -> &DataStore<S> {
        &self.store
    }

    /// Drop all cached datasets; the next call reloads from the source.
    pub fn reload(&self) {
        info!("Reloading explorer datasets");
        self.store.invalidate();
    }

    pub fn resolve(&self, request: &SelectionRequest) -> Result<Option<ResolvedSelection>> {
        SelectionResolver::new(&self.store).resolve(request)
    }

    pub fn dashboard(&self, sae: &SaeId, latent: Latent) -> Result<DashboardArtifact> {
        DashboardResolver::new(&self.store).resolve(sae, latent)
    }

    pub fn token_sampler(&self) -> Result<TokenSampler> {
        Ok(TokenSampler::new(&self.store.english_tokens_by_letter()?))
    }

    /// Build the full view for `request`. `None` when no SAE is available.
    pub fn view(&self, request: &SelectionRequest) -> Result<Option<ExplorerView>> {
        let Some(selection) = self.resolve(request)? else {
            warn!("No SAE configurations available");
            return Ok(None);
        };

        let absorption = AbsorptionAggregator::new(&self.store)
            .with_max_latents(self.max_absorbing_latents)
            .aggregate(&selection)?;

        let (probe, cosine) = match selection.letter {
            Some(letter) => (
                Some(self.probe_slot(&selection.sae, letter)?),
                Some(self.cosine_slot(&selection.sae, letter, &absorption)?),
            ),
            None => (None, None),
        };

        let split_dashboards = self.dashboard_slots(&selection.sae, &absorption.split_latents)?;
        let absorbing: Vec<Latent> = absorption.absorbing_latents.keys().copied().collect();
        let absorbing_dashboards = self.dashboard_slots(&selection.sae, &absorbing)?;

        info!(
            "View {} letter {:?}: {} split, {} absorbing latents",
            selection.sae,
            selection.letter,
            absorption.split_latents.len(),
            absorption.total_absorbing_latents
        );

        Ok(Some(ExplorerView {
            selection,
            absorption,
            probe,
            cosine,
            split_dashboards,
            absorbing_dashboards,
        }))
    }

    fn probe_slot(&self, sae: &SaeId, letter: char) -> Result<ProbeSlot> {
        match ProbeStatsLookup::new(&self.store).lookup(sae, letter) {
            Ok(Some(stats)) => Ok(ProbeSlot::Available { stats }),
            Ok(None) => Ok(ProbeSlot::NoData),
            Err(e) if e.is_not_found() => {
                warn!("{}", e);
                Ok(ProbeSlot::Missing {
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn cosine_slot(
        &self,
        sae: &SaeId,
        letter: char,
        absorption: &AbsorptionView,
    ) -> Result<CosineSlot> {
        match self.store.cosine_similarities(sae, letter) {
            Ok(values) => {
                let profile = CosineProfile::from_values(values.to_vec());
                Ok(CosineSlot::Available {
                    split: profile.describe(absorption.split_latents.iter().copied()),
                    absorbing: profile.describe(absorption.absorbing_latents.keys().copied()),
                })
            }
            Err(e) if e.is_not_found() => {
                warn!("{}", e);
                Ok(CosineSlot::Missing {
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn dashboard_slots(&self, sae: &SaeId, latents: &[Latent]) -> Result<Vec<DashboardSlot>> {
        let resolver = DashboardResolver::new(&self.store);
        latents
            .iter()
            .map(|&latent| match resolver.resolve(sae, latent) {
                Ok(artifact) => Ok(DashboardSlot {
                    latent,
                    artifact: Some(artifact),
                    missing: None,
                }),
                Err(e) if e.is_not_found() => {
                    warn!("Dashboard for latent {} missing: {}", latent, e);
                    Ok(DashboardSlot {
                        latent,
                        artifact: None,
                        missing: Some(e.to_string()),
                    })
                }
                Err(e) => Err(e),
            })
            .collect()
    }
}
