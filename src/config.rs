//! File layout configuration for the explorer datasets

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sae::{Latent, SaeId};

/// Maximum number of absorbing latents returned for display
pub const MAX_ABSORBING_LATENTS: usize = 20;

/// Default directory of non-canonical dashboard HTML, relative to `data_dir`
pub const DEFAULT_DASHBOARDS_DIR: &str = "non_canonical_dashboards";

/// Where the explorer finds its datasets.
///
/// Relative file names are resolved against `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Root directory holding all datasets
    pub data_dir: PathBuf,
    /// SAE/letter split-feature table
    pub split_feats_file: String,
    /// Feature-absorption results table
    pub absorption_file: String,
    /// English tokens grouped by first letter
    pub english_tokens_file: String,
    /// k-sparse probe statistics table
    pub probe_stats_file: String,
    /// Directory of per-(layer, width, l0, letter) cosine arrays
    pub cosine_dir: String,
    /// Directory of non-canonical dashboard HTML files
    pub dashboards_dir: String,
    /// Cap on absorbing latents in one view
    pub max_absorbing_latents: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            split_feats_file: "sae_split_feats.parquet".to_string(),
            absorption_file: "feature_absorption_results.parquet".to_string(),
            english_tokens_file: "english_tokens_by_letter.parquet".to_string(),
            probe_stats_file: "k_sparse_probe_stats.parquet".to_string(),
            cosine_dir: "cosine_sims".to_string(),
            dashboards_dir: DEFAULT_DASHBOARDS_DIR.to_string(),
            max_absorbing_latents: MAX_ABSORBING_LATENTS,
        }
    }
}

impl ExplorerConfig {
    /// Load a config from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn split_feats_path(&self) -> PathBuf {
        self.data_dir.join(&self.split_feats_file)
    }

    pub fn absorption_path(&self) -> PathBuf {
        self.data_dir.join(&self.absorption_file)
    }

    pub fn english_tokens_path(&self) -> PathBuf {
        self.data_dir.join(&self.english_tokens_file)
    }

    pub fn probe_stats_path(&self) -> PathBuf {
        self.data_dir.join(&self.probe_stats_file)
    }

    /// `cosine_sims/layer_{layer}/width_{w}k/average_l0_{l0}/{letter}.npy`
    pub fn cosine_path(&self, sae: &SaeId, letter: char) -> PathBuf {
        self.data_dir
            .join(&self.cosine_dir)
            .join(format!("layer_{}", sae.layer))
            .join(format!("width_{}k", sae.width_k()))
            .join(format!("average_l0_{}", sae.sae_l0))
            .join(format!("{letter}.npy"))
    }

    /// Dashboard path relative to `data_dir`.
    pub fn dashboard_relative_path(&self, sae: &SaeId, latent: Latent) -> PathBuf {
        dashboard_relative_path(&self.dashboards_dir, sae, latent)
    }

    pub fn dashboard_path(&self, sae: &SaeId, latent: Latent) -> PathBuf {
        self.data_dir.join(self.dashboard_relative_path(sae, latent))
    }
}

/// `{dir}/layer_{layer}/width_{w}k/average_l0_{l0}_feature_{latent}.html`
pub fn dashboard_relative_path(dir: &str, sae: &SaeId, latent: Latent) -> PathBuf {
    Path::new(dir)
        .join(format!("layer_{}", sae.layer))
        .join(format!("width_{}k", sae.width_k()))
        .join(format!("average_l0_{}_feature_{latent}.html", sae.sae_l0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.max_absorbing_latents, 20);
        assert_eq!(
            config.split_feats_path(),
            PathBuf::from("data/sae_split_feats.parquet")
        );
    }

    #[test]
    fn test_dashboard_path_convention() {
        let config = ExplorerConfig::default();
        let sae = SaeId::new(3, 16_000, 40);
        assert_eq!(
            config.dashboard_path(&sae, 1234),
            PathBuf::from(
                "data/non_canonical_dashboards/layer_3/width_16k/average_l0_40_feature_1234.html"
            )
        );
    }

    #[test]
    fn test_cosine_path_convention() {
        let config = ExplorerConfig::default().with_data_dir("/srv/absorb");
        let sae = SaeId::new(0, 65_000, 73);
        assert_eq!(
            config.cosine_path(&sae, 'q'),
            PathBuf::from("/srv/absorb/cosine_sims/layer_0/width_65k/average_l0_73/q.npy")
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ExplorerConfig =
            serde_json::from_str(r#"{"data_dir": "/tmp/x", "max_absorbing_latents": 5}"#)
                .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.max_absorbing_latents, 5);
        assert_eq!(config.cosine_dir, "cosine_sims");
    }
}
