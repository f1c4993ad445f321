//! SAE identity and the canonical-L0 lookup for Gemma Scope residual SAEs
//!
//! Every `(sae_width, layer)` pair has exactly one canonical `sae_l0`, the one
//! published on Neuronpedia. All other L0 values for that pair are
//! non-canonical and their dashboards live on local disk.

use serde::{Deserialize, Serialize};

/// Latent index within one SAE.
pub type Latent = u32;

/// Base model the SAEs were trained on, as it appears in Neuronpedia URLs.
pub const MODEL_ID: &str = "gemma-2-2b";

/// Canonical L0 per `(sae_width, layer)`.
///
/// Rows are `(sae_width, [l0 for layer 0, 1, ...])`.
const CANONICAL_L0: [(u32, [u32; 10]); 2] = [
    (16_000, [105, 102, 141, 59, 124, 68, 70, 69, 71, 73]),
    (65_000, [73, 121, 77, 89, 89, 105, 107, 107, 111, 118]),
];

/// Identifies one trained sparse autoencoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SaeId {
    pub layer: u32,
    pub sae_width: u32,
    pub sae_l0: u32,
}

impl SaeId {
    pub fn new(layer: u32, sae_width: u32, sae_l0: u32) -> Self {
        Self {
            layer,
            sae_width,
            sae_l0,
        }
    }

    /// Width in thousands, as used in paths and URLs (`16000` -> `16`).
    pub fn width_k(&self) -> u32 {
        width_k(self.sae_width)
    }

    pub fn is_canonical(&self) -> bool {
        is_canonical(self.sae_width, self.layer, self.sae_l0)
    }
}

impl std::fmt::Display for SaeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L{}/{}k/l0={}",
            self.layer,
            self.width_k(),
            self.sae_l0
        )
    }
}

/// Width in thousands, truncating like integer division.
pub fn width_k(sae_width: u32) -> u32 {
    sae_width / 1000
}

/// Canonical L0 for a `(sae_width, layer)` pair, if the pair is in the table.
pub fn canonical_l0(sae_width: u32, layer: u32) -> Option<u32> {
    CANONICAL_L0
        .iter()
        .find(|(width, _)| *width == sae_width)
        .and_then(|(_, by_layer)| by_layer.get(layer as usize).copied())
}

/// Exact match of all three fields against the canonical table.
pub fn is_canonical(sae_width: u32, layer: u32, sae_l0: u32) -> bool {
    canonical_l0(sae_width, layer) == Some(sae_l0)
}

/// All `(sae_width, layer)` pairs that have a canonical L0.
pub fn canonical_pairs() -> impl Iterator<Item = (u32, u32)> {
    CANONICAL_L0.iter().flat_map(|(width, by_layer)| {
        (0..by_layer.len() as u32).map(move |layer| (*width, layer))
    })
}
