//! Cosine similarity between SAE decoder directions and a letter probe

use std::cmp::Ordering;

use serde::Serialize;

use crate::sae::Latent;

/// Per-latent cosine similarity; position in the array is the latent id.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineProfile {
    values: Vec<f32>,
}

/// One latent with its similarity and rank among all latents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatentCosine {
    pub latent: Latent,
    pub cosine: f32,
    pub rank: usize,
}

impl CosineProfile {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, latent: Latent) -> Option<f32> {
        self.values.get(latent as usize).copied()
    }

    /// Latents ordered by descending similarity, ties by ascending id.
    /// NaN entries are left out.
    fn ranked(&self) -> Vec<(Latent, f32)> {
        let mut ranked: Vec<(Latent, f32)> = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(i, &v)| (i as Latent, v))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked
    }

    pub fn top_k(&self, k: usize) -> Vec<(Latent, f32)> {
        let mut ranked = self.ranked();
        ranked.truncate(k);
        ranked
    }

    /// 0-based rank of `latent`, `None` if out of range or NaN.
    pub fn rank_of(&self, latent: Latent) -> Option<usize> {
        let value = self.value(latent).filter(|v| !v.is_nan())?;
        let ahead = self
            .values
            .iter()
            .enumerate()
            .filter(|(i, v)| {
                !v.is_nan() && (**v > value || (**v == value && (*i as Latent) < latent))
            })
            .count();
        Some(ahead)
    }

    /// Similarity and rank for each of `latents` present in the profile.
    pub fn describe(&self, latents: impl IntoIterator<Item = Latent>) -> Vec<LatentCosine> {
        latents
            .into_iter()
            .filter_map(|latent| {
                Some(LatentCosine {
                    latent,
                    cosine: self.value(latent)?,
                    rank: self.rank_of(latent)?,
                })
            })
            .collect()
    }
}
