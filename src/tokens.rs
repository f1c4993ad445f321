//! Random token sampling from the English-token-by-letter table
//!
//! Used to show example tokens that do and do not start with a letter next to
//! the absorbed tokens.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::records::LetterToken;

/// First alphabetic character of `token`, lowercased.
///
/// Skips leading whitespace and SentencePiece word markers.
pub fn first_letter(token: &str) -> Option<char> {
    token
        .chars()
        .find(|c| c.is_alphabetic())
        .and_then(|c| c.to_lowercase().next())
}

/// Distinct tokens indexed by letter.
#[derive(Debug, Clone, Default)]
pub struct TokenSampler {
    by_letter: BTreeMap<char, Vec<String>>,
}

impl TokenSampler {
    pub fn new(rows: &[LetterToken]) -> Self {
        let mut sets: BTreeMap<char, BTreeSet<String>> = BTreeMap::new();
        for row in rows {
            sets.entry(row.letter).or_default().insert(row.token.clone());
        }
        Self {
            by_letter: sets
                .into_iter()
                .map(|(letter, tokens)| (letter, tokens.into_iter().collect()))
                .collect(),
        }
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.by_letter.keys().copied()
    }

    /// Sorted distinct tokens for `letter`.
    pub fn letter_tokens(&self, letter: char) -> &[String] {
        self.by_letter
            .get(&letter)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Up to `n` distinct tokens of `letter`, reproducible for a given seed.
    pub fn sample_letter_tokens(&self, letter: char, n: usize, seed: u64) -> Vec<String> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        self.letter_tokens(letter)
            .choose_multiple(&mut rng, n)
            .cloned()
            .collect()
    }

    /// Up to `n` distinct tokens that do not start with `letter`.
    ///
    /// Filters on the token text itself as well as on its table letter, so a
    /// mislabelled row can never leak in.
    pub fn sample_non_letter_tokens(&self, letter: char, n: usize, seed: u64) -> Vec<String> {
        let excluded = letter.to_lowercase().next().unwrap_or(letter);
        let candidates: BTreeSet<&String> = self
            .by_letter
            .iter()
            .filter(|(l, _)| **l != excluded)
            .flat_map(|(_, tokens)| tokens.iter())
            .filter(|token| first_letter(token) != Some(excluded))
            .collect();
        let candidates: Vec<&String> = candidates.into_iter().collect();

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        candidates
            .choose_multiple(&mut rng, n)
            .map(|token| (*token).clone())
            .collect()
    }
}
