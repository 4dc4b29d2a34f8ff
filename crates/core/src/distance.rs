use serde::{Deserialize, Serialize};
use strsim::levenshtein;

use crate::normalization::{
    LineNormalizer, NormalizedLine, DEFAULT_CACHE_CAPACITY, DEFAULT_MIN_TOKEN_LEN,
};
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Tokens shorter than this (in chars) never count as shared vocabulary.
    pub min_token_len: usize,
    pub normalize_cache_capacity: u64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            normalize_cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Edit distance between first lines, saturated to the longer line's length
/// when the two lines share no significant word.
pub struct DistanceEstimator {
    normalizer: LineNormalizer,
}

impl DistanceEstimator {
    pub fn new(config: DistanceConfig) -> Self {
        Self {
            normalizer: LineNormalizer::new(config.normalize_cache_capacity, config.min_token_len),
        }
    }

    pub fn distance(&self, a: &Record, b: &Record) -> f64 {
        self.distance_text(&a.text, &b.text)
    }

    pub fn similarity(&self, a: &Record, b: &Record) -> f64 {
        -self.distance(a, b)
    }

    pub fn distance_text(&self, a: &str, b: &str) -> f64 {
        let left = self.normalizer.normalize(a);
        let right = self.normalizer.normalize(b);
        self.distance_normalized(&left, &right) as f64
    }

    fn distance_normalized(&self, left: &NormalizedLine, right: &NormalizedLine) -> usize {
        if left.joined == right.joined {
            return 0;
        }
        if !left.shares_vocabulary(right) {
            return left.char_len().max(right.char_len());
        }
        levenshtein(&left.joined, &right.joined)
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self::new(DistanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(a: &str, b: &str) -> f64 {
        DistanceEstimator::default().distance_text(a, b)
    }

    #[test]
    fn case_and_punctuation_only_divergence_is_zero() {
        assert_eq!(d("The bees of Hybla", "the Bees of hybla!"), 0.0);
    }

    #[test]
    fn disjoint_vocabulary_saturates() {
        // "cat sat" and "dog ran" have no token of four chars or more
        assert_eq!(d("cat sat", "dog ran"), 7.0);
        assert_eq!(d("Totally different verse", "The bees of Hybla"), 23.0);
    }

    #[test]
    fn shared_word_uses_edit_distance() {
        assert_eq!(d("sweet honey", "sweet money"), 1.0);
        assert_eq!(d("If eighty-eight be past", "if eightyeight be pass"), 1.0);
    }

    #[test]
    fn empty_lines() {
        assert_eq!(d("", ""), 0.0);
        assert_eq!(d("", "  , "), 0.0);
        assert_eq!(d("", "Go lovely Rose"), 14.0);
        assert_eq!(d("Go lovely Rose", ""), 14.0);
    }

    #[test]
    fn min_token_len_is_configurable() {
        let estimator = DistanceEstimator::new(DistanceConfig {
            min_token_len: 3,
            ..DistanceConfig::default()
        });
        assert_eq!(estimator.distance_text("cat sat", "cat ran"), 2.0);
        assert_eq!(d("cat sat", "cat ran"), 7.0);
    }

    #[test]
    fn similarity_is_negated_distance() {
        let estimator = DistanceEstimator::default();
        let a = Record::new("1", "sweet honey");
        let b = Record::new("2", "sweet money");
        assert_eq!(estimator.similarity(&a, &b), -1.0);
    }
}
