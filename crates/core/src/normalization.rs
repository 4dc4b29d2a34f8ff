use std::sync::Arc;

use moka::sync::Cache;
use rustc_hash::FxHashSet;

pub const DEFAULT_CACHE_CAPACITY: u64 = 65_536;
pub const DEFAULT_MIN_TOKEN_LEN: usize = 4;

/// Token form of a first line, plus the tokens rejoined with single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub tokens: Vec<String>,
    pub joined: String,
    /// Tokens of at least `min_token_len` chars.
    pub significant: FxHashSet<String>,
}

impl NormalizedLine {
    pub fn from_text(text: &str, min_token_len: usize) -> Self {
        let tokens = normalize(text);
        let joined = tokens.join(" ");
        let significant = tokens
            .iter()
            .filter(|token| token.chars().count() >= min_token_len)
            .cloned()
            .collect();
        Self {
            tokens,
            joined,
            significant,
        }
    }

    /// Whether the two lines have a significant token in common.
    pub fn shares_vocabulary(&self, other: &NormalizedLine) -> bool {
        let (small, large) = if self.significant.len() <= other.significant.len() {
            (&self.significant, &other.significant)
        } else {
            (&other.significant, &self.significant)
        };
        small.iter().any(|token| large.contains(token))
    }

    /// Length of the joined form, counted in chars.
    pub fn char_len(&self) -> usize {
        self.joined.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub fn normalize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Memoizing normalizer. Entries are keyed on the raw text and evicted once
/// the capacity is reached.
pub struct LineNormalizer {
    cache: Cache<String, Arc<NormalizedLine>>,
    min_token_len: usize,
}

impl LineNormalizer {
    pub fn new(capacity: u64, min_token_len: usize) -> Self {
        Self {
            cache: Cache::new(capacity),
            min_token_len,
        }
    }

    pub fn normalize(&self, text: &str) -> Arc<NormalizedLine> {
        if let Some(hit) = self.cache.get(text) {
            return hit;
        }
        let line = Arc::new(NormalizedLine::from_text(text, self.min_token_len));
        self.cache.insert(text.to_string(), Arc::clone(&line));
        line
    }

    pub fn contains(&self, text: &str) -> bool {
        self.cache.contains_key(text)
    }
}

impl Default for LineNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_MIN_TOKEN_LEN)
    }
}
