use crate::config::{MatcherConfig, SimilarityMetric};
use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::debug;

/// Fuzzy matcher correcting misspelled keywords against the catalog vocabulary
pub struct FuzzyMatcher {
    /// Minimum score (0-100) for a vocabulary entry to replace a keyword
    pub threshold: u8,
    pub metric: SimilarityMetric,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: 80,
            metric: SimilarityMetric::Levenshtein,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: u8, metric: SimilarityMetric) -> Self {
        Self { threshold, metric }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self::new(config.fuzzy_threshold, config.metric)
    }

    /// Similarity between two strings on a 0-100 scale
    pub fn score(&self, a: &str, b: &str) -> u8 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        let similarity = match self.metric {
            SimilarityMetric::Levenshtein => normalized_levenshtein(&a, &b),
            SimilarityMetric::JaroWinkler => jaro_winkler(&a, &b),
        };
        (similarity * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Best vocabulary entry for a keyword. Ties keep the earlier entry.
    pub fn best_match<'a>(&self, keyword: &str, vocabulary: &'a [String]) -> Option<(&'a str, u8)> {
        let mut best: Option<(&'a str, u8)> = None;
        for entry in vocabulary {
            let score = self.score(keyword, entry);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((entry.as_str(), score));
            }
        }
        best
    }

    /// Replace the keyword with its closest vocabulary entry when the score
    /// clears the threshold; otherwise return it unchanged.
    pub fn correct(&self, keyword: &str, vocabulary: &[String]) -> String {
        match self.best_match(keyword, vocabulary) {
            Some((entry, score)) if score >= self.threshold => {
                if entry != keyword {
                    debug!("Corrected keyword '{}' -> '{}' (score {})", keyword, entry, score);
                }
                entry.to_string()
            }
            _ => keyword.to_string(),
        }
    }
}
