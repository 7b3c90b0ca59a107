//! Keyword -> column mapping.
//!
//! Each keyword is matched against the normalized column names: whole-word
//! matches first, substring containment only when there are none. Candidates
//! are ordered shortest raw name first.

use crate::catalog::ColumnCatalog;
use crate::config::MatcherConfig;
use crate::error::{NlqError, Result};
use crate::fuzzy_matcher::FuzzyMatcher;
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered keyword -> candidate columns. Every stored entry has at least one
/// candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordMapping {
    entries: IndexMap<String, Vec<String>>,
}

impl KeywordMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert candidates for a keyword. Empty candidate lists are dropped.
    pub fn insert(&mut self, keyword: impl Into<String>, candidates: Vec<String>) {
        if candidates.is_empty() {
            return;
        }
        self.entries.insert(keyword.into(), candidates);
    }

    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.entries.get(keyword).map(Vec::as_slice)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.entries.contains_key(keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with exactly one candidate.
    pub fn singletons(&self) -> KeywordMapping {
        self.filtered(|candidates| candidates.len() == 1)
    }

    /// Entries with more than one candidate.
    pub fn ambiguous(&self) -> KeywordMapping {
        self.filtered(|candidates| candidates.len() > 1)
    }

    pub fn is_ambiguous(&self) -> bool {
        self.entries.values().any(|candidates| candidates.len() > 1)
    }

    /// All candidate columns flattened in mapping order, duplicates removed.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for candidates in self.entries.values() {
            for column in candidates {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    fn filtered<F: Fn(&[String]) -> bool>(&self, keep: F) -> KeywordMapping {
        KeywordMapping {
            entries: self
                .entries
                .iter()
                .filter(|(_, candidates)| keep(candidates))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for KeywordMapping {
    fn from_iter<T: IntoIterator<Item = (K, Vec<String>)>>(iter: T) -> Self {
        let mut mapping = KeywordMapping::new();
        for (keyword, candidates) in iter {
            mapping.insert(keyword, candidates);
        }
        mapping
    }
}

pub struct ColumnMatcher {
    catalog: ColumnCatalog,
    vocabulary: Vec<String>,
    fuzzy: Option<FuzzyMatcher>,
}

impl ColumnMatcher {
    pub fn new(catalog: ColumnCatalog, config: &MatcherConfig) -> Self {
        let vocabulary = catalog.vocabulary();
        let fuzzy = config
            .fuzzy_correction
            .then(|| FuzzyMatcher::from_config(config));
        Self {
            catalog,
            vocabulary,
            fuzzy,
        }
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    /// Map keywords onto catalog columns. Keywords without any match are omitted.
    pub fn map_keywords(&self, keywords: &[String]) -> Result<KeywordMapping> {
        let mut mapping = KeywordMapping::new();
        for keyword in keywords {
            let keyword = match &self.fuzzy {
                Some(fuzzy) => fuzzy.correct(&keyword.to_lowercase(), &self.vocabulary),
                None => keyword.to_lowercase(),
            };
            if mapping.contains(&keyword) {
                continue;
            }
            let matches = self.match_keyword(&keyword)?;
            mapping.insert(keyword, matches);
        }
        debug!("Keyword mapping: {:?}", mapping);
        Ok(mapping)
    }

    /// Candidate columns for one keyword, shortest raw name first.
    pub fn match_keyword(&self, keyword: &str) -> Result<Vec<String>> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(&keyword)))
            .case_insensitive(true)
            .build()
            .map_err(|e| NlqError::Config(format!("invalid keyword pattern: {}", e)))?;

        let columns = self.catalog.columns();
        let mut matches: Vec<String> = columns
            .iter()
            .filter(|c| pattern.is_match(&c.normalized))
            .map(|c| c.raw.clone())
            .collect();

        if matches.is_empty() {
            matches = columns
                .iter()
                .filter(|c| c.normalized.contains(&keyword))
                .map(|c| c.raw.clone())
                .collect();
        }

        matches.sort_by_key(|raw| raw.chars().count());
        Ok(matches)
    }
}
