//! Column catalog: the ordered list of field names a question can refer to.

use crate::error::Result;
use lazy_static::lazy_static;
use polars::prelude::DataFrame;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

lazy_static! {
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"(\p{Ll})(\p{Lu})").unwrap();
}

/// Normalize a column name for comparison: split camelCase, underscores to
/// spaces, lower-case, trim. `comentarioDesc` -> `comentario desc`,
/// `N_DESCARGA` -> `n descarga`.
pub fn normalize_column_name(name: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(name, "$1 $2");
    split.replace('_', " ").to_lowercase().trim().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogColumn {
    /// Name as it appears in the dataset (what gets emitted)
    pub raw: String,
    /// Comparison form
    pub normalized: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnCatalog {
    columns: Vec<CatalogColumn>,
}

impl ColumnCatalog {
    /// Build a catalog. When two names normalize to the same form, the first wins.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for name in names {
            let raw = name.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let normalized = normalize_column_name(raw);
            if !seen.insert(normalized.clone()) {
                warn!("Column '{}' collides with an earlier column after normalization", raw);
                continue;
            }
            columns.push(CatalogColumn {
                raw: raw.to_string(),
                normalized,
            });
        }
        debug!("Column catalog holds {} columns", columns.len());
        Self { columns }
    }

    /// One column name per line; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(raw.lines()))
    }

    pub fn from_frame(df: &DataFrame) -> Self {
        Self::new(df.get_column_names())
    }

    pub fn columns(&self) -> &[CatalogColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Find a column by raw or normalized name, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<&CatalogColumn> {
        let wanted = normalize_column_name(name);
        self.columns
            .iter()
            .find(|c| c.raw.eq_ignore_ascii_case(name.trim()) || c.normalized == wanted)
    }

    /// Words a misspelled keyword can be corrected to: every normalized name,
    /// then every individual word of those names longer than one character.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut vocabulary = Vec::new();
        for column in &self.columns {
            if seen.insert(column.normalized.clone()) {
                vocabulary.push(column.normalized.clone());
            }
        }
        for column in &self.columns {
            for word in column.normalized.split_whitespace() {
                if word.chars().count() > 1 && seen.insert(word.to_string()) {
                    vocabulary.push(word.to_string());
                }
            }
        }
        vocabulary
    }
}
