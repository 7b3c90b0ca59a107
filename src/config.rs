//! Application configuration.
//!
//! Settings come from an optional JSON file (every field has a default) and are
//! then overridden by environment variables, which the binaries load from `.env`
//! through `dotenv` before calling [`AppConfig::load`].

use crate::dataset::DatasetFormat;
use crate::error::{NlqError, Result};
use crate::sql_generator::PromptRules;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    pub llm: LlmConfig,
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
    pub sessions: SessionConfig,
    pub executor: ExecutorConfig,
    pub datasets: Vec<DatasetConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            llm: LlmConfig::default(),
            extractor: ExtractorConfig::default(),
            matcher: MatcherConfig::default(),
            sessions: SessionConfig::default(),
            executor: ExecutorConfig::default(),
            datasets: Vec::new(),
        }
    }
}

/// Connection settings for the OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.1,
            max_tokens: 300,
            timeout_secs: 30,
        }
    }
}

/// What to do with numerals found in a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumeralPolicy {
    /// Pure numerals never become keywords
    Drop,
    /// A numeral is appended to the most recent keyword ("descarga 8621")
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub include_verbs: bool,
    pub numeral_policy: NumeralPolicy,
    /// Words kept as keywords whenever they appear in a question
    pub domain_terms: Vec<String>,
    /// Words of this many characters or fewer are never singularized
    pub min_strip_len: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            include_verbs: false,
            numeral_policy: NumeralPolicy::Drop,
            domain_terms: vec![
                "descarga".to_string(),
                "inyección".to_string(),
                "comentario".to_string(),
            ],
            min_strip_len: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Levenshtein,
    JaroWinkler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub fuzzy_correction: bool,
    /// Minimum score (0-100) a vocabulary entry needs to replace a keyword
    pub fuzzy_threshold: u8,
    pub metric: SimilarityMetric,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_correction: true,
            fuzzy_threshold: 80,
            metric: SimilarityMetric::Levenshtein,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle sessions older than this are evicted
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 15 * 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_rows: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_rows: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub format: DatasetFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// One column name per line; the table headers are used when absent
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub prompt: PromptRules,
}

fn default_delimiter() -> char {
    ';'
}

fn default_table_name() -> String {
    "data".to_string()
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            format: DatasetFormat::from_path(&path),
            path,
            delimiter: default_delimiter(),
            catalog_path: None,
            table_name: default_table_name(),
            prompt: PromptRules::default(),
        }
    }
}

impl AppConfig {
    /// Load the optional JSON file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", &secs)?;
        }
        if let Some(addr) = lookup("NLQ_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(secs) = lookup("NLQ_SESSION_TTL_SECS") {
            self.sessions.ttl_secs = parse_env("NLQ_SESSION_TTL_SECS", &secs)?;
        }
        if let Some(threshold) = lookup("NLQ_FUZZY_THRESHOLD") {
            self.matcher.fuzzy_threshold = parse_env("NLQ_FUZZY_THRESHOLD", &threshold)?;
        }

        if let Some(path) = lookup("NLQ_DATASET_PATH") {
            match self.datasets.first_mut() {
                Some(first) => {
                    first.format = DatasetFormat::from_path(Path::new(&path));
                    first.path = PathBuf::from(path);
                }
                None => self.datasets.push(DatasetConfig::new("data", path)),
            }
        }
        if let Some(first) = self.datasets.first_mut() {
            if let Some(catalog) = lookup("NLQ_CATALOG_PATH") {
                first.catalog_path = Some(PathBuf::from(catalog));
            }
            if let Some(column) = lookup("NLQ_ID_COLUMN") {
                first.prompt.id_column = Some(column);
            }
            if let Some(column) = lookup("NLQ_DATE_COLUMN") {
                first.prompt.date_column = Some(column);
            }
        }

        debug!("Configuration after overrides: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(NlqError::Config(
                "no dataset configured (set NLQ_DATASET_PATH or add one to the config file)".to_string(),
            ));
        }
        if self.matcher.fuzzy_threshold > 100 {
            return Err(NlqError::Config(format!(
                "fuzzy_threshold must be within 0..=100, got {}",
                self.matcher.fuzzy_threshold
            )));
        }
        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.name.as_str()) {
                return Err(NlqError::Config(format!("duplicate dataset name: {}", dataset.name)));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| NlqError::Config(format!("{} has an invalid value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_env_creates_dataset_when_none_configured() {
        let vars = env(&[
            ("NLQ_DATASET_PATH", "data/PARAMETROS_TJ2_model_time.json"),
            ("NLQ_ID_COLUMN", "N_DESCARGA"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.datasets.len(), 1);
        assert_eq!(config.datasets[0].format, DatasetFormat::Json);
        assert_eq!(config.datasets[0].prompt.id_column.as_deref(), Some("N_DESCARGA"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_llm_api_key_takes_precedence() {
        let vars = env(&[("LLM_API_KEY", "primary"), ("OPENAI_API_KEY", "fallback")]);
        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let vars = env(&[("NLQ_FUZZY_THRESHOLD", "eighty")]);
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(|k| vars.get(k).cloned()),
            Err(NlqError::Config(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.datasets.push(DatasetConfig::new("pellets", "pellets.json"));
        config.datasets.push(DatasetConfig::new("pellets", "other.json"));
        assert!(config.validate().is_err());

        config.datasets.pop();
        config.matcher.fuzzy_threshold = 120;
        assert!(config.validate().is_err());

        config.matcher.fuzzy_threshold = 80;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_file_defaults() {
        let raw = r#"{
            "datasets": [
                {"name": "parametros", "path": "data/PARAMETROS_TJ2_ORDENADOS.csv",
                 "format": "csv",
                 "prompt": {"id_column": "N_DESCARGA", "date_column": "fecha"}}
            ],
            "matcher": {"metric": "jaro_winkler"}
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.matcher.metric, SimilarityMetric::JaroWinkler);
        assert_eq!(config.matcher.fuzzy_threshold, 80);
        assert_eq!(config.datasets[0].delimiter, ';');
        assert_eq!(config.datasets[0].table_name, "data");
        assert_eq!(config.datasets[0].format, DatasetFormat::Csv);
    }
}
