//! Data Assistant
//!
//! Handles one conversational turn against a dataset:
//! question -> keywords -> column mapping -> (clarification round-trips) ->
//! synthesized SQL -> rows.
//!
//! Clarification state lives in a per-session slot; a turn holds its slot for
//! its whole duration and the slot is cleared once a query has run, whatever
//! the outcome.

use crate::ambiguity::{ClarificationStep, ConversationState};
use crate::catalog::ColumnCatalog;
use crate::column_matcher::{ColumnMatcher, KeywordMapping};
use crate::config::{AppConfig, DatasetConfig};
use crate::dataset::load_table;
use crate::error::{NlqError, Result, NO_PARAMETERS_MESSAGE};
use crate::keywords::KeywordExtractor;
use crate::llm::TextGenerator;
use crate::session::SessionStore;
use crate::sql_engine::{Row, SqlEngine};
use crate::sql_generator::QuerySynthesizer;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What a turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AskOutcome {
    /// Guidance when the question names nothing the dataset knows about
    Message { message: String },
    /// One `"<keyword>: <c1>, <c2>"` line per ambiguous keyword
    Clarification { clarification: Vec<String> },
    Answer { answer: Vec<Row> },
}

impl AskOutcome {
    fn no_parameters() -> Self {
        AskOutcome::Message {
            message: NO_PARAMETERS_MESSAGE.to_string(),
        }
    }
}

/// Keywords and mapping for a question, without opening a session.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordReport {
    pub keywords: Vec<String>,
    pub mapping: KeywordMapping,
}

enum Turn {
    Reply(AskOutcome),
    Hold(ConversationState),
    Run { question: String, mapping: KeywordMapping },
}

pub struct DataAssistant {
    name: String,
    extractor: KeywordExtractor,
    matcher: ColumnMatcher,
    synthesizer: QuerySynthesizer,
    engine: SqlEngine,
    generator: Arc<dyn TextGenerator>,
    sessions: SessionStore,
    llm_timeout: Duration,
}

impl DataAssistant {
    /// Load the dataset (and its catalog file, if any) and build the assistant.
    pub fn from_config(
        dataset: &DatasetConfig,
        config: &AppConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        let frame = load_table(&dataset.path, dataset.format, dataset.delimiter)?;
        let catalog = match &dataset.catalog_path {
            Some(path) => ColumnCatalog::from_file(path)?,
            None => ColumnCatalog::from_frame(&frame),
        };
        if catalog.is_empty() {
            return Err(NlqError::Dataset(format!("dataset '{}' has no columns", dataset.name)));
        }
        Ok(Self::from_parts(dataset, frame, catalog, config, generator))
    }

    pub fn from_parts(
        dataset: &DatasetConfig,
        frame: DataFrame,
        catalog: ColumnCatalog,
        config: &AppConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        info!(
            "Dataset '{}': {} rows, {} catalog columns",
            dataset.name,
            frame.height(),
            catalog.len()
        );
        Self {
            name: dataset.name.clone(),
            extractor: KeywordExtractor::new(config.extractor.clone()),
            matcher: ColumnMatcher::new(catalog, &config.matcher),
            synthesizer: QuerySynthesizer::new(&dataset.table_name, dataset.prompt.clone()),
            engine: SqlEngine::new(&dataset.table_name, frame, config.executor.max_rows),
            generator,
            sessions: SessionStore::new(Duration::from_secs(config.sessions.ttl_secs)),
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        self.matcher.catalog()
    }

    pub fn engine(&self) -> &SqlEngine {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Discard any pending clarification for the session.
    pub async fn reset(&self, session_id: &str) -> bool {
        self.sessions.reset(session_id).await
    }

    /// Extraction and matching only.
    pub fn analyze(&self, question: &str) -> Result<KeywordReport> {
        let keywords = self.extractor.extract(question)?;
        let mapping = self.matcher.map_keywords(&keywords)?;
        Ok(KeywordReport { keywords, mapping })
    }

    /// Handle one message. While the session awaits a clarification the
    /// message is read as the comma-separated column choices.
    pub async fn ask(&self, session_id: &str, message: &str) -> Result<AskOutcome> {
        let slot = self.sessions.slot(session_id);
        let mut slot = slot.lock().await;
        slot.touch();
        info!("[{}/{}] Received: {}", self.name, session_id, message);

        let answered = slot
            .state
            .as_mut()
            .map(|state| (state.apply_answer(message), state.question.clone()));

        let turn = match answered {
            Some((Ok(ClarificationStep::Pending(prompt)), _)) => Turn::Reply(AskOutcome::Clarification {
                clarification: prompt,
            }),
            Some((Ok(ClarificationStep::Resolved(mapping)), question)) => Turn::Run { question, mapping },
            Some((Err(e), _)) => {
                if !matches!(e, NlqError::TooManyClarificationValues { .. }) {
                    slot.clear();
                }
                return Err(e);
            }
            None => self.open(message)?,
        };

        let (question, mapping) = match turn {
            Turn::Reply(outcome) => return Ok(outcome),
            Turn::Hold(state) => {
                let clarification = state.prompt();
                info!(
                    "[{}/{}] Awaiting clarification for {:?}",
                    self.name,
                    session_id,
                    state.outstanding()
                );
                slot.state = Some(state);
                return Ok(AskOutcome::Clarification { clarification });
            }
            Turn::Run { question, mapping } => (question, mapping),
        };

        let result = self.run_query(&question, &mapping).await;
        slot.clear();
        match result {
            Ok(rows) => Ok(AskOutcome::Answer { answer: rows }),
            Err(e) => {
                warn!("[{}/{}] Query failed: {}", self.name, session_id, e);
                Err(e)
            }
        }
    }

    fn open(&self, question: &str) -> Result<Turn> {
        let keywords = match self.extractor.extract(question) {
            Ok(keywords) => keywords,
            Err(NlqError::NoKeywordsFound) => return Ok(Turn::Reply(AskOutcome::no_parameters())),
            Err(e) => return Err(e),
        };
        let mapping = self.matcher.map_keywords(&keywords)?;
        if mapping.is_empty() {
            return Ok(Turn::Reply(AskOutcome::no_parameters()));
        }
        if mapping.is_ambiguous() {
            return Ok(Turn::Hold(ConversationState::new(question, mapping)));
        }
        Ok(Turn::Run {
            question: question.to_string(),
            mapping,
        })
    }

    async fn run_query(&self, question: &str, mapping: &KeywordMapping) -> Result<Vec<Row>> {
        let columns = mapping.columns();
        info!("Final keyword mapping: {:?}", mapping);
        let synthesis = self
            .synthesizer
            .synthesize(self.generator.as_ref(), question, &columns);
        let sql = tokio::time::timeout(self.llm_timeout, synthesis)
            .await
            .map_err(|_| {
                NlqError::UpstreamTimeout(format!("no completion within {:?}", self.llm_timeout))
            })??;
        self.engine.execute(&sql)
    }
}
