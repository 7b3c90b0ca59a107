//! Clarification dialogue.
//!
//! A question whose keywords map to more than one column opens a
//! [`ConversationState`]. The follow-up messages are read as comma-separated
//! column choices, assigned positionally to the keywords still waiting for an
//! answer.

use crate::catalog::normalize_column_name;
use crate::column_matcher::KeywordMapping;
use crate::error::{NlqError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// State of one in-flight clarification exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    /// The question that opened the exchange; it stays the semantic query
    pub question: String,
    /// Full mapping as produced by the matcher
    pub mapping: KeywordMapping,
    /// Resolved entries: the singletons plus every answered keyword
    pub resolved: KeywordMapping,
    pub created_at: DateTime<Utc>,
}

/// Result of feeding one answer into a [`ConversationState`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClarificationStep {
    /// Some keywords are still ambiguous; the prompt lists them
    Pending(Vec<String>),
    /// Every keyword is resolved; the merged mapping is ready for synthesis
    Resolved(KeywordMapping),
}

impl ConversationState {
    /// Open an exchange. Singleton entries are resolved immediately.
    pub fn new(question: impl Into<String>, mapping: KeywordMapping) -> Self {
        let resolved = mapping.singletons();
        Self {
            question: question.into(),
            mapping,
            resolved,
            created_at: Utc::now(),
        }
    }

    /// Ambiguous keywords without an answer yet, in the order they were reported.
    pub fn outstanding(&self) -> Vec<&str> {
        self.mapping
            .iter()
            .filter(|(keyword, candidates)| candidates.len() > 1 && !self.resolved.contains(keyword))
            .map(|(keyword, _)| keyword)
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.outstanding().is_empty()
    }

    /// One line per outstanding keyword: `"<keyword>: <c1>, <c2>, ..."`.
    pub fn prompt(&self) -> Vec<String> {
        self.outstanding()
            .into_iter()
            .filter_map(|keyword| {
                self.mapping
                    .get(keyword)
                    .map(|candidates| format!("{}: {}", keyword, candidates.join(", ")))
            })
            .collect()
    }

    /// Apply a comma-separated answer. More values than outstanding keywords is
    /// rejected without touching the state.
    pub fn apply_answer(&mut self, answer: &str) -> Result<ClarificationStep> {
        let values: Vec<&str> = answer
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        let outstanding: Vec<String> = self.outstanding().into_iter().map(str::to_string).collect();

        debug!("Outstanding keywords: {:?}, answer values: {:?}", outstanding, values);

        if values.len() > outstanding.len() {
            warn!(
                "Rejected clarification with {} values for {} outstanding keywords",
                values.len(),
                outstanding.len()
            );
            return Err(NlqError::TooManyClarificationValues {
                given: values.len(),
                expected: outstanding.len(),
            });
        }

        for (keyword, value) in outstanding.iter().zip(values) {
            let column = self.canonical_choice(keyword, value);
            self.resolved.insert(keyword.clone(), vec![column]);
        }

        if self.is_resolved() {
            Ok(ClarificationStep::Resolved(self.final_mapping()))
        } else {
            Ok(ClarificationStep::Pending(self.prompt()))
        }
    }

    /// Singletons and clarified entries merged in the original mapping order.
    pub fn final_mapping(&self) -> KeywordMapping {
        self.mapping
            .keywords()
            .filter_map(|keyword| {
                self.resolved
                    .get(keyword)
                    .map(|columns| (keyword.to_string(), columns.to_vec()))
            })
            .collect()
    }

    /// The candidate the user meant, or the value verbatim if it names none.
    fn canonical_choice(&self, keyword: &str, value: &str) -> String {
        let candidates = self.mapping.get(keyword).unwrap_or(&[]);
        let wanted = normalize_column_name(value);
        match candidates
            .iter()
            .find(|c| c.eq_ignore_ascii_case(value) || normalize_column_name(c) == wanted)
        {
            Some(candidate) => candidate.clone(),
            None => {
                warn!(
                    "Answer '{}' for '{}' is not one of the candidates {:?}; using it as given",
                    value, keyword, candidates
                );
                value.to_string()
            }
        }
    }
}
