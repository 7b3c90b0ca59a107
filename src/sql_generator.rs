//! Query synthesis: prompt construction and strict extraction of the SQL
//! statement from a free-form completion.

use crate::error::{NlqError, Result};
use crate::llm::TextGenerator;
use crate::sql_engine::ensure_read_only;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

lazy_static! {
    static ref LINE_START_SELECT: Regex = Regex::new(r"(?im)^[ \t>*`]*(select)\b").unwrap();
    static ref ANY_SELECT: Regex = Regex::new(r"(?i)\bselect\b").unwrap();
    static ref BLANK_LINE: Regex = Regex::new(r"\n[ \t]*\n").unwrap();
}

/// Dataset-specific instructions embedded in the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptRules {
    /// Column to filter on when the user refers to a record by number
    pub id_column: Option<String>,
    /// Column holding `YYYY-MM-DD` dates
    pub date_column: Option<String>,
    pub extra_rules: Vec<String>,
}

pub struct QuerySynthesizer {
    table_name: String,
    rules: PromptRules,
}

impl QuerySynthesizer {
    pub fn new(table_name: impl Into<String>, rules: PromptRules) -> Self {
        Self {
            table_name: table_name.into(),
            rules,
        }
    }

    pub fn build_prompt(&self, question: &str, columns: &[String]) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!("The table is named '{}'.\n", self.table_name));
        prompt.push_str(&format!("User question: '{}'.\n", question));
        prompt.push_str(&format!("Available columns: {}.\n", columns.join(", ")));
        prompt.push_str("Write one valid SQL SELECT query using only these columns, exactly as written.\n\n");

        prompt.push_str("### Rules:\n");
        prompt.push_str("- All values in the table are text: compare against quoted literals, e.g. `col = '123'`.\n");
        if let Some(id) = &self.rules.id_column {
            prompt.push_str(&format!(
                "- When the user refers to a record by number, filter with `{} = '<number>'`.\n",
                id
            ));
            prompt.push_str(&format!("- To count records use `COUNT({})`.\n", id));
        }
        if let Some(date) = &self.rules.date_column {
            prompt.push_str(&format!(
                "### Dates ('{date}' holds text in YYYY-MM-DD format):\n\
                 - A specific day: `WHERE {date} = 'YYYY-MM-DD'`.\n\
                 - A specific month: `WHERE {date} LIKE 'YYYY-MM%'`.\n\
                 - A specific year: `WHERE {date} LIKE 'YYYY%'`.\n\
                 - A range: `WHERE {date} >= 'YYYY-MM-DD' AND {date} <= 'YYYY-MM-DD'`.\n",
                date = date
            ));
        }
        for rule in &self.rules.extra_rules {
            prompt.push_str(&format!("- {}\n", rule));
        }
        prompt.push_str("\nReturn ONLY the SQL query, without explanations or additional text.");
        prompt
    }

    /// Ask the generator for a query and extract it from the completion.
    pub async fn synthesize(
        &self,
        generator: &dyn TextGenerator,
        question: &str,
        columns: &[String],
    ) -> Result<String> {
        let prompt = self.build_prompt(question, columns);
        let completion = generator.complete(&prompt).await?;
        let sql = extract_sql(&completion)?;
        info!("Synthesized SQL: {}", sql);
        Ok(sql)
    }
}

/// Extract the SQL statement from a completion.
///
/// The statement starts at the first line beginning with `SELECT` (any case)
/// or, failing that, at the first inline `select` token (any case) whose text
/// parses as a query. It runs to the first `;` outside single quotes, a code
/// fence or the end of the text. Prose trailing the query is dropped by
/// cutting back at blank lines until the statement parses.
pub fn extract_sql(completion: &str) -> Result<String> {
    let line_start = LINE_START_SELECT
        .captures(completion)
        .and_then(|c| c.get(1))
        .map(|m| m.start());
    if let Some(start) = line_start {
        let candidates = statement_candidates(&completion[start..]);
        let parsed = candidates.iter().find(|sql| ensure_read_only(sql).is_ok());
        if let Some(sql) = parsed.or(candidates.first()) {
            debug!("Extracted SQL from completion: {}", sql);
            return Ok(sql.clone());
        }
    }

    // Inline matches may sit inside prose; only a parseable statement counts.
    for m in ANY_SELECT.find_iter(completion) {
        let parsed = statement_candidates(&completion[m.start()..])
            .into_iter()
            .find(|sql| ensure_read_only(sql).is_ok());
        if let Some(sql) = parsed {
            debug!("Extracted inline SQL from completion: {}", sql);
            return Ok(sql);
        }
    }

    Err(NlqError::Synthesis(format!(
        "no SELECT statement in completion: {:?}",
        completion
    )))
}

/// Statements starting at the head of `body`, longest first: up to the fence
/// or terminator, then shortened at each blank line.
fn statement_candidates(body: &str) -> Vec<String> {
    let mut end = body.len();
    if let Some(idx) = body.find("```") {
        end = end.min(idx);
    }
    if let Some(idx) = statement_terminator(body) {
        end = end.min(idx);
    }
    let body = &body[..end];

    let mut cuts: Vec<usize> = BLANK_LINE.find_iter(body).map(|m| m.start()).collect();
    cuts.reverse();
    std::iter::once(body.len())
        .chain(cuts)
        .map(|cut| body[..cut].trim().trim_end_matches('`').trim().to_string())
        .filter(|sql| sql.len() > "select".len())
        .collect()
}

/// Byte offset of the first `;` not inside a single-quoted literal.
fn statement_terminator(sql: &str) -> Option<usize> {
    let mut in_quote = false;
    for (idx, c) in sql.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return Some(idx),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_unwraps_code_fence() {
        let completion = "```sql\nSELECT comentarioDesc FROM data WHERE N_DESCARGA = '8621';\n```";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "SELECT comentarioDesc FROM data WHERE N_DESCARGA = '8621'"
        );
    }

    #[test]
    fn test_skips_leading_prose() {
        let completion = "Sure! I'd be happy to help. Here is the query:\n\nselect fecha\nfrom data\nwhere N_DESCARGA = '8621'\n\nThis returns the date.";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "select fecha\nfrom data\nwhere N_DESCARGA = '8621'"
        );
    }

    #[test]
    fn test_inline_upper_case_select() {
        let completion = "The query is: SELECT hora FROM data WHERE fecha = '2004-05-11'; it returns hours.";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "SELECT hora FROM data WHERE fecha = '2004-05-11'"
        );
    }

    #[test]
    fn test_semicolon_inside_literal_is_kept() {
        let completion = "SELECT fecha FROM data WHERE comentarioDesc = 'a;b';";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "SELECT fecha FROM data WHERE comentarioDesc = 'a;b'"
        );
    }

    #[test]
    fn test_blank_line_inside_fenced_query_is_kept() {
        let completion = "```sql\nSELECT fecha\n\nFROM data\nWHERE N_DESCARGA = '8621'\n```";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "SELECT fecha\n\nFROM data\nWHERE N_DESCARGA = '8621'"
        );
    }

    #[test]
    fn test_inline_lower_case_select() {
        let completion = "Here is the query: select fecha from data where N_DESCARGA = '8621'";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "select fecha from data where N_DESCARGA = '8621'"
        );
    }

    #[test]
    fn test_inline_select_in_prose_is_skipped() {
        let completion = "You could select a column first. SELECT fecha FROM data WHERE N_DESCARGA = '8621'";
        assert_eq!(
            extract_sql(completion).unwrap(),
            "SELECT fecha FROM data WHERE N_DESCARGA = '8621'"
        );
    }

    #[test]
    fn test_fails_closed_without_select() {
        assert!(matches!(
            extract_sql("I cannot answer that, please select a different question."),
            Err(NlqError::Synthesis(_))
        ));
        assert!(matches!(extract_sql("SELECT;"), Err(NlqError::Synthesis(_))));
    }

    #[test]
    fn test_prompt_contains_rules_and_columns() {
        let synthesizer = QuerySynthesizer::new(
            "data",
            PromptRules {
                id_column: Some("N_DESCARGA".to_string()),
                date_column: Some("fecha".to_string()),
                extra_rules: vec!["If the user mentions a configuration, filter on `configuracion`.".to_string()],
            },
        );
        let prompt = synthesizer.build_prompt(
            "¿cuántas descargas hubo en 2004?",
            &["N_DESCARGA".to_string(), "fecha".to_string()],
        );
        assert!(prompt.contains("The table is named 'data'."));
        assert!(prompt.contains("'¿cuántas descargas hubo en 2004?'"));
        assert!(prompt.contains("Available columns: N_DESCARGA, fecha."));
        assert!(prompt.contains("`N_DESCARGA = '<number>'`"));
        assert!(prompt.contains("`WHERE fecha LIKE 'YYYY%'`"));
        assert!(prompt.contains("filter on `configuracion`"));
    }

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_synthesize() {
        let synthesizer = QuerySynthesizer::new("data", PromptRules::default());
        let sql = synthesizer
            .synthesize(&Canned("```\nSELECT fecha FROM data\n```"), "fecha?", &["fecha".to_string()])
            .await
            .unwrap();
        assert_eq!(sql, "SELECT fecha FROM data");
    }
}
