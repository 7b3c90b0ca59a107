//! SQL Engine Module
//!
//! Executes synthesized queries against the in-memory dataset through the
//! Polars SQL context. Queries are checked with `sqlparser` first so only a
//! single read-only SELECT ever reaches the engine.

use crate::error::{NlqError, Result};
use indexmap::IndexMap;
use polars::prelude::*;
use polars::sql::SQLContext;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::time::Instant;
use tracing::{info, warn};

/// One result row: column name -> value, nulls omitted.
pub type Row = IndexMap<String, serde_json::Value>;

/// SQL engine over one read-only table
pub struct SqlEngine {
    table_name: String,
    frame: DataFrame,
    max_rows: usize,
}

impl SqlEngine {
    pub fn new(table_name: impl Into<String>, frame: DataFrame, max_rows: usize) -> Self {
        Self {
            table_name: table_name.into(),
            frame,
            max_rows,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Execute a query. Zero rows is `NotFound`, engine failures are
    /// `Execution` errors carrying the engine's message.
    pub fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        let start_time = Instant::now();
        let sql = sql.trim().trim_end_matches(';').trim();
        info!("🔍 Executing SQL: {}", sql);

        ensure_read_only(sql)?;

        let mut ctx = SQLContext::new();
        ctx.register(&self.table_name, self.frame.clone().lazy());
        let result = ctx
            .execute(sql)
            .and_then(|lf| lf.collect())
            .map_err(|e| NlqError::Execution(e.to_string()))?;

        if result.height() == 0 {
            info!("Query returned no rows");
            return Err(NlqError::NotFound);
        }
        if result.height() > self.max_rows {
            warn!(
                "Query returned {} rows, truncating to {}",
                result.height(),
                self.max_rows
            );
        }

        let rows = dataframe_to_rows(&result, self.max_rows)?;
        info!(
            "✅ Query completed in {}ms, returned {} rows",
            start_time.elapsed().as_millis(),
            rows.len()
        );
        Ok(rows)
    }
}

/// Reject anything that is not exactly one query statement.
pub(crate) fn ensure_read_only(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| NlqError::Execution(format!("SQL parse error: {}", e)))?;
    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(NlqError::Execution("empty SQL statement".to_string())),
        [_] => Err(NlqError::Execution("only SELECT queries are allowed".to_string())),
        _ => Err(NlqError::Execution("only a single statement is allowed".to_string())),
    }
}

/// Convert a DataFrame to JSON rows, dropping null cells
fn dataframe_to_rows(df: &DataFrame, max_rows: usize) -> Result<Vec<Row>> {
    let df_limited = df.head(Some(max_rows));
    let columns = df_limited.get_columns();
    let mut rows = Vec::with_capacity(df_limited.height());

    for row_idx in 0..df_limited.height() {
        let mut row = Row::new();
        for series in columns {
            let value = series.get(row_idx)?;
            if let Some(json) = any_value_to_json(&value) {
                row.insert(series.name().to_string(), json);
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn any_value_to_json(value: &AnyValue) -> Option<serde_json::Value> {
    use serde_json::Value;
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(Value::String(s.to_string())),
        AnyValue::StringOwned(s) => Some(Value::String(s.to_string())),
        AnyValue::Boolean(b) => Some(Value::Bool(*b)),
        AnyValue::Int8(_) | AnyValue::Int16(_) | AnyValue::Int32(_) | AnyValue::Int64(_) => {
            value.extract::<i64>().map(Value::from)
        }
        AnyValue::UInt8(_) | AnyValue::UInt16(_) | AnyValue::UInt32(_) | AnyValue::UInt64(_) => {
            value.extract::<u64>().map(Value::from)
        }
        AnyValue::Float32(_) | AnyValue::Float64(_) => value
            .extract::<f64>()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        other => Some(Value::String(other.to_string())),
    }
}
