//! Dataset loading.
//!
//! Portal exports arrive either as a JSON array of records or as a delimited
//! text file. Every cell is stored as text so the synthesized SQL can compare
//! against quoted literals uniformly; missing values become nulls.

use crate::error::{NlqError, Result};
use indexmap::IndexMap;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Json,
    Csv,
}

impl DatasetFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt") => {
                DatasetFormat::Csv
            }
            _ => DatasetFormat::Json,
        }
    }
}

/// Load a table from disk as an all-text DataFrame.
pub fn load_table(path: &Path, format: DatasetFormat, delimiter: char) -> Result<DataFrame> {
    let df = match format {
        DatasetFormat::Json => {
            let raw = std::fs::read_to_string(path)?;
            frame_from_json(&raw)?
        }
        DatasetFormat::Csv => {
            let bytes = std::fs::read(path)?;
            frame_from_delimited(&bytes, delimiter)?
        }
    };
    info!(
        "Loaded {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Build a frame from a JSON array of flat records. Keys missing from a record
/// are nulls in that row.
pub fn frame_from_json(raw: &str) -> Result<DataFrame> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(raw)
        .map_err(|e| NlqError::Dataset(format!("expected a JSON array of records: {}", e)))?;

    let mut columns: IndexMap<String, Vec<Option<String>>> = IndexMap::new();
    for (row_idx, record) in records.iter().enumerate() {
        for (key, value) in record {
            let column = columns
                .entry(key.clone())
                .or_insert_with(|| vec![None; row_idx]);
            column.push(json_cell(value));
        }
        // pad columns this record did not mention
        for column in columns.values_mut() {
            if column.len() == row_idx {
                column.push(None);
            }
        }
    }

    build_frame(columns)
}

/// Build a frame from delimited text with a header row. Fields that are not
/// valid UTF-8 are decoded as Latin-1.
pub fn frame_from_delimited(bytes: &[u8], delimiter: char) -> Result<DataFrame> {
    if !delimiter.is_ascii() {
        return Err(NlqError::Dataset(format!("delimiter must be ASCII, got {:?}", delimiter)));
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| NlqError::Dataset(format!("failed to read header: {}", e)))?
        .iter()
        .map(|h| decode_field(h).trim().to_string())
        .collect();

    let mut columns: IndexMap<String, Vec<Option<String>>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();

    for record in reader.byte_records() {
        let record = record.map_err(|e| NlqError::Dataset(format!("malformed row: {}", e)))?;
        for (idx, header) in headers.iter().enumerate() {
            let cell = record.get(idx).map(decode_field).and_then(|s| text_cell(&s));
            if let Some(column) = columns.get_mut(header) {
                column.push(cell);
            }
        }
    }

    build_frame(columns)
}

fn build_frame(columns: IndexMap<String, Vec<Option<String>>>) -> Result<DataFrame> {
    let series: Vec<Series> = columns
        .into_iter()
        .map(|(name, values)| Series::new(&name, values))
        .collect();
    Ok(DataFrame::new(series)?)
}

fn json_cell(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => text_cell(s),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_nan() => None,
            _ => Some(n.to_string()),
        },
        serde_json::Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Text that means "no value" in the portal exports becomes null.
fn text_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed {
        "" | "nan" | "NaN" | "None" | "null" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
