use serde::Serialize;
use std::fmt;

use super::delimited::reader::parse_delimited;
use super::spreadsheet::reader::parse_spreadsheet;
use crate::config::{DELIMITED_SEPARATOR, MISSING_VALUE_TOKENS};
use crate::error::SourceError;

/// A single scalar extracted from a source file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SourceValue {
    /// The marker a dataframe reader uses for an empty cell
    pub fn missing() -> Self {
        SourceValue::Float(f64::NAN)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }
}

impl fmt::Display for SourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceValue::Null => f.write_str("NULL"),
            SourceValue::Int(i) => write!(f, "{}", i),
            SourceValue::Float(v) => write!(f, "{:?}", v),
            SourceValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// A single record (row) from the file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRow {
    pub values: Vec<SourceValue>,
}

impl SourceRow {
    pub fn new(values: Vec<SourceValue>) -> Self {
        Self { values }
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Display for SourceRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str(")")
    }
}

/// Header names plus every data row of a parsed file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub columns: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    /// Positional width shared by every row: the number of header columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Format {
    /// `;`-separated text with a header record
    Delimited,
    /// First worksheet of an `.xlsx` workbook
    Spreadsheet,
}

impl Format {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" | "delimited" => Ok(Format::Delimited),
            "xlsx" | "spreadsheet" => Ok(Format::Spreadsheet),
            _ => Err(anyhow::anyhow!(
                "Unsupported format: {}. Supported formats: csv, xlsx",
                s
            )),
        }
    }

    /// Detect the format from an object key's extension
    pub fn from_key(key: &str) -> Option<Self> {
        let lower = key.to_lowercase();

        if lower.ends_with(".csv") {
            Some(Format::Delimited)
        } else if lower.ends_with(".xlsx") {
            Some(Format::Spreadsheet)
        } else {
            None
        }
    }
}

/// Cell text that stands for a missing value
pub fn is_missing_token(value: &str) -> bool {
    value.is_empty() || MISSING_VALUE_TOKENS.contains(&value)
}

/// Parse a source object's bytes into columns and rows
pub fn parse(bytes: &[u8], format: Format) -> Result<SourceTable, SourceError> {
    match format {
        Format::Delimited => parse_delimited(bytes, DELIMITED_SEPARATOR),
        Format::Spreadsheet => parse_spreadsheet(bytes),
    }
}

/// Inferred type of a text column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    /// Narrowest kind accommodating every present value
    fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnKind::Int;

        for value in values.filter(|v| !is_missing_token(v)) {
            if kind == ColumnKind::Int && value.parse::<i64>().is_err() {
                kind = ColumnKind::Float;
            }
            if kind == ColumnKind::Float && value.parse::<f64>().is_err() {
                return ColumnKind::Text;
            }
        }

        kind
    }

    fn convert(&self, value: &str) -> SourceValue {
        if is_missing_token(value) {
            return SourceValue::missing();
        }

        match self {
            ColumnKind::Int => value
                .parse()
                .map(SourceValue::Int)
                .unwrap_or_else(|_| SourceValue::Text(value.to_string())),
            ColumnKind::Float => value
                .parse()
                .map(SourceValue::Float)
                .unwrap_or_else(|_| SourceValue::Text(value.to_string())),
            ColumnKind::Text => SourceValue::Text(value.to_string()),
        }
    }
}

/// Turn raw text records into typed rows, inferring one type per column
pub(crate) fn infer_rows(width: usize, records: Vec<Vec<String>>) -> Vec<SourceRow> {
    let kinds: Vec<ColumnKind> = (0..width)
        .map(|col| {
            ColumnKind::infer(
                records
                    .iter()
                    .filter_map(|record| record.get(col).map(String::as_str)),
            )
        })
        .collect();

    records
        .into_iter()
        .map(|record| {
            SourceRow::new(
                record
                    .iter()
                    .enumerate()
                    .map(|(col, value)| {
                        kinds
                            .get(col)
                            .copied()
                            .unwrap_or(ColumnKind::Text)
                            .convert(value)
                    })
                    .collect(),
            )
        })
        .collect()
}
