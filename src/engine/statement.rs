//! Insert statement synthesis.
//!
//! The statement is kept as data (column list plus one slot per source-row
//! position) and rendered once. Row values are only ever bound, never spliced.
//!
//! The number of value slots follows the source row width, not the number of
//! resolved columns. When the exclusion set does not exactly make up the
//! difference between file and table, synthesis still succeeds and the
//! database rejects the statement at execution time.

use serde::Serialize;
use std::collections::BTreeMap;

use super::resolver::ResolvedColumn;
use crate::db::{Dialect, TableName};
use crate::error::StatementSynthesisError;

/// Source-row index → date format the database parses that value with
pub type DateColumnMappings = BTreeMap<usize, String>;

/// What the statement does with the value bound at one position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValueSlot {
    Bare,
    DateParse { format: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertStatement {
    pub sql: String,
    /// Parameters bound per row: the source row width
    pub arity: usize,
    pub slots: Vec<ValueSlot>,
    #[serde(skip)]
    pub columns: Vec<ResolvedColumn>,
}

impl InsertStatement {
    pub fn slot(&self, position: usize) -> Option<&ValueSlot> {
        self.slots.get(position)
    }

    /// Catalog type of the column the value at `position` lands in
    pub fn column_type(&self, position: usize) -> Option<&str> {
        self.columns
            .get(position)
            .and_then(|c| c.data_type.as_deref())
    }
}

/// Build `INSERT INTO <table>(<columns>) VALUES (<slots>)`
pub fn synthesize(
    dialect: Dialect,
    table: &TableName,
    columns: &[ResolvedColumn],
    row_width: usize,
    date_columns: &DateColumnMappings,
) -> Result<InsertStatement, StatementSynthesisError> {
    if let Some((&index, _)) = date_columns.range(row_width..).next() {
        return Err(StatementSynthesisError::DateIndexOutOfRange { index, row_width });
    }

    let slots: Vec<ValueSlot> = (0..row_width)
        .map(|idx| match date_columns.get(&idx) {
            Some(format) => ValueSlot::DateParse {
                format: format.clone(),
            },
            None => ValueSlot::Bare,
        })
        .collect();

    let column_list = columns
        .iter()
        .map(|c| c.identifier.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let values_list = slots
        .iter()
        .enumerate()
        .map(|(idx, slot)| match slot {
            ValueSlot::Bare => dialect.value_placeholder(
                idx + 1,
                columns.get(idx).and_then(|c| c.data_type.as_deref()),
            ),
            ValueSlot::DateParse { format } => {
                dialect.date_parse(&dialect.placeholder(idx + 1), format)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO {}({}) VALUES ({})",
        table, column_list, values_list
    );

    Ok(InsertStatement {
        sql,
        arity: row_width,
        slots,
        columns: columns.to_vec(),
    })
}
