use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;

use crate::error::SourceError;
use crate::formats::reader::{SourceRow, SourceTable, SourceValue, is_missing_token};

/// Parse the first worksheet of an `.xlsx` workbook; its first row is the header.
///
/// Cells keep the type the workbook stores. Dates become
/// `YYYY-MM-DD HH:MM:SS` text and booleans 1/0. Empty and error cells, and
/// text cells holding a missing-value token, become the missing-value marker.
pub fn parse_spreadsheet(bytes: &[u8]) -> Result<SourceTable, SourceError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SourceError::EmptyWorkbook)??;

    let mut rows = range.rows();

    let columns: Vec<String> = rows
        .next()
        .ok_or(SourceError::MissingHeader)?
        .iter()
        .map(|cell| cell.to_string())
        .collect();

    let width = columns.len();
    let rows = rows
        .map(|cells| {
            let mut values: Vec<SourceValue> = cells.iter().map(cell_value).collect();
            values.resize(width, SourceValue::missing());
            SourceRow::new(values)
        })
        .collect();

    Ok(SourceTable { columns, rows })
}

fn cell_value(cell: &Data) -> SourceValue {
    match cell {
        Data::Int(i) => SourceValue::Int(*i),
        Data::Float(f) => SourceValue::Float(*f),
        Data::String(s) if is_missing_token(s) => SourceValue::missing(),
        Data::String(s) => SourceValue::Text(s.clone()),
        Data::Bool(b) => SourceValue::Int(i64::from(*b)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => SourceValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => SourceValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => SourceValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => SourceValue::missing(),
    }
}
