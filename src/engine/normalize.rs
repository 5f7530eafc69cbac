use crate::formats::{SourceRow, SourceValue};

/// Replace every NaN float with NULL; every other value is copied as is.
pub fn normalize(rows: &[SourceRow]) -> Vec<SourceRow> {
    rows.iter()
        .map(|row| SourceRow::new(row.values.iter().map(normalize_value).collect()))
        .collect()
}

fn normalize_value(value: &SourceValue) -> SourceValue {
    match value {
        SourceValue::Float(f) if f.is_nan() => SourceValue::Null,
        other => other.clone(),
    }
}
