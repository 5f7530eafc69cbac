use crate::error::SourceError;
use crate::formats::reader::{SourceTable, infer_rows};

/// Parse delimited text whose first record is the header.
///
/// Every record must have as many fields as the header.
pub fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<SourceTable, SourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);

    let columns: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|s| s.to_string())
        .collect();

    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(SourceError::MissingHeader);
    }

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        records.push(record.iter().map(|s| s.to_string()).collect());
    }

    let rows = infer_rows(columns.len(), records);

    Ok(SourceTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::SourceValue;

    #[test]
    fn test_semicolon_file() {
        let data = b"AC_CODE;ORG_CODE;VALID_FROM;AMOUNT\n\
                     AC1;ORG1;01/10/2006;10.5\n\
                     AC2;;31/12/2999;\n";

        let table = parse_delimited(data, b';').unwrap();

        assert_eq!(
            table.columns,
            vec!["AC_CODE", "ORG_CODE", "VALID_FROM", "AMOUNT"]
        );
        assert_eq!(table.width(), 4);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].values[0], SourceValue::Text("AC1".to_string()));
        assert_eq!(table.rows[0].values[3], SourceValue::Float(10.5));
        assert!(matches!(table.rows[1].values[1], SourceValue::Float(f) if f.is_nan()));
        assert!(matches!(table.rows[1].values[3], SourceValue::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_commas_are_not_separators() {
        let data = b"NAME;DESCRIPTION\nA;one, two\n";
        let table = parse_delimited(data, b';').unwrap();
        assert_eq!(
            table.rows[0].values[1],
            SourceValue::Text("one, two".to_string())
        );
    }

    #[test]
    fn test_header_only() {
        let table = parse_delimited(b"A;B;C\n", b';').unwrap();
        assert_eq!(table.width(), 3);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_empty_input_has_no_header() {
        let result = parse_delimited(b"", b';');
        assert!(matches!(result, Err(SourceError::MissingHeader)));
    }

    #[test]
    fn test_ragged_record_is_rejected() {
        let result = parse_delimited(b"A;B\n1;2;3\n", b';');
        assert!(matches!(result, Err(SourceError::Delimited(_))));
    }
}
