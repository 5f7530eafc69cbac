//! How a destination column's catalog type decides value binding.

/// Type category for SQL type conversion strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Bound as the matching Rust numeric or bool type
    NativeNumeric,
    /// Parsed to a native Rust type before binding (UUID, TIMESTAMP)
    NativeParsed,
    /// Bound as text and converted by a `CAST` around the placeholder
    StringCast,
    /// Text types with direct string binding
    DirectString,
}

impl TypeCategory {
    /// Classify a catalog type name, in any case
    pub fn from_sql_type(col_type: &str) -> Self {
        match normalize_type(col_type).as_str() {
            "BOOLEAN" | "SMALLINT" | "INTEGER" | "BIGINT" | "REAL" | "DOUBLE PRECISION" => {
                TypeCategory::NativeNumeric
            }
            "UUID" | "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => TypeCategory::NativeParsed,
            // NUMERIC goes through text so no digits are lost to f64
            "NUMERIC"
            | "TIMESTAMP WITH TIME ZONE"
            | "DATE"
            | "TIME"
            | "TIME WITHOUT TIME ZONE"
            | "TIME WITH TIME ZONE"
            | "INTERVAL"
            | "BYTEA" => TypeCategory::StringCast,
            _ => TypeCategory::DirectString,
        }
    }
}

/// Upper-cased catalog type with surrounding whitespace removed
pub fn normalize_type(col_type: &str) -> String {
    col_type.trim().to_ascii_uppercase()
}
