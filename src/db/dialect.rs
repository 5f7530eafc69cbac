//! SQL dialects the loader can render statements for.
//!
//! A dialect owns every piece of database-specific text: placeholder syntax,
//! the catalog query, the delete-all statement and the date-parse wrapper.

use serde::Serialize;

use super::TableName;
use super::column_type::TypeCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dialect {
    /// `:1` placeholders, `sys.all_tab_columns` catalog
    Oracle,
    /// `$1` placeholders, `information_schema.columns` catalog
    Postgres,
    /// `?1` placeholders, `pragma_table_info` catalog
    #[cfg(test)]
    Sqlite,
}

impl Dialect {
    /// Positional placeholder for the 1-based parameter `position`
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Oracle => format!(":{}", position),
            Dialect::Postgres => format!("${}", position),
            #[cfg(test)]
            Dialect::Sqlite => format!("?{}", position),
        }
    }

    /// Placeholder for a value bound as-is into a column of `column_type`.
    ///
    /// Postgres receives text for types it will not assign from a text
    /// parameter, so those placeholders are cast to the column type.
    pub fn value_placeholder(&self, position: usize, column_type: Option<&str>) -> String {
        let placeholder = self.placeholder(position);
        match (self, column_type) {
            (Dialect::Postgres, Some(col_type))
                if TypeCategory::from_sql_type(col_type) == TypeCategory::StringCast =>
            {
                format!("CAST({} AS {})", placeholder, col_type.trim())
            }
            _ => placeholder,
        }
    }

    /// Wrap a placeholder so the database parses its text with `format`
    pub fn date_parse(&self, placeholder: &str, format: &str) -> String {
        format!("TO_DATE({},'{}')", placeholder, format.replace('\'', "''"))
    }

    pub fn truncate_sql(&self, table: &TableName) -> String {
        match self {
            Dialect::Oracle | Dialect::Postgres => format!("TRUNCATE TABLE {}", table),
            #[cfg(test)]
            Dialect::Sqlite => format!("DELETE FROM {}", table),
        }
    }

    pub fn count_sql(&self, table: &TableName) -> String {
        format!("SELECT COUNT(*) AS ct_recs FROM {}", table)
    }

    /// Catalog query returning `(column_name, data_type)` in ordinal order,
    /// together with the values to bind to it.
    pub fn columns_query(&self, table: &TableName) -> (String, Vec<String>) {
        match (self, &table.schema) {
            (Dialect::Oracle, Some(schema)) => (
                "SELECT column_name, data_type FROM sys.all_tab_columns \
                 WHERE owner = UPPER(:1) AND table_name = UPPER(:2) ORDER BY column_id"
                    .to_string(),
                vec![schema.clone(), table.name.clone()],
            ),
            (Dialect::Oracle, None) => (
                "SELECT column_name, data_type FROM sys.all_tab_columns \
                 WHERE owner = USER AND table_name = UPPER(:1) ORDER BY column_id"
                    .to_string(),
                vec![table.name.clone()],
            ),
            (Dialect::Postgres, Some(schema)) => (
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = lower($1) AND table_name = lower($2) \
                 ORDER BY ordinal_position"
                    .to_string(),
                vec![schema.clone(), table.name.clone()],
            ),
            (Dialect::Postgres, None) => (
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = lower($1) \
                 ORDER BY ordinal_position"
                    .to_string(),
                vec![table.name.clone()],
            ),
            #[cfg(test)]
            (Dialect::Sqlite, schema) => (
                "SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid".to_string(),
                vec![
                    table.name.clone(),
                    schema.clone().unwrap_or_else(|| "main".to_string()),
                ],
            ),
        }
    }
}
