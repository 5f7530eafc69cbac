use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::db::{CatalogColumn, RelationalDriver, TableName};
use crate::error::{LoadError, SchemaResolutionError};

/// A destination column that will receive values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// Trimmed name as stored in the catalog
    pub name: String,
    /// Name ready to splice into SQL, double-quoted if it contains whitespace
    pub identifier: String,
    /// Catalog data type, when reported
    pub data_type: Option<String>,
}

/// Quote an identifier iff it contains whitespace
pub fn quote_identifier(name: &str) -> String {
    if name.chars().any(char::is_whitespace) {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// Drop excluded columns and quote the rest, keeping catalog order
pub fn resolve_columns(
    catalog: Vec<CatalogColumn>,
    excluded: &BTreeSet<String>,
) -> Vec<ResolvedColumn> {
    catalog
        .into_iter()
        .filter_map(|column| {
            let name = column.name.trim();
            if excluded.contains(name) {
                return None;
            }
            Some(ResolvedColumn {
                identifier: quote_identifier(name),
                name: name.to_string(),
                data_type: column.data_type,
            })
        })
        .collect()
}

/// Fetch the destination's columns and reduce them to the load-eligible list.
///
/// Never returns an empty list.
pub async fn resolve(
    driver: &dyn RelationalDriver,
    table: &TableName,
    excluded: &BTreeSet<String>,
) -> Result<Vec<ResolvedColumn>, LoadError> {
    let (sql, binds) = driver.dialect().columns_query(table);
    debug!(sql, ?binds, "querying destination columns");

    let catalog = driver
        .fetch_catalog_columns(&sql, &binds)
        .await
        .map_err(|e| {
            LoadError::from_driver(e, |source| {
                SchemaResolutionError::Query {
                    table: table.to_string(),
                    source,
                }
                .into()
            })
        })?;

    if catalog.is_empty() {
        return Err(SchemaResolutionError::NoColumns(table.to_string()).into());
    }

    for name in excluded {
        if !catalog.iter().any(|c| c.name.trim() == name) {
            warn!(%table, column = %name, "optional column is not a column of the table; ignoring");
        }
    }

    let columns = resolve_columns(catalog, excluded);
    if columns.is_empty() {
        return Err(SchemaResolutionError::AllColumnsExcluded(table.to_string()).into());
    }

    Ok(columns)
}
