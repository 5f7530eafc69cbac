use std::sync::Arc;
use tracing::{info, instrument};

use super::orchestrator::{LoadOptions, LoadReport, Orchestrator};
use crate::db::{RelationalDriver, TableName};
use crate::error::{LoadError, SourceError};
use crate::formats::{self, Format};
use crate::io::{ObjectStore, default_prefix, fetch_source_object};

/// Loads source objects from a store into staging tables
pub struct Loader {
    store: Arc<dyn ObjectStore>,
    driver: Arc<dyn RelationalDriver>,
    /// Listing prefix; defaults to the "directory" of each requested key
    source_prefix: Option<String>,
    /// Overrides detection from the key's extension
    format: Option<Format>,
}

impl Loader {
    pub fn new(store: Arc<dyn ObjectStore>, driver: Arc<dyn RelationalDriver>) -> Self {
        Self {
            store,
            driver,
            source_prefix: None,
            format: None,
        }
    }

    pub fn with_source_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.source_prefix = Some(prefix.into());
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Replace the contents of `table` with the rows of the object at `source_key`.
    ///
    /// The format comes from the override, else the key's extension in any
    /// case. The source is fetched and parsed before the table is touched, so
    /// a missing or malformed file leaves the table as it was.
    #[instrument(skip(self, table, options), fields(%table))]
    pub async fn load_file_to_table(
        &self,
        source_key: &str,
        table: &TableName,
        options: &LoadOptions,
    ) -> Result<LoadReport, LoadError> {
        let prefix = self
            .source_prefix
            .as_deref()
            .unwrap_or_else(|| default_prefix(source_key));

        let format = self
            .format
            .or_else(|| Format::from_key(source_key))
            .ok_or_else(|| SourceError::UnsupportedFormat(source_key.to_string()))?;

        let bytes = fetch_source_object(self.store.as_ref(), prefix, source_key).await?;

        let source = formats::parse(&bytes, format)?;
        info!(
            ?format,
            columns = source.width(),
            rows = source.rows.len(),
            "parsed source file"
        );

        Orchestrator::new(self.driver.clone())
            .run(table, source, options)
            .await
    }
}
