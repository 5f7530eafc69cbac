//! Error taxonomy of a load.
//!
//! Every step of the pipeline maps its failure into one variant of
//! [`LoadError`]. Nothing is retried; the first error aborts the load.

use crate::db::DriverError;

/// Errors that can abort a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A database session could not be established or acquired.
    #[error("Error connecting to the database: {0}")]
    Connection(#[source] sqlx::Error),

    /// The source object could not be located, fetched or parsed.
    ///
    /// Raised before the destination table is touched.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The delete-all statement was rejected.
    #[error("Failed to truncate table {table}: {source}")]
    Truncate { table: String, source: sqlx::Error },

    #[error(transparent)]
    SchemaResolution(#[from] SchemaResolutionError),

    #[error(transparent)]
    StatementSynthesis(#[from] StatementSynthesisError),

    /// The batch was rejected; a truncated destination table stays empty.
    #[error(transparent)]
    BulkInsert(#[from] BulkInsertError),

    /// A row count could not be observed. Logged, never returned by a load.
    #[error(transparent)]
    ValidationObservation(#[from] ValidationObservationError),
}

impl LoadError {
    /// Split a driver error into a connection failure or a step-specific failure.
    pub(crate) fn from_driver(
        error: DriverError,
        on_query: impl FnOnce(sqlx::Error) -> LoadError,
    ) -> LoadError {
        match error {
            DriverError::Connect(e) => LoadError::Connection(e),
            DriverError::Query(e) => on_query(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source object '{key}' not found under prefix '{prefix}'")]
    NotFound { key: String, prefix: String },

    #[error("Unsupported source format for '{0}'. Supported extensions: .csv, .xlsx")]
    UnsupportedFormat(String),

    #[error("Failed to fetch source object: {0:#}")]
    Fetch(anyhow::Error),

    #[error("Failed to parse delimited file: {0}")]
    Delimited(#[from] csv::Error),

    #[error("Failed to parse spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("Spreadsheet contains no worksheet")]
    EmptyWorkbook,

    #[error("Source file has no header row")]
    MissingHeader,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaResolutionError {
    #[error("Failed to retrieve the columns of {table}: {source}")]
    Query { table: String, source: sqlx::Error },

    #[error("Table '{0}' not found or has no columns")]
    NoColumns(String),

    #[error("Every column of '{0}' is excluded from the load")]
    AllColumnsExcluded(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StatementSynthesisError {
    #[error("Date column index {index} is out of range for rows of width {row_width}")]
    DateIndexOutOfRange { index: usize, row_width: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum BulkInsertError {
    #[error("Row {row} has {actual} values but the insert statement binds {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Bulk insert into {table} was rejected: {source}")]
    Rejected { table: String, source: sqlx::Error },

    #[error(
        "Source has {rows} rows but the database allows at most {limit} per transaction; \
         the table was left untouched"
    )]
    TransactionLimit { rows: usize, limit: usize },
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to retrieve record count of {table}: {source}")]
pub struct ValidationObservationError {
    pub table: String,
    #[source]
    pub source: DriverError,
}
