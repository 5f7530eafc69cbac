//! Database layer - SQL dialects, the driver seam and the pooled sqlx driver

pub mod column_type;
pub mod dialect;
pub mod pool;
pub mod table;

pub use dialect::Dialect;
pub use pool::Pool;
pub use table::TableName;

use async_trait::async_trait;

use crate::engine::InsertStatement;
use crate::formats::SourceRow;

/// Errors reported by a [`RelationalDriver`]
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No session could be established or acquired
    #[error("Error connecting to the database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A session was available but the statement failed
    #[error("Error executing database query: {0}")]
    Query(#[source] sqlx::Error),
}

/// A column as reported by the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: Option<String>,
}

/// The relational database a load writes to.
///
/// Every call acquires its own session and releases it before returning,
/// on success and on error.
#[async_trait]
pub trait RelationalDriver: Send + Sync {
    /// SQL dialect the driver's database speaks
    fn dialect(&self) -> Dialect;

    /// Execute a statement without parameters, returning affected rows
    async fn execute(&self, sql: &str) -> Result<u64, DriverError>;

    /// Execute a query returning a single integer
    async fn query_scalar(&self, sql: &str) -> Result<i64, DriverError>;

    /// Run a catalog query producing `(column_name, data_type)` rows
    async fn fetch_catalog_columns(
        &self,
        sql: &str,
        binds: &[String],
    ) -> Result<Vec<CatalogColumn>, DriverError>;

    /// Most rows one transaction may write, when the database caps it
    fn max_rows_per_transaction(&self) -> Option<usize> {
        None
    }

    /// Execute `statement` once per row inside a single transaction.
    ///
    /// Either every row is committed or none is.
    async fn execute_many(
        &self,
        statement: &InsertStatement,
        rows: &[SourceRow],
    ) -> Result<u64, DriverError>;
}
