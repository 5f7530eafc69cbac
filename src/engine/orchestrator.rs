use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::normalize::normalize;
use super::resolver::resolve;
use super::statement::{DateColumnMappings, InsertStatement, synthesize};
use crate::config::LOG_PREVIEW_ROWS;
use crate::db::{RelationalDriver, TableName};
use crate::error::{BulkInsertError, LoadError, ValidationObservationError};
use crate::formats::{SourceRow, SourceTable};

/// Per-load column reconciliation settings
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Destination columns that never receive a value
    pub excluded_columns: BTreeSet<String>,
    pub date_columns: DateColumnMappings,
}

/// Step a load has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    Start,
    Truncated,
    CountedBefore,
    ColumnsResolved,
    RowsNormalized,
    StatementBuilt,
    Inserted,
    CountedAfter,
    Done,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Start => "start",
            LoadState::Truncated => "truncated",
            LoadState::CountedBefore => "counted_before",
            LoadState::ColumnsResolved => "columns_resolved",
            LoadState::RowsNormalized => "rows_normalized",
            LoadState::StatementBuilt => "statement_built",
            LoadState::Inserted => "inserted",
            LoadState::CountedAfter => "counted_after",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a completed load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub load_id: Uuid,
    pub table: TableName,
    /// Destination columns that received values, in insert order
    pub columns: Vec<String>,
    pub statement: String,
    pub rows_inserted: u64,
    /// Absent when the count could not be observed
    pub count_before: Option<i64>,
    pub count_after: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Runs the replace-all load of one row set into one table.
///
/// Steps run strictly in order and the first failure aborts the load. The
/// truncate is not part of the insert transaction: a load that fails after
/// it leaves the table empty.
pub struct Orchestrator {
    driver: Arc<dyn RelationalDriver>,
}

impl Orchestrator {
    pub fn new(driver: Arc<dyn RelationalDriver>) -> Self {
        Self { driver }
    }

    pub async fn run(
        &self,
        table: &TableName,
        source: SourceTable,
        options: &LoadOptions,
    ) -> Result<LoadReport, LoadError> {
        let mut state = LoadState::Start;

        match self.run_steps(table, source, options, &mut state).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(%table, reached = %state, error = %e, "load failed");
                if state >= LoadState::Truncated {
                    warn!(%table, "truncated table is not restored; it stays empty until the next successful load");
                }
                advance(&mut state, LoadState::Failed);
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        table: &TableName,
        source: SourceTable,
        options: &LoadOptions,
        state: &mut LoadState,
    ) -> Result<LoadReport, LoadError> {
        let load_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!(%load_id, %table, rows = source.rows.len(), "starting load");

        // All rows go into one transaction; a source the database would refuse
        // must not empty the table first.
        check_transaction_limit(self.driver.max_rows_per_transaction(), source.rows.len())?;

        self.truncate(table).await?;
        advance(state, LoadState::Truncated);

        let count_before = self.observe_count(table).await;
        advance(state, LoadState::CountedBefore);

        let columns = resolve(self.driver.as_ref(), table, &options.excluded_columns).await?;
        advance(state, LoadState::ColumnsResolved);

        let rows = normalize(&source.rows);
        advance(state, LoadState::RowsNormalized);

        let statement = synthesize(
            self.driver.dialect(),
            table,
            &columns,
            source.width(),
            &options.date_columns,
        )?;
        info!(sql = %statement.sql, "insert statement built");
        advance(state, LoadState::StatementBuilt);

        let rows_inserted = self.insert(table, &statement, &rows).await?;
        advance(state, LoadState::Inserted);

        let count_after = self.observe_count(table).await;
        advance(state, LoadState::CountedAfter);

        if let (Some(before), Some(after)) = (count_before, count_after)
            && after != before + rows_inserted as i64
        {
            warn!(
                %table,
                before,
                after,
                rows_inserted,
                "row count after load does not match rows inserted"
            );
        }

        let report = LoadReport {
            load_id,
            table: table.clone(),
            columns: columns.into_iter().map(|c| c.name).collect(),
            statement: statement.sql,
            rows_inserted,
            count_before,
            count_after,
            started_at,
            completed_at: Utc::now(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        advance(state, LoadState::Done);

        info!(
            %load_id,
            %table,
            rows_inserted,
            duration_ms = report.duration_ms,
            "load complete"
        );
        Ok(report)
    }

    async fn truncate(&self, table: &TableName) -> Result<(), LoadError> {
        let sql = self.driver.dialect().truncate_sql(table);
        self.driver.execute(&sql).await.map_err(|e| {
            LoadError::from_driver(e, |source| LoadError::Truncate {
                table: table.to_string(),
                source,
            })
        })?;
        info!(%table, "table truncated");
        Ok(())
    }

    /// Row count for logging; a failure is logged and reported as `None`
    async fn observe_count(&self, table: &TableName) -> Option<i64> {
        let sql = self.driver.dialect().count_sql(table);
        match self.driver.query_scalar(&sql).await {
            Ok(count) => {
                info!(%table, count, "record count");
                Some(count)
            }
            Err(source) => {
                let err = ValidationObservationError {
                    table: table.to_string(),
                    source,
                };
                warn!(error = %err, "continuing without record count");
                None
            }
        }
    }

    async fn insert(
        &self,
        table: &TableName,
        statement: &InsertStatement,
        rows: &[SourceRow],
    ) -> Result<u64, LoadError> {
        check_row_widths(statement, rows)?;

        if rows.is_empty() {
            info!(%table, "source has no rows; nothing to insert");
            return Ok(0);
        }

        for row in rows.iter().take(LOG_PREVIEW_ROWS) {
            debug!(%row, "row preview");
        }

        let inserted = self
            .driver
            .execute_many(statement, rows)
            .await
            .map_err(|e| {
                LoadError::from_driver(e, |source| {
                    BulkInsertError::Rejected {
                        table: table.to_string(),
                        source,
                    }
                    .into()
                })
            })?;
        info!(%table, rows = inserted, "rows inserted");
        Ok(inserted)
    }
}

fn advance(state: &mut LoadState, next: LoadState) {
    debug!(from = %state, to = %next, "load state");
    *state = next;
}

fn check_transaction_limit(limit: Option<usize>, rows: usize) -> Result<(), BulkInsertError> {
    match limit {
        Some(limit) if rows > limit => Err(BulkInsertError::TransactionLimit { rows, limit }),
        _ => Ok(()),
    }
}

/// Every row must bind exactly as many values as the statement has slots
fn check_row_widths(statement: &InsertStatement, rows: &[SourceRow]) -> Result<(), BulkInsertError> {
    match rows
        .iter()
        .position(|row| row.width() != statement.arity)
    {
        Some(idx) => Err(BulkInsertError::RowWidth {
            row: idx,
            expected: statement.arity,
            actual: rows[idx].width(),
        }),
        None => Ok(()),
    }
}
