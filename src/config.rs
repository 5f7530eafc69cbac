//! Configuration constants for the staging loader
//!
//! This module centralizes the tunable parameters used throughout the
//! application. Per-load settings live in `runner::LoadArgs` and
//! `engine::LoadOptions`.

use std::time::Duration;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// Upper bound on establishing a single database session.
///
/// Statements themselves have no timeout: a hung statement blocks the load
/// until the caller gives up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

pub const TOKEN_VALIDITY_DURATION: Duration = Duration::from_secs(900); // 15 minutes

/// Every pipeline step holds at most one connection, and steps never overlap.
pub const MAX_POOL_SIZE: u32 = 2;

pub const DEFAULT_PORT: u16 = 5432;

pub const DEFAULT_DATABASE: &str = "postgres";

/// Aurora DSQL rejects a transaction that modifies more rows than this.
/// A load writes all rows in one transaction, so larger sources are refused
/// before the table is truncated.
pub const DSQL_MAX_ROWS_PER_TRANSACTION: usize = 3000;

// ============================================================================
// Source File Configuration
// ============================================================================

/// Field separator of delimited source files
pub const DELIMITED_SEPARATOR: u8 = b';';

/// Cell text read as a missing value, the same set a dataframe reader uses
/// by default. The empty string is handled separately.
pub const MISSING_VALUE_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Number of normalized rows echoed at debug level before the insert
pub const LOG_PREVIEW_ROWS: usize = 5;
