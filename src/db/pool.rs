//! Pooled sqlx driver: bb8 over `sqlx::PgConnection`, with password or DSQL IAM auth.
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, default_provider::credentials::default_provider};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_dsql::auth_token::{AuthTokenGenerator, Config};
use aws_types::SdkConfig;
use derive_builder::Builder;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgSslMode};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection};

use super::column_type::{TypeCategory, normalize_type};
use super::{CatalogColumn, Dialect, DriverError, RelationalDriver};
use crate::config::{
    CONNECT_TIMEOUT, DEFAULT_DATABASE, DEFAULT_PORT, DSQL_MAX_ROWS_PER_TRANSACTION,
    MAX_POOL_SIZE, PING_TIMEOUT, TOKEN_VALIDITY_DURATION,
};
use crate::engine::{InsertStatement, ValueSlot};
use crate::formats::{SourceRow, SourceValue};

pub type Bb8Connection = bb8::PooledConnection<'static, ConnectionManager>;

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// A session checked out of the pool; returned to it on drop
pub enum PoolConnection {
    Postgres(Bb8Connection),
    #[cfg(test)]
    Sqlite(sqlx::pool::PoolConnection<sqlx::Sqlite>),
}

#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
    /// Rows one transaction may modify, when the server caps it
    row_limit: Option<usize>,
}

/// How sessions authenticate
#[derive(Clone)]
pub enum DbAuth {
    Password(String),
    /// Short-lived Aurora DSQL token signed with the default AWS credentials
    DsqlIam { region: Region },
}

#[derive(Builder)]
pub struct PoolArgs {
    #[builder(setter(into))]
    endpoint: String,
    #[builder(default = "DEFAULT_PORT")]
    port: u16,
    #[builder(setter(into), default = "DEFAULT_DATABASE.to_string()")]
    database: String,
    #[builder(setter(into))]
    username: String,
    auth: DbAuth,
    #[builder(default = "MAX_POOL_SIZE")]
    max_pool_size: u32,
}

pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs {
        endpoint,
        port,
        database,
        username,
        auth,
        max_pool_size,
    } = args;

    let base_options = PgConnectOptions::new()
        .host(&endpoint)
        .port(port)
        .username(&username)
        .database(&database);

    let row_limit =
        matches!(auth, DbAuth::DsqlIam { .. }).then_some(DSQL_MAX_ROWS_PER_TRANSACTION);

    let (connect_options, token_provider) = match auth {
        DbAuth::Password(password) => (
            base_options.password(&password).ssl_mode(PgSslMode::Prefer),
            None,
        ),
        DbAuth::DsqlIam { region } => {
            let provider = DsqlIamDbAuthTokenProvider::new(
                &endpoint,
                region,
                TokenType::from(username.as_ref()),
                SharedCredentialsProvider::new(default_provider().await),
            )
            .await
            .context("Failed to set up IAM authentication for DSQL cluster")?;
            (base_options.ssl_mode(PgSslMode::VerifyFull), Some(provider))
        }
    };

    let conn_manager = ConnectionManager {
        connect_options,
        token_provider,
    };

    // No idle connections are opened up front; the first step pays the connect.
    let bb8_pool = bb8::Builder::new()
        .max_size(max_pool_size)
        .connection_timeout(CONNECT_TIMEOUT)
        .build(conn_manager)
        .await
        .context("Failed to create connection pool")?;

    tracing::info!(endpoint, port, database, "connection pool ready");

    Ok(Pool {
        inner: PoolInner::Postgres(bb8_pool),
        row_limit,
    })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    ///
    /// A single connection keeps the in-memory database alive between steps.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
            row_limit: None,
        })
    }

    /// Cap the rows one `execute_many` transaction may insert
    #[cfg(test)]
    pub fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub async fn acquire(&self) -> Result<PoolConnection, DriverError> {
        match &self.inner {
            PoolInner::Postgres(pool) => Ok(PoolConnection::Postgres(get_postgres(pool).await?)),
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let conn = pool.acquire().await.map_err(DriverError::Connect)?;
                Ok(PoolConnection::Sqlite(conn))
            }
        }
    }
}

async fn get_postgres(pool: &bb8::Pool<ConnectionManager>) -> Result<Bb8Connection, DriverError> {
    pool.get_owned().await.map_err(|e| match e {
        bb8::RunError::User(e) => DriverError::Connect(e),
        bb8::RunError::TimedOut => DriverError::Connect(sqlx::Error::PoolTimedOut),
    })
}

#[async_trait]
impl RelationalDriver for Pool {
    fn dialect(&self) -> Dialect {
        match &self.inner {
            PoolInner::Postgres(_) => Dialect::Postgres,
            #[cfg(test)]
            PoolInner::Sqlite(_) => Dialect::Sqlite,
        }
    }

    fn max_rows_per_transaction(&self) -> Option<usize> {
        self.row_limit
    }

    async fn execute(&self, sql: &str) -> Result<u64, DriverError> {
        let result = match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => sqlx::query(sql)
                .execute(&mut *conn)
                .await
                .map(|r| r.rows_affected()),
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => sqlx::query(sql)
                .execute(&mut *conn)
                .await
                .map(|r| r.rows_affected()),
        };
        result.map_err(DriverError::Query)
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64, DriverError> {
        let result = match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                sqlx::query_scalar::<_, i64>(sql)
                    .fetch_one(&mut *conn)
                    .await
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                sqlx::query_scalar::<_, i64>(sql)
                    .fetch_one(&mut *conn)
                    .await
            }
        };
        result.map_err(DriverError::Query)
    }

    async fn fetch_catalog_columns(
        &self,
        sql: &str,
        binds: &[String],
    ) -> Result<Vec<CatalogColumn>, DriverError> {
        let rows = match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                let mut query = sqlx::query_as::<_, (String, Option<String>)>(sql);
                for value in binds {
                    query = query.bind(value.as_str());
                }
                query.fetch_all(&mut *conn).await
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                let mut query = sqlx::query_as::<_, (String, Option<String>)>(sql);
                for value in binds {
                    query = query.bind(value.as_str());
                }
                query.fetch_all(&mut *conn).await
            }
        }
        .map_err(DriverError::Query)?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| CatalogColumn {
                name,
                data_type: data_type.filter(|t| !t.trim().is_empty()),
            })
            .collect())
    }

    async fn execute_many(
        &self,
        statement: &InsertStatement,
        rows: &[SourceRow],
    ) -> Result<u64, DriverError> {
        let mut inserted = 0u64;

        match &self.inner {
            PoolInner::Postgres(pool) => {
                let converted = convert_rows(statement, rows)?;
                let mut conn = get_postgres(pool).await?;
                // Dropping the transaction without commit rolls every row back.
                let mut tx = conn.begin().await.map_err(DriverError::Query)?;
                for values in converted {
                    let mut query = sqlx::query(&statement.sql);
                    for value in values {
                        query = bind_postgres(query, value);
                    }
                    inserted += query
                        .execute(&mut *tx)
                        .await
                        .map_err(DriverError::Query)?
                        .rows_affected();
                }
                tx.commit().await.map_err(DriverError::Query)?;
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let mut conn = pool.acquire().await.map_err(DriverError::Connect)?;
                let mut tx = conn.begin().await.map_err(DriverError::Query)?;
                for row in rows {
                    let mut query = sqlx::query(&statement.sql);
                    for value in &row.values {
                        query = bind_sqlite(query, value);
                    }
                    inserted += query
                        .execute(&mut *tx)
                        .await
                        .map_err(DriverError::Query)?
                        .rows_affected();
                }
                tx.commit().await.map_err(DriverError::Query)?;
            }
        }

        Ok(inserted)
    }
}

/// A row value converted for the destination column, owned so every row can
/// be checked before the transaction opens.
#[derive(Debug, Clone, PartialEq)]
enum PgValue {
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Integer(Option<i32>),
    BigInt(Option<i64>),
    Real(Option<f32>),
    Double(Option<f64>),
    Uuid(Option<uuid::Uuid>),
    Timestamp(Option<chrono::NaiveDateTime>),
    Text(Option<String>),
}

/// Convert one value according to its slot and the destination column type.
///
/// Date-parse slots always receive text. Types in the string-cast category
/// are sent as text and converted by the `CAST` the statement carries. NULLs
/// are typed after the column so the server does not reject a `text` NULL.
fn to_pg_value(
    value: &SourceValue,
    slot: Option<&ValueSlot>,
    column_type: Option<&str>,
) -> Result<PgValue, String> {
    if matches!(slot, Some(ValueSlot::DateParse { .. })) {
        return Ok(PgValue::Text(as_text(value)));
    }

    let Some(column_type) = column_type else {
        return Ok(match value {
            SourceValue::Null => PgValue::Text(None),
            SourceValue::Int(i) => PgValue::BigInt(Some(*i)),
            SourceValue::Float(f) => PgValue::Double(Some(*f)),
            SourceValue::Text(s) => PgValue::Text(Some(s.clone())),
        });
    };

    let col_type = normalize_type(column_type);
    match TypeCategory::from_sql_type(&col_type) {
        TypeCategory::NativeNumeric => match col_type.as_str() {
            "BOOLEAN" => as_bool(value).map(PgValue::Bool),
            "SMALLINT" => as_integer(value, &col_type).map(PgValue::SmallInt),
            "INTEGER" => as_integer(value, &col_type).map(PgValue::Integer),
            "BIGINT" => as_integer(value, &col_type).map(PgValue::BigInt),
            "REAL" => as_double(value, &col_type).map(|f| PgValue::Real(f.map(|f| f as f32))),
            _ => as_double(value, &col_type).map(PgValue::Double),
        },
        TypeCategory::NativeParsed if col_type == "UUID" => match value {
            SourceValue::Null => Ok(PgValue::Uuid(None)),
            SourceValue::Text(s) => uuid::Uuid::parse_str(s.trim())
                .map(|u| PgValue::Uuid(Some(u)))
                .map_err(|e| mismatch(value, &col_type, e)),
            _ => Err(mismatch(value, &col_type, "expected a UUID string")),
        },
        TypeCategory::NativeParsed => match value {
            SourceValue::Null => Ok(PgValue::Timestamp(None)),
            SourceValue::Text(s) => parse_timestamp(s.trim())
                .map(|t| PgValue::Timestamp(Some(t)))
                .ok_or_else(|| mismatch(value, &col_type, "expected YYYY-MM-DD[ HH:MM:SS]")),
            _ => Err(mismatch(value, &col_type, "expected a timestamp string")),
        },
        TypeCategory::StringCast | TypeCategory::DirectString => {
            Ok(PgValue::Text(as_text(value)))
        }
    }
}

fn as_text(value: &SourceValue) -> Option<String> {
    match value {
        SourceValue::Null => None,
        SourceValue::Int(i) => Some(i.to_string()),
        SourceValue::Float(f) => Some(f.to_string()),
        SourceValue::Text(s) => Some(s.clone()),
    }
}

fn as_bool(value: &SourceValue) -> Result<Option<bool>, String> {
    match value {
        SourceValue::Null => Ok(None),
        SourceValue::Int(i) => Ok(Some(*i != 0)),
        SourceValue::Float(f) => Ok(Some(*f != 0.0)),
        SourceValue::Text(s) => parse_bool(s.trim())
            .map(Some)
            .ok_or_else(|| mismatch(value, "BOOLEAN", "expected true/false, t/f, yes/no or 1/0")),
    }
}

/// Integers arrive as floats when their column also holds missing values
fn as_integer<T>(value: &SourceValue, type_name: &str) -> Result<Option<T>, String>
where
    T: TryFrom<i64> + std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    let whole = match value {
        SourceValue::Null => return Ok(None),
        SourceValue::Int(i) => *i,
        SourceValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => *f as i64,
        SourceValue::Float(_) => return Err(mismatch(value, type_name, "not a whole number")),
        SourceValue::Text(s) => {
            return s
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| mismatch(value, type_name, e));
        }
    };
    T::try_from(whole)
        .map(Some)
        .map_err(|_| mismatch(value, type_name, "out of range"))
}

fn as_double(value: &SourceValue, type_name: &str) -> Result<Option<f64>, String> {
    match value {
        SourceValue::Null => Ok(None),
        SourceValue::Int(i) => Ok(Some(*i as f64)),
        SourceValue::Float(f) => Ok(Some(*f)),
        SourceValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| mismatch(value, type_name, e)),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn mismatch(value: &SourceValue, type_name: &str, reason: impl std::fmt::Display) -> String {
    format!(
        "Type mismatch: cannot convert {} to {}: {}",
        value, type_name, reason
    )
}

/// Convert every row up front; the first bad value names its row and position.
fn convert_rows(
    statement: &InsertStatement,
    rows: &[SourceRow],
) -> Result<Vec<Vec<PgValue>>, DriverError> {
    rows.iter()
        .enumerate()
        .map(|(row_idx, row)| {
            row.values
                .iter()
                .enumerate()
                .map(|(idx, value)| {
                    to_pg_value(value, statement.slot(idx), statement.column_type(idx)).map_err(
                        |reason| {
                            DriverError::Query(sqlx::Error::Encode(
                                format!("row {}, position {}: {}", row_idx, idx, reason).into(),
                            ))
                        },
                    )
                })
                .collect()
        })
        .collect()
}

fn bind_postgres<'q>(
    query: Query<'q, sqlx::Postgres, PgArguments>,
    value: PgValue,
) -> Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        PgValue::Bool(v) => query.bind(v),
        PgValue::SmallInt(v) => query.bind(v),
        PgValue::Integer(v) => query.bind(v),
        PgValue::BigInt(v) => query.bind(v),
        PgValue::Real(v) => query.bind(v),
        PgValue::Double(v) => query.bind(v),
        PgValue::Uuid(v) => query.bind(v),
        PgValue::Timestamp(v) => query.bind(v),
        PgValue::Text(v) => query.bind(v),
    }
}

#[cfg(test)]
fn bind_sqlite<'q>(
    query: Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q SourceValue,
) -> Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        SourceValue::Null => query.bind(None::<String>),
        SourceValue::Int(i) => query.bind(*i),
        SourceValue::Float(f) => query.bind(*f),
        SourceValue::Text(s) => query.bind(s.as_str()),
    }
}

/// Opens sessions for the bb8 pool, signing a fresh IAM token per session when needed.
pub struct ConnectionManager {
    connect_options: PgConnectOptions,
    token_provider: Option<DsqlIamDbAuthTokenProvider>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("host", &self.connect_options.get_host())
            .field("iam", &self.token_provider.is_some())
            .finish()
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connect_options = match &self.token_provider {
            Some(provider) => {
                let token = provider
                    .generate_token()
                    .await
                    .map_err(|err| sqlx::Error::Configuration(err.into()))?;
                self.connect_options.clone().password(&token)
            }
            None => self.connect_options.clone(),
        };

        tracing::debug!(host = connect_options.get_host(), "opening database session");

        tokio::time::timeout(CONNECT_TIMEOUT, connect_options.connect())
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, conn.ping())
            .await
            // bb8 tries another connection when the ping fails or stalls
            .map_err(|_| sqlx::Error::PoolTimedOut)
            .and_then(|result| result)
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}

pub struct DsqlIamDbAuthTokenProvider {
    sdk_config: SdkConfig,
    signer: AuthTokenGenerator,
    token_type: TokenType,
}

pub enum TokenType {
    Admin,
    Regular,
}

impl From<&str> for TokenType {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().trim_ascii() {
            "admin" => Self::Admin,
            _ => Self::Regular,
        }
    }
}

impl DsqlIamDbAuthTokenProvider {
    pub async fn new(
        hostname: &str,
        region: Region,
        token_type: TokenType,
        credential_provider: SharedCredentialsProvider,
    ) -> Result<Self> {
        Ok(Self {
            sdk_config: aws_config::defaults(BehaviorVersion::latest())
                .credentials_provider(credential_provider)
                .region(region.clone())
                .load()
                .await,
            signer: AuthTokenGenerator::new(
                Config::builder()
                    .expires_in(TOKEN_VALIDITY_DURATION.as_secs())
                    .hostname(hostname)
                    .region(region)
                    .build()
                    .map_err(|err| anyhow!(err))?,
            ),
            token_type,
        })
    }

    async fn generate_token(&self) -> Result<String> {
        match self.token_type {
            TokenType::Admin => {
                self.signer
                    .db_connect_admin_auth_token(&self.sdk_config)
                    .await
            }
            TokenType::Regular => self.signer.db_connect_auth_token(&self.sdk_config).await,
        }
        .map(|token| token.to_string())
        .map_err(|err| anyhow!(err))
    }
}
