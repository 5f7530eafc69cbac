//! High-level runner API for the staging loader.
//!
//! Builds the connection pool, the object store and the [`Loader`] from a
//! flat set of arguments, then runs one load. This is the API the CLI uses.

use anyhow::{Context, Result, anyhow};
use aws_config::{BehaviorVersion, Region};
use std::sync::Arc;
use tracing::info;

use crate::db::TableName;
use crate::db::pool::{self, DbAuth, PoolArgsBuilder};
use crate::engine::{DateColumnMappings, LoadOptions, Loader};
use crate::io::{LocalObjectStore, ObjectStore, S3ObjectStore, SourceUri};

pub use crate::engine::LoadReport;
pub use crate::formats::Format;

/// Arguments for running a load
#[derive(Clone)]
pub struct LoadArgs {
    // Connection configuration
    pub endpoint: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    /// Authenticate with a DSQL IAM token instead of a password.
    /// DSQL caps a transaction at 3000 rows; larger sources are refused
    /// before the table is truncated.
    pub iam: bool,
    pub region: Option<String>,

    // Source configuration
    pub source_uri: String,
    /// Listing prefix for the source object; defaults to the key's directory
    pub source_prefix: Option<String>,
    pub format: Option<Format>,

    // Destination
    pub table: String,
    pub optional_columns: Vec<String>,
    pub date_columns: DateColumnMappings,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<crate::db::Pool>,
}

impl LoadArgs {
    fn auth(&self) -> Result<DbAuth> {
        if self.iam {
            let region = self
                .region
                .clone()
                .ok_or_else(|| anyhow!("A region is required for IAM authentication"))?;
            Ok(DbAuth::DsqlIam {
                region: Region::new(region),
            })
        } else {
            let password = self
                .password
                .clone()
                .ok_or_else(|| anyhow!("A database password is required unless --iam is set"))?;
            Ok(DbAuth::Password(password))
        }
    }

    fn options(&self) -> LoadOptions {
        LoadOptions {
            excluded_columns: self.optional_columns.iter().cloned().collect(),
            date_columns: self.date_columns.clone(),
        }
    }
}

/// Run a load with the specified arguments
///
/// # Example
///
/// ```no_run
/// use staging_loader::runner::{LoadArgs, run_load};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = LoadArgs {
///     endpoint: "xxx.dsql.eu-west-1.on.aws".to_string(),
///     port: 5432,
///     database: "postgres".to_string(),
///     username: "admin".to_string(),
///     password: None,
///     iam: true,
///     region: Some("eu-west-1".to_string()),
///     source_uri: "s3://cdw-bucket/inputstream/cdw/orgcode.csv".to_string(),
///     source_prefix: None,
///     format: None,
///     table: "cdw_stg.tbl_usr_orgcode".to_string(),
///     optional_columns: vec!["PROCESS_NAME".to_string()],
///     date_columns: [(2, "DD/MM/YYYY".to_string())].into_iter().collect(),
/// };
///
/// let report = run_load(args).await?;
/// println!("Loaded {} rows into {}", report.rows_inserted, report.table);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadReport> {
    let table = TableName::parse(&args.table)?;
    let uri = SourceUri::parse(&args.source_uri)?;
    let source_key = uri.key()?;
    let options = args.options();

    let store = object_store(&uri, args.region.as_deref()).await?;

    // Create connection pool (or use test pool if provided)
    #[cfg(test)]
    let pool = match args.test_pool.clone() {
        Some(test_pool) => test_pool,
        None => connect(&args).await?,
    };

    #[cfg(not(test))]
    let pool = connect(&args).await?;

    let mut loader = Loader::new(store, Arc::new(pool));
    if let Some(prefix) = &args.source_prefix {
        loader = loader.with_source_prefix(prefix.clone());
    }
    if let Some(format) = args.format {
        loader = loader.with_format(format);
    }

    let report = loader
        .load_file_to_table(&source_key, &table, &options)
        .await?;
    Ok(report)
}

async fn connect(args: &LoadArgs) -> Result<crate::db::Pool> {
    let pool_args = PoolArgsBuilder::default()
        .endpoint(&args.endpoint)
        .port(args.port)
        .database(&args.database)
        .username(&args.username)
        .auth(args.auth()?)
        .build()?;
    pool::pool(pool_args)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", args.endpoint, args.port))
}

async fn object_store(uri: &SourceUri, region: Option<&str>) -> Result<Arc<dyn ObjectStore>> {
    match uri {
        SourceUri::S3 { bucket, .. } => {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region.to_string()));
            }
            let aws_config = loader.load().await;
            let client = aws_sdk_s3::Client::new(&aws_config);
            info!(bucket, "using S3 object store");
            Ok(Arc::new(S3ObjectStore::new(Arc::new(client), bucket.clone())))
        }
        SourceUri::Local(_) => {
            let root = uri
                .local_root()
                .ok_or_else(|| anyhow!("Not a local path: {:?}", uri))?;
            info!(root = %root.display(), "using local object store");
            Ok(Arc::new(LocalObjectStore::new(root)))
        }
    }
}
