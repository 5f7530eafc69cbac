use clap::{Parser, Subcommand};
use staging_loader::runner::{Format, LoadArgs, LoadReport, run_load};

#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Replace the contents of a staging table with the rows of one source file
    Load {
        /// Database endpoint (a DSQL endpoint also yields the region)
        #[arg(short, long)]
        endpoint: String,

        /// Database port
        #[arg(long, default_value = "5432")]
        port: u16,

        /// Database name
        #[arg(long, default_value = "postgres")]
        database: String,

        /// Database username
        #[arg(short, long, default_value = "admin")]
        username: String,

        /// Database password
        #[arg(long, env = "STAGING_LOADER_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Authenticate with an Aurora DSQL IAM token instead of a password.
        /// DSQL allows 3000 rows per transaction, so larger files are refused
        /// before the table is touched.
        #[arg(long)]
        iam: bool,

        /// AWS region (optional, inferred from a DSQL endpoint if not specified)
        #[arg(short, long)]
        region: Option<String>,

        /// Source file: local path or S3 URI (s3://bucket/key)
        #[arg(short, long)]
        source_uri: String,

        /// Prefix to search for the source object (default: the key's directory)
        #[arg(long)]
        source_prefix: Option<String>,

        /// Destination table, optionally schema-qualified (schema.table)
        #[arg(short, long)]
        table: String,

        /// File format (csv, xlsx) - auto-detected from extension if not specified
        #[arg(short, long)]
        format: Option<String>,

        /// Table columns that receive no value (format: col1,col2)
        #[arg(long)]
        optional_columns: Option<String>,

        /// Parse the value at a source position as a date (format: INDEX:FORMAT, repeatable)
        #[arg(long = "date-column", value_name = "INDEX:FORMAT")]
        date_columns: Vec<String>,

        /// Print the load summary as JSON
        #[arg(long)]
        json: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Load {
            endpoint,
            port,
            database,
            username,
            password,
            iam,
            region,
            source_uri,
            source_prefix,
            table,
            format,
            optional_columns,
            date_columns,
            json,
            quiet,
        } => {
            // Initialize tracing based on quiet mode
            use tracing_subscriber::{EnvFilter, FmtSubscriber};
            let filter = if quiet {
                EnvFilter::new("staging_loader=warn,sqlx=off")
            } else {
                EnvFilter::new("staging_loader=info,sqlx=off")
            };
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);

            let region = region.or_else(|| cli::extract_region_from_endpoint(&endpoint));
            if iam && region.is_none() {
                return Err(anyhow::anyhow!(
                    "Could not extract region from endpoint '{}'.\n\
                     Expected format: xxx.dsql.REGION.on.aws (e.g., xxx.dsql.us-east-1.on.aws)\n\
                     Please specify --region explicitly.",
                    endpoint
                ));
            }

            let format = format.as_deref().map(Format::parse).transpose()?;

            let optional_columns = optional_columns
                .as_deref()
                .map(cli::parse_optional_columns)
                .transpose()
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to parse optional columns: {}\n\
                         Example: --optional-columns \"PROCESS_NAME,ETL_CYCLE\"",
                        e
                    )
                })?
                .unwrap_or_default();

            let date_columns = cli::parse_date_columns(&date_columns).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to parse date column: {}\n\
                     Example: --date-column \"2:DD/MM/YYYY\"",
                    e
                )
            })?;

            if !quiet && !json {
                eprintln!("Staging Loader");
                eprintln!("==============");
                eprintln!("Endpoint: {}:{}", endpoint, port);
                eprintln!("Source: {}", source_uri);
                eprintln!("Table: {}", table);
                eprintln!();
            }

            let load_args = LoadArgs {
                endpoint,
                port,
                database,
                username,
                password,
                iam,
                region,
                source_uri,
                source_prefix,
                format,
                table,
                optional_columns,
                date_columns,
            };

            let report = run_load(load_args).await?;
            print_summary(&report, json)?;
        }
    }
    Ok(())
}

fn print_summary(report: &LoadReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let count = |c: Option<i64>| c.map_or_else(|| "unavailable".to_string(), |n| n.to_string());

    println!("Load Summary");
    println!("============");
    println!("Load ID: {}", report.load_id);
    println!("Table: {}", report.table);
    println!("Columns: {}", report.columns.join(", "));
    println!("Rows inserted: {}", report.rows_inserted);
    println!("Records before: {}", count(report.count_before));
    println!("Records after: {}", count(report.count_after));
    println!("Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
    Ok(())
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    use std::collections::{BTreeMap, BTreeSet};

    /// Extract region from DSQL endpoint format: xxx.dsql.{region}.on.aws
    pub fn extract_region_from_endpoint(endpoint: &str) -> Option<String> {
        let parts: Vec<&str> = endpoint.split('.').collect();
        if parts.len() >= 5
            && parts[1].contains("dsql")
            && parts[parts.len() - 2] == "on"
            && parts[parts.len() - 1] == "aws"
        {
            Some(parts[2].to_string())
        } else {
            None
        }
    }

    /// Parse "col1,col2" into column names. Names are kept exactly as given
    /// apart from surrounding whitespace.
    pub fn parse_optional_columns(list: &str) -> anyhow::Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();

        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !seen.insert(name) {
                return Err(anyhow::anyhow!("Duplicate optional column '{}'", name));
            }
            columns.push(name.to_string());
        }

        Ok(columns)
    }

    /// Parse repeated "INDEX:FORMAT" values into an index -> format mapping
    pub fn parse_date_columns(values: &[String]) -> anyhow::Result<BTreeMap<usize, String>> {
        let mut mappings = BTreeMap::new();

        for value in values {
            let (index, format) = value.split_once(':').ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid date column '{}'. Expected format: 'INDEX:FORMAT'",
                    value
                )
            })?;

            let index = index.trim();
            let index: usize = index.parse().map_err(|_| {
                anyhow::anyhow!(
                    "Date column index '{}' must be a non-negative integer",
                    index
                )
            })?;

            if format.is_empty() {
                return Err(anyhow::anyhow!(
                    "Date format cannot be empty in '{}'",
                    value
                ));
            }

            if mappings.insert(index, format.to_string()).is_some() {
                return Err(anyhow::anyhow!(
                    "Duplicate date column index {} in date column mapping",
                    index
                ));
            }
        }

        Ok(mappings)
    }

}
