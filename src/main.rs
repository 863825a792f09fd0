use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use sqlcopy::config::{redacted_url, CopyConfig, Overrides, PlaceholderStyle};
use sqlcopy::copy::{copy_rows, CopyOptions};
use sqlcopy::driver::{Connection, Cursor, Scheme};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPlaceholder {
    /// `?` for every parameter
    Question,
    /// Numbered `$1`, `$2`, ...
    Dollar,
}

impl From<CliPlaceholder> for PlaceholderStyle {
    fn from(style: CliPlaceholder) -> Self {
        match style {
            CliPlaceholder::Question => PlaceholderStyle::Question,
            CliPlaceholder::Dollar => PlaceholderStyle::Dollar,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sqlcopy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source database URL (overrides SQLCOPY_SOURCE_URL)
    #[arg(long)]
    source: Option<String>,

    /// Destination database URL (overrides SQLCOPY_DEST_URL)
    #[arg(long)]
    dest: Option<String>,

    /// Query to run against the source
    #[arg(short, long)]
    query: String,

    /// Table name, `table(col, ...)` or a full INSERT statement
    #[arg(short, long)]
    target: String,

    /// Rows per INSERT statement (overrides SQLCOPY_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Placeholder syntax of the destination (overrides SQLCOPY_PLACEHOLDER)
    #[arg(long, value_enum)]
    placeholder: Option<CliPlaceholder>,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("sqlcopy v{}", env!("CARGO_PKG_VERSION"));

    let overrides = Overrides {
        source_url: cli.source.clone(),
        dest_url: cli.dest.clone(),
        batch_size: cli.batch_size,
        placeholder: cli.placeholder.map(Into::into),
    };
    let config =
        CopyConfig::load(&cli.env_file, &overrides).context("Failed to load copy configuration")?;

    info!(
        source = ?redacted_url(&config.source_url),
        dest = ?redacted_url(&config.dest_url),
        target = ?cli.target,
        batch_size = ?config.batch_size,
        "Starting copy"
    );

    let options = config.copy_options();
    debug!(options = ?options, "Copy options");

    let rows = copy_from_source(&config, &cli.query, &cli.target, &options)?;
    info!(rows = rows, "Copy complete");

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn copy_from_source(
    config: &CopyConfig,
    query: &str,
    target: &str,
    options: &CopyOptions,
) -> Result<u64> {
    match Scheme::from_url(&config.source_url).context("Invalid source URL")? {
        Scheme::Sqlite => copy_from_sqlite(config, query, target, options),
        Scheme::Postgres => copy_from_postgres(config, query, target, options),
    }
}

/// Open the destination and copy every row of `cursor` into it
fn copy_into(
    cursor: &mut dyn Cursor,
    config: &CopyConfig,
    target: &str,
    options: &CopyOptions,
) -> Result<u64> {
    let connection = open_destination(&config.dest_url)?;

    match copy_rows(cursor, connection.as_ref(), target, options) {
        Ok(rows) => Ok(rows),
        Err(failure) => {
            error!(rows_written = failure.rows_written, "Copy failed");
            Err(failure).with_context(|| format!("Failed to copy rows into {}", target))
        }
    }
}

fn open_destination(url: &str) -> Result<Box<dyn Connection>> {
    info!(dest = ?redacted_url(url), "Connecting to destination");
    match Scheme::from_url(url).context("Invalid destination URL")? {
        Scheme::Sqlite => open_sqlite_destination(url),
        Scheme::Postgres => open_postgres_destination(url),
    }
}

#[cfg(feature = "sqlite")]
fn copy_from_sqlite(
    config: &CopyConfig,
    query: &str,
    target: &str,
    options: &CopyOptions,
) -> Result<u64> {
    use sqlcopy::{SqliteConnection, SqliteCursor};

    info!(source = ?redacted_url(&config.source_url), "Opening SQLite source");
    let source = SqliteConnection::open(&config.source_url)?;

    let mut stmt = source
        .inner()
        .prepare(query)
        .context("Failed to prepare source query")?;
    let mut cursor = SqliteCursor::query(&mut stmt)?;

    copy_into(&mut cursor, config, target, options)
}

#[cfg(not(feature = "sqlite"))]
fn copy_from_sqlite(
    _config: &CopyConfig,
    _query: &str,
    _target: &str,
    _options: &CopyOptions,
) -> Result<u64> {
    bail!("SQLite support not enabled. Rebuild with --features sqlite")
}

#[cfg(feature = "sqlite")]
fn open_sqlite_destination(url: &str) -> Result<Box<dyn Connection>> {
    let connection = sqlcopy::SqliteConnection::open(url)?;
    Ok(Box::new(connection))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_destination(_url: &str) -> Result<Box<dyn Connection>> {
    bail!("SQLite support not enabled. Rebuild with --features sqlite")
}

#[cfg(feature = "postgres")]
fn copy_from_postgres(
    config: &CopyConfig,
    query: &str,
    target: &str,
    options: &CopyOptions,
) -> Result<u64> {
    use sqlcopy::driver::connect_client;
    use sqlcopy::PostgresCursor;

    info!(source = ?redacted_url(&config.source_url), "Connecting to PostgreSQL source");
    let mut client = connect_client(&config.source_url).with_context(|| {
        format!(
            "Failed to connect to PostgreSQL at {}",
            redacted_url(&config.source_url)
        )
    })?;

    let mut cursor = PostgresCursor::query(&mut client, query)?;

    copy_into(&mut cursor, config, target, options)
}

#[cfg(not(feature = "postgres"))]
fn copy_from_postgres(
    _config: &CopyConfig,
    _query: &str,
    _target: &str,
    _options: &CopyOptions,
) -> Result<u64> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}

#[cfg(feature = "postgres")]
fn open_postgres_destination(url: &str) -> Result<Box<dyn Connection>> {
    let connection = sqlcopy::PostgresConnection::connect(url).with_context(|| {
        format!("Failed to connect to PostgreSQL at {}", redacted_url(url))
    })?;
    Ok(Box::new(connection))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres_destination(_url: &str) -> Result<Box<dyn Connection>> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}
