mod config;
mod filters;
mod logging;

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::info;

use whodb_core::{Condition, ErrorKind, Page, WriteMode};
use whodb_engine::{Facade, PluginRegistry};
use whodb_import::{
    AutoGeneratedPolicy, ColumnMapping, ImportError, ImportOptions, MappedColumn, TabularInput,
    commit_import, validate_mapped_import,
};
use whodb_mockdata::{GenerationEngine, GenerationError};
use whodb_plugins::{PostgresPlugin, postgres};

use config::{AppConfig, redact_connection_string};
use filters::{parse_filter, parse_sort};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] whodb_core::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
    #[error("logging error: {0}")]
    Logging(String),
}

impl CliError {
    fn kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Core(err) => Some(err.kind()),
            CliError::Generation(err) => Some(err.kind()),
            CliError::Import(err) => Some(err.kind()),
            CliError::Io(_) => Some(ErrorKind::Io),
            _ => None,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "whodb", version, about = "WhoDB command line")]
struct Cli {
    /// Database connection string.
    #[arg(long, env = "DATABASE_URL", global = true, value_name = "CONNECTION_STRING")]
    conn: Option<String>,
    /// Settings file (defaults to ./whodb.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Schema to expose; overrides the config file.
    #[arg(long, global = true)]
    schema: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List storage units.
    Units,
    /// Describe the columns of a unit.
    Columns(UnitArgs),
    /// Read rows from a unit.
    Query(QueryArgs),
    /// Fill a unit (and the units it references) with mock rows.
    Generate(GenerateArgs),
    /// Validate a CSV file against a unit and write its rows.
    Import(ImportArgs),
    /// Write the rows of a unit as CSV.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct UnitArgs {
    unit: String,
}

#[derive(Args, Debug)]
struct QueryArgs {
    unit: String,
    /// Filter as `KEY OP VALUE`; repeat to AND several.
    #[arg(long = "where", value_name = "FILTER")]
    filters: Vec<String>,
    /// Sort key, optionally suffixed with `:desc`.
    #[arg(long)]
    sort: Vec<String>,
    #[arg(long, default_value_t = 50)]
    limit: u64,
    #[arg(long, default_value_t = 0)]
    offset: u64,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    unit: String,
    #[arg(long, default_value_t = 10)]
    rows: u64,
    /// Clear the unit and its referenced units first.
    #[arg(long, default_value_t = false)]
    overwrite: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Print the plan without writing anything.
    #[arg(long, default_value_t = false)]
    plan: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    unit: String,
    file: PathBuf,
    #[arg(long, default_value_t = false)]
    overwrite: bool,
    /// Keep supplied values for serial/identity columns.
    #[arg(long, default_value_t = false)]
    use_supplied_ids: bool,
    /// Validate and print the preview only.
    #[arg(long, default_value_t = false)]
    check: bool,
    /// Write a source column under another name, as `SOURCE=TARGET`.
    #[arg(long = "map", value_name = "SOURCE=TARGET")]
    renames: Vec<String>,
    /// Leave a source column out.
    #[arg(long)]
    skip: Vec<String>,
    /// Match columns by position instead of by header.
    #[arg(long, default_value_t = false, conflicts_with_all = ["renames", "skip"])]
    positional: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    unit: String,
    #[arg(long = "where", value_name = "FILTER")]
    filters: Vec<String>,
    /// Output file; stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.kind().map(|kind| kind.to_string());
            eprintln!("{}", json!({ "kind": kind, "message": err.to_string() }));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(schema) = cli.schema {
        config.connection.schema = schema;
    }
    logging::init_logging(&config.logging)?;

    let conn = cli
        .conn
        .or_else(|| config.connection.url.clone())
        .ok_or_else(|| {
            CliError::InvalidConfig("no connection string; pass --conn or set DATABASE_URL".into())
        })?;
    let facade = connect(&conn, &config).await?;

    match cli.command {
        Command::Units => print_json(&facade.list_units().await?),
        Command::Columns(args) => print_json(&facade.columns(&args.unit).await?),
        Command::Query(args) => query(&facade, args).await,
        Command::Generate(args) => generate(facade, &config, args).await,
        Command::Import(args) => import(&facade, &config, args).await,
        Command::Export(args) => export(&facade, args).await,
    }
}

async fn connect(conn: &str, config: &AppConfig) -> Result<Facade, CliError> {
    let store_type = detect_engine(conn)?;
    info!(
        event = "cli.connect",
        store_type = store_type,
        conn = %redact_connection_string(conn),
        schema = %config.connection.schema
    );
    let plugin = PostgresPlugin::connect(conn, config.connection.postgres_options()).await?;
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(plugin))?;
    Ok(Facade::connect(
        &registry,
        store_type,
        config.connection.engine_config(),
    )?)
}

fn detect_engine(conn: &str) -> Result<&'static str, CliError> {
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        Ok(postgres::STORE_TYPE)
    } else {
        Err(CliError::UnsupportedEngine(redact_connection_string(conn)))
    }
}

async fn conditions(
    facade: &Facade,
    unit: &str,
    filters: &[String],
) -> Result<Vec<Condition>, CliError> {
    if filters.is_empty() {
        return Ok(Vec::new());
    }
    let columns = facade.columns(unit).await?;
    filters
        .iter()
        .map(|raw| parse_filter(raw, facade.category(), &columns))
        .collect()
}

async fn query(facade: &Facade, args: QueryArgs) -> Result<(), CliError> {
    let conditions = conditions(facade, &args.unit, &args.filters).await?;
    let sort = args
        .sort
        .iter()
        .map(String::as_str)
        .map(parse_sort)
        .collect::<Result<Vec<_>, _>>()?;
    let rows = facade
        .query(
            &args.unit,
            &conditions,
            &sort,
            Some(Page::new(args.offset, args.limit)),
        )
        .await?;
    print_json(&rows)
}

async fn generate(facade: Facade, config: &AppConfig, args: GenerateArgs) -> Result<(), CliError> {
    let mut options = config.mock_data.clone();
    if let Some(seed) = args.seed {
        options = options.with_seed(seed);
    }
    let mode = write_mode(args.overwrite);
    let engine = GenerationEngine::new(facade, options);
    if args.plan {
        return print_json(&engine.plan(&args.unit, args.rows, mode).await?);
    }
    print_json(&engine.generate(&args.unit, args.rows, mode).await?)
}

async fn import(facade: &Facade, config: &AppConfig, args: ImportArgs) -> Result<(), CliError> {
    let input = TabularInput::from_csv(File::open(&args.file)?)?;
    let mapping = column_mapping(&args, input.headers())?;
    let preview =
        validate_mapped_import(facade, &args.unit, &input, &mapping, config.import).await?;
    print_json(&json!({
        "unit": preview.unit,
        "headers": preview.headers,
        "targets": preview.targets,
        "auto_generated_columns": preview.auto_generated_columns,
        "rows_total": preview.rows_total,
        "issues": preview.issues,
        "submit": preview.submit,
        "preview": preview.preview(),
    }))?;
    if args.check {
        return Ok(());
    }

    let auto_generated = if args.use_supplied_ids {
        AutoGeneratedPolicy::UseSupplied
    } else {
        AutoGeneratedPolicy::Generate
    };
    let options = ImportOptions::new(write_mode(args.overwrite), auto_generated);
    let result = commit_import(facade, preview.stage()?, options).await?;
    print_json(&result)
}

/// Build the mapping from `--map`, `--skip` and `--positional`; unnamed
/// headers keep their own name.
fn column_mapping(args: &ImportArgs, headers: &[String]) -> Result<ColumnMapping, CliError> {
    if args.positional {
        return Ok(ColumnMapping::Positional);
    }
    if args.renames.is_empty() && args.skip.is_empty() {
        return Ok(ColumnMapping::Headers);
    }
    let mut renames = Vec::with_capacity(args.renames.len());
    for raw in &args.renames {
        let (source, target) = raw.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("mapping '{raw}' must look like 'SOURCE=TARGET'"))
        })?;
        renames.push((source.trim(), target.trim()));
    }
    let columns = headers
        .iter()
        .map(|header| {
            let header = header.trim();
            if args.skip.iter().any(|skip| skip == header) {
                return MappedColumn::skip(header);
            }
            match renames.iter().find(|(source, _)| *source == header) {
                Some((_, target)) => MappedColumn::to(header, *target),
                None => MappedColumn::to(header, header),
            }
        })
        .collect();
    let mapping = ColumnMapping::explicit(columns);
    Ok(if args.use_supplied_ids {
        mapping.allowing_auto_generated()
    } else {
        mapping
    })
}

async fn export(facade: &Facade, args: ExportArgs) -> Result<(), CliError> {
    let conditions = conditions(facade, &args.unit, &args.filters).await?;
    let writer: Box<dyn Write + Send> = match &args.out {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    let rows = facade.export_csv(&args.unit, &conditions, writer).await?;
    info!(event = "cli.export", unit = %args.unit, rows = rows);
    Ok(())
}

fn write_mode(overwrite: bool) -> WriteMode {
    if overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::Append
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
