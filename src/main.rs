//! # ShellSpark CLI
//!
//! Builds a pipeline from command-line flags, then prints the compiled
//! shell command or executes it.
//!
//! ## Usage
//!
//! ```bash
//! # Show the compiled command without running it
//! shellspark access.log --match ERROR --dry-run
//!
//! # Grouped aggregation over CSV, sorted by an alias
//! shellspark sales.csv --format csv \
//!     --filter quantity:gt:0 \
//!     --group-by region \
//!     --agg 'orders=count(*)' --agg 'qty=sum(quantity)' \
//!     --sort qty --desc --numeric
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shellspark::aggregate::Agg;
use shellspark::{
    ColumnRef, Config, FilterOp, FilterValue, Format, Pipeline, RunOutput, SortOrder,
};

#[derive(Parser, Debug)]
#[command(
    name = "shellspark",
    about = "Compile declarative data transformations into shell pipelines",
    version
)]
struct Cli {
    /// Input file path (may contain a glob when --parallel is used)
    path: String,

    /// Input format: text, csv, or json
    #[arg(long, default_value = "text")]
    format: String,

    /// CSV field delimiter
    #[arg(long, default_value = ",")]
    delimiter: String,

    /// Treat the first CSV row as data, not a header
    #[arg(long)]
    no_header: bool,

    /// Whole-line substring filter (repeatable)
    #[arg(long = "match")]
    matches: Vec<String>,

    /// Column filter COLUMN:OP:VALUE, e.g. quantity:gt:0 (repeatable;
    /// COLUMN "line" filters the whole line)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Comma-separated projection columns
    #[arg(long)]
    select: Option<String>,

    /// Comma-separated group keys (requires --agg)
    #[arg(long)]
    group_by: Option<String>,

    /// Aggregation ALIAS=FUNC(COLUMN), e.g. total=sum(quantity)
    /// (repeatable)
    #[arg(long = "agg")]
    aggs: Vec<String>,

    /// Sort column (name or 1-based index)
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Sort numerically
    #[arg(long)]
    numeric: bool,

    /// Keep at most N rows
    #[arg(long)]
    limit: Option<usize>,

    /// Skip N rows before the limit
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Remove duplicate rows
    #[arg(long)]
    distinct: bool,

    /// Process glob matches in parallel with N workers (0 = CPU count)
    #[arg(long)]
    parallel: Option<usize>,

    /// Print the compiled command instead of executing it
    #[arg(long)]
    dry_run: bool,

    /// Configuration file (defaults to shellspark.toml discovery)
    #[arg(long)]
    config: Option<String>,
}

/// `42` and `1.5` become numeric filter values, anything else a string.
fn parse_value(text: &str) -> FilterValue {
    if let Ok(i) = text.parse::<i64>() {
        return FilterValue::Int(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return FilterValue::Float(f);
    }
    FilterValue::Str(text.to_string())
}

/// Column reference from CLI text: digits mean a 1-based index.
fn parse_column(text: &str) -> ColumnRef {
    match text.parse::<usize>() {
        Ok(index) => ColumnRef::Index(index),
        Err(_) => ColumnRef::Name(text.to_string()),
    }
}

/// `ALIAS=FUNC(COLUMN)` or `ALIAS=count(*)`.
fn parse_agg(spec: &str) -> Result<(String, Agg)> {
    let (alias, call) = spec
        .split_once('=')
        .with_context(|| format!("--agg '{spec}' is not ALIAS=FUNC(COLUMN)"))?;
    let call = call.trim();
    let (func, rest) = call
        .split_once('(')
        .with_context(|| format!("--agg '{spec}' is not ALIAS=FUNC(COLUMN)"))?;
    let column = rest
        .strip_suffix(')')
        .with_context(|| format!("--agg '{spec}' is missing a closing parenthesis"))?;
    let agg = Agg::named(column.trim(), func.trim())?;
    Ok((alias.trim().to_string(), agg))
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let format = match cli.format.as_str() {
        "text" => Format::Text,
        "csv" => Format::Csv,
        "json" => Format::Json,
        other => bail!("unknown format '{other}' (expected text, csv, or json)"),
    };

    let mut pipeline = Pipeline::with_format(&cli.path, format);
    match format {
        Format::Csv => {
            pipeline = pipeline.parse(Format::Csv, &cli.delimiter, !cli.no_header);
        }
        Format::Json => {
            pipeline = pipeline.parse_json();
        }
        Format::Text => {}
    }

    for pattern in &cli.matches {
        pipeline = pipeline.filter_line(FilterOp::Contains, pattern.as_str());
    }

    for spec in &cli.filters {
        let mut parts = spec.splitn(3, ':');
        let (Some(column), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            bail!("--filter '{spec}' is not COLUMN:OP:VALUE");
        };
        let key = format!("{column}__{op}");
        pipeline = pipeline.filter_named(&key, parse_value(value))?;
    }

    if let Some(columns) = &cli.select {
        pipeline = pipeline.select(columns.split(',').map(str::trim).map(parse_column))?;
    }

    if let Some(keys) = &cli.group_by {
        if cli.aggs.is_empty() {
            bail!("--group-by requires at least one --agg");
        }
        pipeline = pipeline.group_by(keys.split(',').map(str::trim).map(parse_column))?;
        let aggs = cli
            .aggs
            .iter()
            .map(|spec| parse_agg(spec))
            .collect::<Result<Vec<_>>>()?;
        pipeline = pipeline.agg(aggs)?;
    } else if !cli.aggs.is_empty() {
        bail!("--agg requires --group-by");
    }

    if cli.distinct {
        pipeline = pipeline.distinct_all();
    }

    if let Some(column) = &cli.sort {
        let order = if cli.desc { SortOrder::Desc } else { SortOrder::Asc };
        pipeline = pipeline.sort(parse_column(column), order, cli.numeric);
    }

    if let Some(count) = cli.limit {
        pipeline = pipeline.limit(count, cli.offset)?;
    }

    if let Some(workers) = cli.parallel {
        pipeline = pipeline.parallel((workers > 0).then_some(workers))?;
    }

    Ok(pipeline)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).context("loading configuration")?,
        None => Config::load().unwrap_or_default(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();
    config.apply();

    let pipeline = build_pipeline(&cli)?;
    let command = pipeline.to_shell()?;

    if cli.dry_run {
        println!("{command}");
        return Ok(());
    }

    match pipeline.run()? {
        RunOutput::Lines(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        RunOutput::Records(records) => {
            for record in records {
                let row: Vec<String> = record
                    .columns()
                    .zip(record.values())
                    .map(|(name, value)| format!("{name}={value:?}"))
                    .collect();
                println!("{}", row.join(" "));
            }
        }
        RunOutput::Json(values) => {
            for value in values {
                println!("{value}");
            }
        }
    }
    Ok(())
}
