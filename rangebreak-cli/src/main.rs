//! RangeBreak CLI — simulate, backtest, validate, and bar import commands.
//!
//! Commands:
//! - `simulate-day` — run one strategy on one trading day
//! - `backtest` — simulate a date range and print the trade statistics
//! - `validate` — walk-forward validation ending in PROMOTE / REJECT
//! - `import-bars` — canonicalize a bar CSV into the Parquet store
//! - `synth` — write a seeded random-walk series for smoke runs

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rangebreak_core::data::{
    canonicalize, random_walk, read_csv_bars, write_csv_bars, BarSource, CsvBarSource,
    ParquetBarStore, RandomWalkConfig,
};
use rangebreak_runner::report::write_trades_csv;
use rangebreak_runner::{
    JsonlTradeSink, JsonlValidationLog, ResolvedConfig, RunConfig, Services, TomlRegistry,
};

#[derive(Parser)]
#[command(
    name = "rangebreak",
    about = "RangeBreak CLI — opening-range breakout simulation and walk-forward validation"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreFormat {
    Parquet,
    Csv,
}

/// Inputs every simulation command needs.
#[derive(Args)]
struct RunInputs {
    /// Run configuration (TOML).
    #[arg(long, default_value = "rangebreak.toml")]
    config: PathBuf,

    /// Strategy registry (TOML of [[strategy]] tables).
    #[arg(long, default_value = "strategies.toml")]
    registry: PathBuf,

    /// Bar store directory.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Layout of the bar store.
    #[arg(long, value_enum, default_value_t = StoreFormat::Parquet)]
    format: StoreFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one strategy on one trading day and print the outcome as JSON.
    SimulateDay {
        #[command(flatten)]
        inputs: RunInputs,

        #[arg(long)]
        strategy: String,

        /// Trading day (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,
    },
    /// Backtest a strategy over a date range.
    Backtest {
        #[command(flatten)]
        inputs: RunInputs,

        #[arg(long)]
        strategy: String,

        /// First trading day (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Last trading day, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,

        /// Directory for the JSONL trade tape.
        #[arg(long)]
        trades_dir: Option<PathBuf>,

        /// Also export the trades as CSV.
        #[arg(long)]
        trades_csv: Option<PathBuf>,

        /// Print JSON instead of markdown.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Walk-forward validation of one or more strategies.
    Validate {
        #[command(flatten)]
        inputs: RunInputs,

        /// Strategy ids to validate.
        #[arg(long = "strategy", required = true)]
        strategies: Vec<String>,

        /// First trading day (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Last trading day, inclusive (YYYY-MM-DD).
        #[arg(long)]
        end: NaiveDate,

        /// Append-only validation history.
        #[arg(long, default_value = "results/validation.jsonl")]
        history: PathBuf,

        /// Directory for per-strategy JSON and markdown reports.
        #[arg(long, default_value = "results")]
        report_dir: PathBuf,
    },
    /// Canonicalize a bar CSV and store it as Parquet.
    ImportBars {
        /// CSV with timestamp,open,high,low,close columns.
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        instrument: String,

        /// Parquet store directory.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
    /// Write a synthetic random-walk series.
    Synth {
        /// Run configuration; supplies the session calendar.
        #[arg(long, default_value = "rangebreak.toml")]
        config: PathBuf,

        #[arg(long)]
        instrument: String,

        /// First day (YYYY-MM-DD).
        #[arg(long)]
        start: NaiveDate,

        /// Number of weekday sessions.
        #[arg(long, default_value_t = 250)]
        days: usize,

        #[arg(long, default_value_t = 4800.0)]
        start_price: f64,

        #[arg(long, default_value_t = 0.25)]
        tick_size: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = StoreFormat::Parquet)]
        format: StoreFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::SimulateDay {
            inputs,
            strategy,
            date,
        } => run_simulate_day(&inputs, &strategy, date),
        Commands::Backtest {
            inputs,
            strategy,
            start,
            end,
            trades_dir,
            trades_csv,
            json,
        } => run_backtest_cmd(&inputs, &strategy, start, end, trades_dir, trades_csv, json),
        Commands::Validate {
            inputs,
            strategies,
            start,
            end,
            history,
            report_dir,
        } => run_validate(&inputs, &strategies, start, end, &history, &report_dir),
        Commands::ImportBars {
            csv,
            instrument,
            data_dir,
        } => run_import(&csv, &instrument, &data_dir),
        Commands::Synth {
            config,
            instrument,
            start,
            days,
            start_price,
            tick_size,
            seed,
            data_dir,
            format,
        } => {
            let config = load_config(&config)?;
            let walk = RandomWalkConfig {
                first_day: start,
                days,
                bar_minutes: 1,
                start_price,
                max_step: tick_size * 8.0,
                tick_size,
                seed,
            };
            run_synth(&config, &instrument, &walk, &data_dir, format)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<ResolvedConfig> {
    let config = RunConfig::from_file(path)
        .and_then(RunConfig::resolve)
        .with_context(|| format!("invalid run config {}", path.display()))?;
    info!(path = %path.display(), hash = %config.config_hash, "loaded run config");
    Ok(config)
}

fn open_source(inputs: &RunInputs) -> Box<dyn BarSource> {
    match inputs.format {
        StoreFormat::Parquet => Box::new(ParquetBarStore::new(&inputs.data_dir)),
        StoreFormat::Csv => Box::new(CsvBarSource::new(&inputs.data_dir)),
    }
}

/// Everything a simulation command borrows from.
struct Loaded {
    config: ResolvedConfig,
    registry: TomlRegistry,
    source: Box<dyn BarSource>,
}

impl Loaded {
    fn new(inputs: &RunInputs) -> Result<Self> {
        let config = load_config(&inputs.config)?;
        let registry = TomlRegistry::from_file(&inputs.registry)
            .with_context(|| format!("invalid strategy registry {}", inputs.registry.display()))?;
        Ok(Self {
            config,
            registry,
            source: open_source(inputs),
        })
    }

    fn services(&self) -> Services<'_> {
        Services::new(&self.config, &self.registry, self.source.as_ref())
    }
}

fn run_simulate_day(inputs: &RunInputs, strategy: &str, date: NaiveDate) -> Result<()> {
    let loaded = Loaded::new(inputs)?;
    let report = loaded.services().run_day(strategy, date)?;
    println!("{}", report.to_json()?);
    Ok(())
}

fn run_backtest_cmd(
    inputs: &RunInputs,
    strategy: &str,
    start: NaiveDate,
    end: NaiveDate,
    trades_dir: Option<PathBuf>,
    trades_csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if end < start {
        bail!("--end {end} is before --start {start}");
    }
    let loaded = Loaded::new(inputs)?;
    let tape = trades_dir.map(JsonlTradeSink::new);
    let mut services = loaded.services();
    if let Some(sink) = &tape {
        services = services.with_trade_sink(sink);
    }
    let report = services.run_backtest(strategy, start, end)?;

    if let Some(path) = trades_csv {
        let sink = tape
            .as_ref()
            .context("--trades-csv needs --trades-dir to read the tape from")?;
        let trades = sink.read(&report.strategy_id)?;
        write_trades_csv(&path, &trades)?;
        println!("Trades saved to: {}", path.display());
    }

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.to_markdown());
    }
    Ok(())
}

fn run_validate(
    inputs: &RunInputs,
    strategies: &[String],
    start: NaiveDate,
    end: NaiveDate,
    history: &Path,
    report_dir: &Path,
) -> Result<()> {
    if end < start {
        bail!("--end {end} is before --start {start}");
    }
    let loaded = Loaded::new(inputs)?;
    let log = JsonlValidationLog::new(history);
    let services = loaded.services().with_history(&log);
    std::fs::create_dir_all(report_dir)
        .with_context(|| format!("cannot create {}", report_dir.display()))?;

    println!("{:<24} {:<14} {}", "Strategy", "Verdict", "Report");
    println!("{}", "-".repeat(64));
    for strategy in strategies {
        let report = services.run_validation(strategy, start, end, Utc::now())?;
        let stem = report_dir.join(format!("{strategy}.validation"));
        let json_path = stem.with_extension("json");
        let md_path = stem.with_extension("md");
        std::fs::write(&json_path, report.to_json()?)
            .with_context(|| format!("cannot write {}", json_path.display()))?;
        std::fs::write(&md_path, report.to_markdown())
            .with_context(|| format!("cannot write {}", md_path.display()))?;
        if !report.verdict.is_promote() {
            warn!(strategy = %strategy, verdict = report.verdict.label(), "strategy not promoted");
        }
        println!("{:<24} {:<14} {}", strategy, report.verdict.label(), md_path.display());
    }
    println!("History: {}", log.path().display());
    Ok(())
}

fn run_import(csv: &Path, instrument: &str, data_dir: &Path) -> Result<()> {
    let raw = read_csv_bars(csv)?;
    let (bars, report) = canonicalize(raw);
    if !report.is_clean() {
        warn!(
            duplicates = report.duplicates_dropped,
            insane = report.insane_dropped,
            "dropped bars during import"
        );
    }
    let partitions = ParquetBarStore::new(data_dir).write(instrument, &bars)?;
    println!(
        "Imported {} of {} bars for {instrument} into {} partition(s) under {}",
        report.output,
        report.input,
        partitions,
        data_dir.display()
    );
    Ok(())
}

fn run_synth(
    config: &ResolvedConfig,
    instrument: &str,
    walk: &RandomWalkConfig,
    data_dir: &Path,
    format: StoreFormat,
) -> Result<()> {
    let bars = random_walk(&config.calendar, walk);
    match format {
        StoreFormat::Parquet => {
            ParquetBarStore::new(data_dir).write(instrument, &bars)?;
        }
        StoreFormat::Csv => {
            let path = CsvBarSource::new(data_dir).path_for(instrument);
            write_csv_bars(&path, &bars)?;
        }
    }
    println!(
        "Wrote {} synthetic bars ({} sessions, seed {}) for {instrument} to {}",
        bars.len(),
        walk.days,
        walk.seed,
        data_dir.display()
    );
    Ok(())
}
