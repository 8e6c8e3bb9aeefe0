//! stratsig CLI: evaluate one bar series, or build digests for a watchlist.
//!
//! Commands:
//! - `evaluate` - run the signal engine over one CSV file and print the record
//! - `digest` - load every watched ticker, evaluate in parallel, print per-user digests

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use stratsig::config::StrategyConfig;
use stratsig::data::{load_bars, load_config, BarSource, CsvDirSource, DataError};
use stratsig::digest::{build_digests, BatchOutcome};
use stratsig::logging::init_logging;
use stratsig::watchlist::Watchlist;
use stratsig::{evaluate_parallel, Bar, Period, ResultRecord, SignalEngine};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "stratsig",
    about = "Strategy signal engine for daily bar series"
)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single CSV bar series.
    Evaluate {
        /// CSV file with date,open,high,low,close,volume columns.
        #[arg(long)]
        csv: PathBuf,

        /// Strategy TOML file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override a strategy setting, e.g. --set pattern_window=30.
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, f64)>,

        /// Print the record as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Build per-subscriber digests for a watchlist.
    Digest {
        /// Watchlist TOML file.
        #[arg(long)]
        watchlist: PathBuf,

        /// Directory holding one CSV file per ticker.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Strategy TOML file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override a strategy setting, e.g. --set pattern_window=30.
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, f64)>,

        /// Digest date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Print digests as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn parse_override(s: &str) -> std::result::Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    let value: f64 = match value.trim() {
        "true" => 1.0,
        "false" => 0.0,
        v => v
            .parse()
            .map_err(|_| format!("`{v}` is not a number for {key}"))?,
    };
    Ok((key.trim().to_string(), value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Evaluate {
            csv,
            config,
            overrides,
            json,
        } => run_evaluate(&csv, config.as_deref(), &overrides, json),
        Commands::Digest {
            watchlist,
            data_dir,
            config,
            overrides,
            date,
            json,
        } => run_digest(
            &watchlist,
            &data_dir,
            config.as_deref(),
            &overrides,
            date.unwrap_or_else(|| chrono::Local::now().date_naive()),
            json,
        ),
    }
}

fn build_engine(config_path: Option<&Path>, overrides: &[(String, f64)]) -> Result<SignalEngine> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => StrategyConfig::default(),
    };
    if !overrides.is_empty() {
        let params: HashMap<&str, f64> = overrides.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        config = config
            .with_overrides(&params)
            .context("invalid --set override")?;
    }
    SignalEngine::new(config).context("invalid strategy configuration")
}

fn run_evaluate(
    csv: &Path,
    config_path: Option<&Path>,
    overrides: &[(String, f64)],
    json: bool,
) -> Result<()> {
    let engine = build_engine(config_path, overrides)?;
    let bars = load_bars(csv).with_context(|| format!("loading {}", csv.display()))?;
    if bars.is_empty() {
        warn!(path = %csv.display(), "no bars loaded");
    }

    let record = engine.evaluate(&bars);
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", render_record(&record, engine.config().baseline_window));
    }
    Ok(())
}

fn render_record(record: &ResultRecord, window: Period) -> String {
    let header = match (record.price, record.baseline_average, record.deviation_pct) {
        (Some(price), Some(baseline), Some(d)) => {
            format!("${price:.2} | {window}MA({baseline:.2}) dev {d:+.1}%")
        }
        (Some(price), Some(baseline), None) => {
            format!("${price:.2} | {window}MA({baseline:.2}) dev n/a")
        }
        _ => "could not analyze".to_string(),
    };
    format!(
        "{header}\n{}\nnotify: {}\n",
        record.signal_text, record.notify
    )
}

fn run_digest(
    watchlist_path: &Path,
    data_dir: &Path,
    config_path: Option<&Path>,
    overrides: &[(String, f64)],
    date: NaiveDate,
    json: bool,
) -> Result<()> {
    let engine = build_engine(config_path, overrides)?;
    let watchlist = Watchlist::load(watchlist_path)
        .with_context(|| format!("loading watchlist {}", watchlist_path.display()))?;
    let source = CsvDirSource::new(data_dir, watchlist.market_suffixes.clone());

    // Each ticker is loaded once, however many users follow it
    let tickers: Vec<String> = watchlist.all_tickers().into_iter().collect();
    let loaded: Vec<(String, Result<Vec<Bar>, DataError>)> = tickers
        .par_iter()
        .map(|t| (t.clone(), source.load(t)))
        .collect();

    let mut outcome = BatchOutcome::default();
    let mut series: Vec<(String, Vec<Bar>)> = Vec::with_capacity(loaded.len());
    for (ticker, result) in loaded {
        match result {
            Ok(bars) => series.push((ticker, bars)),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "could not load series");
                outcome.record_failure(ticker, e);
            }
        }
    }

    let instruments: Vec<(&str, &[Bar])> = series
        .iter()
        .map(|(t, bars)| (t.as_str(), bars.as_slice()))
        .collect();
    let (evaluations, errors) = evaluate_parallel(&engine, instruments);
    info!(
        tickers = tickers.len(),
        analyzed = evaluations.len(),
        failed = errors.len() + outcome.failures.len(),
        "batch evaluated"
    );

    let batch = BatchOutcome::from_evaluations(evaluations, errors);
    outcome.records.extend(batch.records);
    outcome.failures.extend(batch.failures);

    let digests = build_digests(&watchlist, &outcome, engine.config().baseline_window, date);
    if json {
        println!("{}", serde_json::to_string_pretty(&digests)?);
        return Ok(());
    }

    for digest in &digests {
        println!("To: {}", digest.contact);
        println!("Subject: {}", digest.subject);
        println!();
        println!("{}", digest.render());
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("pattern_window=30").unwrap(),
            ("pattern_window".to_string(), 30.0)
        );
        assert_eq!(
            parse_override("require_right_leg = true").unwrap(),
            ("require_right_leg".to_string(), 1.0)
        );
        assert!(parse_override("pattern_window").is_err());
        assert!(parse_override("pattern_window=abc").is_err());
    }

    #[test]
    fn test_empty_series_renders_insufficient_data() {
        let engine = SignalEngine::new(StrategyConfig::default()).unwrap();
        let bars: Vec<Bar> = Vec::new();
        let record = engine.evaluate(&bars);

        let text = render_record(&record, engine.config().baseline_window);
        assert_eq!(
            text,
            "could not analyze\ninsufficient data: need 60 bars, got 0\nnotify: false\n"
        );
    }

    #[test]
    fn test_cli_parses_digest() {
        let cli = Cli::try_parse_from([
            "stratsig",
            "digest",
            "--watchlist",
            "w.toml",
            "--set",
            "pattern_window=30",
            "--date",
            "2024-03-07",
        ])
        .unwrap();
        match cli.command {
            Commands::Digest {
                overrides, date, ..
            } => {
                assert_eq!(overrides, vec![("pattern_window".to_string(), 30.0)]);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 7));
            }
            _ => panic!("expected digest"),
        }
    }
}
