//! Local data loading: CSV bar series and TOML strategy files
//!
//! CSV files carry one bar per row with a `date,open,high,low,close,volume`
//! header (capitalized headers are accepted). Extra columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{config::StrategyConfig, Bar, EngineError};

/// Errors raised while reading input files
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Config(#[from] EngineError),

    #[error("no bar series found for {ticker}")]
    MissingSeries { ticker: String },
}

/// Read bars from CSV. Rows that fail to parse are skipped with a warning.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (row, record) in rdr.deserialize::<Bar>().enumerate() {
        match record {
            Ok(bar) => bars.push(bar),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => warn!(row = row + 1, error = %e, "skipping unparseable row"),
        }
    }
    Ok(bars)
}

/// Read a CSV bar file
pub fn load_bars(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_bars(file)
}

/// Read and validate a TOML strategy file
pub fn load_config(path: &Path) -> Result<StrategyConfig, DataError> {
    let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: StrategyConfig = toml::from_str(&text).map_err(|source| DataError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

// ============================================================
// BAR SOURCES
// ============================================================

/// Supplies the bar series for a ticker
pub trait BarSource: Sync {
    fn load(&self, ticker: &str) -> Result<Vec<Bar>, DataError>;
}

/// One CSV file per ticker in a directory.
///
/// Looks for `<ticker>.csv`, then `<ticker>.<suffix>.csv` for each market
/// suffix in order, and takes the first file that yields any bars.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
    pub dir: PathBuf,
    pub suffixes: Vec<String>,
}

impl CsvDirSource {
    pub fn new(dir: impl Into<PathBuf>, suffixes: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            suffixes,
        }
    }

    fn candidates(&self, ticker: &str) -> Vec<PathBuf> {
        std::iter::once(format!("{ticker}.csv"))
            .chain(self.suffixes.iter().map(|s| format!("{ticker}.{s}.csv")))
            .map(|name| self.dir.join(name))
            .collect()
    }
}

impl BarSource for CsvDirSource {
    fn load(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        for path in self.candidates(ticker) {
            if !path.is_file() {
                continue;
            }
            let bars = load_bars(&path)?;
            if bars.is_empty() {
                debug!(path = %path.display(), "empty series, trying next suffix");
                continue;
            }
            debug!(path = %path.display(), bars = bars.len(), "loaded series");
            return Ok(bars);
        }
        Err(DataError::MissingSeries {
            ticker: ticker.to_string(),
        })
    }
}

// ============================================================
// TESTS
// ============================================================
