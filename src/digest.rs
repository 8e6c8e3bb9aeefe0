//! Per-subscriber digests built from a batch of evaluations

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::{watchlist::Watchlist, Evaluation, EvaluationError, Period, ResultRecord};

/// Every instrument's outcome for one batch run, keyed by ticker
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub records: BTreeMap<String, ResultRecord>,
    /// Ticker to the reason it could not be analyzed
    pub failures: BTreeMap<String, String>,
}

impl BatchOutcome {
    pub fn from_evaluations(evaluations: Vec<Evaluation>, errors: Vec<EvaluationError>) -> Self {
        let mut outcome = Self::default();
        for e in evaluations {
            outcome.records.insert(e.symbol, e.record);
        }
        for e in errors {
            outcome.failures.insert(e.symbol, e.error.to_string());
        }
        outcome
    }

    pub fn record_failure(&mut self, ticker: impl Into<String>, reason: impl fmt::Display) {
        self.failures.insert(ticker.into(), reason.to_string());
    }
}

/// One line of a digest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DigestLine {
    Alert {
        ticker: String,
        name: Option<String>,
        price: f64,
        baseline_window: Period,
        baseline: Option<f64>,
        deviation_pct: Option<f64>,
        signals: String,
    },
    Failure {
        ticker: String,
        name: Option<String>,
        reason: String,
    },
}

fn label(ticker: &str, name: &Option<String>) -> String {
    match name {
        Some(name) => format!("[{ticker} {name}]"),
        None => format!("[{ticker}]"),
    }
}

impl fmt::Display for DigestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestLine::Alert {
                ticker,
                name,
                price,
                baseline_window,
                baseline,
                deviation_pct,
                signals,
            } => {
                write!(f, "{} ${price:.2} | {baseline_window}MA(", label(ticker, name))?;
                match baseline {
                    Some(b) => write!(f, "{b:.2})")?,
                    None => write!(f, "n/a)")?,
                }
                match deviation_pct {
                    Some(d) => write!(f, " dev {d:+.1}%")?,
                    None => write!(f, " dev n/a")?,
                }
                write!(f, " | {signals}")
            }
            DigestLine::Failure {
                ticker,
                name,
                reason,
            } => write!(f, "{} could not analyze: {reason}", label(ticker, name)),
        }
    }
}

/// Everything one subscriber receives for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digest {
    pub contact: String,
    pub subject: String,
    pub lines: Vec<DigestLine>,
}

impl Digest {
    /// Plain-text body, one paragraph per line
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn subject_for(date: NaiveDate) -> String {
    format!("Strategy digest - {}", date.format("%m/%d"))
}

/// Build one digest per subscriber with something to report.
///
/// An instrument is reported when its record notifies with a positive price,
/// or when it could not be analyzed at all.
pub fn build_digests(
    watchlist: &Watchlist,
    outcome: &BatchOutcome,
    baseline_window: Period,
    date: NaiveDate,
) -> Vec<Digest> {
    let subject = subject_for(date);
    let mut digests = Vec::new();

    for user in &watchlist.users {
        if user.contact.trim().is_empty() {
            debug!("skipping subscriber without contact");
            continue;
        }

        let mut lines = Vec::new();
        for ticker in user.tickers() {
            let name = watchlist.names.get(&ticker).cloned();
            if let Some(record) = outcome.records.get(&ticker) {
                let Some(price) = record.price.filter(|p| *p > 0.0) else {
                    continue;
                };
                if !record.notify {
                    continue;
                }
                lines.push(DigestLine::Alert {
                    ticker,
                    name,
                    price,
                    baseline_window,
                    baseline: record.baseline_average,
                    deviation_pct: record.deviation_pct,
                    signals: record.signal_text.clone(),
                });
            } else if let Some(reason) = outcome.failures.get(&ticker) {
                lines.push(DigestLine::Failure {
                    ticker,
                    name,
                    reason: reason.clone(),
                });
            }
        }

        if lines.is_empty() {
            debug!(contact = %user.contact, "nothing to report");
            continue;
        }
        digests.push(Digest {
            contact: user.contact.clone(),
            subject: subject.clone(),
            lines,
        });
    }

    info!(
        subscribers = watchlist.users.len(),
        digests = digests.len(),
        "digests built"
    );
    digests
}
