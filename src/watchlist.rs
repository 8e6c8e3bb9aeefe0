//! Subscribers, their tickers and display names
//!
//! ```toml
//! market_suffixes = ["TW", "TWO"]
//!
//! [[users]]
//! contact = "trader@example.com"
//! tickers = "2330, 2317 / 2454"
//!
//! [names]
//! 2330 = "TSMC"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::DataError;

/// One recipient and the free-text ticker list they follow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub contact: String,
    #[serde(default)]
    pub tickers: String,
}

impl Subscriber {
    pub fn tickers(&self) -> BTreeSet<String> {
        parse_tickers(&self.tickers)
    }
}

fn default_suffixes() -> Vec<String> {
    vec!["TW".to_string(), "TWO".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    #[serde(default)]
    pub users: Vec<Subscriber>,
    /// Ticker to display name
    #[serde(default)]
    pub names: BTreeMap<String, String>,
    /// Market suffixes tried, in order, when a plain series is missing
    #[serde(default = "default_suffixes")]
    pub market_suffixes: Vec<String>,
}

impl Default for Watchlist {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            names: BTreeMap::new(),
            market_suffixes: default_suffixes(),
        }
    }
}

/// Split free text into upper-cased, de-duplicated, sorted tickers
pub fn parse_tickers(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
        .collect()
}

impl Watchlist {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| DataError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every ticker any user follows, each once
    pub fn all_tickers(&self) -> BTreeSet<String> {
        self.users.iter().flat_map(Subscriber::tickers).collect()
    }

    /// Name for display, falling back to the ticker itself
    pub fn display_name<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.names.get(ticker).map_or(ticker, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tickers() {
        let tickers: Vec<String> = parse_tickers("2330, 2317/2330 ; aapl\n0050").into_iter().collect();
        assert_eq!(tickers, vec!["0050", "2317", "2330", "AAPL"]);
        assert!(parse_tickers(" ,; ").is_empty());
    }

    #[test]
    fn test_from_toml() {
        let watchlist = Watchlist::from_toml_str(
            r#"
            [[users]]
            contact = "a@example.com"
            tickers = "2330, 2317"

            [[users]]
            contact = "b@example.com"
            tickers = "2317 2454"

            [names]
            2330 = "TSMC"
            "#,
        )
        .unwrap();

        assert_eq!(watchlist.users.len(), 2);
        assert_eq!(watchlist.market_suffixes, vec!["TW", "TWO"]);
        assert_eq!(watchlist.all_tickers().len(), 3);
        assert_eq!(watchlist.display_name("2330"), "TSMC");
        assert_eq!(watchlist.display_name("2454"), "2454");
    }

    #[test]
    fn test_user_without_tickers() {
        let watchlist = Watchlist::from_toml_str(
            r#"
            [[users]]
            contact = "a@example.com"
            "#,
        )
        .unwrap();
        assert!(watchlist.users[0].tickers().is_empty());
        assert!(watchlist.all_tickers().is_empty());
    }
}
