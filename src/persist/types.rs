use std::fmt;
use std::path::PathBuf;

/// Name of the combined sink. No coin may take it.
pub const AGGREGATE_NAME: &str = "all";

/// Where a spread record goes: the file for one coin, or the combined one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SinkKey {
    Coin(String),
    Aggregate,
}

impl SinkKey {
    pub fn coin(coin: &str) -> Self {
        SinkKey::Coin(coin.to_string())
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKey::Coin(coin) => f.write_str(coin),
            SinkKey::Aggregate => f.write_str(AGGREGATE_NAME),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Column order of every spread CSV file.
pub const CSV_HEADER: [&str; 14] = [
    "reported_at",
    "coin",
    "spread_pct",
    "maker_exchange",
    "maker_ask_pure",
    "maker_ask",
    "maker_fee_pct",
    "maker_ask_time",
    "taker_exchange",
    "taker_bid_pure",
    "taker_bid",
    "taker_fee_pct",
    "taker_bid_time",
    "staleness_ms",
];
