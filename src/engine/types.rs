use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Venues we stream top-of-book from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    Binance,
    Mexc,
    GateIo,
}

impl Exchange {
    /// Lower-case key used in config files and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Mexc => "mexc",
            Exchange::GateIo => "gateio",
        }
    }

    pub fn host(&self) -> &'static str {
        match self {
            Exchange::Binance => "fstream.binance.com",
            Exchange::Mexc => "contract.mexc.com",
            Exchange::GateIo => "fx-ws.gateio.ws",
        }
    }

    pub fn port(&self) -> u16 {
        443
    }

    /// Websocket path for `coin` (already upper-case).
    pub fn path(&self, coin: &str) -> String {
        match self {
            Exchange::Binance => format!("/ws/{}usdt@depth20@100ms", coin.to_lowercase()),
            Exchange::Mexc => "/ws".to_string(),
            Exchange::GateIo => "/v4/ws/usdt".to_string(),
        }
    }

    pub fn default_fees(&self) -> FeeSchedule {
        match self {
            Exchange::Binance => FeeSchedule::new(0.02, 0.04),
            Exchange::Mexc => FeeSchedule::new(0.00, 0.01),
            Exchange::GateIo => FeeSchedule::new(0.015, 0.05),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Exchange::Binance => "Binance",
            Exchange::Mexc => "Mexc",
            Exchange::GateIo => "Gate.io",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown exchange `{0}` (expected binance, mexc, gate or gateio)")]
pub struct UnknownExchange(pub String);

impl FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "mexc" => Ok(Exchange::Mexc),
            "gate" | "gateio" | "gate.io" => Ok(Exchange::GateIo),
            other => Err(UnknownExchange(other.to_string())),
        }
    }
}

/// Maker/taker fees in percent, e.g. `0.02` means 0.02%.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FeeSchedule {
    pub maker_pct: f64,
    pub taker_pct: f64,
}

impl FeeSchedule {
    pub fn new(maker_pct: f64, taker_pct: f64) -> Self {
        Self { maker_pct, taker_pct }
    }
}

/// One coin streamed from one exchange. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub coin: String,
    pub exchange: Exchange,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub tls: bool,
    pub fees: FeeSchedule,
}

impl Instrument {
    pub fn new(coin: &str, exchange: Exchange) -> Self {
        let coin = coin.trim().to_uppercase();
        Self {
            path: exchange.path(&coin),
            host: exchange.host().to_string(),
            port: exchange.port(),
            tls: true,
            fees: exchange.default_fees(),
            exchange,
            coin,
        }
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Point the instrument somewhere else, e.g. a local plain-text server in tests.
    pub fn with_endpoint(mut self, host: &str, port: u16, tls: bool) -> Self {
        self.host = host.to_string();
        self.port = port;
        self.tls = tls;
        self
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }

    /// Contract symbol in the exchange's own convention.
    pub fn symbol(&self) -> String {
        match self.exchange {
            Exchange::Binance => format!("{}usdt", self.coin.to_lowercase()),
            Exchange::Mexc | Exchange::GateIo => format!("{}_USDT", self.coin),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:^5}: {:^10}]", self.coin, self.exchange.to_string())
    }
}

/// One side of the book: the exchange price and the price after fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    pub pure: f64,
    pub adjusted: f64,
}

/// Top-of-book snapshot for one instrument. Never mutated after publication.
///
/// A side is either fully set (pure and fee-adjusted price) or absent, so the
/// two prices can't drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub bid_time: DateTime<Utc>,
    pub ask_time: DateTime<Utc>,
}

impl Quote {
    /// Exchanges report both sides in one event, so they share a timestamp.
    pub fn new(bid: Option<Price>, ask: Option<Price>, time: DateTime<Utc>) -> Self {
        Self { bid, ask, bid_time: time, ask_time: time }
    }

    pub fn bid_pure(&self) -> Option<f64> {
        self.bid.map(|p| p.pure)
    }

    pub fn bid(&self) -> Option<f64> {
        self.bid.map(|p| p.adjusted)
    }

    pub fn ask_pure(&self) -> Option<f64> {
        self.ask.map(|p| p.pure)
    }

    pub fn ask(&self) -> Option<f64> {
        self.ask.map(|p| p.adjusted)
    }

    pub fn is_two_sided(&self) -> bool {
        self.bid.is_some() && self.ask.is_some()
    }
}
