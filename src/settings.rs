//! Runtime settings.
//!
//! Read from a JSON (or TOML/YAML, by extension) file and layered with
//! `XSPREAD__*` environment variables, e.g. `XSPREAD__MIN_PROFIT=0.3` or
//! `XSPREAD__RECONNECT__MAX_DELAY_MS=10000`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::scanner::ReportMode;
use crate::engine::types::{Exchange, FeeSchedule, Instrument, UnknownExchange};
use crate::market_data::adapters::backoff::ReconnectConfig;
use crate::persist::AGGREGATE_NAME;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const ENV_PREFIX: &str = "XSPREAD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    UnknownExchange(#[from] UnknownExchange),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.into() }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default = "default_log_level")]
    log_level: String,
    scan_frequency_ms: u64,
    min_profit: f64,
    coins: Vec<String>,
    exchanges: Vec<String>,
    #[serde(default = "default_spread_dir")]
    spread_dir: PathBuf,
    #[serde(default)]
    log_dir: Option<PathBuf>,
    #[serde(default)]
    report_mode: ReportMode,
    #[serde(default)]
    reconnect: ReconnectConfig,
    #[serde(default)]
    fees: HashMap<String, FeeSchedule>,
    #[serde(default)]
    metrics: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_spread_dir() -> PathBuf {
    PathBuf::from("spread")
}

/// Validated settings. Read-only once built.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub scan_frequency: Duration,
    /// Minimum profit in percent of the maker's ask.
    pub min_profit: f64,
    pub coins: Vec<String>,
    pub exchanges: Vec<Exchange>,
    pub spread_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub report_mode: ReportMode,
    pub reconnect: ReconnectConfig,
    pub fees: HashMap<Exchange, FeeSchedule>,
    pub metrics: bool,
}

impl Settings {
    /// File plus environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("coins")
                    .with_list_parse_key("exchanges"),
            );
        Self::build(builder)
    }

    /// Settings from a JSON document alone.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let builder =
            config::Config::builder().add_source(config::File::from_str(text, config::FileFormat::Json));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        let mut coins: Vec<String> = Vec::new();
        for coin in raw.coins {
            let coin = coin.trim().to_uppercase();
            if coin.is_empty() {
                return Err(invalid("coins", "empty coin symbol"));
            }
            if coin.eq_ignore_ascii_case(AGGREGATE_NAME) {
                return Err(invalid("coins", format!("`{}` is reserved for the combined spread file", coin)));
            }
            if !coins.contains(&coin) {
                coins.push(coin);
            }
        }
        if coins.is_empty() {
            return Err(invalid("coins", "at least one coin is required"));
        }

        let mut exchanges: Vec<Exchange> = Vec::new();
        for name in &raw.exchanges {
            let exchange: Exchange = name.parse()?;
            if !exchanges.contains(&exchange) {
                exchanges.push(exchange);
            }
        }
        if exchanges.is_empty() {
            return Err(invalid("exchanges", "at least one exchange is required"));
        }

        if raw.scan_frequency_ms == 0 {
            return Err(invalid("scan_frequency_ms", "must be greater than zero"));
        }
        if !raw.min_profit.is_finite() || raw.min_profit < 0.0 {
            return Err(invalid("min_profit", format!("{} is not a non-negative number", raw.min_profit)));
        }

        let reconnect = raw.reconnect;
        if reconnect.initial_delay_ms == 0 || reconnect.max_delay_ms == 0 {
            return Err(invalid("reconnect", "delays must be positive"));
        }
        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            return Err(invalid("reconnect", "initial_delay_ms exceeds max_delay_ms"));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(invalid("reconnect", "multiplier must be at least 1"));
        }

        let mut fees = HashMap::new();
        for (name, schedule) in raw.fees {
            let exchange: Exchange = name.parse()?;
            let valid = |pct: f64| pct.is_finite() && (0.0..100.0).contains(&pct);
            if !valid(schedule.maker_pct) || !valid(schedule.taker_pct) {
                return Err(invalid("fees", format!("{} fees out of range", exchange)));
            }
            fees.insert(exchange, schedule);
        }

        Ok(Self {
            log_level: raw.log_level,
            scan_frequency: Duration::from_millis(raw.scan_frequency_ms),
            min_profit: raw.min_profit,
            coins,
            exchanges,
            spread_dir: raw.spread_dir,
            log_dir: raw.log_dir,
            report_mode: raw.report_mode,
            reconnect,
            fees,
            metrics: raw.metrics,
        })
    }

    pub fn fees_for(&self, exchange: Exchange) -> FeeSchedule {
        self.fees.get(&exchange).copied().unwrap_or_else(|| exchange.default_fees())
    }

    /// One instrument per (coin, exchange), coins outermost.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.coins
            .iter()
            .flat_map(|coin| {
                self.exchanges
                    .iter()
                    .map(move |&exchange| Instrument::new(coin, exchange).with_fees(self.fees_for(exchange)))
            })
            .collect()
    }

    /// `log_level` as a tracing filter directive. Accepts the usual level
    /// names plus `warning`, `crit` and `critical`.
    pub fn tracing_filter(&self) -> String {
        level_directive(&self.log_level)
    }
}

pub fn level_directive(level: &str) -> String {
    match level.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "crit" | "critical" => "error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"{
        "log_level": "debug",
        "scan_frequency_ms": 250,
        "min_profit": 0.3,
        "coins": ["btc", "eth", "BTC"],
        "exchanges": ["binance", "gate", "mexc"]
    }"#;

    #[test]
    fn test_loads_core_keys() {
        let settings = Settings::from_json(BASE).unwrap();
        assert_eq!(settings.coins, vec!["BTC", "ETH"]);
        assert_eq!(settings.exchanges, vec![Exchange::Binance, Exchange::GateIo, Exchange::Mexc]);
        assert_eq!(settings.scan_frequency, Duration::from_millis(250));
        assert_eq!(settings.min_profit, 0.3);
        assert_eq!(settings.spread_dir, PathBuf::from("spread"));
        assert_eq!(settings.report_mode, ReportMode::EveryCycle);
        assert_eq!(settings.reconnect, ReconnectConfig::default());
        assert!(settings.log_dir.is_none());
        assert!(!settings.metrics);
    }

    #[test]
    fn test_instruments_coin_major_with_default_fees() {
        let settings = Settings::from_json(BASE).unwrap();
        let instruments = settings.instruments();
        assert_eq!(instruments.len(), 6);
        assert_eq!(instruments[0].coin, "BTC");
        assert_eq!(instruments[0].exchange, Exchange::Binance);
        assert_eq!(instruments[1].exchange, Exchange::GateIo);
        assert_eq!(instruments[1].fees, FeeSchedule::new(0.015, 0.05));
        assert_eq!(instruments[3].coin, "ETH");
    }

    #[test]
    fn test_optional_keys() {
        let json = r#"{
            "scan_frequency_ms": 100,
            "min_profit": 0,
            "coins": ["sol"],
            "exchanges": ["gateio"],
            "spread_dir": "/tmp/spreads",
            "log_dir": "logs",
            "report_mode": "on_change",
            "reconnect": {"initial_delay_ms": 100, "max_delay_ms": 1000},
            "fees": {"gate": {"maker_pct": 0.0, "taker_pct": 0.02}},
            "metrics": true
        }"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.report_mode, ReportMode::OnChange);
        assert_eq!(settings.reconnect.max_delay_ms, 1000);
        assert_eq!(settings.reconnect.multiplier, 2.0);
        assert_eq!(settings.fees_for(Exchange::GateIo), FeeSchedule::new(0.0, 0.02));
        assert_eq!(settings.fees_for(Exchange::Binance), FeeSchedule::new(0.02, 0.04));
        assert_eq!(settings.instruments()[0].fees, FeeSchedule::new(0.0, 0.02));
        assert_eq!(settings.log_dir, Some(PathBuf::from("logs")));
        assert!(settings.metrics);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            r#"{"scan_frequency_ms": 0, "min_profit": 1, "coins": ["btc"], "exchanges": ["mexc"]}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": -1, "coins": ["btc"], "exchanges": ["mexc"]}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": [], "exchanges": ["mexc"]}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": ["btc", "all"], "exchanges": ["mexc"]}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": ["btc"], "exchanges": []}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": ["btc"], "exchanges": ["mexc"],
                "reconnect": {"initial_delay_ms": 5000, "max_delay_ms": 100}}"#,
            r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": ["btc"], "exchanges": ["mexc"],
                "reconnect": {"multiplier": 0.5}}"#,
        ];
        for case in cases {
            assert!(
                matches!(Settings::from_json(case), Err(ConfigError::Invalid { .. })),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn test_unknown_exchange_is_an_error() {
        let json = r#"{"scan_frequency_ms": 10, "min_profit": 1, "coins": ["btc"], "exchanges": ["kraken"]}"#;
        assert!(matches!(Settings::from_json(json), Err(ConfigError::UnknownExchange(_))));
    }

    #[test]
    fn test_missing_required_key() {
        let json = r#"{"min_profit": 1, "coins": ["btc"], "exchanges": ["mexc"]}"#;
        assert!(matches!(Settings::from_json(json), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, BASE).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.coins.len(), 2);
    }

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("critical"), "error");
        assert_eq!(level_directive("debug"), "debug");
    }
}
