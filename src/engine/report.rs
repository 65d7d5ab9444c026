use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::engine::types::{Instrument, Quote};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Pairing produced something that can't happen, e.g. two coins in one
    /// comparison. Never retried.
    #[error("scan invariant violated: {0}")]
    InvariantViolation(String),
}

/// An instrument together with the quote the scanner read for it this cycle.
#[derive(Debug, Clone)]
pub struct Leg {
    pub instrument: Arc<Instrument>,
    pub quote: Arc<Quote>,
}

impl Leg {
    pub fn new(instrument: Arc<Instrument>, quote: Arc<Quote>) -> Self {
        Self { instrument, quote }
    }
}

/// The side of a leg that goes into a report: the ask of the maker or the
/// bid of the taker.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSide {
    pub instrument: Arc<Instrument>,
    pub pure: f64,
    pub adjusted: f64,
    pub fee_pct: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpreadReport {
    pub coin: String,
    pub spread_pct: f64,
    pub staleness_ms: i64,
    pub maker: ReportSide,
    pub taker: ReportSide,
}

impl SpreadReport {
    /// Buy on `maker` at its ask, sell on `taker` at its bid.
    pub fn new(maker: &Leg, taker: &Leg) -> Result<Self, ScanError> {
        if maker.instrument.coin != taker.instrument.coin {
            return Err(ScanError::InvariantViolation(format!(
                "maker coin {} != taker coin {}",
                maker.instrument.coin, taker.instrument.coin
            )));
        }

        let ask = maker.quote.ask.ok_or_else(|| {
            ScanError::InvariantViolation(format!("maker {} has no ask", maker.instrument))
        })?;
        let bid = taker.quote.bid.ok_or_else(|| {
            ScanError::InvariantViolation(format!("taker {} has no bid", taker.instrument))
        })?;

        let spread_pct = 100.0 * (ask.adjusted - bid.adjusted) / ask.adjusted;
        let staleness_ms = (maker.quote.ask_time - taker.quote.bid_time).num_milliseconds().abs();

        Ok(Self {
            coin: maker.instrument.coin.clone(),
            spread_pct,
            staleness_ms,
            maker: ReportSide {
                instrument: Arc::clone(&maker.instrument),
                pure: ask.pure,
                adjusted: ask.adjusted,
                fee_pct: maker.instrument.fees.maker_pct,
                time: maker.quote.ask_time,
            },
            taker: ReportSide {
                instrument: Arc::clone(&taker.instrument),
                pure: bid.pure,
                adjusted: bid.adjusted,
                fee_pct: taker.instrument.fees.taker_pct,
                time: taker.quote.bid_time,
            },
        })
    }

    /// Flat row for the CSV sinks.
    pub fn record(&self, reported_at: DateTime<Utc>) -> SpreadRecord<'_> {
        SpreadRecord {
            reported_at: reported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            coin: &self.coin,
            spread_pct: self.spread_pct,
            maker_exchange: self.maker.instrument.exchange.as_str(),
            maker_ask_pure: self.maker.pure,
            maker_ask: self.maker.adjusted,
            maker_fee_pct: self.maker.fee_pct,
            maker_ask_time: self.maker.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            taker_exchange: self.taker.instrument.exchange.as_str(),
            taker_bid_pure: self.taker.pure,
            taker_bid: self.taker.adjusted,
            taker_fee_pct: self.taker.fee_pct,
            taker_bid_time: self.taker.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            staleness_ms: self.staleness_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpreadRecord<'a> {
    pub reported_at: String,
    pub coin: &'a str,
    pub spread_pct: f64,
    pub maker_exchange: &'static str,
    pub maker_ask_pure: f64,
    pub maker_ask: f64,
    pub maker_fee_pct: f64,
    pub maker_ask_time: String,
    pub taker_exchange: &'static str,
    pub taker_bid_pure: f64,
    pub taker_bid: f64,
    pub taker_fee_pct: f64,
    pub taker_bid_time: String,
    pub staleness_ms: i64,
}

impl fmt::Display for SpreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " {:^5}, {:^10.6}", self.coin, self.spread_pct)?;
        writeln!(
            f,
            "{:>8} {:^10}, {:^12.6}, {:^12.6}, -{:^6.4}%, {}",
            "maker",
            self.maker.instrument.exchange.to_string(),
            self.maker.pure,
            self.maker.adjusted,
            self.maker.fee_pct,
            self.maker.time.format("%Y-%m-%d %H:%M:%S%.3f"),
        )?;
        write!(
            f,
            "{:>8} {:^10}, {:^12.6}, {:^12.6}, +{:^6.4}%, {}, {}ms",
            "taker",
            self.taker.instrument.exchange.to_string(),
            self.taker.pure,
            self.taker.adjusted,
            self.taker.fee_pct,
            self.taker.time.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.staleness_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Exchange, Price};
    use chrono::TimeZone;

    fn leg(coin: &str, exchange: Exchange, bid: f64, ask: f64, ms: i64) -> Leg {
        Leg::new(
            Arc::new(Instrument::new(coin, exchange)),
            Arc::new(Quote::new(
                Some(Price { pure: bid, adjusted: bid }),
                Some(Price { pure: ask, adjusted: ask }),
                Utc.timestamp_millis_opt(ms).unwrap(),
            )),
        )
    }

    #[test]
    fn test_spread_and_staleness() {
        let maker = leg("BTC", Exchange::Binance, 99.0, 100.0, 1_000);
        let taker = leg("BTC", Exchange::Mexc, 98.0, 99.5, 1_250);

        let report = SpreadReport::new(&maker, &taker).unwrap();
        assert_eq!(report.coin, "BTC");
        assert!((report.spread_pct - 2.0).abs() < 1e-12);
        assert_eq!(report.staleness_ms, 250);
        assert_eq!(report.maker.fee_pct, 0.02);
        assert_eq!(report.taker.fee_pct, 0.01);

        // staleness is symmetric
        let report = SpreadReport::new(&taker, &maker).unwrap();
        assert_eq!(report.staleness_ms, 250);
    }

    #[test]
    fn test_coin_mismatch_is_invariant_violation() {
        let maker = leg("BTC", Exchange::Binance, 99.0, 100.0, 0);
        let taker = leg("ETH", Exchange::Mexc, 98.0, 99.5, 0);
        let err = SpreadReport::new(&maker, &taker).unwrap_err();
        assert!(matches!(err, ScanError::InvariantViolation(_)));
        assert!(err.to_string().contains("BTC"));
    }

    #[test]
    fn test_missing_side_is_invariant_violation() {
        let maker = Leg::new(
            Arc::new(Instrument::new("BTC", Exchange::GateIo)),
            Arc::new(Quote::new(None, None, Utc.timestamp_millis_opt(0).unwrap())),
        );
        let taker = leg("BTC", Exchange::Mexc, 98.0, 99.5, 0);
        assert!(SpreadReport::new(&maker, &taker).is_err());
    }

    #[test]
    fn test_display_and_record() {
        let maker = leg("ETH", Exchange::GateIo, 1.0, 2.0, 0);
        let taker = leg("ETH", Exchange::Binance, 1.5, 3.0, 5);
        let report = SpreadReport::new(&maker, &taker).unwrap();

        let text = report.to_string();
        assert!(text.contains("Gate.io"));
        assert!(text.contains("Binance"));
        assert!(text.ends_with("5ms"));

        let record = report.record(Utc.timestamp_millis_opt(0).unwrap());
        assert_eq!(record.maker_exchange, "gateio");
        assert_eq!(record.taker_exchange, "binance");
        assert_eq!(record.maker_ask_time, "1970-01-01T00:00:00.000Z");
        assert_eq!(record.staleness_ms, 5);
    }
}
