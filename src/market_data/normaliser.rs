// Convert wire prices into fee-adjusted quote sides.

use chrono::{DateTime, TimeZone, Utc};

use crate::engine::types::{Exchange, FeeSchedule, Price, Quote};
use crate::market_data::adapters::{BookUpdate, SideUpdate, StreamError};

pub struct Normaliser {
    pub fees: FeeSchedule,
}

impl Normaliser {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }

    /// Selling into a bid costs the taker fee.
    pub fn bid(&self, pure: f64) -> Price {
        Price { pure, adjusted: pure * (1.0 + self.fees.taker_pct * 0.01) }
    }

    /// Buying at the ask is charged the maker fee.
    pub fn ask(&self, pure: f64) -> Price {
        Price { pure, adjusted: pure * (1.0 - self.fees.maker_pct * 0.01) }
    }

    /// Build the next quote from the previous one and an update.
    pub fn apply(&self, prev: Option<&Quote>, update: &BookUpdate) -> Quote {
        let bid = match update.bid {
            SideUpdate::Keep => prev.and_then(|q| q.bid),
            SideUpdate::Clear => None,
            SideUpdate::Set(pure) => Some(self.bid(pure)),
        };
        let ask = match update.ask {
            SideUpdate::Keep => prev.and_then(|q| q.ask),
            SideUpdate::Clear => None,
            SideUpdate::Set(pure) => Some(self.ask(pure)),
        };
        Quote::new(bid, ask, update.time)
    }
}

/// Parse a decimal price string as sent by Binance and Gate.io.
pub fn parse_price(exchange: Exchange, s: &str) -> Result<f64, StreamError> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|e| StreamError::decode(exchange, format!("price `{}`: {}", s, e)))?;
    if !value.is_finite() {
        return Err(StreamError::decode(exchange, format!("price `{}` is not finite", s)));
    }
    Ok(value)
}

/// Exchange event timestamp in milliseconds since the epoch.
pub fn event_time(exchange: Exchange, ms: i64) -> Result<DateTime<Utc>, StreamError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StreamError::decode(exchange, format!("timestamp {} out of range", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn binance() -> Normaliser {
        Normaliser::new(Exchange::Binance.default_fees())
    }

    fn ts(ms: i64) -> DateTime<Utc> {
        event_time(Exchange::Binance, ms).unwrap()
    }

    #[test]
    fn test_binance_fee_adjustment() {
        let norm = binance();
        let ask = norm.ask(101.0);
        let bid = norm.bid(100.0);
        assert!((ask.adjusted - 100.9798).abs() < 1e-9);
        assert!((bid.adjusted - 100.04).abs() < 1e-9);
        assert_eq!(ask.pure, 101.0);
        assert_eq!(bid.pure, 100.0);
    }

    #[test]
    fn test_apply_keep_carries_previous_side() {
        let norm = binance();
        let first = norm.apply(
            None,
            &BookUpdate { bid: SideUpdate::Set(100.0), ask: SideUpdate::Set(101.0), time: ts(1) },
        );
        let second = norm.apply(
            Some(&first),
            &BookUpdate { bid: SideUpdate::Keep, ask: SideUpdate::Set(102.0), time: ts(2) },
        );
        assert_eq!(second.bid, first.bid);
        assert_eq!(second.ask_pure(), Some(102.0));
        assert_eq!(second.bid_time, ts(2));
        assert_eq!(second.ask_time, ts(2));
    }

    #[test]
    fn test_apply_clear_and_keep_without_history() {
        let norm = binance();
        let quote = norm.apply(
            None,
            &BookUpdate { bid: SideUpdate::Keep, ask: SideUpdate::Clear, time: ts(5) },
        );
        assert_eq!(quote.bid, None);
        assert_eq!(quote.ask, None);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(Exchange::GateIo, "27000.5").unwrap(), 27000.5);
        assert!(parse_price(Exchange::GateIo, "").is_err());
        assert!(parse_price(Exchange::GateIo, "abc").is_err());
        assert!(parse_price(Exchange::GateIo, "inf").is_err());
    }

    proptest! {
        #[test]
        fn prop_sides_set_together(pure in 0.0001f64..1_000_000.0, maker in 0.0f64..1.0, taker in 0.0f64..1.0) {
            let norm = Normaliser::new(FeeSchedule::new(maker, taker));
            let quote = norm.apply(None, &BookUpdate {
                bid: SideUpdate::Set(pure),
                ask: SideUpdate::Clear,
                time: ts(0),
            });
            prop_assert_eq!(quote.bid_pure().is_some(), quote.bid().is_some());
            prop_assert_eq!(quote.ask_pure().is_some(), quote.ask().is_some());
            let bid = quote.bid().unwrap();
            prop_assert!((bid - pure * (1.0 + taker * 0.01)).abs() <= 1e-9 * pure.max(1.0));
        }
    }
}
