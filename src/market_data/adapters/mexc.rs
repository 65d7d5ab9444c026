// Mexc contract full-depth stream

use std::time::Duration;

use serde_json::{json, Value};

use super::mexc_types::{
    Depth, WsMessage, CLIENT_ID_CHANNEL, DEPTH_CHANNEL, PONG_CHANNEL, SUBSCRIBE_ACK_CHANNEL,
};
use super::{AckPolicy, BookUpdate, MarketEvent, SideUpdate, StreamError, VenueAdapter};
use crate::engine::types::{Exchange, Instrument};
use crate::market_data::normaliser::event_time;

/// Mexc drops connections that stay quiet at the application level for longer than this.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);

const DEPTH_LIMIT: u32 = 20;

pub struct MexcAdapter {
    instrument: Instrument,
    ping_interval: Duration,
}

impl MexcAdapter {
    pub fn new(instrument: Instrument) -> Self {
        Self { instrument, ping_interval: PING_INTERVAL }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    fn best(levels: &[Vec<f64>]) -> Result<SideUpdate, StreamError> {
        match levels.first() {
            None => Ok(SideUpdate::Keep),
            Some(level) => match level.first() {
                Some(price) if price.is_finite() => Ok(SideUpdate::Set(*price)),
                _ => Err(StreamError::decode(Exchange::Mexc, format!("bad level {:?}", level))),
            },
        }
    }

    fn book(msg: WsMessage) -> Result<MarketEvent, StreamError> {
        let data = msg.data.ok_or_else(|| StreamError::decode(Exchange::Mexc, "depth push without data"))?;
        let ts = msg.ts.ok_or_else(|| StreamError::decode(Exchange::Mexc, "depth push without ts"))?;
        let depth: Depth = serde_json::from_value(data).map_err(|e| StreamError::decode(Exchange::Mexc, e))?;

        Ok(MarketEvent::Book(BookUpdate {
            bid: Self::best(&depth.bids)?,
            ask: Self::best(&depth.asks)?,
            time: event_time(Exchange::Mexc, ts)?,
        }))
    }
}

impl VenueAdapter for MexcAdapter {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn subscribe_request(&self) -> Option<String> {
        let request = json!({
            "method": "sub.depth.full",
            "param": {
                "symbol": self.instrument.symbol(),
                "limit": DEPTH_LIMIT,
            },
        });
        Some(request.to_string())
    }

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::FirstMessage
    }

    fn keepalive(&self) -> Option<(Duration, String)> {
        Some((self.ping_interval, json!({ "method": "ping" }).to_string()))
    }

    fn decode(&self, text: &str) -> Result<MarketEvent, StreamError> {
        let msg: WsMessage = serde_json::from_str(text).map_err(|e| StreamError::decode(Exchange::Mexc, e))?;

        match msg.channel.as_deref() {
            Some(DEPTH_CHANNEL) => Self::book(msg),
            Some(SUBSCRIBE_ACK_CHANNEL) => Ok(match msg.data {
                Some(Value::String(s)) if s == "success" => MarketEvent::SubscribeAck,
                Some(Value::String(s)) => MarketEvent::SubscribeRejected(s),
                Some(other) => MarketEvent::SubscribeRejected(other.to_string()),
                None => MarketEvent::SubscribeRejected("empty ack".to_string()),
            }),
            Some(PONG_CHANNEL) => Ok(MarketEvent::Pong),
            Some(CLIENT_ID_CHANNEL) => Ok(MarketEvent::Ignored),
            _ => Ok(MarketEvent::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MexcAdapter {
        MexcAdapter::new(Instrument::new("eth", Exchange::Mexc))
    }

    #[test]
    fn test_subscribe_request_shape() {
        let request: Value = serde_json::from_str(&adapter().subscribe_request().unwrap()).unwrap();
        assert_eq!(request["method"], "sub.depth.full");
        assert_eq!(request["param"]["symbol"], "ETH_USDT");
        assert_eq!(request["param"]["limit"], 20);
        assert_eq!(adapter().ack_policy(), AckPolicy::FirstMessage);
    }

    #[test]
    fn test_keepalive_every_twenty_seconds() {
        let (period, payload) = adapter().keepalive().unwrap();
        assert_eq!(period, Duration::from_secs(20));
        assert_eq!(serde_json::from_str::<Value>(&payload).unwrap(), json!({"method": "ping"}));
    }

    #[test]
    fn test_depth_with_integer_and_float_prices() {
        let msg = r#"{"channel":"push.depth.full","symbol":"ETH_USDT",
            "data":{"asks":[[1801,12,1],[1802.5,3,1]],"bids":[[1800.5,7,2]],"version":1},"ts":1700000000999}"#;
        match adapter().decode(msg).unwrap() {
            MarketEvent::Book(update) => {
                assert_eq!(update.bid, SideUpdate::Set(1800.5));
                assert_eq!(update.ask, SideUpdate::Set(1801.0));
                assert_eq!(update.time.timestamp_millis(), 1700000000999);
            }
            other => panic!("expected book update, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_side_keeps_previous() {
        let msg = r#"{"channel":"push.depth.full","data":{"asks":[],"bids":[[5,1,1]]},"ts":1}"#;
        match adapter().decode(msg).unwrap() {
            MarketEvent::Book(update) => assert_eq!(update.ask, SideUpdate::Keep),
            other => panic!("expected book update, got {:?}", other),
        }
    }

    #[test]
    fn test_housekeeping_channels() {
        let ack = r#"{"channel":"rs.sub.depth.full","data":"success","ts":1}"#;
        assert_eq!(adapter().decode(ack).unwrap(), MarketEvent::SubscribeAck);

        let nack = r#"{"channel":"rs.sub.depth.full","data":"contract not exists","ts":1}"#;
        assert_eq!(
            adapter().decode(nack).unwrap(),
            MarketEvent::SubscribeRejected("contract not exists".into())
        );

        assert_eq!(adapter().decode(r#"{"channel":"pong","data":1}"#).unwrap(), MarketEvent::Pong);
        assert_eq!(adapter().decode(r#"{"channel":"clientId","data":"x"}"#).unwrap(), MarketEvent::Ignored);
        assert_eq!(adapter().decode(r#"{"channel":"rs.error","data":"?"}"#).unwrap(), MarketEvent::Unknown);
    }

    #[test]
    fn test_depth_without_ts_is_decode_error() {
        let msg = r#"{"channel":"push.depth.full","data":{"asks":[],"bids":[]}}"#;
        assert!(adapter().decode(msg).is_err());
        let msg = r#"{"channel":"push.depth.full","data":{"asks":[[]],"bids":[]},"ts":1}"#;
        assert!(adapter().decode(msg).is_err());
    }
}
