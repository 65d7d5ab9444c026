// Binance USD-M futures partial depth stream

use serde_json::Value;

use super::binance_types::{DepthUpdate, WsLevel};
use super::{AckPolicy, BookUpdate, MarketEvent, SideUpdate, StreamError, VenueAdapter};
use crate::engine::types::{Exchange, Instrument};
use crate::market_data::normaliser::{event_time, parse_price};

pub struct BinanceAdapter {
    instrument: Instrument,
}

impl BinanceAdapter {
    pub fn new(instrument: Instrument) -> Self {
        Self { instrument }
    }

    // Empty side leaves the previous price in place.
    fn best(levels: &[WsLevel]) -> Result<SideUpdate, StreamError> {
        match levels.first() {
            Some(level) => Ok(SideUpdate::Set(parse_price(Exchange::Binance, &level.0)?)),
            None => Ok(SideUpdate::Keep),
        }
    }
}

impl VenueAdapter for BinanceAdapter {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    // Subscription is encoded in the path.
    fn subscribe_request(&self) -> Option<String> {
        None
    }

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::None
    }

    fn decode(&self, text: &str) -> Result<MarketEvent, StreamError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| StreamError::decode(Exchange::Binance, e))?;

        if value.get("e").and_then(Value::as_str) != Some("depthUpdate") {
            return Ok(MarketEvent::Unknown);
        }

        let depth: DepthUpdate =
            serde_json::from_value(value).map_err(|e| StreamError::decode(Exchange::Binance, e))?;

        Ok(MarketEvent::Book(BookUpdate {
            bid: Self::best(&depth.bids)?,
            ask: Self::best(&depth.asks)?,
            time: event_time(Exchange::Binance, depth.event_time)?,
        }))
    }
}
