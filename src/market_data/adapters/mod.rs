// Shared trait + events for exchange streaming adapters

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::types::{Exchange, Instrument};

pub mod backoff;
pub mod session;

pub mod binance;
pub mod binance_types;
pub mod gateio;
pub mod gateio_types;
pub mod mexc;
pub mod mexc_types;

/// Errors an adapter session can hit. Apart from `Decode`, all of them end
/// the current connection and send the session back through its reconnect loop.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("{exchange} connection to {target} failed: {reason}")]
    Connection {
        exchange: Exchange,
        target: String,
        reason: String,
    },

    #[error("{exchange} websocket handshake failed: {reason}")]
    Handshake { exchange: Exchange, reason: String },

    #[error("{exchange} rejected subscription: {reason}")]
    Subscription { exchange: Exchange, reason: String },

    #[error("{exchange} sent an undecodable message: {reason}")]
    Decode { exchange: Exchange, reason: String },

    #[error("{exchange} transport error: {reason}")]
    Transport { exchange: Exchange, reason: String },

    #[error("{exchange} closed the connection: {reason}")]
    Closed { exchange: Exchange, reason: String },
}

impl StreamError {
    pub fn decode(exchange: Exchange, reason: impl ToString) -> Self {
        StreamError::Decode { exchange, reason: reason.to_string() }
    }

    pub fn exchange(&self) -> Exchange {
        match self {
            StreamError::Connection { exchange, .. }
            | StreamError::Handshake { exchange, .. }
            | StreamError::Subscription { exchange, .. }
            | StreamError::Decode { exchange, .. }
            | StreamError::Transport { exchange, .. }
            | StreamError::Closed { exchange, .. } => *exchange,
        }
    }

    /// Decode errors only drop the offending message; everything else tears
    /// the connection down.
    pub fn ends_session(&self) -> bool {
        !matches!(self, StreamError::Decode { .. })
    }
}

/// What one side of the book did in an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SideUpdate {
    /// Side absent from this event; keep whatever was published before.
    Keep,
    /// Mark the side as having no price.
    Clear,
    /// New best price as reported by the exchange, before fees.
    Set(f64),
}

/// Exchange-agnostic top-of-book update, before fee adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub bid: SideUpdate,
    pub ask: SideUpdate,
    pub time: DateTime<Utc>,
}

/// Decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Book(BookUpdate),
    SubscribeAck,
    SubscribeRejected(String),
    Pong,
    /// Known housekeeping message with nothing to do.
    Ignored,
    /// Well-formed JSON we don't recognise.
    Unknown,
}

/// How a venue confirms a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Subscription lives in the connection path.
    None,
    /// The very next message must be the ack.
    FirstMessage,
    /// Keep reading until an ack or a rejection shows up.
    Await,
}

/// Exchange-specific half of a streaming session: what to send and how to
/// read what comes back. Connection handling lives in [`session::Session`].
pub trait VenueAdapter: Send + 'static {
    fn instrument(&self) -> &Instrument;

    fn exchange(&self) -> Exchange {
        self.instrument().exchange
    }

    /// Text frame sent right after the handshake, if the venue wants one.
    fn subscribe_request(&self) -> Option<String>;

    fn ack_policy(&self) -> AckPolicy;

    /// Application-level ping: period and payload.
    fn keepalive(&self) -> Option<(Duration, String)> {
        None
    }

    fn decode(&self, text: &str) -> Result<MarketEvent, StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_do_not_end_session() {
        let err = StreamError::decode(Exchange::Mexc, "bad level");
        assert!(!err.ends_session());
        assert_eq!(err.exchange(), Exchange::Mexc);

        let err = StreamError::Closed { exchange: Exchange::Binance, reason: "bye".into() };
        assert!(err.ends_session());
        assert_eq!(err.to_string(), "Binance closed the connection: bye");
    }
}
