// Source: wss://fx-ws.gateio.ws/v4/ws/usdt (futures.book_ticker)
use serde::Deserialize;
use serde_json::Value;

pub const BOOK_TICKER_CHANNEL: &str = "futures.book_ticker";

#[derive(Debug, Deserialize)]
pub struct WsMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub result: Option<Value>, // BookTicker on "update", {"status": ..} on "subscribe"
    #[serde(default)]
    pub error: Option<WsError>,
}

#[derive(Debug, Deserialize)]
pub struct WsError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookTicker {
    pub t: i64, // ms
    #[serde(rename = "b", default)]
    pub bid: String,
    #[serde(rename = "B", default)]
    pub bid_size: f64,
    #[serde(rename = "a", default)]
    pub ask: String,
    #[serde(rename = "A", default)]
    pub ask_size: f64,
}
