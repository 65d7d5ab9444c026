// Source: wss://fstream.binance.com/ws/<symbol>@depth20@100ms (partial book depth)
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DepthUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "b", default)]
    pub bids: Vec<WsLevel>, // best first
    #[serde(rename = "a", default)]
    pub asks: Vec<WsLevel>, // best first
}

#[derive(Debug, Deserialize)]
pub struct WsLevel(
    pub String, // price, e.g. "27000.10"
    pub String, // quantity
);
