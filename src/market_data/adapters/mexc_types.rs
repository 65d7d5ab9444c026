// Source: wss://contract.mexc.com/ws (sub.depth.full)
use serde::Deserialize;
use serde_json::Value;

pub const DEPTH_CHANNEL: &str = "push.depth.full";
pub const SUBSCRIBE_ACK_CHANNEL: &str = "rs.sub.depth.full";
pub const PONG_CHANNEL: &str = "pong";
pub const CLIENT_ID_CHANNEL: &str = "clientId";

#[derive(Debug, Deserialize)]
pub struct WsMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Option<Value>, // Depth on push, "success" on ack
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Depth {
    #[serde(default)]
    pub bids: Vec<Vec<f64>>, // [price, volume, order count], best first
    #[serde(default)]
    pub asks: Vec<Vec<f64>>,
}
