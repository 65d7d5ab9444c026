//! Connection state machine shared by every venue adapter.
//!
//! `DISCONNECTED -> TCP_CONNECTED -> TLS_ESTABLISHED -> WS_HANDSHAKED ->
//! SUBSCRIBED -> STREAMING`, and back to `DISCONNECTED` on any error, after
//! which [`Session::run`] waits out a backoff delay and starts over. Only the
//! shutdown signal ends the loop.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_native_tls::native_tls;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, trace, warn};

use super::backoff::{Backoff, ReconnectConfig};
use super::{AckPolicy, MarketEvent, StreamError, VenueAdapter};
use crate::engine::types::Exchange;
use crate::market_data::normaliser::Normaliser;
use crate::market_data::quote_cell::QuotePublisher;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
const CLIENT_AGENT: &str = concat!("xspread-rs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    TcpConnected,
    TlsEstablished,
    WsHandshaked,
    Subscribed,
    Streaming,
}

pub struct Session<A: VenueAdapter> {
    adapter: A,
    publisher: QuotePublisher,
    normaliser: Normaliser,
    backoff: Backoff,
    state: SessionState,
    /// A book update arrived on the current connection.
    streamed: bool,
}

impl<A: VenueAdapter> Session<A> {
    pub fn new(adapter: A, publisher: QuotePublisher, reconnect: ReconnectConfig) -> Self {
        let normaliser = Normaliser::new(adapter.instrument().fees);
        Self {
            adapter,
            publisher,
            normaliser,
            backoff: Backoff::new(reconnect),
            state: SessionState::Disconnected,
            streamed: false,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Stream until `shutdown` flips to true (or its sender goes away),
    /// reconnecting with backoff whenever a session fails.
    #[instrument(
        name = "stream",
        skip_all,
        fields(coin = %self.adapter.instrument().coin, exchange = %self.adapter.exchange())
    )]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let instrument = self.adapter.instrument();
        info!(
            host = %instrument.host,
            port = instrument.port,
            path = %instrument.path,
            "starting stream"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once(&mut shutdown).await {
                Ok(()) => break,
                Err(err) => {
                    warn!(error = %err, state = ?self.state, "stream session failed");
                    metrics::counter!("xspread_reconnects_total", "exchange" => self.adapter.exchange().as_str())
                        .increment(1);
                }
            }

            self.transition(SessionState::Disconnected);
            let delay = self.backoff.next_delay();
            info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.attempts(),
                "reconnecting after delay"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.transition(SessionState::Disconnected);
        info!("stream stopped");
    }

    /// One pass through the state machine. `Ok` means we were asked to stop.
    async fn run_once(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), StreamError> {
        self.streamed = false;
        let mut ws = tokio::select! {
            ws = self.establish() => ws?,
            _ = wait_for_shutdown(shutdown) => return Ok(()),
        };

        self.transition(SessionState::Streaming);
        info!("streaming");

        self.stream_loop(&mut ws, shutdown).await
    }

    async fn establish(&mut self) -> Result<WsStream, StreamError> {
        let stream = self.connect().await?;
        let mut ws = self.handshake_websocket(stream).await?;
        self.subscribe(&mut ws).await?;
        Ok(ws)
    }

    /// TCP connect, then TLS with SNI set to the target host.
    pub async fn connect(&mut self) -> Result<MaybeTlsStream<TcpStream>, StreamError> {
        let instrument = self.adapter.instrument();
        let exchange = instrument.exchange;
        let host = instrument.host.clone();
        let port = instrument.port;
        let tls = instrument.tls;
        let target = format!("{}:{}", host, port);
        let connection_error =
            |reason: String| StreamError::Connection { exchange, target: target.clone(), reason };

        let tcp = time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| connection_error("tcp connect timed out".to_string()))?
            .map_err(|e| connection_error(e.to_string()))?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(error = %e, "could not set TCP_NODELAY");
        }
        debug!(%target, "tcp connected");
        self.transition(SessionState::TcpConnected);

        if !tls {
            return Ok(MaybeTlsStream::Plain(tcp));
        }

        let connector = native_tls::TlsConnector::new().map_err(|e| connection_error(e.to_string()))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        // the venues' front-ends route on the SNI name
        let stream = time::timeout(CONNECT_TIMEOUT, connector.connect(&host, tcp))
            .await
            .map_err(|_| connection_error("tls handshake timed out".to_string()))?
            .map_err(|e| connection_error(e.to_string()))?;
        debug!(%target, "tls established");
        self.transition(SessionState::TlsEstablished);

        Ok(MaybeTlsStream::NativeTls(stream))
    }

    pub async fn handshake_websocket(
        &mut self,
        stream: MaybeTlsStream<TcpStream>,
    ) -> Result<WsStream, StreamError> {
        let exchange = self.adapter.exchange();
        let url = self.adapter.instrument().url();
        let handshake_error = |reason: String| StreamError::Handshake { exchange, reason };

        let mut request = url.as_str().into_client_request().map_err(|e| handshake_error(e.to_string()))?;
        request.headers_mut().insert(USER_AGENT, HeaderValue::from_static(CLIENT_AGENT));

        let (ws, response) = time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::client_async(request, stream))
            .await
            .map_err(|_| handshake_error("websocket handshake timed out".to_string()))?
            .map_err(|e| handshake_error(e.to_string()))?;
        debug!(%url, status = %response.status(), "websocket handshake complete");
        self.transition(SessionState::WsHandshaked);

        Ok(ws)
    }

    pub async fn subscribe(&mut self, ws: &mut WsStream) -> Result<(), StreamError> {
        let exchange = self.adapter.exchange();

        if let Some(request) = self.adapter.subscribe_request() {
            debug!(%request, "sending subscribe request");
            ws.send(Message::Text(request)).await.map_err(|e| transport_error(exchange, e))?;
        }

        let policy = self.adapter.ack_policy();
        if policy != AckPolicy::None {
            time::timeout(SUBSCRIBE_TIMEOUT, self.await_ack(ws, policy))
                .await
                .map_err(|_| StreamError::Subscription {
                    exchange,
                    reason: "no acknowledgment received".to_string(),
                })??;
            info!("subscribe success");
        }

        self.transition(SessionState::Subscribed);
        Ok(())
    }

    async fn await_ack(&mut self, ws: &mut WsStream, policy: AckPolicy) -> Result<(), StreamError> {
        let exchange = self.adapter.exchange();
        let rejected = |reason: String| StreamError::Subscription { exchange, reason };

        loop {
            let Some(text) = read_text(ws, exchange).await? else { continue };

            let event = match self.adapter.decode(&text) {
                Ok(event) => event,
                Err(err) if policy == AckPolicy::FirstMessage => return Err(rejected(err.to_string())),
                Err(err) => {
                    warn!(error = %err, msg = %text, "dropping undecodable message");
                    continue;
                }
            };

            match event {
                MarketEvent::SubscribeAck => return Ok(()),
                MarketEvent::SubscribeRejected(reason) => return Err(rejected(reason)),
                _ if policy == AckPolicy::FirstMessage => {
                    return Err(rejected(format!("expected subscribe ack, got {}", text)));
                }
                other => self.handle_event(other, &text)?,
            }
        }
    }

    async fn stream_loop(
        &mut self,
        ws: &mut WsStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), StreamError> {
        let exchange = self.adapter.exchange();
        let mut keepalive = self.adapter.keepalive().map(|(period, payload)| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (interval, payload)
        });

        loop {
            tokio::select! {
                _ = wait_for_shutdown(shutdown) => {
                    info!("shutdown requested, closing websocket");
                    if let Err(e) = ws.close(None).await {
                        debug!(error = %e, "close failed");
                    }
                    return Ok(());
                }
                payload = next_tick(&mut keepalive) => {
                    debug!(%payload, "sending keepalive");
                    ws.send(Message::Text(payload)).await.map_err(|e| transport_error(exchange, e))?;
                }
                frame = read_text(ws, exchange) => {
                    let Some(text) = frame? else { continue };
                    match self.adapter.decode(&text) {
                        Ok(event) => self.handle_event(event, &text)?,
                        Err(err) if err.ends_session() => return Err(err),
                        Err(err) => warn!(error = %err, msg = %text, "dropping undecodable message"),
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: MarketEvent, raw: &str) -> Result<(), StreamError> {
        match event {
            MarketEvent::Book(update) => {
                // the delay only starts over once data flows
                if !self.streamed {
                    self.streamed = true;
                    self.backoff.reset();
                }
                let quote = self.normaliser.apply(self.publisher.last().as_deref(), &update);
                if let (Some(bid), Some(ask)) = (quote.bid(), quote.ask()) {
                    debug!(bid, ask, "top of book");
                }
                self.publisher.publish(quote);
            }
            MarketEvent::SubscribeAck => debug!("subscribe acknowledged"),
            MarketEvent::SubscribeRejected(reason) => {
                return Err(StreamError::Subscription { exchange: self.adapter.exchange(), reason });
            }
            MarketEvent::Pong => debug!("received pong message"),
            MarketEvent::Ignored => {}
            MarketEvent::Unknown => {
                warn!(msg = %raw, "unknown message received");
                metrics::counter!("xspread_unknown_messages_total", "exchange" => self.adapter.exchange().as_str())
                    .increment(1);
            }
        }
        Ok(())
    }
}

/// Read one frame. Control frames are dealt with here and yield `None`.
async fn read_text(ws: &mut WsStream, exchange: Exchange) -> Result<Option<String>, StreamError> {
    match ws.next().await {
        Some(Ok(Message::Text(text))) => {
            trace!(msg = %text, "received");
            Ok(Some(text))
        }
        Some(Ok(Message::Ping(payload))) => {
            debug!(len = payload.len(), "received ping frame");
            // tungstenite has queued the pong, push it out now
            ws.flush().await.map_err(|e| transport_error(exchange, e))?;
            Ok(None)
        }
        Some(Ok(Message::Pong(_))) => {
            debug!("received pong frame");
            Ok(None)
        }
        Some(Ok(Message::Close(frame))) => Err(StreamError::Closed {
            exchange,
            reason: frame
                .map(|f| format!("{} {}", f.code, f.reason))
                .unwrap_or_else(|| "close frame".to_string()),
        }),
        Some(Ok(Message::Binary(bytes))) => {
            debug!(len = bytes.len(), "ignoring binary frame");
            Ok(None)
        }
        Some(Ok(Message::Frame(_))) => Ok(None),
        Some(Err(e)) => Err(transport_error(exchange, e)),
        None => Err(StreamError::Closed { exchange, reason: "stream ended".to_string() }),
    }
}

async fn next_tick(keepalive: &mut Option<(Interval, String)>) -> String {
    match keepalive {
        Some((interval, payload)) => {
            interval.tick().await;
            payload.clone()
        }
        None => std::future::pending().await,
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as a request.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn transport_error(exchange: Exchange, err: tungstenite::Error) -> StreamError {
    StreamError::Transport { exchange, reason: err.to_string() }
}
