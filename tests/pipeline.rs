// Router end to end: local venues -> sessions -> quote cells -> scanner -> sink.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use xspread_rs::engine::types::{Exchange, Instrument};
use xspread_rs::market_data::router::Router;
use xspread_rs::persist::{MemorySpreadSink, SinkKey, SpreadSink};
use xspread_rs::settings::Settings;

/// Serve one scripted session per connection: optionally wait for a
/// subscribe request, then send `messages` and keep the socket open.
async fn venue(wait_for_subscribe: bool, messages: Vec<&'static str>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let messages = messages.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else { return };
                if wait_for_subscribe {
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_text() {
                            break;
                        }
                    }
                }
                for msg in messages {
                    if ws.send(Message::Text(msg.to_string())).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    port
}

fn settings(min_profit: f64, mode: &str) -> Settings {
    let json = format!(
        r#"{{
            "log_level": "debug",
            "scan_frequency_ms": 20,
            "min_profit": {},
            "coins": ["btc"],
            "exchanges": ["binance", "gate"],
            "report_mode": "{}",
            "reconnect": {{"initial_delay_ms": 20, "max_delay_ms": 200}}
        }}"#,
        min_profit, mode
    );
    Settings::from_json(&json).unwrap()
}

async fn local_instruments(settings: &Settings) -> Vec<Instrument> {
    let binance = venue(
        false,
        vec![r#"{"e":"depthUpdate","E":1700000000000,"b":[["100.0","1"]],"a":[["101.0","1"]]}"#],
    )
    .await;
    let gate = venue(
        true,
        vec![
            r#"{"channel":"futures.book_ticker","event":"subscribe","result":{"status":"success"}}"#,
            r#"{"channel":"futures.book_ticker","event":"update","result":{"t":1700000000040,"b":"102","B":0,"a":"102.5","A":0}}"#,
        ],
    )
    .await;

    settings
        .instruments()
        .into_iter()
        .map(|inst| {
            let port = match inst.exchange {
                Exchange::Binance => binance,
                _ => gate,
            };
            inst.with_endpoint("127.0.0.1", port, false)
        })
        .collect()
}

async fn wait_for_records(sink: &MemorySpreadSink, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.len() < count {
        assert!(Instant::now() < deadline, "only {} records", sink.len());
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn reports_cross_exchange_spread() {
    let settings = settings(0.5, "every_cycle");
    let router = Router::from_settings(&settings).with_instruments(local_instruments(&settings).await);
    assert_eq!(router.instruments().len(), 2);

    let sink = Arc::new(MemorySpreadSink::new());
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(router.run(Arc::clone(&sink) as Arc<dyn SpreadSink>, rx));

    // every cycle reports again
    wait_for_records(&sink, 6).await;
    tx.send(true).unwrap();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

    let per_coin = sink.reports_for(&SinkKey::coin("BTC"));
    let aggregate = sink.reports_for(&SinkKey::Aggregate);
    assert_eq!(per_coin.len(), aggregate.len());

    let report = &per_coin[0];
    assert_eq!(report.maker.instrument.exchange, Exchange::GateIo);
    assert_eq!(report.taker.instrument.exchange, Exchange::Binance);
    assert_eq!(report.maker.pure, 102.5);
    assert_eq!(report.taker.pure, 100.0);
    let expected = 100.0 * (102.5 * (1.0 - 0.00015) - 100.04) / (102.5 * (1.0 - 0.00015));
    assert!((report.spread_pct - expected).abs() < 1e-9);
    assert_eq!(report.staleness_ms, 40);
}

#[tokio::test]
async fn on_change_reports_standing_spread_once() {
    let settings = settings(0.5, "on_change");
    let router = Router::from_settings(&settings).with_instruments(local_instruments(&settings).await);

    let sink = Arc::new(MemorySpreadSink::new());
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(router.run(Arc::clone(&sink) as Arc<dyn SpreadSink>, rx));

    wait_for_records(&sink, 2).await;
    // several more scan cycles
    sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn nothing_reported_below_threshold() {
    let settings = settings(10.0, "every_cycle");
    let router = Router::from_settings(&settings).with_instruments(local_instruments(&settings).await);

    let sink = Arc::new(MemorySpreadSink::new());
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(router.run(Arc::clone(&sink) as Arc<dyn SpreadSink>, rx));

    sleep(Duration::from_millis(300)).await;
    tx.send(true).unwrap();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

    assert!(sink.is_empty());
}
