// Router wires instruments to adapter sessions and the scanner, and owns their lifetimes
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::engine::report::ScanError;
use crate::engine::scanner::{ReportMode, Scanner};
use crate::engine::types::{Exchange, Instrument};
use crate::market_data::adapters::backoff::ReconnectConfig;
use crate::market_data::adapters::binance::BinanceAdapter;
use crate::market_data::adapters::gateio::GateIoAdapter;
use crate::market_data::adapters::mexc::MexcAdapter;
use crate::market_data::adapters::session::{wait_for_shutdown, Session};
use crate::market_data::quote_cell::{quote_cell, QuotePublisher};
use crate::persist::SpreadSink;
use crate::settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("scanner task failed: {0}")]
    Task(#[from] JoinError),
}

/// Start the streaming session for the instrument behind `publisher`.
pub fn spawn_stream(
    publisher: QuotePublisher,
    reconnect: ReconnectConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let instrument = Instrument::clone(publisher.instrument());
    match instrument.exchange {
        Exchange::Binance => {
            tokio::spawn(Session::new(BinanceAdapter::new(instrument), publisher, reconnect).run(shutdown))
        }
        Exchange::Mexc => {
            tokio::spawn(Session::new(MexcAdapter::new(instrument), publisher, reconnect).run(shutdown))
        }
        Exchange::GateIo => {
            tokio::spawn(Session::new(GateIoAdapter::new(instrument), publisher, reconnect).run(shutdown))
        }
    }
}

pub struct Router {
    instruments: Vec<Instrument>,
    reconnect: ReconnectConfig,
    min_profit: f64,
    scan_frequency: Duration,
    report_mode: ReportMode,
}

impl Router {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            instruments: settings.instruments(),
            reconnect: settings.reconnect.clone(),
            min_profit: settings.min_profit,
            scan_frequency: settings.scan_frequency,
            report_mode: settings.report_mode,
        }
    }

    /// Replace the instruments built from settings, e.g. to point them at
    /// other endpoints.
    pub fn with_instruments(mut self, instruments: Vec<Instrument>) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Run every stream and the scanner until `shutdown` fires or the
    /// scanner stops on its own, then stop and join everything.
    pub async fn run(
        self,
        sink: Arc<dyn SpreadSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RouterError> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut readers = Vec::with_capacity(self.instruments.len());
        let mut streams = Vec::with_capacity(self.instruments.len());
        for instrument in self.instruments {
            info!(
                coin = %instrument.coin,
                exchange = %instrument.exchange,
                host = %instrument.host,
                path = %instrument.path,
                maker_pct = instrument.fees.maker_pct,
                taker_pct = instrument.fees.taker_pct,
                "starting stream"
            );
            let (publisher, reader) = quote_cell(instrument);
            readers.push(reader);
            streams.push(spawn_stream(publisher, self.reconnect.clone(), stop_rx.clone()));
        }

        let scanner = Scanner::new(readers, self.min_profit, self.scan_frequency).with_report_mode(self.report_mode);
        let mut scanner_task = tokio::spawn(scanner.run(sink, stop_rx));

        let finished = tokio::select! {
            res = &mut scanner_task => Some(res),
            _ = wait_for_shutdown(&mut shutdown) => None,
        };

        info!(streams = streams.len(), "stopping tasks");
        if stop_tx.send(true).is_err() {
            debug!("no task left to stop");
        }

        let scan_result = match finished {
            Some(res) => res,
            None => scanner_task.await,
        };

        for stream in streams {
            if let Err(e) = stream.await {
                error!(error = %e, "stream task failed");
            }
        }

        info!("router stopped");
        scan_result??;
        Ok(())
    }
}
