//! Spread sinks: where the scanner's reports end up.
//!
//! Every report is offered twice, once under its coin and once under the
//! aggregate key. Sinks are best-effort: a failed write is logged and the
//! scanner carries on.

pub mod types;
pub use types::*;
pub mod csv_sink;
pub mod memory;

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::report::SpreadReport;

pub use csv_sink::CsvSpreadSink;
pub use memory::MemorySpreadSink;

pub trait SpreadSink: Send + Sync {
    fn record(&self, key: &SinkKey, report: &SpreadReport) -> SinkResult<()>;
}

/// Send `report` to its coin key and the aggregate key.
pub fn emit(sink: &dyn SpreadSink, report: &SpreadReport) {
    for key in [SinkKey::coin(&report.coin), SinkKey::Aggregate] {
        if let Err(e) = sink.record(&key, report) {
            warn!(%key, error = %e, "spread sink write failed");
        }
    }
}

/// Logs each report once, on the aggregate key.
#[derive(Debug, Default)]
pub struct TracingSpreadSink;

impl SpreadSink for TracingSpreadSink {
    fn record(&self, key: &SinkKey, report: &SpreadReport) -> SinkResult<()> {
        if *key == SinkKey::Aggregate {
            info!(
                coin = %report.coin,
                spread_pct = report.spread_pct,
                maker = %report.maker.instrument.exchange,
                taker = %report.taker.instrument.exchange,
                staleness_ms = report.staleness_ms,
                "spread\n{}",
                report
            );
        }
        Ok(())
    }
}

/// Offers every record to each inner sink. All sinks are tried; the first
/// error is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn SpreadSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn SpreadSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SpreadSink for FanoutSink {
    fn record(&self, key: &SinkKey, report: &SpreadReport) -> SinkResult<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(key, report) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
