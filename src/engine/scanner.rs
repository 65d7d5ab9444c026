//! Arbitrage scanner.
//!
//! Every cycle it reads the latest quote of each instrument, pairs up the
//! exchanges quoting the same coin and reports the pairs where buying on one
//! venue and selling on the other clears `min_profit_pct` after fees.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, instrument};

use crate::engine::report::{Leg, ScanError, SpreadReport};
use crate::engine::types::{Exchange, Quote};
use crate::market_data::adapters::session::wait_for_shutdown;
use crate::market_data::quote_cell::QuoteReader;
use crate::persist::{emit, SpreadSink};

/// Whether a standing opportunity is reported every cycle or only when it appears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    #[default]
    EveryCycle,
    /// Report once when the condition starts holding; re-arm once it stops.
    OnChange,
}

/// Which leg of a pair should be the maker (the leg whose ask we lift).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FirstMakes,
    SecondMakes,
}

/// Profitability test for one pair, on fee-adjusted prices.
///
/// On an exact tie the second leg makes. Returns `None` when either side of
/// either quote is missing or neither direction clears the threshold.
pub fn profitable_direction(a: &Quote, b: &Quote, min_profit_pct: f64) -> Option<Direction> {
    let (a_bid, a_ask) = (a.bid()?, a.ask()?);
    let (b_bid, b_ask) = (b.bid()?, b.ask()?);

    let spread_ab = a_ask - b_bid;
    let spread_ba = b_ask - a_bid;

    if spread_ab > spread_ba && spread_ab >= a_ask * min_profit_pct * 0.01 {
        Some(Direction::FirstMakes)
    } else if spread_ba >= spread_ab && spread_ba >= b_ask * min_profit_pct * 0.01 {
        Some(Direction::SecondMakes)
    } else {
        None
    }
}

type OpportunityKey = (String, Exchange, Exchange);

struct CoinGroup {
    coin: String,
    readers: Vec<QuoteReader>,
}

pub struct Scanner {
    groups: Vec<CoinGroup>,
    min_profit_pct: f64,
    interval: Duration,
    mode: ReportMode,
    standing: HashSet<OpportunityKey>,
}

impl Scanner {
    /// Readers are grouped by coin; within a coin they keep the given order.
    pub fn new(readers: Vec<QuoteReader>, min_profit_pct: f64, interval: Duration) -> Self {
        let mut groups: Vec<CoinGroup> = Vec::new();
        for reader in readers {
            let coin = reader.instrument().coin.clone();
            match groups.iter_mut().find(|g| g.coin == coin) {
                Some(group) => group.readers.push(reader),
                None => groups.push(CoinGroup { coin, readers: vec![reader] }),
            }
        }

        Self {
            groups,
            min_profit_pct,
            interval,
            mode: ReportMode::default(),
            standing: HashSet::new(),
        }
    }

    pub fn with_report_mode(mut self, mode: ReportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn coins(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.coin.as_str())
    }

    /// One pass over every coin.
    pub fn scan_once(&mut self) -> Result<Vec<SpreadReport>, ScanError> {
        let mut reports = Vec::new();

        for group in &self.groups {
            let legs: Vec<Leg> = group
                .readers
                .iter()
                .filter_map(|r| r.latest().map(|q| Leg::new(Arc::clone(r.instrument()), q)))
                .filter(|leg| leg.quote.is_two_sided())
                .collect();

            for (a, b) in legs.iter().tuple_combinations() {
                debug!(
                    coin = %group.coin,
                    first = %a.instrument.exchange,
                    second = %b.instrument.exchange,
                    "checking pair"
                );
                let report = match profitable_direction(&a.quote, &b.quote, self.min_profit_pct) {
                    Some(Direction::FirstMakes) => SpreadReport::new(a, b)?,
                    Some(Direction::SecondMakes) => SpreadReport::new(b, a)?,
                    None => continue,
                };
                reports.push(report);
            }
        }

        if self.mode == ReportMode::OnChange {
            let current: HashSet<OpportunityKey> = reports.iter().map(opportunity_key).collect();
            let previous = std::mem::replace(&mut self.standing, current);
            reports.retain(|r| !previous.contains(&opportunity_key(r)));
        }

        Ok(reports)
    }

    /// Scan every `interval` until shutdown. An invariant violation stops the
    /// scanner and is handed back to the caller.
    #[instrument(name = "scanner", skip_all)]
    pub async fn run(
        mut self,
        sink: Arc<dyn SpreadSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ScanError> {
        info!(
            coins = self.groups.len(),
            interval_ms = self.interval.as_millis() as u64,
            min_profit_pct = self.min_profit_pct,
            mode = ?self.mode,
            "scanner started"
        );

        loop {
            debug!("start iteration");
            let reports = match self.scan_once() {
                Ok(reports) => reports,
                Err(err) => {
                    error!(error = %err, "scan aborted");
                    return Err(err);
                }
            };

            for report in &reports {
                metrics::counter!("xspread_spreads_reported_total", "coin" => report.coin.clone()).increment(1);
                metrics::histogram!("xspread_spread_staleness_ms").record(report.staleness_ms as f64);
                emit(sink.as_ref(), report);
            }
            debug!(reported = reports.len(), "finish iteration");

            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("scanner stopped");
        Ok(())
    }
}

fn opportunity_key(report: &SpreadReport) -> OpportunityKey {
    (
        report.coin.clone(),
        report.maker.instrument.exchange,
        report.taker.instrument.exchange,
    )
}
