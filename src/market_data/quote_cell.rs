//! Latest-quote cell shared between one adapter and the scanner.
//!
//! The adapter owns the only [`QuotePublisher`]; the scanner holds any number
//! of [`QuoteReader`]s. Publishing swaps in a whole new `Arc<Quote>`, so a
//! reader gets either the old snapshot or the new one, never a mix, and
//! neither side ever waits on a lock.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::engine::types::{Instrument, Quote};

/// Create the cell for one instrument. Starts out unset.
pub fn quote_cell(instrument: Instrument) -> (QuotePublisher, QuoteReader) {
    let instrument = Arc::new(instrument);
    let slot = Arc::new(ArcSwapOption::empty());
    (
        QuotePublisher { instrument: Arc::clone(&instrument), slot: Arc::clone(&slot) },
        QuoteReader { instrument, slot },
    )
}

/// Write half. Deliberately not `Clone`: one writer per instrument.
#[derive(Debug)]
pub struct QuotePublisher {
    instrument: Arc<Instrument>,
    slot: Arc<ArcSwapOption<Quote>>,
}

impl QuotePublisher {
    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn publish(&self, quote: Quote) {
        self.slot.store(Some(Arc::new(quote)));
        metrics::counter!("xspread_quotes_published_total", "exchange" => self.instrument.exchange.as_str())
            .increment(1);
    }

    /// What this publisher stored last.
    pub fn last(&self) -> Option<Arc<Quote>> {
        self.slot.load_full()
    }
}

#[derive(Debug, Clone)]
pub struct QuoteReader {
    instrument: Arc<Instrument>,
    slot: Arc<ArcSwapOption<Quote>>,
}

impl QuoteReader {
    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn latest(&self) -> Option<Arc<Quote>> {
        self.slot.load_full()
    }
}
