// Market data module entrypoint
pub mod adapters;   // venue sessions (Binance, Gate.io, Mexc)
pub mod normaliser; // wire prices -> fee-adjusted quotes
pub mod quote_cell; // latest-quote cell shared with the scanner
pub mod router;     // spawns and supervises everything
