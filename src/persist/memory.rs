use parking_lot::Mutex;

use super::{SinkKey, SinkResult, SpreadSink};
use crate::engine::report::SpreadReport;

/// Keeps every record in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySpreadSink {
    records: Mutex<Vec<(SinkKey, SpreadReport)>>,
}

impl MemorySpreadSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(SinkKey, SpreadReport)> {
        self.records.lock().clone()
    }

    pub fn reports_for(&self, key: &SinkKey) -> Vec<SpreadReport> {
        self.records
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl SpreadSink for MemorySpreadSink {
    fn record(&self, key: &SinkKey, report: &SpreadReport) -> SinkResult<()> {
        self.records.lock().push((key.clone(), report.clone()));
        Ok(())
    }
}
