// Append-only spread CSVs: <dir>/<COIN>.csv and <dir>/all.csv
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use super::{SinkError, SinkKey, SinkResult, SpreadSink, CSV_HEADER};
use crate::engine::report::SpreadReport;

pub struct CsvSpreadSink {
    dir: PathBuf,
    writers: Mutex<HashMap<SinkKey, csv::Writer<File>>>,
}

impl CsvSpreadSink {
    pub fn new(dir: impl AsRef<Path>) -> SinkResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io { path: dir.clone(), source })?;
        Ok(Self { dir, writers: Mutex::new(HashMap::new()) })
    }

    pub fn path_for(&self, key: &SinkKey) -> PathBuf {
        self.dir.join(format!("{}.csv", key))
    }

    fn open(&self, key: &SinkKey) -> SinkResult<csv::Writer<File>> {
        let path = self.path_for(key);
        let io_err = |source| SinkError::Io { path: path.clone(), source };

        let file = OpenOptions::new().create(true).append(true).open(&path).map_err(io_err)?;
        let is_new = file.metadata().map_err(io_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(CSV_HEADER)?;
        }
        debug!(path = %path.display(), is_new, "opened spread file");
        Ok(writer)
    }
}

impl SpreadSink for CsvSpreadSink {
    fn record(&self, key: &SinkKey, report: &SpreadReport) -> SinkResult<()> {
        let mut writers = self.writers.lock();
        if !writers.contains_key(key) {
            let writer = self.open(key)?;
            writers.insert(key.clone(), writer);
        }
        if let Some(writer) = writers.get_mut(key) {
            writer.serialize(report.record(Utc::now()))?;
            writer.flush().map_err(|source| SinkError::Io { path: self.path_for(key), source })?;
        }
        Ok(())
    }
}
