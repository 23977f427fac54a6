// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// LogSink that appends every logged scalar to a CSV file.
//
// One row per value, long format, so step-level losses and
// epoch-level correlations share a single file:
//
//   granularity,index,name,value
//   step,0,train_loss,1.283100
//   step,1,train_loss,0.944020
//   epoch,0,val_pearson,0.412877
//   epoch,0,train_loss_epoch,1.113560
//
// The file is appended to, so a resumed run keeps its history.
// Values are also echoed at debug level through tracing.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};

use crate::domain::traits::{LogPoint, LogSink};

pub const METRICS_FILE: &str = "metrics.csv";

pub struct CsvLogSink {
    csv_path: PathBuf,
    writer:   Mutex<csv::Writer<fs::File>>,
}

impl CsvLogSink {
    /// Open `{dir}/metrics.csv`, writing the header if the file is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
        let csv_path = dir.join(METRICS_FILE);
        let is_new = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", csv_path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["granularity", "index", "name", "value"])?;
            writer.flush()?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, writer: Mutex::new(writer) })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    fn write_row(&self, name: &str, value: f64, at: LogPoint) -> Result<()> {
        let (granularity, index) = match at {
            LogPoint::Step(s)  => ("step", s.to_string()),
            LogPoint::Epoch(e) => ("epoch", e.to_string()),
        };
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("metrics writer lock poisoned"))?;
        writer.write_record([granularity, index.as_str(), name, format!("{value:.6}").as_str()])?;
        writer.flush()?;
        Ok(())
    }
}

impl LogSink for CsvLogSink {
    fn log_scalar(&self, name: &str, value: f64, at: LogPoint) {
        tracing::debug!("{} {} = {:.6}", at, name, value);
        if let Err(e) = self.write_row(name, value, at) {
            tracing::warn!("Cannot log '{}': {:#}", name, e);
        }
    }
}
