// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the training core and its collaborators.
// The trainer only ever sees these traits:
//
//   SampleReader — turns a data file into ordered Samples
//                  (CsvSampleReader in the data layer)
//   LogSink      — receives named scalars per step / epoch
//                  (CsvLogSink in the infra layer)

use std::{fmt, path::Path};

use anyhow::Result;

use crate::domain::sample::Sample;

// ─── SampleReader ─────────────────────────────────────────────────────────────
/// Reads raw samples from a file. Must be deterministic for a given path:
/// the same file always yields the same samples in the same order.
pub trait SampleReader {
    fn read_samples(&self, path: &Path) -> Result<Vec<Sample>>;
}

// ─── LogSink ──────────────────────────────────────────────────────────────────
/// Granularity of a logged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPoint {
    /// Global optimizer step (training) or validation batch counter.
    Step(u64),
    Epoch(usize),
}

impl fmt::Display for LogPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPoint::Step(s)  => write!(f, "step,{s}"),
            LogPoint::Epoch(e) => write!(f, "epoch,{e}"),
        }
    }
}

/// Receives named scalar values. Storage and visualisation are the sink's
/// business; the trainer only names values and says when they happened.
pub trait LogSink: Send + Sync {
    fn log_scalar(&self, name: &str, value: f64, at: LogPoint);
}
