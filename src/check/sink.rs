//! Progress sinks receiving periodic checker snapshots.
//!
//! Sinks are best-effort: the runner logs and swallows every push failure.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Aggregated state pushed to a [`ProgressSink`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Name of the checker producing the snapshot.
    pub checker: String,
    /// Items processed so far.
    pub processed: u64,
    /// Items whose verification failed outright.
    pub failed: u64,
    /// True for the snapshot emitted when the run finalizes.
    pub final_flush: bool,
    /// Progress grid counters as rows.
    pub grid: Vec<Vec<u64>>,
    /// Cumulative findings per category tag.
    pub category_totals: BTreeMap<String, u64>,
    /// Evidence recorded since the previous snapshot.
    pub evidence: BTreeMap<String, Vec<String>>,
}

/// Failure reported by a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the destination failed.
    #[error("sink io: {0}")]
    Io(#[from] io::Error),
    /// The snapshot could not be encoded.
    #[error("sink encoding: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The destination refused the snapshot.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of progress snapshots.
pub trait ProgressSink: Send + Sync {
    /// Delivers one snapshot.
    fn push(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError>;
}

/// Discards every snapshot.
#[derive(Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn push(&self, _snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Emits each snapshot as a structured `info` event.
#[derive(Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn push(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        let evidence: usize = snapshot.evidence.values().map(Vec::len).sum();
        info!(
            checker = %snapshot.checker,
            processed = snapshot.processed,
            failed = snapshot.failed,
            final_flush = snapshot.final_flush,
            totals = ?snapshot.category_totals,
            evidence,
            "check.progress"
        );
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Default)]
pub struct MemorySink {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the snapshots received so far.
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().clone()
    }

    /// Every evidence string received under `tag`, across snapshots.
    pub fn evidence(&self, tag: &str) -> Vec<String> {
        self.snapshots
            .lock()
            .iter()
            .filter_map(|snapshot| snapshot.evidence.get(tag))
            .flatten()
            .cloned()
            .collect()
    }
}

impl ProgressSink for MemorySink {
    fn push(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

/// Appends one JSON object per snapshot to a file.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ProgressSink for JsonLinesSink {
    fn push(&self, snapshot: &ProgressSnapshot) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, snapshot)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
