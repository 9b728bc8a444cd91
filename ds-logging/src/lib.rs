//! ds-logging: the durable CSV result stream and run diagnostics.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use ds_bench::SimResult;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Anything that accepts per-rollout results.
pub trait ResultSink {
    fn record(&mut self, sim: &SimResult) -> Result<(), RecordError>;
    fn flush(&mut self) -> Result<(), RecordError>;
}

/// Append-only CSV writer: one `pct10,name_0,...,name_k` row per rollout.
///
/// This stream is the search's only durable output, so rows are flushed
/// periodically and the caller flushes once more before exiting, fatal or
/// not.
pub struct CsvRecorder<W: Write> {
    w: io::BufWriter<W>,
    rows_since_flush: u64,
    flush_every_rows: u64,
}

impl<W: Write> CsvRecorder<W> {
    /// `flush_every_rows=0` disables periodic flushing.
    pub fn new(sink: W, flush_every_rows: u64) -> Self {
        Self {
            w: io::BufWriter::new(sink),
            rows_since_flush: 0,
            flush_every_rows,
        }
    }
}

impl<W: Write> ResultSink for CsvRecorder<W> {
    fn record(&mut self, sim: &SimResult) -> Result<(), RecordError> {
        write!(self.w, "{}", sim.result.pct10)?;
        for op in &sim.order {
            write!(self.w, ",{}", op.name())?;
        }
        writeln!(self.w)?;
        self.rows_since_flush += 1;
        if self.flush_every_rows > 0 && self.rows_since_flush >= self.flush_every_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecordError> {
        self.w.flush()?;
        self.rows_since_flush = 0;
        Ok(())
    }
}

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Log placement-related environment to stderr. Diagnostics only.
pub fn log_env_diagnostics() {
    match std::env::var("OMP_PLACES") {
        Ok(v) => eprintln!("OMP_PLACES={v}"),
        Err(_) => eprintln!("OMP_PLACES unset"),
    }
}
