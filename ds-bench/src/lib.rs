//! ds-bench: collective timing of candidate orders.
//!
//! Rank 0 chooses an order; every rank must execute the same bound order in
//! lock-step so the measured time is the collective cost. The `Benchmarker`
//! capability also has a CSV-replay implementation for offline analysis.

pub mod collective;
pub mod csv;
pub mod proto;
pub mod result;

use thiserror::Error;

use ds_core::{OpError, OpRef};
use ds_platform::{BackendError, Platform, PlatformError};

pub use collective::CollectiveBenchmarker;
pub use csv::CsvBenchmarker;
pub use result::{BenchmarkResult, SimResult};

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("measured time is negative or non-finite: {0}")]
    BadTime(f64),
    #[error("broadcast order references unknown op {0}")]
    UnknownOp(String),
    #[error("malformed order broadcast: {0}")]
    Malformed(String),
    #[error("no recorded measurement for order [{0}, ...]")]
    NoSuchOrder(String),
    #[error("csv line {line}: {msg}")]
    Csv { line: usize, msg: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Op(#[from] OpError),
}

/// One collective measurement.
///
/// Rank 0 passes the chosen order; other ranks pass an empty slice and
/// execute whatever the broadcast reconstructs. `Ok(None)` on a non-root
/// rank means rank 0 has finished the search.
pub trait Benchmarker {
    fn benchmark(
        &mut self,
        plat: &mut Platform,
        order: &[OpRef],
    ) -> Result<Option<BenchmarkResult>, BenchError>;

    /// Release the other ranks once the search is over.
    fn finish(&mut self, plat: &mut Platform) -> Result<(), BenchError>;
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
