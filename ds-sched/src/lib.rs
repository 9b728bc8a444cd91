//! ds-sched: legal-extension machinery: resource binding, synchronization
//! insertion, and the frontier generator.

pub mod bind;
pub mod frontier;
pub mod sync;

use thiserror::Error;

use ds_platform::PlatformError;

pub use bind::{bind_unbound_vertex, platform_variations};
pub use frontier::frontier;
pub use sync::{is_synced, make_syncs};

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("op {0} not in graph")]
    UnknownOp(String),
    #[error("pred {pred} of {op} not committed")]
    MissingPred { op: String, pred: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
