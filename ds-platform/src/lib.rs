//! ds-platform: execution-platform model: stream/event handles, the
//! per-process `Platform` registry, and the accelerator/communicator
//! capability traits with in-process reference backends.

pub mod backend;
pub mod comm;
pub mod handle;
pub mod platform;
pub mod sim;

pub use backend::{Accelerator, BackendError, Communicator, Request};
pub use comm::{SelfComm, ThreadComm};
pub use handle::{Event, Stream};
pub use platform::{Platform, PlatformError};
pub use sim::SimAccelerator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
