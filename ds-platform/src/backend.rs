//! Capability traits the platform requires from its backends.
//!
//! Any accelerator runtime offering streams, events, and stream-wait-event,
//! and any message library offering barrier, broadcast, and nonblocking
//! send/recv/wait, can sit behind these traits. The search itself never
//! touches a backend directly; everything goes through the `Platform`.

use std::time::Duration;

use thiserror::Error;

use crate::handle::{Event, Stream};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("accelerator: {0}")]
    Accelerator(String),
    #[error("communicator: {0}")]
    Comm(String),
}

/// Abstract contract for accelerator backends.
///
/// Stream and event indices are dense; index 0 is the default stream and
/// always exists. All calls are issued from the owning process's driver
/// thread.
pub trait Accelerator: Send {
    /// Allocate one more backend stream.
    fn create_stream(&mut self) -> Result<(), BackendError>;

    /// Number of backend streams, counting the default stream.
    fn num_streams(&self) -> usize;

    /// Grow the backend event pool to at least `n` events.
    fn reserve_events(&mut self, n: usize) -> Result<(), BackendError>;

    /// Number of backing events allocated so far.
    fn num_events(&self) -> usize;

    /// Enqueue `cost` worth of work on `stream`. Returns immediately.
    fn launch(&mut self, stream: Stream, cost: Duration) -> Result<(), BackendError>;

    /// Capture the current tail of `stream` into `event`.
    fn event_record(&mut self, event: Event, stream: Stream) -> Result<(), BackendError>;

    /// Make all future work on `stream` wait for `event`.
    fn stream_wait_event(&mut self, stream: Stream, event: Event) -> Result<(), BackendError>;

    /// Block the host until `event` has completed.
    fn event_sync(&mut self, event: Event) -> Result<(), BackendError>;

    /// Block the host until all work on `stream` has completed.
    fn stream_sync(&mut self, stream: Stream) -> Result<(), BackendError>;

    /// Block the host until every stream has drained.
    fn sync_all(&mut self) -> Result<(), BackendError>;
}

/// Handle for a posted nonblocking message operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Request(pub u64);

/// Abstract contract for the inter-process message library.
pub trait Communicator: Send {
    fn rank(&self) -> u32;
    fn size(&self) -> u32;

    fn barrier(&mut self) -> Result<(), BackendError>;

    /// Broadcast `buf` from `root`. Non-root buffers are replaced.
    fn broadcast(&mut self, root: u32, buf: &mut Vec<u8>) -> Result<(), BackendError>;

    /// Post a nonblocking send of `bytes` bytes to `peer`.
    fn post_send(&mut self, peer: u32, tag: u32, bytes: usize) -> Result<Request, BackendError>;

    /// Post a nonblocking receive of `bytes` bytes from `peer`.
    fn post_recv(&mut self, peer: u32, tag: u32, bytes: usize) -> Result<Request, BackendError>;

    /// Block until a posted operation completes.
    fn wait(&mut self, req: Request) -> Result<(), BackendError>;

    /// Element-wise maximum across ranks; every rank receives the result.
    fn allreduce_max(&mut self, vals: &mut [f64]) -> Result<(), BackendError>;
}
