//! Process-local resource registry.
//!
//! One `Platform` value per process, created at startup and owned by the
//! search driver for its whole lifetime. It hands out stream and event
//! handles, validates them, and fronts the accelerator and communicator
//! backends.

use thiserror::Error;

use crate::backend::{Accelerator, BackendError, Communicator};
use crate::handle::{Event, Stream};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("requested non-existent stream {0}")]
    NoSuchStream(u32),
    #[error("requested invalid event handle {0}")]
    InvalidEvent(u32),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct Platform {
    accel: Box<dyn Accelerator>,
    comm: Box<dyn Communicator>,
    streams: Vec<Stream>,
    /// Next event handle from `new_event`. Handles at or past the cursor are
    /// invalid even when a backing event exists for them.
    next_event: u32,
}

impl Platform {
    pub fn new(accel: Box<dyn Accelerator>, comm: Box<dyn Communicator>) -> Self {
        debug_assert!(accel.num_streams() >= 1, "backend missing default stream");
        Self {
            accel,
            comm,
            streams: vec![Stream::DEFAULT],
            next_event: 0,
        }
    }

    /// Platform with `n` streams beyond the default one.
    pub fn with_streams(
        n: usize,
        accel: Box<dyn Accelerator>,
        comm: Box<dyn Communicator>,
    ) -> Result<Self, PlatformError> {
        let mut plat = Self::new(accel, comm);
        plat.ensure_streams(n)?;
        Ok(plat)
    }

    /// All stream handles, the default stream first.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Number of streams, not counting the default stream.
    pub fn num_streams(&self) -> usize {
        self.streams.len() - 1
    }

    pub fn num_events(&self) -> u32 {
        self.next_event
    }

    pub fn new_stream(&mut self) -> Result<Stream, PlatformError> {
        self.accel.create_stream()?;
        let stream = Stream(self.streams.len() as u32);
        self.streams.push(stream);
        Ok(stream)
    }

    pub fn ensure_streams(&mut self, n: usize) -> Result<(), PlatformError> {
        while self.num_streams() < n {
            self.new_stream()?;
        }
        Ok(())
    }

    /// Fresh event handle; the backing pool grows lazily and persists across
    /// `reset_dynamic_resources`.
    pub fn new_event(&mut self) -> Result<Event, PlatformError> {
        self.accel.reserve_events(self.next_event as usize + 1)?;
        let ev = Event(self.next_event);
        self.next_event += 1;
        Ok(ev)
    }

    /// Validate `n` event handles at once, growing the pool as needed.
    pub fn ensure_events(&mut self, n: u32) -> Result<(), PlatformError> {
        self.accel.reserve_events(n as usize)?;
        if self.next_event < n {
            self.next_event = n;
        }
        Ok(())
    }

    /// Rewind the event cursor so the next iteration allocates from id 0.
    /// Backing events stay allocated.
    pub fn reset_dynamic_resources(&mut self) {
        self.next_event = 0;
    }

    pub fn check_stream(&self, stream: Stream) -> Result<(), PlatformError> {
        if (stream.id() as usize) < self.streams.len() {
            Ok(())
        } else {
            Err(PlatformError::NoSuchStream(stream.id()))
        }
    }

    pub fn check_event(&self, event: Event) -> Result<(), PlatformError> {
        if event.id() < self.next_event {
            Ok(())
        } else {
            Err(PlatformError::InvalidEvent(event.id()))
        }
    }

    pub fn accel_mut(&mut self) -> &mut dyn Accelerator {
        self.accel.as_mut()
    }

    pub fn comm_mut(&mut self) -> &mut dyn Communicator {
        self.comm.as_mut()
    }

    pub fn rank(&self) -> u32 {
        self.comm.rank()
    }

    pub fn size(&self) -> u32 {
        self.comm.size()
    }
}
