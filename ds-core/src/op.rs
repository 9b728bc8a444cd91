//! The operation model.
//!
//! An operation is a named, immutable unit of work shared by reference
//! between the graph, the search tree, and committed prefixes. The kind is a
//! tagged variant; compute payloads hang off it behind the `CpuWork` /
//! `GpuWork` capability traits so kernels stay outside this crate.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use ds_platform::{Accelerator, BackendError, Event, Platform, PlatformError, Request, Stream};

pub type OpRef = Arc<Op>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("cannot run unbound op {0}")]
    Unbound(String),
    #[error("wait {0} has no posted request")]
    NothingPosted(String),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Host-side compute payload.
pub trait CpuWork: Send + Sync {
    fn run(&self, plat: &mut Platform) -> Result<(), OpError>;
}

/// Accelerator compute payload. Invoked with the stream the op was bound to.
pub trait GpuWork: Send + Sync {
    fn run(&self, accel: &mut dyn Accelerator, stream: Stream) -> Result<(), OpError>;
}

/// Payload that does nothing. Used where only graph structure matters.
pub struct NullCpuWork;

impl CpuWork for NullCpuWork {
    fn run(&self, _plat: &mut Platform) -> Result<(), OpError> {
        Ok(())
    }
}

/// Accelerator payload that does nothing.
pub struct NullGpuWork;

impl GpuWork for NullGpuWork {
    fn run(&self, _accel: &mut dyn Accelerator, _stream: Stream) -> Result<(), OpError> {
        Ok(())
    }
}

/// Request slot shared between a post operation and its wait.
#[derive(Clone, Default)]
pub struct MsgSlot(Arc<Mutex<Option<Request>>>);

impl MsgSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, req: Request) {
        *self.0.lock().expect("slot lock poisoned") = Some(req);
    }

    pub fn take(&self) -> Option<Request> {
        self.0.lock().expect("slot lock poisoned").take()
    }
}

#[derive(Clone)]
pub enum OpKind {
    Start,
    End,
    Cpu(Arc<dyn CpuWork>),
    /// Accelerator compute with no stream assigned yet. Not runnable.
    Gpu(Arc<dyn GpuWork>),
    /// Accelerator compute assigned to a concrete stream.
    BoundGpu {
        work: Arc<dyn GpuWork>,
        stream: Stream,
    },
    EventRecord {
        stream: Stream,
        event: Event,
    },
    StreamWaitEvent {
        stream: Stream,
        event: Event,
    },
    EventSync {
        event: Event,
    },
    StreamSync {
        stream: Stream,
    },
    PostSend {
        peer: u32,
        tag: u32,
        bytes: usize,
        req: MsgSlot,
    },
    PostRecv {
        peer: u32,
        tag: u32,
        bytes: usize,
        req: MsgSlot,
    },
    WaitMsg {
        req: MsgSlot,
    },
}

pub const TAG_START: u8 = 0;
pub const TAG_END: u8 = 1;
pub const TAG_CPU: u8 = 2;
pub const TAG_GPU: u8 = 3;
pub const TAG_STREAM_SYNC: u8 = 4;
pub const TAG_EVENT_RECORD: u8 = 5;
pub const TAG_STREAM_WAIT_EVENT: u8 = 6;
pub const TAG_EVENT_SYNC: u8 = 7;
pub const TAG_BOUND_GPU: u8 = 8;
pub const TAG_POST_RECV: u8 = 9;
pub const TAG_POST_SEND: u8 = 10;
pub const TAG_WAIT_MSG: u8 = 11;

pub struct Op {
    name: String,
    kind: OpKind,
}

impl Op {
    pub fn new(name: impl Into<String>, kind: OpKind) -> OpRef {
        Arc::new(Op {
            name: name.into(),
            kind,
        })
    }

    pub fn start() -> OpRef {
        Self::new("start", OpKind::Start)
    }

    pub fn end(name: impl Into<String>) -> OpRef {
        Self::new(name, OpKind::End)
    }

    pub fn cpu(name: impl Into<String>, work: Arc<dyn CpuWork>) -> OpRef {
        Self::new(name, OpKind::Cpu(work))
    }

    pub fn gpu(name: impl Into<String>, work: Arc<dyn GpuWork>) -> OpRef {
        Self::new(name, OpKind::Gpu(work))
    }

    pub fn bound_gpu(name: impl Into<String>, work: Arc<dyn GpuWork>, stream: Stream) -> OpRef {
        Self::new(name, OpKind::BoundGpu { work, stream })
    }

    /// Sync ops carry names derived from their handles so the same sync
    /// synthesized on any rank compares equal.
    pub fn event_record(event: Event, stream: Stream) -> OpRef {
        Self::new(
            format!("er-s{}-e{}", stream.id(), event.id()),
            OpKind::EventRecord { stream, event },
        )
    }

    pub fn stream_wait_event(stream: Stream, event: Event) -> OpRef {
        Self::new(
            format!("swe-s{}-e{}", stream.id(), event.id()),
            OpKind::StreamWaitEvent { stream, event },
        )
    }

    pub fn event_sync(event: Event) -> OpRef {
        Self::new(format!("es-e{}", event.id()), OpKind::EventSync { event })
    }

    pub fn stream_sync(stream: Stream) -> OpRef {
        Self::new(format!("ss-s{}", stream.id()), OpKind::StreamSync { stream })
    }

    pub fn post_send(name: impl Into<String>, peer: u32, tag: u32, bytes: usize) -> OpRef {
        Self::new(
            name,
            OpKind::PostSend {
                peer,
                tag,
                bytes,
                req: MsgSlot::new(),
            },
        )
    }

    pub fn post_recv(name: impl Into<String>, peer: u32, tag: u32, bytes: usize) -> OpRef {
        Self::new(
            name,
            OpKind::PostRecv {
                peer,
                tag,
                bytes,
                req: MsgSlot::new(),
            },
        )
    }

    pub fn wait_msg(name: impl Into<String>, req: MsgSlot) -> OpRef {
        Self::new(name, OpKind::WaitMsg { req })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    /// Kind discriminator, stable across processes and dumps.
    pub fn tag(&self) -> u8 {
        match &self.kind {
            OpKind::Start => TAG_START,
            OpKind::End => TAG_END,
            OpKind::Cpu(_) => TAG_CPU,
            OpKind::Gpu(_) => TAG_GPU,
            OpKind::StreamSync { .. } => TAG_STREAM_SYNC,
            OpKind::EventRecord { .. } => TAG_EVENT_RECORD,
            OpKind::StreamWaitEvent { .. } => TAG_STREAM_WAIT_EVENT,
            OpKind::EventSync { .. } => TAG_EVENT_SYNC,
            OpKind::BoundGpu { .. } => TAG_BOUND_GPU,
            OpKind::PostRecv { .. } => TAG_POST_RECV,
            OpKind::PostSend { .. } => TAG_POST_SEND,
            OpKind::WaitMsg { .. } => TAG_WAIT_MSG,
        }
    }

    /// False only for unbound accelerator compute.
    pub fn is_bound(&self) -> bool {
        !matches!(self.kind, OpKind::Gpu(_))
    }

    /// The stream this op's work runs in, if any. Host-side ops (including
    /// the sync primitives, which are issued from the host) return `None`.
    pub fn compute_stream(&self) -> Option<Stream> {
        match &self.kind {
            OpKind::BoundGpu { stream, .. } => Some(*stream),
            _ => None,
        }
    }

    /// `{name, s:1}`-style string for diagnostics.
    pub fn desc(&self) -> String {
        match &self.kind {
            OpKind::BoundGpu { stream, .. } => format!("{{{}, s:{}}}", self.name, stream),
            _ => format!("{{{}}}", self.name),
        }
    }

    fn handle_key(&self) -> (u32, u32) {
        const NONE: u32 = u32::MAX;
        match &self.kind {
            OpKind::BoundGpu { stream, .. } | OpKind::StreamSync { stream } => {
                (stream.id(), NONE)
            }
            OpKind::EventRecord { stream, event }
            | OpKind::StreamWaitEvent { stream, event } => (stream.id(), event.id()),
            OpKind::EventSync { event } => (NONE, event.id()),
            _ => (NONE, NONE),
        }
    }

    fn sort_key(&self) -> (u8, &str, (u32, u32)) {
        (self.tag(), &self.name, self.handle_key())
    }

    fn unbound_key(&self) -> (u8, &str, (u32, u32)) {
        match &self.kind {
            OpKind::BoundGpu { .. } => (TAG_GPU, &self.name, (u32::MAX, u32::MAX)),
            _ => self.sort_key(),
        }
    }

    /// Equality after stripping any stream binding.
    pub fn unbound_eq(&self, other: &Op) -> bool {
        self.unbound_key() == other.unbound_key()
    }

    /// The unbound original of a bound accelerator op; any other op is its
    /// own original.
    pub fn unbound(self: &Arc<Self>) -> OpRef {
        match &self.kind {
            OpKind::BoundGpu { work, .. } => Op::gpu(self.name.clone(), Arc::clone(work)),
            _ => Arc::clone(self),
        }
    }

    /// Bind unbound accelerator compute to `stream`.
    pub fn bind(self: &Arc<Self>, stream: Stream) -> Option<OpRef> {
        match &self.kind {
            OpKind::Gpu(work) => Some(Op::bound_gpu(self.name.clone(), Arc::clone(work), stream)),
            _ => None,
        }
    }

    pub fn run(&self, plat: &mut Platform) -> Result<(), OpError> {
        match &self.kind {
            OpKind::Start | OpKind::End => Ok(()),
            OpKind::Cpu(work) => work.run(plat),
            OpKind::Gpu(_) => Err(OpError::Unbound(self.name.clone())),
            OpKind::BoundGpu { work, stream } => {
                plat.check_stream(*stream)?;
                work.run(plat.accel_mut(), *stream)
            }
            OpKind::EventRecord { stream, event } => {
                plat.check_stream(*stream)?;
                plat.check_event(*event)?;
                plat.accel_mut().event_record(*event, *stream)?;
                Ok(())
            }
            OpKind::StreamWaitEvent { stream, event } => {
                plat.check_stream(*stream)?;
                plat.check_event(*event)?;
                plat.accel_mut().stream_wait_event(*stream, *event)?;
                Ok(())
            }
            OpKind::EventSync { event } => {
                plat.check_event(*event)?;
                plat.accel_mut().event_sync(*event)?;
                Ok(())
            }
            OpKind::StreamSync { stream } => {
                plat.check_stream(*stream)?;
                plat.accel_mut().stream_sync(*stream)?;
                Ok(())
            }
            OpKind::PostSend {
                peer, tag, bytes, req,
            } => {
                let r = plat.comm_mut().post_send(*peer, *tag, *bytes)?;
                req.set(r);
                Ok(())
            }
            OpKind::PostRecv {
                peer, tag, bytes, req,
            } => {
                let r = plat.comm_mut().post_recv(*peer, *tag, *bytes)?;
                req.set(r);
                Ok(())
            }
            OpKind::WaitMsg { req } => {
                let r = req
                    .take()
                    .ok_or_else(|| OpError::NothingPosted(self.name.clone()))?;
                plat.comm_mut().wait(r)?;
                Ok(())
            }
        }
    }
}

// Equality and order are structural over (tag, name, resource handles);
// payloads never participate.
impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Op {}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl Hash for Op {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.desc())
    }
}
