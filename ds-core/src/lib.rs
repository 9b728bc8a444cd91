//! ds-core: the operation model, the DAG, committed prefixes, JSON serdes,
//! and run configuration.

pub mod config;
pub mod graph;
pub mod op;
pub mod seq;
pub mod serdes;

pub use config::{BenchConfig, Config, ConfigError, PlatformConfig, SearchConfig, StrategyKind};
pub use graph::{Graph, GraphError};
pub use op::{
    CpuWork, GpuWork, MsgSlot, NullCpuWork, NullGpuWork, Op, OpError, OpKind, OpRef, TAG_BOUND_GPU,
    TAG_CPU, TAG_END, TAG_EVENT_RECORD, TAG_EVENT_SYNC, TAG_GPU, TAG_POST_RECV, TAG_POST_SEND,
    TAG_START, TAG_STREAM_SYNC, TAG_STREAM_WAIT_EVENT, TAG_WAIT_MSG,
};
pub use seq::Seq;
pub use serdes::{graph_from_json, graph_to_json, op_from_json, op_to_json, SerdesError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
