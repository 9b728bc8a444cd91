//! ds-mcts: Monte Carlo tree search over legal schedule prefixes,
//! parametrized by a pluggable reward strategy.

pub mod dump;
pub mod mcts;
pub mod node;
pub mod strategy;

#[cfg(test)]
mod mcts_tests;

pub use dump::{dump_tree, read_tree, write_tree, TreeDump};
pub use mcts::{
    run_search, run_search_inspect, select_child, MctsError, SearchOpts, SearchReport,
    SearchStats, UCT_C,
};
pub use node::{Node, NodeId, Tree};
pub use strategy::{
    strategy_for, Ctx, MinTime, Normalized, NormalizedAntiCorrelation, Strategy,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
