//! Run configuration.
//!
//! One YAML file drives the search, the benchmark protocol, and platform
//! sizing; the same file should load on every rank.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Schedule search settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Collective benchmark settings.
    #[serde(default)]
    pub bench: BenchConfig,
    /// Platform sizing.
    #[serde(default)]
    pub platform: PlatformConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            bench: BenchConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

/// Reward strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MinTime,
    Normalized,
    NormalizedAntiCorrelation,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search iterations (tree rollouts).
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Serialize the tree every N iterations; 0 disables.
    #[serde(default)]
    pub dump_tree_every: u32,
    /// RNG seed for rollouts and tie-breaks.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            dump_tree_every: 0,
            seed: 0,
            strategy: default_strategy(),
        }
    }
}

fn default_iterations() -> u32 {
    100
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Normalized
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchConfig {
    /// Timed executions per collective measurement.
    #[serde(default = "default_n_iters")]
    pub n_iters: u32,
    /// Untimed executions before the timed ones.
    #[serde(default = "default_warmup_iters")]
    pub warmup_iters: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            n_iters: default_n_iters(),
            warmup_iters: default_warmup_iters(),
        }
    }
}

fn default_n_iters() -> u32 {
    10
}

fn default_warmup_iters() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Streams beyond the default stream.
    #[serde(default = "default_streams")]
    pub streams: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            streams: default_streams(),
        }
    }
}

fn default_streams() -> u32 {
    2
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
