//! Reward strategies.
//!
//! Every strategy scores with the same UCT shape; they differ in what the
//! exploitation term means. Per-node state is the sorted time sequence on
//! the node; rolling aggregates live in `Ctx`.

use ds_bench::BenchmarkResult;
use ds_core::StrategyKind;

use crate::node::{Node, NodeId, Tree};

/// Per-search rolling aggregates.
#[derive(Debug, Clone, Copy)]
pub struct Ctx {
    pub min_t: f64,
    pub max_t: f64,
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            min_t: f64::INFINITY,
            max_t: f64::NEG_INFINITY,
        }
    }

    pub fn observe(&mut self, t: f64) {
        self.min_t = self.min_t.min(t);
        self.max_t = self.max_t.max(t);
    }

    fn range(&self) -> Option<f64> {
        let r = self.max_t - self.min_t;
        if r.is_finite() && r > 0.0 {
            Some(r)
        } else {
            None
        }
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The percentile of one measurement that feeds the tree.
    fn observed(&self, r: &BenchmarkResult) -> f64 {
        r.pct10
    }

    /// Fold one observation into the rolling aggregates. Called once per
    /// iteration, before backprop walks the path.
    fn observe(&self, ctx: &mut Ctx, t: f64) {
        ctx.observe(t);
    }

    /// Exploitation term for `child` under `parent`.
    fn exploit(&self, ctx: &Ctx, tree: &Tree, parent: NodeId, child: NodeId) -> f64;

    /// Fold one observation into a node on the backprop path.
    fn backprop(&self, _ctx: &mut Ctx, node: &mut Node, t: f64) {
        node.insert_time(t);
    }
}

/// Fraction of the observed range the child's median beats; low time wins.
fn min_time_term(ctx: &Ctx, node: &Node) -> f64 {
    match (node.median(), ctx.range()) {
        (Some(m), Some(range)) => (ctx.max_t - m) / range,
        _ => 0.5,
    }
}

pub struct MinTime;

impl Strategy for MinTime {
    fn name(&self) -> &'static str {
        "min_time"
    }

    fn exploit(&self, ctx: &Ctx, tree: &Tree, _parent: NodeId, child: NodeId) -> f64 {
        min_time_term(ctx, tree.node(child))
    }
}

pub struct Normalized;

impl Strategy for Normalized {
    fn name(&self) -> &'static str {
        "normalized"
    }

    fn exploit(&self, ctx: &Ctx, tree: &Tree, _parent: NodeId, child: NodeId) -> f64 {
        min_time_term(ctx, tree.node(child)).clamp(0.0, 1.0)
    }
}

/// Sample Pearson correlation over the common prefix of two sorted series.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let a = &a[..n];
    let b = &b[..n];
    let nf = n as f64;
    let ma = a.iter().sum::<f64>() / nf;
    let mb = b.iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    if va <= 0.0 || vb <= 0.0 {
        return None;
    }
    Some(cov / (va.sqrt() * vb.sqrt()))
}

/// Normalized time plus a bonus for anti-correlating with siblings: a child
/// that is fast exactly when its siblings are slow is consistently the
/// better branch, not just a lucky one.
pub struct NormalizedAntiCorrelation;

impl Strategy for NormalizedAntiCorrelation {
    fn name(&self) -> &'static str {
        "normalized_anti_correlation"
    }

    fn exploit(&self, ctx: &Ctx, tree: &Tree, parent: NodeId, child: NodeId) -> f64 {
        let base = min_time_term(ctx, tree.node(child)).clamp(0.0, 1.0);
        let child_times = &tree.node(child).times;

        let mut sum = 0.0;
        let mut count = 0usize;
        for &sib in &tree.node(parent).children {
            if sib == child {
                continue;
            }
            if let Some(r) = pearson(child_times, &tree.node(sib).times) {
                sum += r;
                count += 1;
            }
        }
        if count == 0 {
            return base;
        }
        let mean_r = sum / count as f64;
        base + (1.0 - mean_r) / 2.0
    }
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::MinTime => Box::new(MinTime),
        StrategyKind::Normalized => Box::new(Normalized),
        StrategyKind::NormalizedAntiCorrelation => Box::new(NormalizedAntiCorrelation),
    }
}
