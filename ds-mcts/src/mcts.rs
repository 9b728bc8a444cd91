//! The schedule search loop.
//!
//! Rank 0 owns the tree and drives selection, expansion, simulation, and
//! backprop; every rank co-executes each candidate order through the
//! benchmarker. Selection and backprop walk the tree iteratively.

use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use ds_bench::{BenchError, Benchmarker, SimResult};
use ds_core::{Graph, GraphError, OpKind, OpRef, SearchConfig, Seq};
use ds_logging::{RecordError, ResultSink};
use ds_platform::Platform;
use ds_sched::{frontier, SchedError};

use crate::dump::{dump_tree, write_tree};
use crate::node::{NodeId, Tree};
use crate::strategy::{Ctx, Strategy};

/// UCT exploration constant.
pub const UCT_C: f64 = std::f64::consts::SQRT_2;

#[derive(Debug, Error)]
pub enum MctsError {
    #[error("frontier is empty at non-terminal op {0}")]
    EmptyFrontier(String),
    #[error("simulation never scheduled op {0}")]
    IncompleteOrder(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Sched(#[from] SchedError),
    #[error(transparent)]
    Bench(#[from] BenchError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("tree dump: {0}")]
    Dump(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(&'static str),
}

#[derive(Debug, Clone)]
pub struct SearchOpts {
    pub iterations: u32,
    pub seed: u64,
    /// Serialize the tree every N iterations; 0 disables.
    pub dump_tree_every: u32,
    /// Filename prefix for tree dumps.
    pub dump_prefix: Option<PathBuf>,
}

impl SearchOpts {
    pub fn from_config(cfg: &SearchConfig) -> Self {
        Self {
            iterations: cfg.iterations,
            seed: cfg.seed,
            dump_tree_every: cfg.dump_tree_every,
            dump_prefix: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SearchStats {
    pub iterations: u32,
    pub node_count: usize,
    /// Every distinct legal order reachable under the binding rules has
    /// been simulated.
    pub exhausted: bool,
}

pub struct SearchReport {
    pub stats: SearchStats,
    /// Lowest observed result so far.
    pub best: Option<SimResult>,
}

/// Score `node`'s children and pick one: unvisited wins outright, fully
/// visited subtrees are avoided, ties break uniformly at random.
pub fn select_child(
    tree: &Tree,
    id: NodeId,
    ctx: &Ctx,
    strategy: &dyn Strategy,
    rng: &mut ChaCha8Rng,
) -> Option<NodeId> {
    let node = tree.node(id);
    if node.children.is_empty() {
        return None;
    }
    let n_parent = node.n.max(1) as f64;

    let mut best = f64::NEG_INFINITY;
    let mut choices: Vec<NodeId> = Vec::new();
    for &cid in &node.children {
        let child = tree.node(cid);
        let score = if child.fully_visited {
            f64::NEG_INFINITY
        } else if child.n == 0 {
            f64::INFINITY
        } else {
            let exploit = strategy.exploit(ctx, tree, id, cid);
            let explore = UCT_C * (n_parent.ln() / child.n as f64).sqrt();
            exploit + explore
        };
        if score > best {
            best = score;
            choices.clear();
            choices.push(cid);
        } else if score == best {
            choices.push(cid);
        }
    }
    if choices.is_empty() {
        return None;
    }
    Some(choices[rng.gen_range(0..choices.len())])
}

struct Driver<'g> {
    g: &'g Graph,
    tree: Tree,
    ctx: Ctx,
    rng: ChaCha8Rng,
}

impl<'g> Driver<'g> {
    fn new(g: &'g Graph, seed: u64) -> Result<Self, MctsError> {
        let start = g.start()?.clone();
        Ok(Self {
            g,
            tree: Tree::with_root(start),
            ctx: Ctx::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Copy of the graph with every stream choice along `prefix` bound in.
    fn scratch_graph(&self, prefix: &Seq) -> Result<Graph, MctsError> {
        let mut gp = self.g.clone();
        for op in prefix.iter() {
            if matches!(op.kind(), OpKind::BoundGpu { .. }) && !gp.contains(op) {
                let unbound = op.unbound();
                if gp.contains(&unbound) {
                    gp.replace(&unbound, op)?;
                }
            }
        }
        Ok(gp)
    }

    fn select(&mut self, strategy: &dyn Strategy) -> NodeId {
        let mut id = self.tree.root();
        loop {
            if self.tree.is_leaf(id) {
                return id;
            }
            match select_child(&self.tree, id, &self.ctx, strategy, &mut self.rng) {
                Some(next) => id = next,
                None => return id,
            }
        }
    }

    /// Create children for `leaf` from its frontier and return the first
    /// never-simulated one. A node whose frontier is empty is terminal and
    /// is its own simulation start.
    fn expand(&mut self, leaf: NodeId, plat: &mut Platform) -> Result<NodeId, MctsError> {
        if !self.tree.node(leaf).expanded {
            let prefix = self.tree.prefix(leaf);
            let gp = self.scratch_graph(&prefix)?;
            let front = frontier(plat, &gp, &prefix)?;
            if front.is_empty() {
                // legal only when the whole graph is already committed
                for op in self.g.nodes() {
                    if !prefix.contains_unbound(op) {
                        return Err(MctsError::EmptyFrontier(op.name().to_string()));
                    }
                }
            }
            for op in front {
                self.tree.add_child(leaf, op);
            }
            self.tree.node_mut(leaf).expanded = true;
        }

        let children = self.tree.node(leaf).children.clone();
        if children.is_empty() {
            return Ok(leaf);
        }
        for c in children {
            if self.tree.node(c).n == 0 {
                return Ok(c);
            }
        }
        // every child simulated, so this was not a leaf
        Err(MctsError::Internal("expand reached a non-leaf node"))
    }

    /// Path prefix plus a uniformly-random legal completion.
    fn simulation_order(
        &mut self,
        from: NodeId,
        plat: &mut Platform,
    ) -> Result<Vec<OpRef>, MctsError> {
        let mut seq = self.tree.prefix(from);
        let mut gp = self.scratch_graph(&seq)?;
        loop {
            let front = frontier(plat, &gp, &seq)?;
            if front.is_empty() {
                break;
            }
            let op = front[self.rng.gen_range(0..front.len())].clone();
            if matches!(op.kind(), OpKind::BoundGpu { .. }) && !gp.contains(&op) {
                let unbound = op.unbound();
                if gp.contains(&unbound) {
                    gp.replace(&unbound, &op)?;
                }
            }
            seq.push(op);
        }
        // an empty frontier with unscheduled ops left is a frontier bug
        for op in self.g.nodes() {
            if !seq.contains_unbound(op) {
                return Err(MctsError::IncompleteOrder(op.name().to_string()));
            }
        }
        Ok(seq.into_vec())
    }

    fn backprop(&mut self, from: NodeId, t: f64, strategy: &dyn Strategy) {
        strategy.observe(&mut self.ctx, t);
        let mut cur = Some(from);
        while let Some(id) = cur {
            let (children, parent) = {
                let node = self.tree.node(id);
                (node.children.clone(), node.parent)
            };
            let children_fully = !children.is_empty()
                && children.iter().all(|&c| self.tree.node(c).fully_visited);

            let node = self.tree.node_mut(id);
            node.n += 1;
            strategy.backprop(&mut self.ctx, node, t);
            if children.is_empty() {
                // expanded with an empty frontier: a terminal prefix
                if node.expanded {
                    node.fully_visited = true;
                }
            } else if children_fully {
                node.fully_visited = true;
            }
            cur = parent;
        }
    }
}

/// Run the collective schedule search. SPMD: every rank calls this with its
/// own platform and graph copy; rank 0 returns the full report, other ranks
/// follow the broadcast until rank 0 finishes.
pub fn run_search(
    g: &Graph,
    plat: &mut Platform,
    bench: &mut dyn Benchmarker,
    strategy: &dyn Strategy,
    opts: &SearchOpts,
    mut sink: Option<&mut dyn ResultSink>,
) -> Result<SearchReport, MctsError> {
    g.validate()?;

    if plat.rank() != 0 {
        return run_follower(plat, bench);
    }

    let result = drive(g, plat, bench, strategy, opts, &mut sink).map(|(report, _)| report);
    // the CSV stream is the only durable output; flush it even on a fatal
    if let Some(s) = sink.as_mut() {
        let _ = s.flush();
    }
    result
}

fn run_follower(
    plat: &mut Platform,
    bench: &mut dyn Benchmarker,
) -> Result<SearchReport, MctsError> {
    let mut stats = SearchStats::default();
    loop {
        plat.reset_dynamic_resources();
        if bench.benchmark(plat, &[])?.is_none() {
            break;
        }
        stats.iterations += 1;
    }
    Ok(SearchReport { stats, best: None })
}

fn drive<'g>(
    g: &'g Graph,
    plat: &mut Platform,
    bench: &mut dyn Benchmarker,
    strategy: &dyn Strategy,
    opts: &SearchOpts,
    sink: &mut Option<&mut dyn ResultSink>,
) -> Result<(SearchReport, Driver<'g>), MctsError> {
    let mut driver = Driver::new(g, opts.seed)?;
    let mut stats = SearchStats::default();
    let mut best: Option<SimResult> = None;

    for i in 0..opts.iterations {
        if driver.tree.node(driver.tree.root()).fully_visited {
            stats.exhausted = true;
            break;
        }

        plat.reset_dynamic_resources();

        let leaf = driver.select(strategy);
        let chosen = driver.expand(leaf, plat)?;
        let order = driver.simulation_order(chosen, plat)?;

        let result = bench
            .benchmark(plat, &order)?
            .ok_or(MctsError::Internal("root measurement returned nothing"))?;
        let t = strategy.observed(&result);
        driver.backprop(chosen, t, strategy);

        let sim = SimResult { order, result };
        eprintln!(
            "iter {i}: len={} pct10={:.6} [{:.6}, {:.6}]",
            sim.order.len(),
            result.pct10,
            driver.ctx.min_t,
            driver.ctx.max_t
        );
        if let Some(s) = sink.as_mut() {
            s.record(&sim)?;
        }
        if best
            .as_ref()
            .map(|b| sim.result.pct10 < b.result.pct10)
            .unwrap_or(true)
        {
            best = Some(sim);
        }

        stats.iterations = i + 1;
        if opts.dump_tree_every > 0 && (i + 1) % opts.dump_tree_every == 0 {
            if let Some(prefix) = &opts.dump_prefix {
                let path = prefix.with_file_name(format!(
                    "{}_{:06}.json",
                    prefix
                        .file_name()
                        .and_then(|s| s.to_str())
                        .unwrap_or("tree"),
                    i + 1
                ));
                write_tree(&path, &dump_tree(&driver.tree, driver.tree.root()))?;
            }
        }
    }

    stats.node_count = driver.tree.len();
    if driver.tree.node(driver.tree.root()).fully_visited {
        stats.exhausted = true;
    }
    bench.finish(plat)?;
    Ok((SearchReport { stats, best }, driver))
}

/// Run the search and hand the final tree to `inspect`. Rank 0 only.
pub fn run_search_inspect<T>(
    g: &Graph,
    plat: &mut Platform,
    bench: &mut dyn Benchmarker,
    strategy: &dyn Strategy,
    opts: &SearchOpts,
    mut sink: Option<&mut dyn ResultSink>,
    inspect: impl FnOnce(&Tree, NodeId, &SearchReport) -> T,
) -> Result<T, MctsError> {
    g.validate()?;
    let (report, driver) = drive(g, plat, bench, strategy, opts, &mut sink)?;
    Ok(inspect(&driver.tree, driver.tree.root(), &report))
}
