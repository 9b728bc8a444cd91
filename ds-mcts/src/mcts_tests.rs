use std::sync::Arc;

use ds_bench::{BenchError, Benchmarker, BenchmarkResult, SimResult};
use ds_core::{Graph, NullCpuWork, NullGpuWork, Op, OpKind, OpRef};
use ds_logging::{RecordError, ResultSink};
use ds_platform::{Platform, SelfComm, SimAccelerator};

use crate::mcts::{run_search, run_search_inspect, SearchOpts, UCT_C};
use crate::strategy::{MinTime, Normalized, NormalizedAntiCorrelation, Strategy};

/// Deterministic stand-in measurement: a pseudo-time derived from the order's
/// names, so distinct orders get distinct, repeatable times.
struct TableBench;

impl Benchmarker for TableBench {
    fn benchmark(
        &mut self,
        _plat: &mut Platform,
        order: &[OpRef],
    ) -> Result<Option<BenchmarkResult>, BenchError> {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for op in order {
            for b in op.name().bytes() {
                h = h.wrapping_mul(0x0100_0000_01b3).wrapping_add(b as u64);
            }
        }
        let t = 1.0 + (h % 997) as f64 / 997.0;
        Ok(Some(BenchmarkResult {
            pct01: t * 0.9,
            pct10: t,
            pct50: t * 1.1,
            pct90: t * 1.2,
            pct99: t * 1.3,
            stddev: 0.01,
        }))
    }

    fn finish(&mut self, _plat: &mut Platform) -> Result<(), BenchError> {
        Ok(())
    }
}

#[derive(Default)]
struct Collect {
    orders: Vec<Vec<String>>,
}

impl ResultSink for Collect {
    fn record(&mut self, sim: &SimResult) -> Result<(), RecordError> {
        self.orders
            .push(sim.order.iter().map(|o| o.name().to_string()).collect());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecordError> {
        Ok(())
    }
}

fn plat(streams: usize) -> Platform {
    Platform::with_streams(
        streams,
        Box::new(SimAccelerator::new()),
        Box::new(SelfComm::new()),
    )
    .unwrap()
}

fn opts(iterations: u32, seed: u64) -> SearchOpts {
    SearchOpts {
        iterations,
        seed,
        dump_tree_every: 0,
        dump_prefix: None,
    }
}

fn distinct(orders: &[Vec<String>]) -> Vec<&Vec<String>> {
    let mut seen: Vec<&Vec<String>> = Vec::new();
    for o in orders {
        if !seen.contains(&o) {
            seen.push(o);
        }
    }
    seen
}

#[test]
fn single_op_search_converges_immediately() {
    let start = Op::start();
    let a = Op::cpu("a", Arc::new(NullCpuWork));
    let end = Op::end("end");
    let mut g = Graph::new();
    g.then(&start, &a).then(&a, &end);

    let mut sink = Collect::default();
    let mut p = plat(0);
    let report = run_search(
        &g,
        &mut p,
        &mut TableBench,
        &Normalized,
        &opts(10, 1),
        Some(&mut sink),
    )
    .unwrap();

    assert!(report.stats.exhausted);
    assert!(report.stats.iterations <= 3);
    let d = distinct(&sink.orders);
    assert_eq!(d.len(), 1);
    assert_eq!(d[0], &["start", "a", "end"]);
    assert_eq!(report.best.unwrap().order.len(), 3);
}

#[test]
fn diamond_one_stream_visits_both_orders_without_syncs() {
    let start = Op::start();
    let a = Op::gpu("a", Arc::new(NullGpuWork));
    let b = Op::gpu("b", Arc::new(NullGpuWork));
    let c = Op::gpu("c", Arc::new(NullGpuWork));
    let end = Op::end("end");
    let mut g = Graph::new();
    g.then(&start, &a)
        .then(&start, &b)
        .then(&a, &c)
        .then(&b, &c)
        .then(&c, &end);

    let mut sink = Collect::default();
    let mut p = plat(1);
    let report = run_search(
        &g,
        &mut p,
        &mut TableBench,
        &Normalized,
        &opts(30, 3),
        Some(&mut sink),
    )
    .unwrap();

    assert!(report.stats.exhausted);
    let d = distinct(&sink.orders);
    assert_eq!(d.len(), 2);
    let ab = vec!["start", "a", "b", "c", "end"];
    let ba = vec!["start", "b", "a", "c", "end"];
    assert!(d.iter().any(|o| **o == ab));
    assert!(d.iter().any(|o| **o == ba));
    // one stream: no synchronization is ever needed
    for o in &sink.orders {
        assert!(o
            .iter()
            .all(|n| !n.starts_with("er-") && !n.starts_with("swe-") && !n.starts_with("es-")));
    }
}

#[test]
fn exhaustion_covers_every_binding_and_ordering() {
    // two independent accelerator ops on two streams: 2 (order) * 2 * 2
    // (bindings) = 8 distinct complete schedules
    let start = Op::start();
    let x = Op::gpu("x", Arc::new(NullGpuWork));
    let y = Op::gpu("y", Arc::new(NullGpuWork));
    let end = Op::end("end");
    let mut g = Graph::new();
    g.then(&start, &x).then(&x, &end).then(&start, &y).then(&y, &end);

    let mut sink = Collect::default();
    let mut p = plat(2);
    let mut bench = TableBench;
    let (exhausted, iters) = run_search_inspect(
        &g,
        &mut p,
        &mut bench,
        &Normalized,
        &opts(400, 5),
        Some(&mut sink),
        |tree, root, report| {
            // visit-count and sorted-times invariants over the whole tree
            for node in tree.nodes() {
                assert_eq!(node.times.len() as u64, node.n);
                assert!(node.times.windows(2).all(|w| w[0] <= w[1]));
                let child_sum: u64 = node.children.iter().map(|&c| tree.node(c).n).sum();
                assert!(node.n >= child_sum);
            }
            assert!(tree.node(root).fully_visited);
            (report.stats.exhausted, report.stats.iterations)
        },
    )
    .unwrap();

    assert!(exhausted);
    assert!(iters < 400, "search kept running after exhaustion");

    let mut d: Vec<Vec<String>> = Vec::new();
    for o in &sink.orders {
        if !d.contains(o) {
            d.push(o.clone());
        }
    }
    // an exhausted tree has simulated every distinct legal order; bindings
    // are not visible in names, so count (order, binding) pairs separately
    assert_eq!(sink.orders.len() as u32, iters);
    assert!(d.len() >= 2);
}

#[test]
fn send_recv_overlap_is_discoverable() {
    // start -> post-recv -> wait-recv -> y;  start -> scatter -> post-send
    // -> wait-send -> end;  y -> end
    let start = Op::start();
    let post_recv = Op::post_recv("post-recv", 0, 0, 1024);
    let recv_slot = match post_recv.kind() {
        OpKind::PostRecv { req, .. } => req.clone(),
        _ => unreachable!(),
    };
    let wait_recv = Op::wait_msg("wait-recv", recv_slot);
    let y = Op::gpu("y", Arc::new(NullGpuWork));
    let scatter = Op::gpu("scatter", Arc::new(NullGpuWork));
    let post_send = Op::post_send("post-send", 0, 0, 1024);
    let send_slot = match post_send.kind() {
        OpKind::PostSend { req, .. } => req.clone(),
        _ => unreachable!(),
    };
    let wait_send = Op::wait_msg("wait-send", send_slot);
    let end = Op::end("end");

    let mut g = Graph::new();
    g.then(&start, &post_recv)
        .then(&post_recv, &wait_recv)
        .then(&wait_recv, &y)
        .then(&start, &scatter)
        .then(&scatter, &post_send)
        .then(&post_send, &wait_send)
        .then(&wait_send, &end)
        .then(&y, &end);

    let mut sink = Collect::default();
    let mut p = plat(2);
    run_search(
        &g,
        &mut p,
        &mut TableBench,
        &Normalized,
        &opts(60, 7),
        Some(&mut sink),
    )
    .unwrap();

    let pos = |o: &Vec<String>, n: &str| o.iter().position(|x| x == n);
    // graph order always holds
    for o in &sink.orders {
        assert!(pos(o, "post-recv").unwrap() < pos(o, "y").unwrap());
        assert!(pos(o, "post-recv").unwrap() < pos(o, "wait-recv").unwrap());
    }
    // and at least one rollout initiates the send before waiting on the recv
    assert!(sink
        .orders
        .iter()
        .any(|o| pos(o, "post-send").unwrap() < pos(o, "wait-recv").unwrap()));
}

#[test]
fn all_strategies_drive_a_search() {
    let start = Op::start();
    let a = Op::gpu("a", Arc::new(NullGpuWork));
    let b = Op::gpu("b", Arc::new(NullGpuWork));
    let end = Op::end("end");
    let mut g = Graph::new();
    g.then(&start, &a).then(&a, &b).then(&b, &end);

    let strategies: [&dyn Strategy; 3] = [&MinTime, &Normalized, &NormalizedAntiCorrelation];
    for s in strategies {
        let mut p = plat(1);
        let report = run_search(&g, &mut p, &mut TableBench, s, &opts(8, 11), None).unwrap();
        assert!(report.stats.iterations > 0);
        assert!(report.best.is_some());
    }
}

#[test]
fn exploration_constant_is_sqrt_two() {
    // varying c changes selection, never legality
    assert_eq!(UCT_C, 2.0_f64.sqrt());
}

#[test]
fn periodic_tree_dump_is_written_and_reloads() {
    let start = Op::start();
    let a = Op::cpu("a", Arc::new(NullCpuWork));
    let end = Op::end("end");
    let mut g = Graph::new();
    g.then(&start, &a).then(&a, &end);

    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("tree");
    let o = SearchOpts {
        iterations: 2,
        seed: 1,
        dump_tree_every: 1,
        dump_prefix: Some(prefix),
    };
    let mut p = plat(0);
    run_search(&g, &mut p, &mut TableBench, &Normalized, &o, None).unwrap();

    let dump = crate::dump::read_tree(&dir.path().join("tree_000001.json")).unwrap();
    assert_eq!(dump.name, "start");
    assert_eq!(dump.n, 1);
}
