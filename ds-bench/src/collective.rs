//! The collective benchmarker: broadcast, co-execute, reduce.

use std::time::Instant;

use ds_core::{BenchConfig, Graph, OpRef};
use ds_platform::Platform;

use crate::proto::{decode_order, encode_order, max_event_id, OpTable};
use crate::result::BenchmarkResult;
use crate::{BenchError, Benchmarker};

pub struct CollectiveBenchmarker {
    table: OpTable,
    n_iters: u32,
    warmup_iters: u32,
}

impl CollectiveBenchmarker {
    /// `g` is this rank's copy of the graph, used to resolve broadcast names.
    pub fn new(g: &Graph, cfg: &BenchConfig) -> Self {
        Self {
            table: OpTable::new(g),
            n_iters: cfg.n_iters.max(1),
            warmup_iters: cfg.warmup_iters,
        }
    }

    fn co_execute(
        &self,
        plat: &mut Platform,
        order: &[OpRef],
    ) -> Result<BenchmarkResult, BenchError> {
        // Inserted syncs reference events this rank never allocated.
        if let Some(max_ev) = max_event_id(order) {
            plat.ensure_events(max_ev + 1)?;
        }

        plat.comm_mut().barrier()?;

        for _ in 0..self.warmup_iters {
            for op in order {
                op.run(plat)?;
            }
            plat.accel_mut().sync_all()?;
        }

        let mut times = Vec::with_capacity(self.n_iters as usize);
        for _ in 0..self.n_iters {
            let t0 = Instant::now();
            for op in order {
                op.run(plat)?;
            }
            plat.accel_mut().sync_all()?;
            times.push(t0.elapsed().as_secs_f64());
        }

        let local = BenchmarkResult::from_times(&mut times)?;

        // Collective cost is bounded by the slowest rank.
        let mut reduced = local.as_array();
        plat.comm_mut().allreduce_max(&mut reduced)?;
        BenchmarkResult::from_array(reduced)
    }
}

impl Benchmarker for CollectiveBenchmarker {
    fn benchmark(
        &mut self,
        plat: &mut Platform,
        order: &[OpRef],
    ) -> Result<Option<BenchmarkResult>, BenchError> {
        let root = plat.rank() == 0;
        let mut buf = if root { encode_order(order) } else { Vec::new() };
        plat.comm_mut().broadcast(0, &mut buf)?;

        if root {
            if order.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.co_execute(plat, order)?))
        } else {
            let exec = decode_order(&buf, &self.table)?;
            if exec.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.co_execute(plat, &exec)?))
        }
    }

    fn finish(&mut self, plat: &mut Platform) -> Result<(), BenchError> {
        if plat.rank() == 0 {
            let mut buf = encode_order(&[]);
            plat.comm_mut().broadcast(0, &mut buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::{CpuWork, Graph, Op, OpError};
    use ds_platform::{Communicator, SelfComm, SimAccelerator, ThreadComm};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Host work that burns a rank-dependent amount of time.
    struct Spin(Duration);

    impl CpuWork for Spin {
        fn run(&self, _plat: &mut Platform) -> Result<(), OpError> {
            thread::sleep(self.0);
            Ok(())
        }
    }

    fn linear_graph(cost: Duration) -> (Graph, Vec<OpRef>) {
        let start = Op::start();
        let work = Op::cpu("work", Arc::new(Spin(cost)));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &work).then(&work, &end);
        let order = vec![start, work, end];
        (g, order)
    }

    #[test]
    fn single_rank_measures_and_returns() {
        let (g, order) = linear_graph(Duration::from_micros(200));
        let cfg = BenchConfig {
            n_iters: 5,
            warmup_iters: 1,
        };
        let mut bench = CollectiveBenchmarker::new(&g, &cfg);
        let mut plat = Platform::new(Box::new(SimAccelerator::new()), Box::new(SelfComm::new()));
        let r = bench.benchmark(&mut plat, &order).unwrap().unwrap();
        assert!(r.pct50 >= 0.0002);
        assert!(r.pct01 <= r.pct99);
    }

    #[test]
    fn every_rank_executes_the_same_order_and_max_wins() {
        // 4 ranks; rank r's op costs (r+1) * 1ms. The reduced median must be
        // the slowest rank's, within scheduling tolerance.
        let ranks = 4u32;
        let comms = ThreadComm::group(ranks);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let cost = Duration::from_millis(u64::from(rank) + 1);
                    let (g, order) = linear_graph(cost);
                    let cfg = BenchConfig {
                        n_iters: 10,
                        warmup_iters: 0,
                    };
                    let mut bench = CollectiveBenchmarker::new(&g, &cfg);
                    let mut plat =
                        Platform::new(Box::new(SimAccelerator::new()), Box::new(comm));
                    let chosen: Vec<OpRef> = if rank == 0 { order } else { Vec::new() };
                    let r = bench.benchmark(&mut plat, &chosen).unwrap().unwrap();
                    (rank, r)
                })
            })
            .collect();

        let mut results = Vec::new();
        for h in handles {
            results.push(h.join().unwrap());
        }
        // all ranks agree on the reduced result
        let (_, first) = results[0];
        for (_, r) in &results {
            assert_eq!(r.pct50, first.pct50);
        }
        // slowest rank costs 4ms per iteration
        assert!(first.pct50 >= 0.004, "pct50 = {}", first.pct50);
    }

    #[test]
    fn finish_releases_follower_ranks() {
        let comms = ThreadComm::group(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let (g, order) = linear_graph(Duration::from_micros(50));
                    let cfg = BenchConfig {
                        n_iters: 2,
                        warmup_iters: 0,
                    };
                    let mut bench = CollectiveBenchmarker::new(&g, &cfg);
                    let mut plat =
                        Platform::new(Box::new(SimAccelerator::new()), Box::new(comm));
                    if rank == 0 {
                        bench.benchmark(&mut plat, &order).unwrap().unwrap();
                        bench.finish(&mut plat).unwrap();
                        0u32
                    } else {
                        let mut seen = 0;
                        while bench.benchmark(&mut plat, &[]).unwrap().is_some() {
                            seen += 1;
                        }
                        seen
                    }
                })
            })
            .collect();
        let counts: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counts[1], 1);
    }
}
