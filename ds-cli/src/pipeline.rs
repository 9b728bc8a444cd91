//! The demo workload: one distributed SpMV iteration as an operation DAG.
//!
//! Per rank: scatter boundary entries, exchange halos with the neighbor,
//! run the local and halo matrix-vector products, and combine. Kernel
//! bodies are synthetic costs sized from the matrix shape; the DAG is the
//! part under search.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ds_core::{CpuWork, Graph, GpuWork, Op, OpError, OpKind};
use ds_platform::{Accelerator, Platform, Stream};

use crate::banded::RankWork;

/// Cost per nonzero for the synthetic kernels.
const NS_PER_NNZ: u64 = 20;

struct GpuKernel {
    cost: Duration,
}

impl GpuWork for GpuKernel {
    fn run(&self, accel: &mut dyn Accelerator, stream: Stream) -> Result<(), OpError> {
        accel.launch(stream, self.cost)?;
        Ok(())
    }
}

struct CpuKernel {
    cost: Duration,
}

impl CpuWork for CpuKernel {
    fn run(&self, _plat: &mut Platform) -> Result<(), OpError> {
        // host work occupies the driver thread for its duration
        let t0 = Instant::now();
        if self.cost > Duration::from_micros(100) {
            thread::sleep(self.cost);
        } else {
            while t0.elapsed() < self.cost {
                std::hint::spin_loop();
            }
        }
        Ok(())
    }
}

fn cost_for(nnz: usize) -> Duration {
    Duration::from_nanos(NS_PER_NNZ * nnz as u64)
}

/// Build this rank's DAG for one SpMV iteration.
///
/// The halo exchange is symmetric, so a rank's incoming data cannot arrive
/// before its own send is issued; the post-send -> wait-recv edge encodes
/// that and keeps lock-step replay free of wait-before-post deadlocks.
pub fn build_pipeline(rank: u32, size: u32, work: &RankWork) -> Graph {
    let up = (rank + 1) % size.max(1);
    let down = (rank + size.max(1) - 1) % size.max(1);

    let start = Op::start();
    let end = Op::end("end");

    let scatter = Op::gpu(
        "scatter",
        Arc::new(GpuKernel {
            cost: cost_for(work.halo_nnz.max(1)),
        }),
    );
    let pack = Op::cpu(
        "pack",
        Arc::new(CpuKernel {
            cost: cost_for(work.halo_nnz.max(1) / 4),
        }),
    );
    let post_send = Op::post_send("post-send", up, 0, work.halo_nnz.max(1) * 8);
    let send_slot = match post_send.kind() {
        OpKind::PostSend { req, .. } => req.clone(),
        _ => unreachable!("constructed as post-send"),
    };
    let wait_send = Op::wait_msg("wait-send", send_slot);

    let post_recv = Op::post_recv("post-recv", down, 0, work.halo_nnz.max(1) * 8);
    let recv_slot = match post_recv.kind() {
        OpKind::PostRecv { req, .. } => req.clone(),
        _ => unreachable!("constructed as post-recv"),
    };
    let wait_recv = Op::wait_msg("wait-recv", recv_slot);

    let spmv_local = Op::gpu(
        "spmv-local",
        Arc::new(GpuKernel {
            cost: cost_for(work.local_nnz.max(1)),
        }),
    );
    let spmv_halo = Op::gpu(
        "spmv-halo",
        Arc::new(GpuKernel {
            cost: cost_for(work.halo_nnz.max(1)),
        }),
    );
    let axpy = Op::gpu(
        "axpy",
        Arc::new(GpuKernel {
            cost: cost_for(work.rows.max(1)),
        }),
    );

    let mut g = Graph::new();
    g.then(&start, &scatter)
        .then(&scatter, &pack)
        .then(&pack, &post_send)
        .then(&post_send, &wait_send)
        .then(&wait_send, &end);
    g.then(&start, &post_recv)
        .then(&post_recv, &wait_recv)
        .then(&post_send, &wait_recv)
        .then(&wait_recv, &spmv_halo)
        .then(&spmv_halo, &axpy);
    g.then(&start, &spmv_local)
        .then(&spmv_local, &axpy)
        .then(&axpy, &end);
    g
}
