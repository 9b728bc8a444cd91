//! Resource binding: turn unbound candidates into concrete runnable ops.

use ds_core::{Graph, OpKind, OpRef};
use ds_platform::Platform;

use crate::SchedError;

/// All legal bindings of `op` on `plat`.
///
/// Unbound accelerator compute gets one variant per stream, excluding the
/// default stream, which is reserved for host-launched primitives. Anything
/// already bound is its own single variation.
pub fn platform_variations(plat: &Platform, op: &OpRef) -> Vec<OpRef> {
    match op.kind() {
        OpKind::Gpu(_) => plat
            .streams()
            .iter()
            .skip(1)
            .filter_map(|s| op.bind(*s))
            .collect(),
        _ => vec![op.clone()],
    }
}

/// A copy of `g` in which the unbound original of `op` is replaced by `op`.
///
/// Lets the search explore stream assignments as if they were different
/// graphs without touching the source graph.
pub fn bind_unbound_vertex(g: &Graph, op: &OpRef) -> Result<Graph, SchedError> {
    let mut gp = g.clone();
    if !gp.contains(op) && matches!(op.kind(), OpKind::BoundGpu { .. }) {
        let unbound = op.unbound();
        if gp.contains(&unbound) {
            gp.replace(&unbound, op)
                .map_err(|_| SchedError::UnknownOp(op.name().to_string()))?;
        }
    }
    if !gp.contains(op) {
        return Err(SchedError::UnknownOp(op.name().to_string()));
    }
    Ok(gp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::{NullCpuWork, NullGpuWork, Op};
    use ds_platform::{SelfComm, SimAccelerator, Stream};
    use std::sync::Arc;

    fn plat(streams: usize) -> Platform {
        Platform::with_streams(
            streams,
            Box::new(SimAccelerator::new()),
            Box::new(SelfComm::new()),
        )
        .unwrap()
    }

    #[test]
    fn gpu_op_gets_one_variant_per_nondefault_stream() {
        let p = plat(2);
        let k = Op::gpu("k", Arc::new(NullGpuWork));
        let vars = platform_variations(&p, &k);
        assert_eq!(vars.len(), 2);
        let streams: Vec<_> = vars.iter().filter_map(|v| v.compute_stream()).collect();
        assert_eq!(streams, vec![Stream(1), Stream(2)]);
        assert!(vars.iter().all(|v| v.unbound_eq(&k)));
    }

    #[test]
    fn cpu_and_bound_ops_are_singletons() {
        let p = plat(2);
        let c = Op::cpu("c", Arc::new(NullCpuWork));
        assert_eq!(platform_variations(&p, &c), vec![c.clone()]);

        let b = Op::gpu("k", Arc::new(NullGpuWork)).bind(Stream(1)).unwrap();
        assert_eq!(platform_variations(&p, &b), vec![b.clone()]);
    }

    #[test]
    fn bind_vertex_specializes_a_copy() {
        let start = Op::start();
        let k = Op::gpu("k", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &k).then(&k, &end);

        let bound = k.bind(Stream(1)).unwrap();
        let gp = bind_unbound_vertex(&g, &bound).unwrap();
        assert!(gp.contains(&bound));
        assert!(!gp.contains(&k));
        // source untouched
        assert!(g.contains(&k));
        assert!(!g.contains(&bound));
    }

    #[test]
    fn bind_vertex_is_idempotent_for_present_ops() {
        let start = Op::start();
        let c = Op::cpu("c", Arc::new(NullCpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &c).then(&c, &end);
        let gp = bind_unbound_vertex(&g, &c).unwrap();
        assert!(gp.contains(&c));
    }

    #[test]
    fn bind_vertex_rejects_foreign_ops() {
        let start = Op::start();
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &end);
        let other = Op::gpu("x", Arc::new(NullGpuWork)).bind(Stream(1)).unwrap();
        assert!(matches!(
            bind_unbound_vertex(&g, &other),
            Err(SchedError::UnknownOp(_))
        ));
    }
}
