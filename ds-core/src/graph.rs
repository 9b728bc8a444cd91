//! Operation DAG with successor and predecessor maps.
//!
//! Graphs are value types: cloning copies the edge maps and shares the
//! underlying operations. The maps are ordered by the ops' total order so
//! iteration is deterministic on every rank.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::op::{Op, OpKind, OpRef};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate op name {0}")]
    DuplicateName(String),
    #[error("graph has no start")]
    NoStart,
    #[error("graph has more than one start")]
    MultipleStart,
    #[error("start has predecessors")]
    StartHasPreds,
    #[error("graph has no reachable end")]
    NoEnd,
    #[error("source {0} has no predecessors but is not the start")]
    DanglingSource(String),
    #[error("sink {0} is not an end")]
    DanglingSink(String),
    #[error("graph contains a cycle")]
    Cycle,
    #[error("op {0} is not bound")]
    Unbound(String),
    #[error("op {0} not in graph")]
    UnknownOp(String),
}

#[derive(Clone, Default)]
pub struct Graph {
    succs: BTreeMap<OpRef, BTreeSet<OpRef>>,
    preds: BTreeMap<OpRef, BTreeSet<OpRef>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_vertex(&mut self, op: &OpRef) {
        self.succs.entry(op.clone()).or_default();
        self.preds.entry(op.clone()).or_default();
    }

    /// Record that `u` happens before `v`.
    pub fn then(&mut self, u: &OpRef, v: &OpRef) -> &mut Self {
        self.ensure_vertex(u);
        self.ensure_vertex(v);
        self.succs
            .get_mut(u)
            .expect("vertex inserted above")
            .insert(v.clone());
        self.preds
            .get_mut(v)
            .expect("vertex inserted above")
            .insert(u.clone());
        self
    }

    pub fn contains(&self, op: &Op) -> bool {
        self.succs.contains_key(op)
    }

    pub fn node_count(&self) -> usize {
        self.succs.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &OpRef> {
        self.succs.keys()
    }

    pub fn succs(&self, op: &Op) -> Option<&BTreeSet<OpRef>> {
        self.succs.get(op)
    }

    pub fn preds(&self, op: &Op) -> Option<&BTreeSet<OpRef>> {
        self.preds.get(op)
    }

    fn vertex_or_unbound(&self, op: &Op) -> Option<&OpRef> {
        if let Some((k, _)) = self.succs.get_key_value(op) {
            return Some(k);
        }
        // A prefix may hold the bound version of a vertex that is still
        // unbound here (or the graph may hold the bound version already).
        self.succs.keys().find(|k| k.unbound_eq(op))
    }

    pub fn contains_or_unbound(&self, op: &Op) -> bool {
        self.vertex_or_unbound(op).is_some()
    }

    /// Successors of the vertex matching `op` exactly or by unbound identity.
    pub fn succs_or_unbound(&self, op: &Op) -> Option<&BTreeSet<OpRef>> {
        self.vertex_or_unbound(op).and_then(|k| self.succs.get(k))
    }

    pub fn preds_or_unbound(&self, op: &Op) -> Option<&BTreeSet<OpRef>> {
        self.vertex_or_unbound(op).and_then(|k| self.preds.get(k))
    }

    /// Substitute `old` with `new` in both maps, keeping all edges.
    pub fn replace(&mut self, old: &OpRef, new: &OpRef) -> Result<(), GraphError> {
        if !self.contains(old) {
            return Err(GraphError::UnknownOp(old.name().to_string()));
        }
        let swap = |set: &mut BTreeSet<OpRef>| {
            if set.remove(old) {
                set.insert(new.clone());
            }
        };
        let old_succs = self.succs.remove(old).unwrap_or_default();
        let old_preds = self.preds.remove(old).unwrap_or_default();
        self.succs.insert(new.clone(), old_succs);
        self.preds.insert(new.clone(), old_preds);
        for set in self.succs.values_mut() {
            swap(set);
        }
        for set in self.preds.values_mut() {
            swap(set);
        }
        Ok(())
    }

    /// The unique start vertex.
    pub fn start(&self) -> Result<&OpRef, GraphError> {
        let mut it = self
            .succs
            .keys()
            .filter(|op| matches!(op.kind(), OpKind::Start));
        let first = it.next().ok_or(GraphError::NoStart)?;
        if it.next().is_some() {
            return Err(GraphError::MultipleStart);
        }
        Ok(first)
    }

    /// All sink vertices.
    pub fn ends(&self) -> Vec<&OpRef> {
        self.succs
            .iter()
            .filter(|(_, s)| s.is_empty())
            .map(|(k, _)| k)
            .collect()
    }

    /// Narrow to bound ops; errors on the first unbound vertex.
    pub fn bound_ops(&self) -> Result<Vec<OpRef>, GraphError> {
        let mut out = Vec::with_capacity(self.succs.len());
        for op in self.succs.keys() {
            if !op.is_bound() {
                return Err(GraphError::Unbound(op.name().to_string()));
            }
            out.push(op.clone());
        }
        Ok(out)
    }

    /// Structural checks: unique names, unique start with no preds, sinks
    /// are ends, acyclicity.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut names = BTreeSet::new();
        for op in self.succs.keys() {
            if !names.insert(op.name()) {
                return Err(GraphError::DuplicateName(op.name().to_string()));
            }
        }

        let start = self.start()?;
        if !self.preds[start].is_empty() {
            return Err(GraphError::StartHasPreds);
        }
        for (op, preds) in &self.preds {
            if preds.is_empty() && !matches!(op.kind(), OpKind::Start) {
                return Err(GraphError::DanglingSource(op.name().to_string()));
            }
        }

        let ends = self.ends();
        if ends.is_empty() {
            return Err(GraphError::NoEnd);
        }
        for end in &ends {
            if !matches!(end.kind(), OpKind::End) {
                return Err(GraphError::DanglingSink(end.name().to_string()));
            }
        }

        // Kahn's algorithm; leftover vertices mean a cycle.
        let mut degree: BTreeMap<&OpRef, usize> = self
            .preds
            .iter()
            .map(|(k, p)| (k, p.len()))
            .collect();
        let mut ready: Vec<&OpRef> = degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&k, _)| k)
            .collect();
        let mut seen = 0usize;
        while let Some(op) = ready.pop() {
            seen += 1;
            for succ in &self.succs[op] {
                let d = degree.get_mut(succ).expect("succ is a vertex");
                *d -= 1;
                if *d == 0 {
                    ready.push(succ);
                }
            }
        }
        if seen != self.succs.len() {
            return Err(GraphError::Cycle);
        }
        Ok(())
    }

    /// Human-readable adjacency listing.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (op, succs) in &self.succs {
            out.push_str(&op.desc());
            out.push_str(" -> ");
            let names: Vec<String> = succs.iter().map(|s| s.desc()).collect();
            out.push_str(&names.join(", "));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{NullCpuWork, NullGpuWork};
    use ds_platform::Stream;
    use std::sync::Arc;

    fn diamond() -> (Graph, OpRef, OpRef, OpRef, OpRef, OpRef) {
        let start = Op::start();
        let a = Op::cpu("a", Arc::new(NullCpuWork));
        let b = Op::cpu("b", Arc::new(NullCpuWork));
        let c = Op::cpu("c", Arc::new(NullCpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &a)
            .then(&start, &b)
            .then(&a, &c)
            .then(&b, &c)
            .then(&c, &end);
        (g, start, a, b, c, end)
    }

    #[test]
    fn diamond_is_valid() {
        let (g, start, a, b, c, end) = diamond();
        g.validate().unwrap();
        assert_eq!(*g.start().unwrap(), start);
        assert_eq!(g.ends(), vec![&end]);
        assert_eq!(g.preds(&c).unwrap().len(), 2);
        assert!(g.succs(&a).unwrap().contains(&c));
        assert!(g.preds(&a).unwrap().contains(&start));
        assert_eq!(g.node_count(), 5);
        assert!(g.contains(&b));
    }

    #[test]
    fn cycle_is_rejected() {
        let start = Op::start();
        let a = Op::cpu("a", Arc::new(NullCpuWork));
        let b = Op::cpu("b", Arc::new(NullCpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &a).then(&a, &b).then(&b, &a).then(&b, &end);
        assert!(matches!(g.validate(), Err(GraphError::Cycle)));
    }

    #[test]
    fn missing_start_is_rejected() {
        let a = Op::cpu("a", Arc::new(NullCpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&a, &end);
        assert!(matches!(g.validate(), Err(GraphError::NoStart)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let start = Op::start();
        let a1 = Op::cpu("a", Arc::new(NullCpuWork));
        let a2 = Op::gpu("a", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &a1).then(&start, &a2).then(&a1, &end).then(&a2, &end);
        assert!(matches!(g.validate(), Err(GraphError::DuplicateName(_))));
    }

    #[test]
    fn replace_rewires_both_maps() {
        let start = Op::start();
        let k = Op::gpu("k", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &k).then(&k, &end);

        let bound = k.bind(Stream(1)).unwrap();
        g.replace(&k, &bound).unwrap();
        assert!(!g.contains(&k));
        assert!(g.contains(&bound));
        assert!(g.succs(&start).unwrap().contains(&bound));
        assert!(g.preds(&end).unwrap().contains(&bound));
        assert_eq!(g.preds(&bound).unwrap().len(), 1);
        g.validate().unwrap();
    }

    #[test]
    fn unbound_lookup_finds_bound_vertex_and_back() {
        let start = Op::start();
        let k = Op::gpu("k", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &k).then(&k, &end);

        let bound = k.bind(Stream(2)).unwrap();
        // graph holds the unbound vertex; query with the bound op
        assert!(g.contains_or_unbound(&bound));
        assert!(g.succs_or_unbound(&bound).unwrap().contains(&end));

        g.replace(&k, &bound).unwrap();
        // graph holds the bound vertex; query with the unbound op
        assert!(g.contains_or_unbound(&k));
        assert!(g.preds_or_unbound(&k).unwrap().contains(&start));
    }

    #[test]
    fn bound_narrowing() {
        let (g, ..) = diamond();
        assert!(g.bound_ops().is_ok());

        let start = Op::start();
        let k = Op::gpu("k", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g2 = Graph::new();
        g2.then(&start, &k).then(&k, &end);
        assert!(matches!(g2.bound_ops(), Err(GraphError::Unbound(_))));
    }

    #[test]
    fn clone_shares_ops() {
        let (g, _, a, ..) = diamond();
        let g2 = g.clone();
        let v1 = g.vertex_or_unbound(&a).unwrap();
        let v2 = g2.vertex_or_unbound(&a).unwrap();
        assert!(Arc::ptr_eq(v1, v2));
    }

    #[test]
    fn dump_lists_adjacency() {
        let (g, ..) = diamond();
        let d = g.dump();
        assert!(d.contains("{a} -> {c}"));
        assert!(d.contains("{start} -> {a}, {b}"));
    }
}
