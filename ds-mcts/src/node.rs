//! The search tree over schedule prefixes.
//!
//! Nodes live in one flat vector owned by `Tree`; the node at index 0 is
//! the root and holds the graph's start op. Children are created through
//! `add_child`, which wires both link directions, and the parent link is a
//! non-owning back-reference, so walking up or down the tree is iteration,
//! never recursion. A node's committed prefix is the op sequence along its
//! parent chain.

use ds_core::{OpRef, Seq};

pub type NodeId = u32;

pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// The op chosen by the edge leading here.
    pub op: OpRef,
    /// Playouts through this node.
    pub n: u64,
    pub expanded: bool,
    /// No novel completion remains anywhere below this node.
    pub fully_visited: bool,
    /// Stand-in value before the node accumulates measurements.
    pub value_estimate: f64,
    /// Observed percentile per playout, kept sorted ascending.
    pub times: Vec<f64>,
}

impl Node {
    pub fn new(op: OpRef, parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            op,
            n: 0,
            expanded: false,
            fully_visited: false,
            value_estimate: f64::INFINITY,
            times: Vec::new(),
        }
    }

    pub fn insert_time(&mut self, t: f64) {
        let i = self.times.partition_point(|&x| x < t);
        self.times.insert(i, t);
    }

    pub fn median(&self) -> Option<f64> {
        if self.times.is_empty() {
            None
        } else {
            Some(self.times[self.times.len() / 2])
        }
    }

    pub fn min_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn max_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// A tree holding only the root; `op` is the prefix every schedule
    /// starts from.
    pub fn with_root(op: OpRef) -> Self {
        Self {
            nodes: vec![Node::new(op, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Append a child for the schedule step `op` under `parent`, linking
    /// both directions.
    pub fn add_child(&mut self, parent: NodeId, op: OpRef) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node::new(op, Some(parent)));
        self.nodes[parent as usize].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// A node is a leaf while it has no children or any child has never
    /// been simulated.
    pub fn is_leaf(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.children.is_empty() {
            return true;
        }
        node.children.iter().any(|&c| self.node(c).n == 0)
    }

    /// The committed prefix along the path from the root to `id`.
    pub fn prefix(&self, id: NodeId) -> Seq {
        let mut ops: Vec<OpRef> = Vec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            let node = self.node(i);
            ops.push(node.op.clone());
            cur = node.parent;
        }
        ops.reverse();
        Seq::from(ops)
    }
}
