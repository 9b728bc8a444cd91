//! Ordered prefix of committed bound ops.

use std::fmt;

use crate::op::{Op, OpRef};

#[derive(Clone, Default)]
pub struct Seq {
    ops: Vec<OpRef>,
}

impl Seq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: OpRef) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpRef> {
        self.ops.iter()
    }

    pub fn as_slice(&self) -> &[OpRef] {
        &self.ops
    }

    pub fn get(&self, i: usize) -> Option<&OpRef> {
        self.ops.get(i)
    }

    /// Membership under bound (structural) equality.
    pub fn contains_bound(&self, op: &Op) -> bool {
        self.ops.iter().any(|o| **o == *op)
    }

    /// Membership after stripping stream bindings, so an unbound graph
    /// vertex matches its committed bound version and vice versa.
    pub fn contains_unbound(&self, op: &Op) -> bool {
        self.ops.iter().any(|o| o.unbound_eq(op))
    }

    /// Position of the committed op matching `op` by unbound identity.
    pub fn position_unbound(&self, op: &Op) -> Option<usize> {
        self.ops.iter().position(|o| o.unbound_eq(op))
    }

    pub fn names(&self) -> Vec<String> {
        self.ops.iter().map(|o| o.name().to_string()).collect()
    }

    pub fn into_vec(self) -> Vec<OpRef> {
        self.ops
    }
}

impl From<Vec<OpRef>> for Seq {
    fn from(ops: Vec<OpRef>) -> Self {
        Self { ops }
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descs: Vec<String> = self.ops.iter().map(|o| o.desc()).collect();
        write!(f, "[{}]", descs.join(", "))
    }
}
