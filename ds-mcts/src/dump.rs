//! Periodic tree serialization for postmortems.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, Tree};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDump {
    pub name: String,
    pub tag: u8,
    pub n: u64,
    #[serde(rename = "fullyVisited")]
    pub fully_visited: bool,
    pub times: Vec<f64>,
    pub children: Vec<TreeDump>,
}

pub fn dump_tree(tree: &Tree, id: NodeId) -> TreeDump {
    let node = tree.node(id);
    TreeDump {
        name: node.op.name().to_string(),
        tag: node.op.tag(),
        n: node.n,
        fully_visited: node.fully_visited,
        times: node.times.clone(),
        children: node
            .children
            .iter()
            .map(|&c| dump_tree(tree, c))
            .collect(),
    }
}

pub fn write_tree(path: &Path, dump: &TreeDump) -> io::Result<()> {
    let f = File::create(path)?;
    serde_json::to_writer(BufWriter::new(f), dump).map_err(io::Error::from)
}

pub fn read_tree(path: &Path) -> io::Result<TreeDump> {
    let f = File::open(path)?;
    serde_json::from_reader(BufReader::new(f)).map_err(io::Error::from)
}
