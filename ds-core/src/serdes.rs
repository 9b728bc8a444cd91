//! JSON (de)serialization for operations and graphs.
//!
//! Each op contributes its own object including its tag and resource
//! bindings. Compute payloads cannot cross a serialization boundary, so a
//! reloaded graph carries inert payloads; adjacency, names, and tags are
//! preserved exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::graph::Graph;
use crate::op::{
    MsgSlot, NullCpuWork, NullGpuWork, Op, OpKind, OpRef, TAG_BOUND_GPU, TAG_CPU, TAG_END,
    TAG_EVENT_RECORD, TAG_EVENT_SYNC, TAG_GPU, TAG_POST_RECV, TAG_POST_SEND, TAG_START,
    TAG_STREAM_SYNC, TAG_STREAM_WAIT_EVENT, TAG_WAIT_MSG,
};
use ds_platform::{Event, Stream};

#[derive(Debug, Error)]
pub enum SerdesError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed graph json: {0}")]
    Malformed(String),
    #[error("unknown tag {0}")]
    UnknownTag(u64),
    #[error("edge references unknown op {0}")]
    UnknownEdgeOp(String),
}

pub fn op_to_json(op: &Op) -> Value {
    let mut j = json!({ "name": op.name(), "tag": op.tag() });
    let obj = j.as_object_mut().expect("constructed as object");
    match op.kind() {
        OpKind::BoundGpu { stream, .. } | OpKind::StreamSync { stream } => {
            obj.insert("stream".into(), json!(stream.id()));
        }
        OpKind::EventRecord { stream, event } | OpKind::StreamWaitEvent { stream, event } => {
            obj.insert("stream".into(), json!(stream.id()));
            obj.insert("event".into(), json!(event.id()));
        }
        OpKind::EventSync { event } => {
            obj.insert("event".into(), json!(event.id()));
        }
        OpKind::PostSend {
            peer, tag, bytes, ..
        }
        | OpKind::PostRecv {
            peer, tag, bytes, ..
        } => {
            obj.insert("peer".into(), json!(peer));
            obj.insert("msg_tag".into(), json!(tag));
            obj.insert("bytes".into(), json!(bytes));
        }
        _ => {}
    }
    j
}

pub fn graph_to_json(g: &Graph) -> Value {
    let nodes: Vec<Value> = g.nodes().map(|op| op_to_json(op)).collect();
    let mut edges: Vec<Value> = Vec::new();
    for u in g.nodes() {
        for v in g.succs(u).into_iter().flatten() {
            edges.push(json!([u.name(), v.name()]));
        }
    }
    json!({ "nodes": nodes, "edges": edges })
}

fn field_u64(j: &Value, key: &str) -> Result<u64, SerdesError> {
    j.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| SerdesError::Malformed(format!("missing field {key}")))
}

fn field_str<'a>(j: &'a Value, key: &str) -> Result<&'a str, SerdesError> {
    j.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SerdesError::Malformed(format!("missing field {key}")))
}

pub fn op_from_json(j: &Value) -> Result<OpRef, SerdesError> {
    let name = field_str(j, "name")?;
    let tag = field_u64(j, "tag")?;
    if tag > u8::MAX as u64 {
        return Err(SerdesError::UnknownTag(tag));
    }
    let stream = || field_u64(j, "stream").map(|s| Stream(s as u32));
    let event = || field_u64(j, "event").map(|e| Event(e as u32));
    let op = match tag as u8 {
        TAG_START => Op::new(name, OpKind::Start),
        TAG_END => Op::end(name),
        TAG_CPU => Op::cpu(name, Arc::new(NullCpuWork)),
        TAG_GPU => Op::gpu(name, Arc::new(NullGpuWork)),
        TAG_BOUND_GPU => Op::bound_gpu(name, Arc::new(NullGpuWork), stream()?),
        TAG_STREAM_SYNC => Op::stream_sync(stream()?),
        TAG_EVENT_RECORD => Op::event_record(event()?, stream()?),
        TAG_STREAM_WAIT_EVENT => Op::stream_wait_event(stream()?, event()?),
        TAG_EVENT_SYNC => Op::event_sync(event()?),
        TAG_POST_SEND => Op::post_send(
            name,
            field_u64(j, "peer")? as u32,
            field_u64(j, "msg_tag")? as u32,
            field_u64(j, "bytes")? as usize,
        ),
        TAG_POST_RECV => Op::post_recv(
            name,
            field_u64(j, "peer")? as u32,
            field_u64(j, "msg_tag")? as u32,
            field_u64(j, "bytes")? as usize,
        ),
        TAG_WAIT_MSG => Op::wait_msg(name, MsgSlot::new()),
        _ => return Err(SerdesError::UnknownTag(tag)),
    };
    Ok(op)
}

pub fn graph_from_json(j: &Value) -> Result<Graph, SerdesError> {
    let nodes = j
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| SerdesError::Malformed("missing nodes".into()))?;
    let edges = j
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| SerdesError::Malformed("missing edges".into()))?;

    let mut by_name: BTreeMap<String, OpRef> = BTreeMap::new();
    for n in nodes {
        let op = op_from_json(n)?;
        by_name.insert(op.name().to_string(), op);
    }

    let mut g = Graph::new();
    for e in edges {
        let pair = e
            .as_array()
            .filter(|p| p.len() == 2)
            .ok_or_else(|| SerdesError::Malformed("edge is not a pair".into()))?;
        let from = pair[0]
            .as_str()
            .ok_or_else(|| SerdesError::Malformed("edge endpoint is not a string".into()))?;
        let to = pair[1]
            .as_str()
            .ok_or_else(|| SerdesError::Malformed("edge endpoint is not a string".into()))?;
        let u = by_name
            .get(from)
            .ok_or_else(|| SerdesError::UnknownEdgeOp(from.to_string()))?
            .clone();
        let v = by_name
            .get(to)
            .ok_or_else(|| SerdesError::UnknownEdgeOp(to.to_string()))?
            .clone();
        g.then(&u, &v);
    }
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::NullGpuWork;

    fn sample_graph() -> Graph {
        let start = Op::start();
        let recv = Op::post_recv("recv-x", 1, 0, 1024);
        let k = Op::gpu("spmv", Arc::new(NullGpuWork)).bind(Stream(1)).unwrap();
        let rec = Op::event_record(Event(0), Stream(1));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &recv)
            .then(&start, &k)
            .then(&k, &rec)
            .then(&recv, &end)
            .then(&rec, &end);
        g
    }

    #[test]
    fn op_json_carries_tag_and_bindings() {
        let k = Op::gpu("spmv", Arc::new(NullGpuWork)).bind(Stream(2)).unwrap();
        let j = op_to_json(&k);
        assert_eq!(j["name"], "spmv");
        assert_eq!(j["tag"], TAG_BOUND_GPU);
        assert_eq!(j["stream"], 2);

        let rec = Op::event_record(Event(4), Stream(1));
        let j = op_to_json(&rec);
        assert_eq!(j["stream"], 1);
        assert_eq!(j["event"], 4);
    }

    #[test]
    fn graph_roundtrip_preserves_adjacency_names_tags() {
        let g = sample_graph();
        let j = graph_to_json(&g);
        let text = serde_json::to_string(&j).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        let g2 = graph_from_json(&back).unwrap();

        assert_eq!(g.node_count(), g2.node_count());
        for op in g.nodes() {
            let found = g2
                .nodes()
                .find(|o| o.name() == op.name())
                .unwrap_or_else(|| panic!("missing {}", op.name()));
            assert_eq!(found.tag(), op.tag());
            let succ_names: Vec<&str> =
                g.succs(op).unwrap().iter().map(|s| s.name()).collect();
            let succ_names2: Vec<&str> =
                g2.succs(found).unwrap().iter().map(|s| s.name()).collect();
            assert_eq!(succ_names, succ_names2);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let j = json!({ "name": "x", "tag": 200 });
        assert!(matches!(op_from_json(&j), Err(SerdesError::UnknownTag(200))));
    }
}
