//! Wire codec for a bound order.
//!
//! Every op is shipped as (tag, name, handle ids) so a receiving rank can
//! reconstruct the exact bound order by name lookup, bind unbound compute to
//! the broadcast stream, and synthesize inserted syncs that were never part
//! of its graph. An empty order is the end-of-search signal.

use rustc_hash::FxHashMap;

use ds_core::{
    Graph, Op, OpKind, OpRef, TAG_BOUND_GPU, TAG_EVENT_RECORD, TAG_EVENT_SYNC, TAG_GPU,
    TAG_STREAM_SYNC, TAG_STREAM_WAIT_EVENT,
};
use ds_platform::{Event, Stream};

use crate::BenchError;

const NO_HANDLE: u32 = u32::MAX;

/// Name lookup for the graph ops a rank built at startup.
pub struct OpTable {
    by_name: FxHashMap<String, OpRef>,
}

impl OpTable {
    pub fn new(g: &Graph) -> Self {
        let mut by_name = FxHashMap::default();
        for op in g.nodes() {
            by_name.insert(op.name().to_string(), op.clone());
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&OpRef> {
        self.by_name.get(name)
    }
}

fn op_handles(op: &Op) -> (u32, u32) {
    match op.kind() {
        OpKind::BoundGpu { stream, .. } | OpKind::StreamSync { stream } => {
            (stream.id(), NO_HANDLE)
        }
        OpKind::EventRecord { stream, event } | OpKind::StreamWaitEvent { stream, event } => {
            (stream.id(), event.id())
        }
        OpKind::EventSync { event } => (NO_HANDLE, event.id()),
        _ => (NO_HANDLE, NO_HANDLE),
    }
}

pub fn encode_order(order: &[OpRef]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(order.len() as u32).to_le_bytes());
    for op in order {
        let name = op.name().as_bytes();
        let (stream, event) = op_handles(op);
        buf.push(op.tag());
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(name);
        buf.extend_from_slice(&stream.to_le_bytes());
        buf.extend_from_slice(&event.to_le_bytes());
    }
    buf
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BenchError> {
        if self.pos + n > self.buf.len() {
            return Err(BenchError::Malformed("truncated order".into()));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, BenchError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, BenchError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

pub fn decode_order(buf: &[u8], table: &OpTable) -> Result<Vec<OpRef>, BenchError> {
    let mut cur = Cursor { buf, pos: 0 };
    let count = cur.u32()? as usize;
    let mut order = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = cur.u8()?;
        let name_len = cur.u32()? as usize;
        let name = std::str::from_utf8(cur.take(name_len)?)
            .map_err(|_| BenchError::Malformed("op name is not utf-8".into()))?;
        let stream = cur.u32()?;
        let event = cur.u32()?;

        let op = match tag {
            TAG_GPU => {
                return Err(BenchError::Malformed(format!("unbound op {name} in order")));
            }
            TAG_BOUND_GPU => {
                let local = table
                    .get(name)
                    .ok_or_else(|| BenchError::UnknownOp(name.to_string()))?;
                local
                    .bind(Stream(stream))
                    .ok_or_else(|| BenchError::Malformed(format!("{name} is not bindable")))?
            }
            TAG_EVENT_RECORD => Op::event_record(Event(event), Stream(stream)),
            TAG_STREAM_WAIT_EVENT => Op::stream_wait_event(Stream(stream), Event(event)),
            TAG_EVENT_SYNC => Op::event_sync(Event(event)),
            TAG_STREAM_SYNC => Op::stream_sync(Stream(stream)),
            _ => {
                let local = table
                    .get(name)
                    .ok_or_else(|| BenchError::UnknownOp(name.to_string()))?;
                if local.tag() != tag {
                    return Err(BenchError::Malformed(format!(
                        "tag mismatch for {name}: {} vs {}",
                        local.tag(),
                        tag
                    )));
                }
                local.clone()
            }
        };
        order.push(op);
    }
    if cur.pos != buf.len() {
        return Err(BenchError::Malformed("trailing bytes after order".into()));
    }
    Ok(order)
}

/// Largest event id referenced by `order`, if any.
pub fn max_event_id(order: &[OpRef]) -> Option<u32> {
    order
        .iter()
        .filter_map(|op| match op.kind() {
            OpKind::EventRecord { event, .. }
            | OpKind::StreamWaitEvent { event, .. }
            | OpKind::EventSync { event } => Some(event.id()),
            _ => None,
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::{NullCpuWork, NullGpuWork};
    use std::sync::Arc;

    fn sample() -> (Graph, Vec<OpRef>) {
        let start = Op::start();
        let c = Op::cpu("pack", Arc::new(NullCpuWork));
        let k = Op::gpu("spmv", Arc::new(NullGpuWork));
        let end = Op::end("end");
        let mut g = Graph::new();
        g.then(&start, &c).then(&c, &k).then(&k, &end);

        let order = vec![
            start,
            c,
            k.bind(Stream(2)).unwrap(),
            Op::event_record(Event(0), Stream(2)),
            Op::stream_sync(Stream(2)),
            Op::event_sync(Event(0)),
            end,
        ];
        (g, order)
    }

    #[test]
    fn order_roundtrips_through_the_wire() {
        let (g, order) = sample();
        let table = OpTable::new(&g);
        let bytes = encode_order(&order);
        let back = decode_order(&bytes, &table).unwrap();
        assert_eq!(back.len(), order.len());
        for (a, b) in order.iter().zip(&back) {
            assert_eq!(**a, **b);
            assert_eq!(a.tag(), b.tag());
        }
        assert_eq!(back[2].compute_stream(), Some(Stream(2)));
    }

    #[test]
    fn empty_order_is_the_stop_signal() {
        let (g, _) = sample();
        let table = OpTable::new(&g);
        let back = decode_order(&encode_order(&[]), &table).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn unknown_name_is_rejected() {
        let (g, _) = sample();
        let table = OpTable::new(&g);
        let stranger = Op::cpu("stranger", Arc::new(NullCpuWork));
        let bytes = encode_order(&[stranger]);
        assert!(matches!(
            decode_order(&bytes, &table),
            Err(BenchError::UnknownOp(_))
        ));
    }

    #[test]
    fn truncation_is_rejected() {
        let (g, order) = sample();
        let table = OpTable::new(&g);
        let bytes = encode_order(&order);
        assert!(decode_order(&bytes[..bytes.len() - 3], &table).is_err());
    }

    #[test]
    fn max_event_id_spans_all_sync_kinds() {
        let (_, order) = sample();
        assert_eq!(max_event_id(&order), Some(0));
        assert_eq!(max_event_id(&order[..2]), None);
    }
}
