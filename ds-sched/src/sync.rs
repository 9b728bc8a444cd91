//! Decide whether a candidate op's dependencies are visible in its resource,
//! and synthesize the sync ops that make them visible when they are not.
//!
//! Rules:
//! - same stream, same process: stream order suffices
//! - cross-stream: event-record on the producer's stream, then
//!   stream-wait-event on the consumer's stream
//! - host consuming a stream: event-record then event-sync
//! - stream consuming the host, and message waits: nothing extra

use std::collections::BTreeMap;

use ds_core::{Graph, Op, OpKind, OpRef, Seq};
use ds_platform::{Event, Platform, Stream};

use crate::SchedError;

/// Producer stream and the prefix position of the latest committed pred
/// running on it, for every pred of `op` that needs cross-resource
/// visibility.
fn pending_producers(
    op: &Op,
    g: &Graph,
    completed: &Seq,
) -> Result<BTreeMap<Stream, usize>, SchedError> {
    let mut producers: BTreeMap<Stream, usize> = BTreeMap::new();

    // Message waits carry their own serialization, and the structural
    // start/end markers consume nothing.
    if matches!(
        op.kind(),
        OpKind::WaitMsg { .. } | OpKind::Start | OpKind::End
    ) {
        return Ok(producers);
    }

    let preds = g
        .preds_or_unbound(op)
        .ok_or_else(|| SchedError::UnknownOp(op.name().to_string()))?;
    for pred in preds {
        let pos = completed.position_unbound(pred).ok_or_else(|| {
            SchedError::MissingPred {
                op: op.name().to_string(),
                pred: pred.name().to_string(),
            }
        })?;
        let committed = &completed.as_slice()[pos];
        let Some(sp) = committed.compute_stream() else {
            // Host-side pred: already visible to everything this process
            // issues later.
            continue;
        };
        if op.compute_stream() == Some(sp) {
            continue;
        }
        let slot = producers.entry(sp).or_insert(pos);
        *slot = (*slot).max(pos);
    }
    Ok(producers)
}

/// First event recorded on `stream` after `from`, searched from the back so
/// the freshest record wins.
fn record_after(completed: &Seq, from: usize, stream: Stream) -> Option<(usize, Event)> {
    completed
        .as_slice()
        .iter()
        .enumerate()
        .skip(from + 1)
        .rev()
        .find_map(|(i, o)| match o.kind() {
            OpKind::EventRecord { stream: s, event } if *s == stream => Some((i, *event)),
            _ => None,
        })
}

fn covered(completed: &Seq, from: usize, producer: Stream, consumer: Option<Stream>) -> bool {
    // Any record on the producer stream after `from`, followed by the right
    // kind of wait, makes the dependency visible.
    for (i, o) in completed.as_slice().iter().enumerate().skip(from + 1) {
        let OpKind::EventRecord { stream: s, event } = o.kind() else {
            continue;
        };
        if *s != producer {
            continue;
        }
        let waited = completed.as_slice()[i + 1..].iter().any(|w| match w.kind() {
            OpKind::StreamWaitEvent { stream, event: e } => {
                consumer == Some(*stream) && e == event
            }
            OpKind::EventSync { event: e } => consumer.is_none() && e == event,
            _ => false,
        });
        if waited {
            return true;
        }
    }
    false
}

/// True iff every dependency of `op` has already been made visible in `op`'s
/// resource by the prefix `completed`.
pub fn is_synced(op: &Op, g: &Graph, completed: &Seq) -> Result<bool, SchedError> {
    let consumer = op.compute_stream();
    for (producer, pos) in pending_producers(op, g, completed)? {
        if !covered(completed, pos, producer, consumer) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// The minimal ordered list of sync ops to append before `op` can be
/// appended. Fresh events come from `plat`; an event whose record is already
/// committed is reused for the missing wait half.
pub fn make_syncs(
    plat: &mut Platform,
    op: &Op,
    g: &Graph,
    completed: &Seq,
) -> Result<Vec<OpRef>, SchedError> {
    let consumer = op.compute_stream();
    let mut syncs: Vec<OpRef> = Vec::new();
    for (producer, pos) in pending_producers(op, g, completed)? {
        if covered(completed, pos, producer, consumer) {
            continue;
        }
        let event = match record_after(completed, pos, producer) {
            Some((_, e)) => e,
            None => {
                let e = plat.new_event()?;
                syncs.push(Op::event_record(e, producer));
                e
            }
        };
        match consumer {
            Some(stream) => syncs.push(Op::stream_wait_event(stream, event)),
            None => syncs.push(Op::event_sync(event)),
        }
    }
    Ok(syncs)
}
