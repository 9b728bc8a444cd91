//! The set of ops that may legally extend a committed prefix.

use ds_core::{Graph, OpKind, OpRef, Seq};
use ds_platform::Platform;

use crate::bind::platform_variations;
use crate::sync::{is_synced, make_syncs};
use crate::SchedError;

/// All legal next steps from `completed`: candidate ops whose dependencies
/// are visible, or the sync ops that would make them visible.
///
/// Syncs are generated for every stream variation of every candidate, so
/// more syncs can be offered than the chosen path will need; unselected
/// ones simply never get committed. A wait is only offered once its record
/// is in the prefix, which keeps every offered step immediately legal.
pub fn frontier(
    plat: &mut Platform,
    g: &Graph,
    completed: &Seq,
) -> Result<Vec<OpRef>, SchedError> {
    // Ops with at least one committed pred. Inserted syncs have no graph
    // entry and contribute nothing here.
    let mut one_pred: Vec<OpRef> = Vec::new();
    for cop in completed.iter() {
        let Some(succs) = g.succs_or_unbound(cop) else {
            continue;
        };
        for succ in succs {
            if !one_pred.iter().any(|o| **o == **succ) {
                one_pred.push(succ.clone());
            }
        }
    }

    // Keep those not already done whose every pred is done.
    let mut candidates: Vec<OpRef> = Vec::new();
    for op in one_pred {
        if completed.contains_unbound(&op) {
            continue;
        }
        let preds = g
            .preds_or_unbound(&op)
            .ok_or_else(|| SchedError::UnknownOp(op.name().to_string()))?;
        if preds.iter().all(|p| completed.contains_unbound(p)) {
            candidates.push(op);
        }
    }

    let mut out: Vec<OpRef> = Vec::new();
    for candidate in &candidates {
        for bound in platform_variations(plat, candidate) {
            if is_synced(&bound, g, completed)? {
                out.push(bound);
            } else {
                for sync in make_syncs(plat, &bound, g, completed)? {
                    let enabled = match sync.kind() {
                        // the record half must commit before its wait is legal
                        OpKind::StreamWaitEvent { event, .. } | OpKind::EventSync { event } => {
                            completed.iter().any(|o| {
                                matches!(o.kind(),
                                    OpKind::EventRecord { event: e, .. } if e == event)
                            })
                        }
                        _ => true,
                    };
                    if enabled {
                        out.push(sync);
                    }
                }
            }
        }
    }

    out.sort();
    out.dedup();
    Ok(out)
}
