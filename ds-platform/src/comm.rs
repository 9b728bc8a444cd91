//! In-process communicator backends.
//!
//! `SelfComm` is the single-rank loopback. `ThreadComm` connects N ranks
//! running as threads of one process through per-pair channels, which is
//! enough to exercise the collective protocol without a message library.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

use crate::backend::{BackendError, Communicator, Request};

enum Pending {
    /// Eagerly delivered; nothing left to do at wait time.
    Send,
    /// Payload still to be drained from `peer`'s channel.
    Recv { peer: u32 },
}

/// Loopback communicator for a single process.
pub struct SelfComm {
    next_req: u64,
    pending: HashMap<u64, Pending>,
}

impl SelfComm {
    pub fn new() -> Self {
        Self {
            next_req: 0,
            pending: HashMap::new(),
        }
    }

    fn issue(&mut self, p: Pending) -> Request {
        let id = self.next_req;
        self.next_req += 1;
        self.pending.insert(id, p);
        Request(id)
    }
}

impl Default for SelfComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator for SelfComm {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn barrier(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn broadcast(&mut self, root: u32, _buf: &mut Vec<u8>) -> Result<(), BackendError> {
        if root != 0 {
            return Err(BackendError::Comm(format!("broadcast root {root} of 1")));
        }
        Ok(())
    }

    fn post_send(&mut self, peer: u32, _tag: u32, _bytes: usize) -> Result<Request, BackendError> {
        if peer != 0 {
            return Err(BackendError::Comm(format!("send peer {peer} of 1")));
        }
        Ok(self.issue(Pending::Send))
    }

    fn post_recv(&mut self, peer: u32, _tag: u32, _bytes: usize) -> Result<Request, BackendError> {
        if peer != 0 {
            return Err(BackendError::Comm(format!("recv peer {peer} of 1")));
        }
        Ok(self.issue(Pending::Send))
    }

    fn wait(&mut self, req: Request) -> Result<(), BackendError> {
        self.pending
            .remove(&req.0)
            .map(|_| ())
            .ok_or_else(|| BackendError::Comm(format!("wait on unknown request {}", req.0)))
    }

    fn allreduce_max(&mut self, _vals: &mut [f64]) -> Result<(), BackendError> {
        Ok(())
    }
}

/// One rank of an in-process thread group.
///
/// Channels are FIFO per ordered pair of ranks. The SPMD driver separates
/// point-to-point traffic from collectives with barriers, so the two kinds
/// never interleave on a channel.
pub struct ThreadComm {
    rank: u32,
    size: u32,
    barrier: Arc<Barrier>,
    /// tx[j] sends to rank j; tx[rank] is unused.
    tx: Vec<Sender<Vec<u8>>>,
    /// rx[j] receives from rank j; rx[rank] is unused.
    rx: Vec<Receiver<Vec<u8>>>,
    next_req: u64,
    pending: HashMap<u64, Pending>,
}

impl ThreadComm {
    /// Build a connected group of `n` communicators, one per rank.
    pub fn group(n: u32) -> Vec<ThreadComm> {
        assert!(n >= 1, "group size must be >= 1");
        let barrier = Arc::new(Barrier::new(n as usize));

        // One channel per ordered (from, to) pair.
        let mut senders: Vec<Vec<Option<Sender<Vec<u8>>>>> = Vec::new();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> = Vec::new();
        for _ in 0..n {
            senders.push((0..n).map(|_| None).collect());
            receivers.push((0..n).map(|_| None).collect());
        }
        for from in 0..n as usize {
            for to in 0..n as usize {
                let (tx, rx) = channel();
                senders[from][to] = Some(tx);
                receivers[to][from] = Some(rx);
            }
        }

        let mut out = Vec::with_capacity(n as usize);
        for rank in 0..n as usize {
            let tx: Vec<Sender<Vec<u8>>> = senders[rank]
                .iter_mut()
                .map(|s| s.take().expect("sender populated above"))
                .collect();
            let rx: Vec<Receiver<Vec<u8>>> = receivers[rank]
                .iter_mut()
                .map(|r| r.take().expect("receiver populated above"))
                .collect();
            out.push(ThreadComm {
                rank: rank as u32,
                size: n,
                barrier: Arc::clone(&barrier),
                tx,
                rx,
                next_req: 0,
                pending: HashMap::new(),
            });
        }
        out
    }

    fn check_peer(&self, peer: u32) -> Result<(), BackendError> {
        if peer >= self.size {
            return Err(BackendError::Comm(format!(
                "peer {peer} of {}",
                self.size
            )));
        }
        Ok(())
    }

    fn send_to(&self, peer: u32, payload: Vec<u8>) -> Result<(), BackendError> {
        self.tx[peer as usize]
            .send(payload)
            .map_err(|_| BackendError::Comm(format!("rank {peer} hung up")))
    }

    fn recv_from(&self, peer: u32) -> Result<Vec<u8>, BackendError> {
        self.rx[peer as usize]
            .recv()
            .map_err(|_| BackendError::Comm(format!("rank {peer} hung up")))
    }

    fn issue(&mut self, p: Pending) -> Request {
        let id = self.next_req;
        self.next_req += 1;
        self.pending.insert(id, p);
        Request(id)
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn barrier(&mut self) -> Result<(), BackendError> {
        self.barrier.wait();
        Ok(())
    }

    fn broadcast(&mut self, root: u32, buf: &mut Vec<u8>) -> Result<(), BackendError> {
        self.check_peer(root)?;
        if self.rank == root {
            for peer in 0..self.size {
                if peer != self.rank {
                    self.send_to(peer, buf.clone())?;
                }
            }
        } else {
            *buf = self.recv_from(root)?;
        }
        Ok(())
    }

    fn post_send(&mut self, peer: u32, _tag: u32, bytes: usize) -> Result<Request, BackendError> {
        self.check_peer(peer)?;
        if peer == self.rank {
            return Ok(self.issue(Pending::Send));
        }
        // Eager delivery; the payload contents are not part of the model.
        self.send_to(peer, vec![0u8; bytes])?;
        Ok(self.issue(Pending::Send))
    }

    fn post_recv(&mut self, peer: u32, _tag: u32, _bytes: usize) -> Result<Request, BackendError> {
        self.check_peer(peer)?;
        if peer == self.rank {
            return Ok(self.issue(Pending::Send));
        }
        Ok(self.issue(Pending::Recv { peer }))
    }

    fn wait(&mut self, req: Request) -> Result<(), BackendError> {
        match self.pending.remove(&req.0) {
            Some(Pending::Send) => Ok(()),
            Some(Pending::Recv { peer }) => self.recv_from(peer).map(|_| ()),
            None => Err(BackendError::Comm(format!(
                "wait on unknown request {}",
                req.0
            ))),
        }
    }

    fn allreduce_max(&mut self, vals: &mut [f64]) -> Result<(), BackendError> {
        // Gather to rank 0, fold, broadcast back.
        if self.rank == 0 {
            for peer in 1..self.size {
                let bytes = self.recv_from(peer)?;
                if bytes.len() != vals.len() * 8 {
                    return Err(BackendError::Comm(format!(
                        "reduce size mismatch from rank {peer}: {} vs {}",
                        bytes.len(),
                        vals.len() * 8
                    )));
                }
                for (i, chunk) in bytes.chunks_exact(8).enumerate() {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    vals[i] = vals[i].max(f64::from_le_bytes(raw));
                }
            }
        } else {
            let mut bytes = Vec::with_capacity(vals.len() * 8);
            for v in vals.iter() {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            self.send_to(0, bytes)?;
        }
        let mut reduced: Vec<u8> = Vec::new();
        if self.rank == 0 {
            for v in vals.iter() {
                reduced.extend_from_slice(&v.to_le_bytes());
            }
        }
        self.broadcast(0, &mut reduced)?;
        if self.rank != 0 {
            for (i, chunk) in reduced.chunks_exact(8).enumerate() {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                vals[i] = f64::from_le_bytes(raw);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn self_comm_loopback_send_recv() {
        let mut c = SelfComm::new();
        let s = c.post_send(0, 7, 64).unwrap();
        let r = c.post_recv(0, 7, 64).unwrap();
        c.wait(s).unwrap();
        c.wait(r).unwrap();
        assert!(c.wait(Request(99)).is_err());
    }

    #[test]
    fn thread_group_broadcast_reaches_all_ranks() {
        let group = ThreadComm::group(4);
        let handles: Vec<_> = group
            .into_iter()
            .map(|mut c| {
                thread::spawn(move || {
                    let mut buf = if c.rank() == 0 { vec![1, 2, 3] } else { Vec::new() };
                    c.broadcast(0, &mut buf).unwrap();
                    buf
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![1, 2, 3]);
        }
    }

    #[test]
    fn thread_group_allreduce_max() {
        let group = ThreadComm::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|mut c| {
                thread::spawn(move || {
                    let mut vals = vec![c.rank() as f64, 10.0 - c.rank() as f64];
                    c.allreduce_max(&mut vals).unwrap();
                    vals
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![2.0, 10.0]);
        }
    }

    #[test]
    fn thread_group_point_to_point() {
        let group = ThreadComm::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|mut c| {
                thread::spawn(move || {
                    let peer = 1 - c.rank();
                    let s = c.post_send(peer, 0, 16).unwrap();
                    let r = c.post_recv(peer, 0, 16).unwrap();
                    c.wait(s).unwrap();
                    c.wait(r).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
