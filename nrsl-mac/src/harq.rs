//! Sidelink HARQ process pool
//!
//! A fixed set of stop-and-wait processes. A process is bound to one
//! destination from `assign` until `release` and keeps the PDUs of the TB
//! in flight so blind retransmissions can resend them verbatim. Free ids
//! are handed out in FIFO order.

use std::collections::{BTreeSet, VecDeque};

use bytes::Bytes;
use tracing::{debug, trace, warn};

/// A single HARQ process.
#[derive(Debug, Clone, Default)]
pub struct HarqProcess {
    dst: Option<u32>,
    burst: Vec<Bytes>,
    lc_ids: BTreeSet<u8>,
}

impl HarqProcess {
    /// Destination the process is bound to, if any.
    pub fn destination(&self) -> Option<u32> {
        self.dst
    }

    /// PDUs of the TB in flight.
    pub fn burst(&self) -> &[Bytes] {
        &self.burst
    }

    fn clear(&mut self) {
        self.dst = None;
        self.burst.clear();
        self.lc_ids.clear();
    }
}

/// Fixed-size pool of HARQ processes with a FIFO free list.
#[derive(Debug)]
pub struct HarqProcessPool {
    processes: Vec<HarqProcess>,
    available: VecDeque<u8>,
}

impl HarqProcessPool {
    /// Creates a pool of `num_processes` free processes with ids `0..n`.
    pub fn new(num_processes: u8) -> Self {
        Self {
            processes: vec![HarqProcess::default(); usize::from(num_processes)],
            available: (0..num_processes).collect(),
        }
    }

    /// Rebuilds the pool with `num_processes` free processes.
    pub fn reinit(&mut self, num_processes: u8) {
        debug!(num_processes, "Reinitializing HARQ pool");
        *self = Self::new(num_processes);
    }

    /// Total number of processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Returns true if the pool has no processes at all.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Binds the oldest free process to `dst` and returns its id.
    ///
    /// # Panics
    /// Panics if every process is in use.
    pub fn assign(&mut self, dst: u32) -> u8 {
        let Some(id) = self.available.pop_front() else {
            panic!("no HARQ process available for destination {dst}");
        };
        self.processes[usize::from(id)].dst = Some(dst);
        trace!(harq_id = id, dst, "HARQ process assigned");
        id
    }

    /// Stores a PDU of logical channel `lcid` in process `id`.
    ///
    /// # Panics
    /// Panics if the process is not bound to `dst`, or if the burst
    /// already holds a PDU of the same logical channel.
    pub fn add_packet(&mut self, dst: u32, id: u8, lcid: u8, pdu: Bytes) {
        let process = self.process_mut(id);
        assert_eq!(
            process.dst,
            Some(dst),
            "HARQ process {id} is not bound to destination {dst}"
        );
        process.lc_ids.insert(lcid);
        process.burst.push(pdu);
        assert_eq!(
            process.lc_ids.len(),
            process.burst.len(),
            "HARQ process {id} holds more than one PDU per logical channel"
        );
    }

    /// Clears process `id` and returns it to the free list.
    pub fn release(&mut self, id: u8) {
        if self.available.contains(&id) {
            warn!(harq_id = id, "HARQ process released while already free");
            return;
        }
        self.process_mut(id).clear();
        self.available.push_back(id);
        trace!(harq_id = id, "HARQ process released");
    }

    /// PDUs buffered in process `id` for `dst`.
    ///
    /// Empty when the process is bound elsewhere.
    pub fn packet_burst(&self, dst: u32, id: u8) -> &[Bytes] {
        match self.processes.get(usize::from(id)) {
            Some(process) if process.dst == Some(dst) => process.burst(),
            _ => &[],
        }
    }

    /// Returns the process with `id`.
    pub fn process(&self, id: u8) -> Option<&HarqProcess> {
        self.processes.get(usize::from(id))
    }

    /// Returns true if process `id` is free.
    pub fn is_available(&self, id: u8) -> bool {
        self.available.contains(&id)
    }

    /// Number of free processes.
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    fn process_mut(&mut self, id: u8) -> &mut HarqProcess {
        let len = self.processes.len();
        self.processes
            .get_mut(usize::from(id))
            .unwrap_or_else(|| panic!("HARQ id {id} outside pool of {len}"))
    }
}
