//! Scheduling decision of a selection pass
//!
//! Once the candidate set is known, a [`SlotAllocator`] decides how many
//! occasions the TB gets, which sub-channels it occupies, and how many bytes
//! each logical channel may send. [`RandomSlotAllocator`] is the built-in
//! policy: fixed MCS, one logical channel per destination, occasions drawn
//! uniformly from the candidates.

use std::collections::{BTreeMap, BTreeSet};

use nrsl_common::SlUeConfig;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::grant::{RlcPduInfo, SlotAlloc};
use crate::pool::SlotCandidate;
use crate::sap::{BufferStatusReport, LcKey, SidelinkLcInfo};
use crate::sci::SCI_F2A_LEN;

/// Redundancy versions of consecutive transmissions of a TB.
pub const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// Modulation order and code rate x 1024 of MCS table 1 (64QAM).
const MCS_TABLE: [(u8, u16); 29] = [
    (2, 120),
    (2, 157),
    (2, 193),
    (2, 251),
    (2, 308),
    (2, 379),
    (2, 449),
    (2, 526),
    (2, 602),
    (2, 679),
    (4, 340),
    (4, 378),
    (4, 434),
    (4, 490),
    (4, 553),
    (4, 616),
    (4, 658),
    (6, 438),
    (6, 466),
    (6, 517),
    (6, 567),
    (6, 616),
    (6, 666),
    (6, 719),
    (6, 772),
    (6, 822),
    (6, 873),
    (6, 910),
    (6, 948),
];

/// Subcarriers per resource block.
const SUBCARRIERS_PER_RB: u64 = 12;

/// Transport block size in bytes of `rbs` resource blocks over `symbols`
/// symbols at `mcs`.
///
/// # Panics
/// Panics if `mcs` is above 28.
pub fn tb_size_bytes(mcs: u8, rbs: u16, symbols: u8) -> u32 {
    let (qm, rate) = MCS_TABLE[usize::from(mcs)];
    let res = SUBCARRIERS_PER_RB * u64::from(rbs) * u64::from(symbols);
    let bits = res * u64::from(qm) * u64::from(rate) / 1024;
    (bits / 8) as u32
}

/// Decides the occasions of a new grant.
pub trait SlotAllocator: Send {
    /// A logical channel was added.
    fn configure_lc(&mut self, _info: &SidelinkLcInfo) {}

    /// A logical channel was removed.
    fn remove_lc(&mut self, _key: LcKey) {}

    /// Latest buffer status of a logical channel.
    fn report_buffer_status(&mut self, report: &BufferStatusReport);

    /// Picks the occasions of one TB for `dst_l2_id` among `candidates`.
    ///
    /// The returned allocations are sorted by slot; an empty result means
    /// nothing to schedule.
    fn allocate(&mut self, dst_l2_id: u32, candidates: &[SlotCandidate]) -> Vec<SlotAlloc>;
}

/// Uniformly random occasion selection with a fixed MCS.
#[derive(Debug)]
pub struct RandomSlotAllocator {
    rng: StdRng,
    mcs: u8,
    max_tx: u8,
    total_sub_channels: u16,
    lcs: BTreeMap<LcKey, SidelinkLcInfo>,
    buffers: BTreeMap<LcKey, BufferStatusReport>,
}

impl RandomSlotAllocator {
    /// Creates the allocator of a UE configuration.
    pub fn new(config: &SlUeConfig, rng: StdRng) -> Self {
        let max_tx = if config.mac.enable_blind_retx {
            config.mac.sl_max_tx_trans_num_pssch
        } else {
            1
        };
        Self {
            rng,
            mcs: config.mac.mcs,
            max_tx,
            total_sub_channels: config.total_sub_channels(),
            lcs: BTreeMap::new(),
            buffers: BTreeMap::new(),
        }
    }

    /// Bytes still buffered on a logical channel.
    pub fn buffered(&self, key: &LcKey) -> u32 {
        self.buffers.get(key).map_or(0, BufferStatusReport::total)
    }

    /// Logical channel of `dst` to serve: lowest priority value with data.
    fn select_lc(&self, dst: u32) -> Option<(SidelinkLcInfo, u32)> {
        self.lcs
            .values()
            .filter(|info| info.dst_l2_id == dst)
            .filter_map(|info| {
                let buffered = self.buffered(&info.key());
                (buffered > 0).then_some((*info, buffered))
            })
            .min_by_key(|(info, _)| (info.priority, info.lcid))
    }

    fn select_slots(&mut self, candidates: &[SlotCandidate]) -> Vec<SlotCandidate> {
        let amount = usize::from(self.max_tx).min(candidates.len());
        let mut picked = index::sample(&mut self.rng, candidates.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn free_sub_channels(&self, candidate: &SlotCandidate) -> Vec<u16> {
        (0..self.total_sub_channels)
            .filter(|sc| !candidate.occupied_sub_channels.contains(sc))
            .collect()
    }

    fn random_start(&mut self, free: &[u16], length: u16) -> u16 {
        let free: BTreeSet<u16> = free.iter().copied().collect();
        let starts: Vec<u16> = free
            .iter()
            .copied()
            .filter(|&start| (start..start + length).all(|sc| free.contains(&sc)))
            .collect();
        starts[self.rng.gen_range(0..starts.len())]
    }
}

/// Longest run of consecutive sub-channel indices.
fn longest_run(free: &[u16]) -> u16 {
    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<u16> = None;
    for &sc in free {
        run = match previous {
            Some(p) if p + 1 == sc => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(sc);
    }
    best
}

impl SlotAllocator for RandomSlotAllocator {
    fn configure_lc(&mut self, info: &SidelinkLcInfo) {
        self.lcs.insert(info.key(), *info);
    }

    fn remove_lc(&mut self, key: LcKey) {
        self.lcs.remove(&key);
        self.buffers.remove(&key);
    }

    fn report_buffer_status(&mut self, report: &BufferStatusReport) {
        trace!(
            lcid = report.lcid,
            dst = report.dst_l2_id,
            bytes = report.total(),
            "Buffer status"
        );
        self.buffers.insert(report.key(), *report);
    }

    fn allocate(&mut self, dst_l2_id: u32, candidates: &[SlotCandidate]) -> Vec<SlotAlloc> {
        let Some((lc, buffered)) = self.select_lc(dst_l2_id) else {
            trace!(dst = dst_l2_id, "No buffered data");
            return Vec::new();
        };

        let usable: Vec<SlotCandidate> = candidates
            .iter()
            .filter(|candidate| {
                usize::from(self.total_sub_channels) > candidate.occupied_sub_channels.len()
            })
            .cloned()
            .collect();
        if usable.is_empty() {
            warn!(dst = dst_l2_id, "Every candidate is fully occupied");
            return Vec::new();
        }

        let slots = self.select_slots(&usable);
        let free: Vec<Vec<u16>> = slots.iter().map(|s| self.free_sub_channels(s)).collect();
        let max_length = free.iter().map(|f| longest_run(f)).min().unwrap_or(0);

        let first = &slots[0];
        let symbols = first.pssch_sym_length;
        let mut length = 1;
        let mut tb_size = tb_size_bytes(self.mcs, first.sub_channel_size_rbs, symbols);
        let required = buffered + SCI_F2A_LEN as u32;
        while tb_size < required && length < max_length {
            length += 1;
            tb_size = tb_size_bytes(self.mcs, length * first.sub_channel_size_rbs, symbols);
        }
        let assigned = buffered.min(tb_size.saturating_sub(SCI_F2A_LEN as u32));
        if assigned == 0 {
            return Vec::new();
        }

        if let Some(report) = self.buffers.get_mut(&lc.key()) {
            let mut left = assigned;
            for queue in [&mut report.retx_queue_size, &mut report.tx_queue_size] {
                let taken = left.min(*queue);
                *queue -= taken;
                left -= taken;
            }
            if left > 0 {
                report.status_pdu_size = report.status_pdu_size.saturating_sub(left as u16);
            }
        }

        let n = slots.len();
        let mut allocations = Vec::with_capacity(n);
        for (k, (candidate, free)) in slots.iter().zip(&free).enumerate() {
            let start = self.random_start(free, length);
            let max = candidate.max_num_per_reserve;
            let tx_sci1a = k % usize::from(max) == 0;
            allocations.push(SlotAlloc {
                slot: candidate.slot,
                dst_l2_id,
                priority: lc.priority,
                rlc_pdu_info: vec![RlcPduInfo {
                    lcid: lc.lcid,
                    size: assigned,
                }],
                mcs: self.mcs,
                pscch_rbs: candidate.pscch_rbs,
                pscch_sym_start: candidate.pscch_sym_start,
                pscch_sym_length: candidate.pscch_sym_length,
                pssch_sym_start: candidate.pssch_sym_start,
                pssch_sym_length: candidate.pssch_sym_length,
                sub_channel_start: start as u8,
                sub_channel_length: length as u8,
                max_num_per_reserve: max,
                ndi: k == 0,
                rv: RV_SEQUENCE[k % RV_SEQUENCE.len()],
                tx_sci1a,
                slot_num_ind: if tx_sci1a {
                    max.min((n - k) as u8)
                } else {
                    0
                },
            });
        }

        debug!(
            dst = dst_l2_id,
            lcid = lc.lcid,
            occasions = n,
            sub_channels = length,
            bytes = assigned,
            first = %first.slot,
            "Allocated TB"
        );
        allocations
    }
}
