//! Semi-persistent sidelink grants
//!
//! A grant holds the future slot allocations of one destination. The slots
//! picked by the allocator for one TB are replicated `cResel` times, one
//! reservation period apart. The reselection counter is decremented once
//! per TB, on its last occasion; when it reaches zero the UE either keeps
//! the reservation (with probability `slProbResourceKeep`) or reselects.

use std::collections::BTreeMap;

use nrsl_common::{SfnSf, SlUeConfig};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, trace};

use crate::pool::SlotCandidate;

/// Bytes granted to one logical channel on an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlcPduInfo {
    /// Logical channel id
    pub lcid: u8,
    /// Bytes offered to the logical channel
    pub size: u32,
}

/// One transmission occasion of a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAlloc {
    /// Slot of the transmission
    pub slot: SfnSf,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Priority of the TB
    pub priority: u8,
    /// Bytes per logical channel
    pub rlc_pdu_info: Vec<RlcPduInfo>,
    /// MCS
    pub mcs: u8,
    /// PSCCH bandwidth in RBs
    pub pscch_rbs: u16,
    /// First PSCCH symbol
    pub pscch_sym_start: u8,
    /// Number of PSCCH symbols
    pub pscch_sym_length: u8,
    /// First PSSCH symbol
    pub pssch_sym_start: u8,
    /// Number of PSSCH symbols
    pub pssch_sym_length: u8,
    /// First PSSCH sub-channel
    pub sub_channel_start: u8,
    /// Number of PSSCH sub-channels
    pub sub_channel_length: u8,
    /// Occasions signalled per SCI-1A
    pub max_num_per_reserve: u8,
    /// New data indicator: first transmission of a TB
    pub ndi: bool,
    /// Redundancy version
    pub rv: u8,
    /// Whether SCI-1A is sent in this slot
    pub tx_sci1a: bool,
    /// Occasions announced by the SCI-1A of this slot, including itself
    pub slot_num_ind: u8,
}

impl SlotAlloc {
    /// Absolute slot index.
    pub fn abs_slot(&self) -> u64 {
        self.slot.normalize()
    }

    /// Total bytes offered to all logical channels.
    pub fn tb_size(&self) -> u32 {
        self.rlc_pdu_info.iter().map(|info| info.size).sum()
    }
}

/// Reservation of one destination.
#[derive(Debug, Clone)]
pub struct Grant {
    dst_l2_id: u32,
    allocations: BTreeMap<u64, SlotAlloc>,
    n_selected: u8,
    tb_tx_counter: u8,
    resel_counter: u8,
    prev_resel_counter: u8,
    c_resel: u32,
    harq_id: Option<u8>,
}

impl Grant {
    /// Builds a grant by replicating the selected occasions `c_resel`
    /// times, `period_slots` apart.
    ///
    /// # Panics
    /// Panics if either counter is zero, if `selected` is empty, or if two
    /// replicated occasions fall on the same slot.
    pub fn create(
        dst_l2_id: u32,
        selected: &[SlotAlloc],
        resel_counter: u8,
        c_resel: u32,
        period_slots: u64,
    ) -> Self {
        assert!(resel_counter != 0, "cannot create a grant with a zero reselection counter");
        assert!(c_resel != 0, "cannot create a grant with a zero cResel counter");
        assert!(!selected.is_empty(), "cannot create a grant without allocations");

        let mut allocations = BTreeMap::new();
        for i in 0..u64::from(c_resel) {
            for alloc in selected {
                let mut alloc = alloc.clone();
                alloc.slot.add(i * period_slots);
                let slot = alloc.abs_slot();
                let previous = allocations.insert(slot, alloc);
                assert!(previous.is_none(), "slot allocation {slot} already exists");
            }
        }

        debug!(
            dst = dst_l2_id,
            resel_counter,
            c_resel,
            allocations = allocations.len(),
            "Grant created"
        );

        Self {
            dst_l2_id,
            allocations,
            n_selected: selected.len() as u8,
            tb_tx_counter: 0,
            resel_counter,
            prev_resel_counter: resel_counter,
            c_resel,
            harq_id: None,
        }
    }

    /// Destination of the grant.
    pub fn dst_l2_id(&self) -> u32 {
        self.dst_l2_id
    }

    /// Transmissions per TB.
    pub fn n_selected(&self) -> u8 {
        self.n_selected
    }

    /// Transmissions of the current TB so far.
    pub fn tb_tx_counter(&self) -> u8 {
        self.tb_tx_counter
    }

    /// Remaining TBs before reselection.
    pub fn resel_counter(&self) -> u8 {
        self.resel_counter
    }

    /// Counter drawn when the grant was created.
    pub fn prev_resel_counter(&self) -> u8 {
        self.prev_resel_counter
    }

    /// Remaining reservation periods.
    pub fn c_resel(&self) -> u32 {
        self.c_resel
    }

    /// HARQ process of the TB in flight.
    pub fn harq_id(&self) -> Option<u8> {
        self.harq_id
    }

    /// Pending allocations in slot order.
    pub fn allocations(&self) -> impl Iterator<Item = &SlotAlloc> {
        self.allocations.values()
    }

    /// Number of pending allocations.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns true if no allocation is pending.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Earliest pending allocation.
    pub fn next_allocation(&self) -> Option<&SlotAlloc> {
        self.allocations.values().next()
    }

    /// Returns true if an allocation sits on the absolute slot.
    pub fn contains_slot(&self, abs_slot: u64) -> bool {
        self.allocations.contains_key(&abs_slot)
    }

    /// Removes and returns the earliest allocation if it is due in `now`
    /// and the grant is active.
    pub fn take_due(&mut self, now: &SfnSf) -> Option<SlotAlloc> {
        if self.resel_counter == 0 {
            return None;
        }
        let now_abs = now.normalize();
        match self.allocations.first_key_value() {
            Some((&slot, _)) if slot == now_abs => self.allocations.pop_first().map(|(_, a)| a),
            _ => None,
        }
    }

    /// Drops allocations that are already in the past, together with the
    /// retransmissions of a TB whose first occasion was dropped.
    ///
    /// Every TB missed entirely counts against the reselection counter. A
    /// TB in flight whose remaining occasions were dropped is completed and
    /// its HARQ process returned.
    pub fn discard_stale(&mut self, now: &SfnSf) -> StaleDiscard {
        let now_abs = now.normalize();
        let mut discard = StaleDiscard::default();
        while let Some((&slot, alloc)) = self.allocations.first_key_value() {
            if slot >= now_abs && (discard.dropped == 0 || alloc.ndi) {
                break;
            }
            if alloc.ndi {
                self.resel_counter = self.resel_counter.saturating_sub(1);
                self.c_resel = self.c_resel.saturating_sub(1);
            }
            self.allocations.pop_first();
            discard.dropped += 1;
        }

        let next_is_retx = self.next_allocation().is_some_and(|alloc| !alloc.ndi);
        if discard.dropped > 0 && self.tb_tx_counter > 0 && !next_is_retx {
            discard.completed_tb = true;
            discard.released_harq = self.complete_tb();
        }
        if discard.dropped > 0 {
            debug!(dst = self.dst_l2_id, dropped = discard.dropped, "Discarded stale allocations");
        }
        discard
    }

    /// Allocations following the current one that its SCI-1A announces:
    /// the next `slot_num_ind - 1` occasions.
    pub fn announced_retx(&self, slot_num_ind: u8) -> impl Iterator<Item = &SlotAlloc> {
        self.allocations
            .values()
            .take(usize::from(slot_num_ind.saturating_sub(1)))
    }

    /// Starts a new TB, on HARQ process `harq_id` when one was assigned.
    pub fn start_tb(&mut self, harq_id: Option<u8>) {
        self.tb_tx_counter = 1;
        self.harq_id = harq_id;
    }

    /// Counts a retransmission of the TB in flight.
    pub fn count_retx(&mut self) {
        self.tb_tx_counter += 1;
    }

    /// Returns true if the TB in flight had its last transmission.
    pub fn is_tb_complete(&self) -> bool {
        self.tb_tx_counter >= self.n_selected
    }

    /// Closes the TB in flight: decrements both counters and returns the
    /// HARQ process to release.
    pub fn complete_tb(&mut self) -> Option<u8> {
        self.resel_counter = self.resel_counter.saturating_sub(1);
        self.c_resel = self.c_resel.saturating_sub(1);
        self.tb_tx_counter = 0;
        trace!(
            dst = self.dst_l2_id,
            resel_counter = self.resel_counter,
            c_resel = self.c_resel,
            "TB completed"
        );
        self.harq_id.take()
    }

    fn keep(&mut self) {
        self.resel_counter = self.prev_resel_counter;
    }

    fn clear(&mut self) {
        self.allocations.clear();
    }
}

/// Result of [`Grant::discard_stale`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleDiscard {
    /// Allocations removed
    pub dropped: usize,
    /// Whether the TB in flight was closed
    pub completed_tb: bool,
    /// HARQ process of the closed TB
    pub released_harq: Option<u8>,
}

/// Outcome of evaluating a destination in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantState {
    /// The grant is active, nothing to do
    Active,
    /// The counter expired and the reservation was kept
    Kept,
    /// New resources must be selected
    Reselect,
}

/// Bounds of the reselection counter for a reservation period.
///
/// `[5, 15]` for periods of at least 100 ms, otherwise scaled by
/// `ceil(100 / max(20, P))`.
pub fn resel_counter_bounds(period_ms: u16) -> (u8, u8) {
    if period_ms >= 100 {
        return (5, 15);
    }
    let scale = 100u16.div_ceil(period_ms.max(20)) as u8;
    (5 * scale, 15 * scale)
}

/// Per destination grant state machine.
#[derive(Debug)]
pub struct GrantScheduler {
    grants: BTreeMap<u32, Grant>,
    rng: StdRng,
    prob_resource_keep: f64,
    reservation_period_ms: u16,
    period_slots: u64,
}

impl GrantScheduler {
    /// Creates a scheduler for the configured reservation period.
    pub fn new(config: &SlUeConfig, rng: StdRng) -> Self {
        Self {
            grants: BTreeMap::new(),
            rng,
            prob_resource_keep: config.mac.sl_prob_resource_keep,
            reservation_period_ms: config.mac.reservation_period_ms,
            period_slots: nrsl_common::ms_to_slots(
                u64::from(config.mac.reservation_period_ms),
                config.numerology,
            ),
        }
    }

    /// Reservation period in slots.
    pub fn period_slots(&self) -> u64 {
        self.period_slots
    }

    /// Decides what happens to the reservation of `dst` in this slot.
    pub fn evaluate(&mut self, dst: u32) -> GrantState {
        let Some(grant) = self.grants.get_mut(&dst) else {
            return GrantState::Reselect;
        };
        if grant.resel_counter != 0 {
            return GrantState::Active;
        }

        let draw: f64 = self.rng.gen();
        if grant.c_resel > 0 && !grant.is_empty() && self.prob_resource_keep > draw {
            grant.keep();
            info!(dst, resel_counter = grant.resel_counter, "Keeping the reservation");
            return GrantState::Kept;
        }

        debug!(
            dst,
            c_resel = grant.c_resel,
            remaining = grant.len(),
            draw,
            "Choosing new resources"
        );
        grant.clear();
        GrantState::Reselect
    }

    /// Draws a reselection counter and the matching `cResel`.
    pub fn draw_resel_counter(&mut self) -> (u8, u32) {
        let (min, max) = resel_counter_bounds(self.reservation_period_ms);
        let counter = self.rng.gen_range(min..=max);
        (counter, u32::from(counter) * 10)
    }

    /// Removes the candidates already claimed by any grant.
    pub fn filter_claimed(&self, mut candidates: Vec<SlotCandidate>) -> Vec<SlotCandidate> {
        candidates.retain(|candidate| {
            let slot = candidate.abs_slot();
            !self.grants.values().any(|grant| grant.contains_slot(slot))
        });
        candidates
    }

    /// Installs a fresh grant for `dst` from the selected occasions.
    ///
    /// # Panics
    /// Panics if `dst` still holds an active grant.
    pub fn install(
        &mut self,
        dst: u32,
        selected: &[SlotAlloc],
        resel_counter: u8,
        c_resel: u32,
    ) -> &Grant {
        if let Some(existing) = self.grants.get(&dst) {
            assert_eq!(
                existing.resel_counter, 0,
                "reselection counter of destination {dst} must be zero before a new grant"
            );
        }
        let grant = Grant::create(dst, selected, resel_counter, c_resel, self.period_slots);
        self.grants.insert(dst, grant);
        &self.grants[&dst]
    }

    /// Grant of `dst`.
    pub fn grant(&self, dst: u32) -> Option<&Grant> {
        self.grants.get(&dst)
    }

    /// Mutable grant of `dst`.
    pub fn grant_mut(&mut self, dst: u32) -> Option<&mut Grant> {
        self.grants.get_mut(&dst)
    }

    /// All grants by destination.
    pub fn grants_mut(&mut self) -> impl Iterator<Item = (&u32, &mut Grant)> {
        self.grants.iter_mut()
    }

    /// Returns true if any grant exists.
    pub fn has_grants(&self) -> bool {
        !self.grants.is_empty()
    }
}
