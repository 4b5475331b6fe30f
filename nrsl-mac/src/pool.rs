//! Sidelink resource pool and candidate generation
//!
//! The pool maps the TDD pattern and the sidelink bitmap onto physical
//! slots: the pattern is repeated, and every UL slot consumes the next
//! bitmap bit. The resulting physical sidelink pattern has period
//! `len(tdd) * (len(bitmap) / gcd(#UL, len(bitmap)))` slots.

use std::collections::BTreeSet;

use nrsl_common::{ms_to_slots, slots_per_subframe, SfnSf, SlPoolConfig, SlUeConfig, TddSlotType};
use tracing::trace;

/// A single-slot resource inside the selection window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCandidate {
    /// Slot of the candidate
    pub slot: SfnSf,
    /// First PSCCH symbol
    pub pscch_sym_start: u8,
    /// Number of PSCCH symbols
    pub pscch_sym_length: u8,
    /// PSCCH bandwidth in RBs
    pub pscch_rbs: u16,
    /// First PSSCH symbol
    pub pssch_sym_start: u8,
    /// Number of PSSCH symbols
    pub pssch_sym_length: u8,
    /// Sub-channel size in RBs
    pub sub_channel_size_rbs: u16,
    /// Occasions signalled per SCI-1A in this pool
    pub max_num_per_reserve: u8,
    /// Sub-channels seen occupied by sensed transmissions
    pub occupied_sub_channels: BTreeSet<u16>,
}

impl SlotCandidate {
    /// Absolute slot index.
    pub fn abs_slot(&self) -> u64 {
        self.slot.normalize()
    }
}

/// The active transmission pool of a UE.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    config: SlPoolConfig,
    numerology: u8,
    total_sub_channels: u16,
    pattern: Vec<bool>,
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Builds the physical sidelink slot pattern.
pub fn physical_sl_pattern(tdd_pattern: &[TddSlotType], sl_bitmap: &[u8]) -> Vec<bool> {
    let ul_slots = tdd_pattern
        .iter()
        .filter(|&&slot| slot == TddSlotType::Ul)
        .count();
    if ul_slots == 0 || sl_bitmap.is_empty() {
        return vec![false; tdd_pattern.len()];
    }

    let repetitions = sl_bitmap.len() / gcd(ul_slots, sl_bitmap.len());
    let mut pattern = Vec::with_capacity(tdd_pattern.len() * repetitions);
    let mut bit = 0;
    for _ in 0..repetitions {
        for slot in tdd_pattern {
            if *slot == TddSlotType::Ul {
                pattern.push(sl_bitmap[bit % sl_bitmap.len()] == 1);
                bit += 1;
            } else {
                pattern.push(false);
            }
        }
    }
    pattern
}

impl ResourcePool {
    /// Builds the pool of a UE configuration.
    pub fn new(config: &SlUeConfig) -> Self {
        let pattern = physical_sl_pattern(&config.pool.tdd_pattern, &config.pool.sl_bitmap);
        trace!(
            pool_id = config.pool.pool_id,
            period = pattern.len(),
            sl_slots = pattern.iter().filter(|&&sl| sl).count(),
            "Physical sidelink pattern built"
        );
        Self {
            config: config.pool.clone(),
            numerology: config.numerology,
            total_sub_channels: config.total_sub_channels(),
            pattern,
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &SlPoolConfig {
        &self.config
    }

    /// Numerology of the carrier.
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Physical sidelink pattern, one entry per slot.
    pub fn physical_pattern(&self) -> &[bool] {
        &self.pattern
    }

    /// Number of sub-channels in the pool.
    pub fn total_sub_channels(&self) -> u16 {
        self.total_sub_channels
    }

    /// Sub-channel size in RBs.
    pub fn sub_channel_size_rbs(&self) -> u16 {
        self.config.sub_channel_size_rbs
    }

    /// Returns true if the absolute slot belongs to the pool.
    pub fn is_sidelink_slot(&self, abs_slot: u64) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        self.pattern[(abs_slot % self.pattern.len() as u64) as usize]
    }

    /// Reservation period converted into physical slots.
    pub fn reservation_period_slots(&self, period_ms: u16) -> u64 {
        ms_to_slots(u64::from(period_ms), self.numerology)
    }

    /// Sensing window length in physical slots.
    pub fn sensing_window_slots(&self) -> u64 {
        ms_to_slots(u64::from(self.config.sensing_window_ms), self.numerology)
    }

    /// Returns all pool slots between `t1` and `t2` slots after `now`.
    ///
    /// # Panics
    /// Panics if the selection window `(t2 - t1 + 1)` slots is longer than
    /// the reservation period.
    pub fn generate_candidates(
        &self,
        now: &SfnSf,
        t1: u8,
        t2: u16,
        reservation_period_ms: u16,
    ) -> Vec<SlotCandidate> {
        let window_slots = u64::from(t2).saturating_sub(u64::from(t1)) + 1;
        let window_us = window_slots * 1000 / slots_per_subframe(self.numerology);
        assert!(
            window_us <= u64::from(reservation_period_ms) * 1000,
            "selection window of {window_us} us is longer than the reservation period of \
             {reservation_period_ms} ms; reduce T2 - T1 or the numerology"
        );

        let now_abs = now.normalize();
        (u64::from(t1)..=u64::from(t2))
            .map(|offset| now_abs + offset)
            .filter(|&abs_slot| self.is_sidelink_slot(abs_slot))
            .map(|abs_slot| SlotCandidate {
                slot: SfnSf::from_normalized(abs_slot, self.numerology),
                pscch_sym_start: self.config.pscch_sym_start,
                pscch_sym_length: self.config.pscch_sym_length,
                pscch_rbs: self.config.pscch_rbs,
                pssch_sym_start: self.config.pssch_sym_start,
                pssch_sym_length: self.config.pssch_sym_length,
                sub_channel_size_rbs: self.config.sub_channel_size_rbs,
                max_num_per_reserve: self.config.max_num_per_reserve,
                occupied_sub_channels: BTreeSet::new(),
            })
            .collect()
    }
}
