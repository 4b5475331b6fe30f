//! Sidelink slot timing
//!
//! A slot is addressed by its system frame number, subframe and slot index
//! within the subframe for a given numerology. The MAC works on the
//! normalized (absolute) slot index, which is monotonic for a UE.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Number of subframes in one radio frame.
pub const SUBFRAMES_PER_FRAME: u64 = 10;

/// Highest numerology supported (slot of 62.5 us).
pub const MAX_NUMEROLOGY: u8 = 4;

/// Frame/subframe/slot triple at a given numerology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SfnSf {
    frame: u32,
    subframe: u8,
    slot: u8,
    numerology: u8,
}

impl SfnSf {
    /// Creates a new slot address.
    ///
    /// # Panics
    /// Panics if the subframe or slot index is out of range for the numerology.
    pub fn new(frame: u32, subframe: u8, slot: u8, numerology: u8) -> Self {
        assert!(numerology <= MAX_NUMEROLOGY, "numerology {numerology} not supported");
        assert!(
            u64::from(subframe) < SUBFRAMES_PER_FRAME,
            "subframe {subframe} out of range"
        );
        assert!(
            u64::from(slot) < slots_per_subframe(numerology),
            "slot {slot} out of range for numerology {numerology}"
        );
        Self {
            frame,
            subframe,
            slot,
            numerology,
        }
    }

    /// Builds the slot address of an absolute slot index.
    pub fn from_normalized(abs_slot: u64, numerology: u8) -> Self {
        let per_subframe = slots_per_subframe(numerology);
        let per_frame = per_subframe * SUBFRAMES_PER_FRAME;
        let rem = abs_slot % per_frame;
        Self {
            frame: (abs_slot / per_frame) as u32,
            subframe: (rem / per_subframe) as u8,
            slot: (rem % per_subframe) as u8,
            numerology,
        }
    }

    /// Frame number
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Subframe index (0-9)
    pub fn subframe(&self) -> u8 {
        self.subframe
    }

    /// Slot index within the subframe
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Numerology (mu)
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Absolute slot index.
    pub fn normalize(&self) -> u64 {
        (u64::from(self.frame) * SUBFRAMES_PER_FRAME + u64::from(self.subframe))
            * slots_per_subframe(self.numerology)
            + u64::from(self.slot)
    }

    /// Advances this slot by `slots`.
    pub fn add(&mut self, slots: u64) {
        *self = self.future(slots);
    }

    /// Returns the slot `slots` after this one without mutating.
    pub fn future(&self, slots: u64) -> Self {
        Self::from_normalized(self.normalize() + slots, self.numerology)
    }

    /// Duration of one slot at this numerology.
    pub fn slot_duration(&self) -> Duration {
        slot_duration(self.numerology)
    }
}

impl PartialOrd for SfnSf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SfnSf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalize()
            .cmp(&other.normalize())
            .then(self.numerology.cmp(&other.numerology))
    }
}

impl fmt::Display for SfnSf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SfnSf({}/{}/{} mu={})",
            self.frame, self.subframe, self.slot, self.numerology
        )
    }
}

/// Number of slots in a subframe (1 ms) at the numerology.
#[inline]
pub fn slots_per_subframe(numerology: u8) -> u64 {
    1u64 << numerology
}

/// Slot duration at the numerology.
#[inline]
pub fn slot_duration(numerology: u8) -> Duration {
    Duration::from_micros(1000 >> numerology)
}

/// Converts a period in milliseconds into a number of physical slots.
#[inline]
pub fn ms_to_slots(ms: u64, numerology: u8) -> u64 {
    ms * slots_per_subframe(numerology)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_numerology_zero() {
        let sfn = SfnSf::new(3, 4, 0, 0);
        assert_eq!(sfn.normalize(), 34);
    }

    #[test]
    fn test_normalize_numerology_two() {
        let sfn = SfnSf::new(1, 2, 3, 2);
        // (1 * 10 + 2) * 4 + 3
        assert_eq!(sfn.normalize(), 51);
    }

    #[test]
    fn test_from_normalized_inverse() {
        let sfn = SfnSf::new(17, 9, 1, 1);
        let back = SfnSf::from_normalized(sfn.normalize(), 1);
        assert_eq!(back, sfn);
    }

    #[test]
    fn test_future_crosses_frame() {
        let sfn = SfnSf::new(0, 9, 1, 1);
        let next = sfn.future(1);
        assert_eq!(next.frame(), 1);
        assert_eq!(next.subframe(), 0);
        assert_eq!(next.slot(), 0);
        // receiver unchanged
        assert_eq!(sfn.subframe(), 9);
    }

    #[test]
    fn test_add_in_place() {
        let mut sfn = SfnSf::new(0, 0, 0, 0);
        sfn.add(100);
        assert_eq!(sfn.frame(), 10);
        assert_eq!(sfn.normalize(), 100);
    }

    #[test]
    fn test_ordering_follows_absolute_slot() {
        let a = SfnSf::new(0, 9, 0, 0);
        let b = SfnSf::new(1, 0, 0, 0);
        assert!(a < b);
    }

    #[test]
    fn test_slot_duration_and_conversion() {
        assert_eq!(slot_duration(0), Duration::from_millis(1));
        assert_eq!(slot_duration(1), Duration::from_micros(500));
        assert_eq!(ms_to_slots(100, 0), 100);
        assert_eq!(ms_to_slots(100, 2), 400);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_invalid_slot_rejected() {
        let _ = SfnSf::new(0, 0, 2, 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(SfnSf::new(5, 3, 1, 1).to_string(), "SfnSf(5/3/1 mu=1)");
    }
}
