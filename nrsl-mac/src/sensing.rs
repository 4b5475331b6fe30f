//! Sensing window
//!
//! Every SCI-1A decoded from another UE becomes a [`SensedRecord`]. Records
//! are kept in arrival order and evicted once they fall out of the sensing
//! window, so the buffer covers `[now - T0, now]`. The exclusion filter
//! additionally ignores the records of the last `Tproc0` slots.

use std::collections::VecDeque;

use nrsl_common::{ms_to_slots, slots_per_subframe, SfnSf};
use tracing::trace;

use crate::sci::SciF1a;

/// A reservation overheard from another UE.
#[derive(Debug, Clone, PartialEq)]
pub struct SensedRecord {
    /// Slot in which the SCI was received
    pub slot: SfnSf,
    /// Announced reservation period in ms, 0 when not reserving
    pub reservation_period_ms: u16,
    /// First sub-channel of the initial transmission
    pub start_sub_channel: u8,
    /// Number of sub-channels
    pub length_sub_channel: u8,
    /// Priority of the sensed TB
    pub priority: u8,
    /// Measured RSRP in dBm
    pub rsrp_dbm: f64,
    /// Slot gap to the first retransmission
    pub gap_retx1: Option<u8>,
    /// First sub-channel of the first retransmission
    pub start_sub_channel_retx1: Option<u8>,
    /// Slot gap to the second retransmission
    pub gap_retx2: Option<u8>,
    /// First sub-channel of the second retransmission
    pub start_sub_channel_retx2: Option<u8>,
}

/// One future transmission implied by a sensed reservation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensedOccasion {
    /// Absolute slot
    pub abs_slot: u64,
    /// First occupied sub-channel
    pub start_sub_channel: u8,
    /// Number of occupied sub-channels
    pub length_sub_channel: u8,
    /// RSRP of the sensed SCI in dBm
    pub rsrp_dbm: f64,
}

impl SensedOccasion {
    /// Sub-channels covered by this occasion.
    pub fn sub_channels(&self) -> std::ops::Range<u16> {
        let start = u16::from(self.start_sub_channel);
        start..start + u16::from(self.length_sub_channel)
    }
}

impl SensedRecord {
    /// Builds a record from a decoded SCI-1A.
    pub fn from_sci(slot: SfnSf, sci: &SciF1a, rsrp_dbm: f64) -> Self {
        Self {
            slot,
            reservation_period_ms: sci.reservation_period_ms,
            start_sub_channel: sci.start_sub_channel,
            length_sub_channel: sci.length_sub_channel,
            priority: sci.priority,
            rsrp_dbm,
            gap_retx1: sci.gap_retx1,
            start_sub_channel_retx1: sci.start_sub_channel_retx1,
            gap_retx2: sci.gap_retx2,
            start_sub_channel_retx2: sci.start_sub_channel_retx2,
        }
    }

    /// Expands the reservation into every occasion that may fall inside a
    /// selection window of `selection_window_slots` physical slots.
    ///
    /// With `Tscal` the window length in ms and `P` the reservation period,
    /// occasions `i = 0..=q` are produced at `slot + i * P'` (P in slots),
    /// where `q = ceil(Tscal / P)` if `P < Tscal` and `q = 1` otherwise.
    /// Each occasion is followed by its retransmissions. A record without
    /// reservation period only yields its own slot.
    pub fn project_future_occasions(
        &self,
        selection_window_slots: u16,
        numerology: u8,
    ) -> Vec<SensedOccasion> {
        let period_ms = self.reservation_period_ms;
        let q = if period_ms == 0 {
            0
        } else {
            let tscal_ms =
                f64::from(selection_window_slots) / slots_per_subframe(numerology) as f64;
            let period = f64::from(period_ms);
            if period < tscal_ms {
                (tscal_ms / period).ceil() as u64
            } else {
                1
            }
        };
        let period_slots = ms_to_slots(u64::from(period_ms), numerology);
        let base_slot = self.slot.normalize();

        let mut occasions = Vec::with_capacity((q as usize + 1) * 3);
        for i in 0..=q {
            let abs_slot = base_slot + i * period_slots;
            occasions.push(SensedOccasion {
                abs_slot,
                start_sub_channel: self.start_sub_channel,
                length_sub_channel: self.length_sub_channel,
                rsrp_dbm: self.rsrp_dbm,
            });

            let retx = [
                (self.gap_retx1, self.start_sub_channel_retx1),
                (self.gap_retx2, self.start_sub_channel_retx2),
            ];
            for (gap, start) in retx {
                if let Some(gap) = gap {
                    occasions.push(SensedOccasion {
                        abs_slot: abs_slot + u64::from(gap),
                        start_sub_channel: start.unwrap_or(self.start_sub_channel),
                        length_sub_channel: self.length_sub_channel,
                        rsrp_dbm: self.rsrp_dbm,
                    });
                }
            }
        }
        occasions
    }
}

/// Rolling buffer of sensed reservations.
#[derive(Debug, Default)]
pub struct SensingWindowTracker {
    records: VecDeque<SensedRecord>,
    window_slots: u64,
}

impl SensingWindowTracker {
    /// Creates a tracker keeping `window_slots` slots of history.
    pub fn new(window_slots: u64) -> Self {
        Self {
            records: VecDeque::new(),
            window_slots,
        }
    }

    /// Appends a record; records arrive in slot order.
    pub fn record(&mut self, entry: SensedRecord) {
        trace!(slot = %entry.slot, rsrp = entry.rsrp_dbm, "Recording sensed SCI");
        self.records.push_back(entry);
    }

    /// Drops records older than the sensing window.
    pub fn prune(&mut self, now: &SfnSf) {
        let oldest = now.normalize().saturating_sub(self.window_slots);
        while let Some(front) = self.records.front() {
            if front.slot.normalize() >= oldest {
                break;
            }
            trace!(slot = %front.slot, now = %now, "Evicting sensed SCI");
            self.records.pop_front();
        }
    }

    /// Records received more than `tproc0` slots before `now`.
    pub fn usable(&self, now: &SfnSf, tproc0: u8) -> impl Iterator<Item = &SensedRecord> {
        let now_abs = now.normalize();
        let mut end = self.records.len();
        while end > 0
            && now_abs.saturating_sub(self.records[end - 1].slot.normalize()) <= u64::from(tproc0)
        {
            end -= 1;
        }
        self.records.range(..end)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was sensed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SensedRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(abs_slot: u64, period_ms: u16) -> SensedRecord {
        SensedRecord {
            slot: SfnSf::from_normalized(abs_slot, 0),
            reservation_period_ms: period_ms,
            start_sub_channel: 0,
            length_sub_channel: 1,
            priority: 1,
            rsrp_dbm: -90.0,
            gap_retx1: None,
            start_sub_channel_retx1: None,
            gap_retx2: None,
            start_sub_channel_retx2: None,
        }
    }

    #[test]
    fn test_prune_drops_old_records() {
        let mut tracker = SensingWindowTracker::new(100);
        tracker.record(record_at(10, 100));
        tracker.record(record_at(50, 100));
        tracker.record(record_at(120, 100));

        tracker.prune(&SfnSf::from_normalized(140, 0));
        assert_eq!(tracker.len(), 2);

        tracker.prune(&SfnSf::from_normalized(151, 0));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.iter().next().map(|r| r.slot.normalize()), Some(120));
    }

    #[test]
    fn test_prune_early_slots_keeps_everything() {
        let mut tracker = SensingWindowTracker::new(100);
        tracker.record(record_at(0, 100));
        tracker.prune(&SfnSf::from_normalized(20, 0));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_usable_skips_tproc0() {
        let mut tracker = SensingWindowTracker::new(100);
        tracker.record(record_at(90, 100));
        tracker.record(record_at(98, 100));
        tracker.record(record_at(99, 100));

        let now = SfnSf::from_normalized(100, 0);
        let usable: Vec<u64> = tracker.usable(&now, 1).map(|r| r.slot.normalize()).collect();
        assert_eq!(usable, vec![90, 98]);

        let usable: Vec<u64> = tracker.usable(&now, 2).map(|r| r.slot.normalize()).collect();
        assert_eq!(usable, vec![90]);

        assert_eq!(tracker.usable(&now, 50).count(), 0);
        // trimming never touches the stored buffer
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_projection_long_period() {
        // window of 32 ms against a 100 ms period: q = 1
        let occasions = record_at(10, 100).project_future_occasions(32, 0);
        let slots: Vec<u64> = occasions.iter().map(|o| o.abs_slot).collect();
        assert_eq!(slots, vec![10, 110]);
    }

    #[test]
    fn test_projection_short_period() {
        // window of 32 ms against a 10 ms period: q = ceil(3.2) = 4
        let occasions = record_at(0, 10).project_future_occasions(32, 0);
        let slots: Vec<u64> = occasions.iter().map(|o| o.abs_slot).collect();
        assert_eq!(slots, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_projection_numerology_scales_period() {
        // 64 slots of 0.5 ms = 32 ms window, 20 ms period = 40 slots, q = 2
        let mut record = record_at(0, 20);
        record.slot = SfnSf::from_normalized(0, 1);
        let slots: Vec<u64> = record
            .project_future_occasions(64, 1)
            .iter()
            .map(|o| o.abs_slot)
            .collect();
        assert_eq!(slots, vec![0, 40, 80]);
    }

    #[test]
    fn test_projection_with_retransmissions() {
        let mut record = record_at(5, 100);
        record.gap_retx1 = Some(2);
        record.start_sub_channel_retx1 = Some(1);
        record.gap_retx2 = Some(4);
        record.start_sub_channel_retx2 = Some(0);

        let occasions = record.project_future_occasions(32, 0);
        let slots: Vec<(u64, u8)> = occasions
            .iter()
            .map(|o| (o.abs_slot, o.start_sub_channel))
            .collect();
        assert_eq!(
            slots,
            vec![(5, 0), (7, 1), (9, 0), (105, 0), (107, 1), (109, 0)]
        );
    }

    #[test]
    fn test_projection_without_period() {
        let occasions = record_at(5, 0).project_future_occasions(32, 0);
        assert_eq!(occasions.len(), 1);
        assert_eq!(occasions[0].abs_slot, 5);
    }

    #[test]
    fn test_occasion_sub_channels() {
        let occasion = SensedOccasion {
            abs_slot: 0,
            start_sub_channel: 2,
            length_sub_channel: 3,
            rsrp_dbm: -80.0,
        };
        assert_eq!(occasion.sub_channels(), 2..5);
    }
}
