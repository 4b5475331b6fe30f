//! Sensing based candidate exclusion
//!
//! A candidate is dropped when one of its projected reservations lands on
//! a slot where sensed transmissions cover every sub-channel of the pool
//! and the covering transmission is stronger than the RSRP threshold. If
//! too few candidates survive, the threshold is relaxed by 3 dB and the
//! pass starts over from the unfiltered set. Past 0 dBm nothing is left.

use nrsl_common::{SfnSf, SlUeConfig};
use tracing::{debug, warn};

use crate::pool::SlotCandidate;
use crate::sensing::{SensedOccasion, SensingWindowTracker};

/// Threshold relaxation step in dB.
pub const RSRP_STEP_DB: i32 = 3;

/// Highest RSRP threshold in dBm.
pub const MAX_RSRP_THRESHOLD_DBM: i32 = 0;

/// Parameters of the exclusion procedure.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    /// Initial threshold in dBm
    pub sl_thres_pssch_rsrp: i32,
    /// Share of candidates that must survive, in percent
    pub resource_percentage: u8,
    /// Sub-channels in the pool
    pub total_sub_channels: u16,
    /// Sensing processing time in slots
    pub tproc0: u8,
    /// Carrier numerology
    pub numerology: u8,
}

/// Reservation context of the UE running the selection.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    /// Selection window `T2 - T1 + 1` in slots
    pub selection_window_slots: u16,
    /// Number of reservation periods the new grant will span
    pub c_resel: u32,
    /// Own reservation period in slots
    pub period_slots: u64,
}

/// Result of an exclusion run.
#[derive(Debug, Clone)]
pub struct ExclusionOutcome {
    /// Surviving candidates
    pub candidates: Vec<SlotCandidate>,
    /// Threshold of the last pass in dBm
    pub threshold_dbm: i32,
    /// Number of passes run
    pub passes: u32,
}

impl ExclusionFilter {
    /// Takes the exclusion parameters from a UE configuration.
    pub fn from_config(config: &SlUeConfig) -> Self {
        Self {
            sl_thres_pssch_rsrp: config.mac.sl_thres_pssch_rsrp,
            resource_percentage: config.mac.resource_percentage,
            total_sub_channels: config.total_sub_channels(),
            tproc0: config.mac.tproc0,
            numerology: config.numerology,
        }
    }

    /// Filters `candidates` against the sensed reservations.
    ///
    /// Returns the input untouched when nothing was sensed.
    pub fn apply(
        &self,
        now: &SfnSf,
        candidates: Vec<SlotCandidate>,
        tracker: &SensingWindowTracker,
        reservation: Reservation,
    ) -> ExclusionOutcome {
        if tracker.is_empty() || candidates.is_empty() {
            return ExclusionOutcome {
                candidates,
                threshold_dbm: self.sl_thres_pssch_rsrp,
                passes: 0,
            };
        }

        let sensed: Vec<Vec<SensedOccasion>> = tracker
            .usable(now, self.tproc0)
            .map(|record| {
                record.project_future_occasions(reservation.selection_window_slots, self.numerology)
            })
            .collect();

        let total = candidates.len();
        let required = f64::from(self.resource_percentage) / 100.0 * total as f64;
        let mut threshold = self.sl_thres_pssch_rsrp;
        let mut passes = 0;

        loop {
            passes += 1;
            let survivors: Vec<SlotCandidate> = candidates
                .iter()
                .cloned()
                .filter_map(|mut candidate| {
                    if self.excludes(&mut candidate, &sensed, threshold, reservation) {
                        None
                    } else {
                        Some(candidate)
                    }
                })
                .collect();

            if survivors.len() as f64 >= required {
                debug!(
                    selected = survivors.len(),
                    total,
                    threshold,
                    "Candidates selected after sensing"
                );
                return ExclusionOutcome {
                    candidates: survivors,
                    threshold_dbm: threshold,
                    passes,
                };
            }

            threshold += RSRP_STEP_DB;
            if threshold > MAX_RSRP_THRESHOLD_DBM {
                warn!(total, "Reached maximum RSRP threshold, unable to select resources");
                return ExclusionOutcome {
                    candidates: Vec::new(),
                    threshold_dbm: threshold,
                    passes,
                };
            }
        }
    }

    fn excludes(
        &self,
        candidate: &mut SlotCandidate,
        sensed: &[Vec<SensedOccasion>],
        threshold: i32,
        reservation: Reservation,
    ) -> bool {
        let first = candidate.abs_slot();
        for occasions in sensed {
            for i in 0..u64::from(reservation.c_resel) {
                let projected = first + i * reservation.period_slots;
                for occasion in occasions.iter().filter(|o| o.abs_slot == projected) {
                    candidate.occupied_sub_channels.extend(
                        occasion
                            .sub_channels()
                            .filter(|&sub_channel| sub_channel < self.total_sub_channels),
                    );
                    if candidate.occupied_sub_channels.len() == usize::from(self.total_sub_channels)
                        && occasion.rsrp_dbm > f64::from(threshold)
                    {
                        debug!(
                            slot = projected,
                            rsrp = occasion.rsrp_dbm,
                            threshold,
                            "Candidate excluded"
                        );
                        return true;
                    }
                }
            }
        }
        false
    }
}
