//! Sidelink UE MAC entity
//!
//! [`SlUeMac`] is driven by one [`SlUeMac::slot_indication`] per sidelink
//! slot; ticks on slots outside the pool are ignored. In every pool slot it
//!
//! 1. drops sensed reservations that left the sensing window,
//! 2. walks the TX destinations in priority order, running a selection
//!    pass for those whose reservation expired (only while a HARQ process
//!    is free),
//! 3. then transmits on the allocation of every destination due in this slot:
//!    data PDUs, then SCI-2A, then SCI-1A on slots that carry it.
//!
//! Everything runs on `&mut self`; the engine is single threaded and slot
//! synchronous.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use nrsl_common::{log_data_pdu, log_sci_message, Direction, SfnSf, SlUeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::allocator::{RandomSlotAllocator, SlotAllocator};
use crate::error::{MacError, Result};
use crate::events::{MacEvent, MacObserver, PscchStats, PsschStats};
use crate::exclusion::{ExclusionFilter, Reservation};
use crate::grant::{GrantScheduler, GrantState, SlotAlloc};
use crate::harq::HarqProcessPool;
use crate::pool::ResourcePool;
use crate::sap::{
    BufferStatusReport, LcKey, LogicalChannelUser, MacToPhy, RxPdu, SidelinkLcInfo, TxOpportunity,
    VarTtiAllocInfo, VarTtiKind,
};
use crate::sci::{SciF1a, SciF2, Stage2Format};
use crate::sensing::{SensedRecord, SensingWindowTracker};

/// Highest logical channel id reserved for sidelink signalling bearers.
pub const MAX_SIGNALLING_LCID: u8 = 3;

struct LogicalChannel {
    info: SidelinkLcInfo,
    user: Box<dyn LogicalChannelUser>,
}

/// Sidelink mode 2 MAC of one UE.
pub struct SlUeMac {
    config: SlUeConfig,
    pool: ResourcePool,
    exclusion: ExclusionFilter,
    sensing: SensingWindowTracker,
    harq: HarqProcessPool,
    grants: GrantScheduler,
    allocator: Box<dyn SlotAllocator>,
    phy: Box<dyn MacToPhy>,
    lcs: BTreeMap<LcKey, LogicalChannel>,
    /// (destination, lowest LC priority), sorted by priority
    tx_destinations: Vec<(u32, u8)>,
    rx_destinations: BTreeSet<u32>,
    buffer_reports: BTreeMap<LcKey, BufferStatusReport>,
    observers: Vec<Box<dyn MacObserver>>,
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl SlUeMac {
    /// Creates the MAC with the built-in random allocator.
    ///
    /// The configuration is validated first.
    pub fn new(config: SlUeConfig, phy: Box<dyn MacToPhy>) -> Result<Self> {
        config.validate()?;
        let mut rng = seeded_rng(config.mac.rng_seed);
        let allocator = RandomSlotAllocator::new(&config, StdRng::seed_from_u64(rng.gen()));
        Ok(Self::build(config, phy, Box::new(allocator), rng))
    }

    /// Creates the MAC with a custom scheduling decision.
    pub fn with_allocator(
        config: SlUeConfig,
        phy: Box<dyn MacToPhy>,
        allocator: Box<dyn SlotAllocator>,
    ) -> Result<Self> {
        config.validate()?;
        let rng = seeded_rng(config.mac.rng_seed);
        Ok(Self::build(config, phy, allocator, rng))
    }

    fn build(
        config: SlUeConfig,
        phy: Box<dyn MacToPhy>,
        allocator: Box<dyn SlotAllocator>,
        rng: StdRng,
    ) -> Self {
        let pool = ResourcePool::new(&config);
        info!(
            src = config.mac.src_l2_id,
            numerology = config.numerology,
            sub_channels = pool.total_sub_channels(),
            sensing = config.mac.enable_sensing,
            "Sidelink MAC created"
        );
        Self {
            exclusion: ExclusionFilter::from_config(&config),
            sensing: SensingWindowTracker::new(pool.sensing_window_slots()),
            harq: HarqProcessPool::new(config.mac.num_sidelink_process),
            grants: GrantScheduler::new(&config, rng),
            pool,
            allocator,
            phy,
            lcs: BTreeMap::new(),
            tx_destinations: Vec::new(),
            rx_destinations: BTreeSet::new(),
            buffer_reports: BTreeMap::new(),
            observers: Vec::new(),
            config,
        }
    }

    /// Configuration of the MAC.
    pub fn config(&self) -> &SlUeConfig {
        &self.config
    }

    /// Source layer-2 id of this UE.
    pub fn src_l2_id(&self) -> u32 {
        self.config.mac.src_l2_id
    }

    /// Transmission pool.
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Sensed reservations.
    pub fn sensing(&self) -> &SensingWindowTracker {
        &self.sensing
    }

    /// HARQ processes.
    pub fn harq(&self) -> &HarqProcessPool {
        &self.harq
    }

    /// Grants by destination.
    pub fn grants(&self) -> &GrantScheduler {
        &self.grants
    }

    /// Registers an observer. Observers see events in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn MacObserver>) {
        self.observers.push(observer);
    }

    fn notify(&mut self, event: MacEvent) {
        trace!(kind = event.kind(), "MAC event");
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    /// Registers a logical channel.
    ///
    /// Channels whose source is this UE are TX channels and make their
    /// destination schedulable.
    ///
    /// # Panics
    /// Panics if the channel already exists.
    pub fn add_lc(&mut self, info: SidelinkLcInfo, user: Box<dyn LogicalChannelUser>) {
        let key = info.key();
        assert!(
            !self.lcs.contains_key(&key),
            "logical channel {} of {} -> {} already exists",
            info.lcid,
            info.src_l2_id,
            info.dst_l2_id
        );
        debug!(
            lcid = info.lcid,
            src = info.src_l2_id,
            dst = info.dst_l2_id,
            priority = info.priority,
            "Adding logical channel"
        );
        self.allocator.configure_lc(&info);
        self.lcs.insert(key, LogicalChannel { info, user });
        if info.src_l2_id == self.src_l2_id() {
            self.refresh_tx_destination(info.dst_l2_id);
        }
    }

    /// Removes a data logical channel.
    ///
    /// # Panics
    /// Panics for signalling bearers (`lcid <= 3`).
    pub fn remove_lc(&mut self, lcid: u8, src_l2_id: u32, dst_l2_id: u32) {
        assert!(
            lcid > MAX_SIGNALLING_LCID,
            "cannot remove sidelink signalling bearer {lcid}"
        );
        let key = LcKey {
            lcid,
            src_l2_id,
            dst_l2_id,
        };
        if self.lcs.remove(&key).is_none() {
            warn!(lcid, src = src_l2_id, dst = dst_l2_id, "Removing unknown logical channel");
            return;
        }
        self.allocator.remove_lc(key);
        self.buffer_reports.remove(&key);
        self.refresh_tx_destination(dst_l2_id);
    }

    /// Removes every data logical channel, keeping signalling bearers.
    pub fn reset_lc_map(&mut self) {
        let removed: Vec<LcKey> = self
            .lcs
            .keys()
            .filter(|key| key.lcid > MAX_SIGNALLING_LCID)
            .copied()
            .collect();
        for key in &removed {
            self.lcs.remove(key);
            self.allocator.remove_lc(*key);
            self.buffer_reports.remove(key);
        }
        let destinations: BTreeSet<u32> = removed.iter().map(|key| key.dst_l2_id).collect();
        for dst in destinations {
            self.refresh_tx_destination(dst);
        }
        debug!(removed = removed.len(), "Logical channel map reset");
    }

    /// Recomputes the priority of `dst` from its TX channels.
    fn refresh_tx_destination(&mut self, dst: u32) {
        let src = self.src_l2_id();
        let priority = self
            .lcs
            .values()
            .filter(|lc| lc.info.src_l2_id == src && lc.info.dst_l2_id == dst)
            .map(|lc| lc.info.priority)
            .min();

        self.tx_destinations.retain(|&(d, _)| d != dst);
        if let Some(priority) = priority {
            self.tx_destinations.push((dst, priority));
            self.tx_destinations.sort_by_key(|&(d, p)| (p, d));
        }
    }

    /// Listens to PSSCH addressed to `dst`.
    pub fn add_rx_destination(&mut self, dst_l2_id: u32) {
        if self.rx_destinations.insert(dst_l2_id) {
            debug!(dst = dst_l2_id, "RX destination added");
        }
    }

    /// TX destinations with their priority, highest priority first.
    pub fn tx_destinations(&self) -> &[(u32, u8)] {
        &self.tx_destinations
    }

    /// RX destinations.
    pub fn rx_destinations(&self) -> impl Iterator<Item = u32> + '_ {
        self.rx_destinations.iter().copied()
    }

    /// Stores the buffer status of a logical channel.
    pub fn report_buffer_status(&mut self, report: BufferStatusReport) {
        let key = report.key();
        if !self.lcs.contains_key(&key) {
            warn!(
                lcid = report.lcid,
                dst = report.dst_l2_id,
                "Buffer status for unknown logical channel"
            );
            return;
        }
        self.allocator.report_buffer_status(&report);
        self.buffer_reports.insert(key, report);
    }

    /// Latest buffer status reported by a logical channel.
    pub fn buffer_status(&self, key: &LcKey) -> Option<&BufferStatusReport> {
        self.buffer_reports.get(key)
    }

    /// Rebuilds the HARQ pool with `num_processes` processes.
    ///
    /// The count is checked against the same range as the configuration;
    /// on error the pool is left unchanged.
    ///
    /// # Panics
    /// Panics if a grant already exists.
    pub fn set_num_sidelink_process(&mut self, num_processes: u8) -> Result<()> {
        assert!(
            !self.grants.has_grants(),
            "HARQ processes can only be changed before the first grant"
        );
        let mut config = self.config.clone();
        config.mac.num_sidelink_process = num_processes;
        config.validate()?;

        self.config = config;
        self.harq.reinit(num_processes);
        Ok(())
    }

    /// Decodes an SCI-1A overheard in `slot` and records it for sensing.
    pub fn receive_sci_f1a(&mut self, slot: SfnSf, pdu: &[u8], rsrp_dbm: f64) -> Result<()> {
        let sci = SciF1a::decode(pdu)?;
        log_sci_message(Direction::Rx, "SCI-1A", pdu);
        if self.config.mac.enable_sensing {
            self.sensing.record(SensedRecord::from_sci(slot, &sci, rsrp_dbm));
        }
        Ok(())
    }

    /// Delivers the data PDUs of a PSSCH reception.
    ///
    /// `pdus` are the `(lcid, payload)` pairs carried after the SCI-2A.
    pub fn receive_pssch(&mut self, sci2a: &[u8], pdus: Vec<(u8, Bytes)>) -> Result<()> {
        let sci = SciF2::decode(sci2a)?;
        log_sci_message(Direction::Rx, "SCI-2A", sci2a);
        if !self.rx_destinations.contains(&sci.dst_id) {
            return Err(MacError::UnknownDestination(sci.dst_id));
        }

        for (lcid, pdu) in pdus {
            log_data_pdu(Direction::Rx, lcid, sci.dst_id, &pdu);
            let key = LcKey {
                lcid,
                src_l2_id: sci.src_id,
                dst_l2_id: sci.dst_id,
            };
            let event = match self.lcs.get_mut(&key) {
                Some(lc) => {
                    let size = pdu.len();
                    lc.user.receive_pdu(RxPdu {
                        lcid,
                        src_l2_id: sci.src_id,
                        dst_l2_id: sci.dst_id,
                        pdu,
                    });
                    MacEvent::RxPdu {
                        src_l2_id: sci.src_id,
                        dst_l2_id: sci.dst_id,
                        lcid,
                        harq_id: sci.harq_id,
                        size,
                    }
                }
                None => {
                    warn!(
                        lcid,
                        src = sci.src_id,
                        dst = sci.dst_id,
                        "PDU for unknown logical channel"
                    );
                    MacEvent::UnknownRxLogicalChannel {
                        src_l2_id: sci.src_id,
                        dst_l2_id: sci.dst_id,
                        lcid,
                    }
                }
            };
            self.notify(event);
        }
        Ok(())
    }

    /// Runs the MAC for one slot.
    ///
    /// Slots outside the pool are ignored. Allocations that fall on them
    /// are discarded as missed at the next pool slot.
    pub fn slot_indication(&mut self, slot: SfnSf) {
        if !self.pool.is_sidelink_slot(slot.normalize()) {
            return;
        }
        trace!(slot = %slot, "Slot indication");
        self.sensing.prune(&slot);

        // HARQ processes released while transmitting are free from the next slot
        let destinations: Vec<u32> = self.tx_destinations.iter().map(|&(dst, _)| dst).collect();
        for &dst in &destinations {
            self.discard_stale(dst, &slot);
            if self.harq.available_count() > 0 {
                self.schedule(dst, &slot);
            }
        }
        for &dst in &destinations {
            self.transmit(dst, &slot);
        }
    }

    fn discard_stale(&mut self, dst: u32, slot: &SfnSf) {
        let Some(grant) = self.grants.grant_mut(dst) else {
            return;
        };
        let discard = grant.discard_stale(slot);
        if let Some(harq_id) = discard.released_harq {
            self.harq.release(harq_id);
            self.notify(MacEvent::HarqReleased {
                slot: *slot,
                dst_l2_id: dst,
                harq_id,
            });
        }
    }

    /// Keeps or reselects the reservation of `dst`.
    fn schedule(&mut self, dst: u32, slot: &SfnSf) {
        match self.grants.evaluate(dst) {
            GrantState::Active => {}
            GrantState::Kept => {
                let resel_counter = self.grants.grant(dst).map_or(0, |g| g.resel_counter());
                self.notify(MacEvent::ResourceKept {
                    slot: *slot,
                    dst_l2_id: dst,
                    resel_counter,
                });
            }
            GrantState::Reselect => self.select_resources(dst, slot),
        }
    }

    fn select_resources(&mut self, dst: u32, slot: &SfnSf) {
        let mac = &self.config.mac;
        let (resel_counter, c_resel) = self.grants.draw_resel_counter();
        let candidates =
            self.pool
                .generate_candidates(slot, mac.t1, mac.t2, mac.reservation_period_ms);
        let total = candidates.len();

        let (candidates, threshold_dbm) = if mac.enable_sensing {
            let reservation = Reservation {
                selection_window_slots: mac.t2 - u16::from(mac.t1) + 1,
                c_resel,
                period_slots: self.grants.period_slots(),
            };
            let outcome = self
                .exclusion
                .apply(slot, candidates, &self.sensing, reservation);
            (outcome.candidates, outcome.threshold_dbm)
        } else {
            (candidates, mac.sl_thres_pssch_rsrp)
        };
        let candidates = self.grants.filter_claimed(candidates);

        if candidates.is_empty() {
            debug!(dst, total, slot = %slot, "No candidate resources");
            self.notify(MacEvent::NoResources {
                slot: *slot,
                dst_l2_id: dst,
            });
            return;
        }

        let selected = self.allocator.allocate(dst, &candidates);
        if selected.is_empty() {
            return;
        }

        let grant = self.grants.install(dst, &selected, resel_counter, c_resel);
        info!(
            dst,
            slot = %slot,
            n_selected = grant.n_selected(),
            resel_counter,
            c_resel,
            "New sidelink grant"
        );
        let event = MacEvent::GrantCreated {
            slot: *slot,
            dst_l2_id: dst,
            n_selected: grant.n_selected(),
            resel_counter,
            c_resel,
            candidates: candidates.len(),
            threshold_dbm,
        };
        self.notify(event);
    }

    /// Sends on the allocation of `dst` due in `slot`, if any.
    fn transmit(&mut self, dst: u32, slot: &SfnSf) {
        let Some(grant) = self.grants.grant_mut(dst) else {
            return;
        };
        let Some(alloc) = grant.take_due(slot) else {
            return;
        };

        let src = self.config.mac.src_l2_id;
        let mut sent: Vec<Bytes> = Vec::new();
        if alloc.ndi {
            let harq_id = (self.harq.available_count() > 0).then(|| self.harq.assign(dst));
            grant.start_tb(harq_id);
            match harq_id {
                Some(harq_id) => {
                    for info in &alloc.rlc_pdu_info {
                        let key = LcKey {
                            lcid: info.lcid,
                            src_l2_id: src,
                            dst_l2_id: dst,
                        };
                        let Some(lc) = self.lcs.get_mut(&key) else {
                            warn!(lcid = info.lcid, dst, "Allocation for removed logical channel");
                            continue;
                        };
                        let opportunity = TxOpportunity {
                            bytes: info.size,
                            lcid: info.lcid,
                            harq_id,
                            src_l2_id: src,
                            dst_l2_id: dst,
                        };
                        if let Some(pdu) = lc.user.notify_tx_opportunity(&opportunity) {
                            self.harq.add_packet(dst, harq_id, info.lcid, pdu.clone());
                            log_data_pdu(Direction::Tx, info.lcid, dst, &pdu);
                            sent.push(pdu);
                        }
                    }
                }
                None => warn!(dst, slot = %slot, "No HARQ process for new transmission"),
            }
        } else {
            assert!(
                self.config.mac.enable_blind_retx,
                "retransmission scheduled with blind retransmission disabled"
            );
            grant.count_retx();
            if let Some(harq_id) = grant.harq_id() {
                sent.extend(self.harq.packet_burst(dst, harq_id).iter().cloned());
            }
        }

        let harq_id = grant.harq_id();
        let announced: Vec<(u64, u8)> = grant
            .announced_retx(alloc.slot_num_ind)
            .map(|next| (next.abs_slot(), next.sub_channel_start))
            .collect();
        let released = if grant.is_tb_complete() {
            grant.complete_tb()
        } else {
            None
        };

        match harq_id {
            Some(harq_id) if !sent.is_empty() => {
                let tb_size = sent.iter().map(Bytes::len).sum();
                for pdu in sent {
                    self.phy.send_data_pdu(pdu);
                }
                self.send_sci(&alloc, harq_id, tb_size, &announced);
            }
            _ => {
                debug!(dst, slot = %slot, ndi = alloc.ndi, "Nothing to send, occasion wasted");
                self.notify(MacEvent::GrantWasted {
                    slot: *slot,
                    dst_l2_id: dst,
                    ndi: alloc.ndi,
                });
            }
        }

        if let Some(harq_id) = released {
            self.harq.release(harq_id);
            self.notify(MacEvent::HarqReleased {
                slot: *slot,
                dst_l2_id: dst,
                harq_id,
            });
        }
    }

    /// Sends SCI-2A and, on slots that carry it, SCI-1A.
    ///
    /// `announced` holds the slot and start sub-channel of the following
    /// occasions of the TB that SCI-1A reserves.
    fn send_sci(
        &mut self,
        alloc: &SlotAlloc,
        harq_id: u8,
        tb_size: usize,
        announced: &[(u64, u8)],
    ) {
        let src = self.config.mac.src_l2_id;
        let sub_channel_size = self.pool.sub_channel_size_rbs();
        let rb_start = u16::from(alloc.sub_channel_start) * sub_channel_size;

        let sci2 = SciF2::broadcast(harq_id, alloc.ndi, alloc.rv, src, alloc.dst_l2_id);
        let pdu = sci2.encode();
        log_sci_message(Direction::Tx, "SCI-2A", &pdu);
        self.phy.send_data_pdu(pdu);
        self.phy.set_var_tti_alloc(
            alloc.slot,
            VarTtiAllocInfo {
                kind: VarTtiKind::Data,
                sym_start: alloc.pssch_sym_start,
                sym_length: alloc.pssch_sym_length,
                rb_start,
                rb_length: u16::from(alloc.sub_channel_length) * sub_channel_size,
            },
        );
        self.notify(MacEvent::PsschScheduled(PsschStats {
            slot: alloc.slot,
            src_l2_id: src,
            dst_l2_id: alloc.dst_l2_id,
            harq_id,
            ndi: alloc.ndi,
            rv: alloc.rv,
            tb_size,
        }));

        if !alloc.tx_sci1a {
            return;
        }

        let mut builder = SciF1a::builder()
            .priority(alloc.priority)
            .mcs(alloc.mcs)
            .stage2_format(Stage2Format::Sci2A)
            .reservation_period_ms(self.config.mac.reservation_period_ms)
            .total_sub_channels(self.pool.total_sub_channels())
            .sub_channels(alloc.sub_channel_start, alloc.sub_channel_length)
            .max_num_per_reserve(alloc.max_num_per_reserve);

        let current = alloc.abs_slot();
        let mut gaps = [None, None];
        for (i, &(next, start)) in announced.iter().take(2).enumerate() {
            let Ok(gap) = u8::try_from(next - current) else {
                warn!(gap = next - current, "Retransmission gap does not fit SCI-1A");
                break;
            };
            builder = if i == 0 {
                builder.retx1(gap, start)
            } else {
                builder.retx2(gap, start)
            };
            gaps[i] = Some(gap);
        }

        let sci1 = match builder.build() {
            Ok(sci1) => sci1,
            Err(e) => {
                warn!(error = %e, "Failed to build SCI-1A");
                return;
            }
        };
        let pdu = sci1.encode();
        log_sci_message(Direction::Tx, "SCI-1A", &pdu);
        self.phy.send_control_pdu(pdu);
        self.phy.set_var_tti_alloc(
            alloc.slot,
            VarTtiAllocInfo {
                kind: VarTtiKind::Ctrl,
                sym_start: alloc.pscch_sym_start,
                sym_length: alloc.pscch_sym_length,
                rb_start,
                rb_length: alloc.pscch_rbs,
            },
        );
        self.notify(MacEvent::PscchScheduled(PscchStats {
            slot: alloc.slot,
            src_l2_id: src,
            dst_l2_id: alloc.dst_l2_id,
            priority: alloc.priority,
            mcs: alloc.mcs,
            total_sub_channels: sci1.total_sub_channels,
            sub_channel_start: alloc.sub_channel_start,
            sub_channel_length: alloc.sub_channel_length,
            reservation_period_ms: sci1.reservation_period_ms,
            gap_retx1: gaps[0],
            gap_retx2: gaps[1],
        }));
    }
}
