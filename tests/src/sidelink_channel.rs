//! In-memory sidelink channel connecting several MAC instances
//!
//! Every UE gets a [`ChannelPhy`] that queues what its MAC sends in the
//! current slot. After all UEs ran the slot, [`SidelinkNetwork`] hands
//! each transmission to every UE that did not transmit itself (half
//! duplex). A TB is passed up once, on its first transmission, as a PHY
//! combining the blind retransmissions would.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use nrsl_common::{SfnSf, SlUeConfig};
use nrsl_mac::{
    BufferStatusReport, LogicalChannelUser, MacError, MacEvent, MacToPhy, RxPdu, SciF2,
    SidelinkLcInfo, SlUeMac, TxOpportunity,
};
use tracing::debug;

use crate::test_utils::{CHANNEL_RSRP_DBM, DATA_LCID};

#[derive(Debug, Default)]
struct PendingTx {
    control: Vec<Bytes>,
    data: Vec<Bytes>,
}

type Pending = Arc<Mutex<BTreeMap<usize, PendingTx>>>;

/// PHY of one UE on the shared channel.
pub struct ChannelPhy {
    ue: usize,
    pending: Pending,
}

impl MacToPhy for ChannelPhy {
    fn send_control_pdu(&mut self, pdu: Bytes) {
        self.pending
            .lock()
            .unwrap()
            .entry(self.ue)
            .or_default()
            .control
            .push(pdu);
    }

    fn send_data_pdu(&mut self, pdu: Bytes) {
        self.pending
            .lock()
            .unwrap()
            .entry(self.ue)
            .or_default()
            .data
            .push(pdu);
    }
}

/// RLC double that fills every opportunity and records receptions.
#[derive(Clone, Default)]
pub struct RecordingRlc {
    fill: u8,
    /// Opportunities offered by the MAC
    pub opportunities: Arc<Mutex<Vec<TxOpportunity>>>,
    /// PDUs delivered by the MAC
    pub received: Arc<Mutex<Vec<RxPdu>>>,
}

impl RecordingRlc {
    /// Creates an RLC whose PDUs are filled with `fill`.
    pub fn new(fill: u8) -> Self {
        Self {
            fill,
            ..Default::default()
        }
    }

    /// Number of PDUs received.
    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl LogicalChannelUser for RecordingRlc {
    fn notify_tx_opportunity(&mut self, opportunity: &TxOpportunity) -> Option<Bytes> {
        self.opportunities.lock().unwrap().push(*opportunity);
        Some(Bytes::from(vec![self.fill; opportunity.bytes as usize]))
    }

    fn receive_pdu(&mut self, pdu: RxPdu) {
        self.received.lock().unwrap().push(pdu);
    }
}

/// A UE attached to the channel.
pub struct UeNode {
    /// MAC under test
    pub mac: SlUeMac,
    /// RLC of every logical channel of the UE
    pub rlc: RecordingRlc,
    /// Events published by the MAC
    pub events: Arc<Mutex<Vec<MacEvent>>>,
}

impl UeNode {
    /// Number of events of `kind` seen so far.
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

/// Several UEs sharing one sidelink carrier.
#[derive(Default)]
pub struct SidelinkNetwork {
    ues: Vec<UeNode>,
    pending: Pending,
    /// (slot, UE) of every PSSCH transmission
    transmissions: Vec<(SfnSf, usize)>,
}

impl SidelinkNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a UE and returns its index.
    pub fn add_ue(&mut self, config: SlUeConfig) -> usize {
        let ue = self.ues.len();
        let phy = ChannelPhy {
            ue,
            pending: self.pending.clone(),
        };
        let fill = config.mac.src_l2_id as u8;
        let mut mac = SlUeMac::new(config, Box::new(phy)).expect("valid UE configuration");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        mac.add_observer(Box::new(move |event: &MacEvent| {
            sink.lock().unwrap().push(event.clone())
        }));
        self.ues.push(UeNode {
            mac,
            rlc: RecordingRlc::new(fill),
            events,
        });
        ue
    }

    /// UE at `index`.
    pub fn ue(&self, index: usize) -> &UeNode {
        &self.ues[index]
    }

    /// Mutable UE at `index`.
    pub fn ue_mut(&mut self, index: usize) -> &mut UeNode {
        &mut self.ues[index]
    }

    /// Adds a TX data channel from UE `index` to `dst`.
    pub fn add_tx_channel(&mut self, index: usize, dst: u32, priority: u8) {
        let node = &mut self.ues[index];
        let src = node.mac.src_l2_id();
        node.mac.add_lc(
            SidelinkLcInfo::new(DATA_LCID, src, dst, priority),
            Box::new(node.rlc.clone()),
        );
    }

    /// Makes UE `index` receive what `src` sends to `dst`.
    pub fn add_rx_channel(&mut self, index: usize, src: u32, dst: u32) {
        let node = &mut self.ues[index];
        node.mac.add_lc(
            SidelinkLcInfo::new(DATA_LCID, src, dst, 1),
            Box::new(node.rlc.clone()),
        );
        node.mac.add_rx_destination(dst);
    }

    /// Reports `bytes` waiting on the TX channel of UE `index` to `dst`.
    pub fn report_buffer(&mut self, index: usize, dst: u32, bytes: u32) {
        let node = &mut self.ues[index];
        let src = node.mac.src_l2_id();
        node.mac.report_buffer_status(BufferStatusReport {
            lcid: DATA_LCID,
            src_l2_id: src,
            dst_l2_id: dst,
            tx_queue_size: bytes,
            ..Default::default()
        });
    }

    /// PSSCH transmissions so far.
    pub fn transmissions(&self) -> &[(SfnSf, usize)] {
        &self.transmissions
    }

    /// Slots of UE `index` that carried PSSCH.
    pub fn tx_slots(&self, index: usize) -> Vec<u64> {
        self.transmissions
            .iter()
            .filter(|(_, ue)| *ue == index)
            .map(|(slot, _)| slot.normalize())
            .collect()
    }

    /// Slots in which more than one UE transmitted.
    pub fn collisions(&self) -> Vec<u64> {
        let mut per_slot: BTreeMap<u64, usize> = BTreeMap::new();
        for (slot, _) in &self.transmissions {
            *per_slot.entry(slot.normalize()).or_default() += 1;
        }
        per_slot
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Runs every UE over the absolute slots in `slots` at numerology 0.
    pub fn run(&mut self, slots: RangeInclusive<u64>) {
        for abs_slot in slots {
            let slot = SfnSf::from_normalized(abs_slot, 0);
            for node in &mut self.ues {
                node.mac.slot_indication(slot);
            }
            self.deliver(slot);
        }
    }

    fn deliver(&mut self, slot: SfnSf) {
        let sent = std::mem::take(&mut *self.pending.lock().unwrap());
        for (&from, tx) in &sent {
            if !tx.data.is_empty() {
                self.transmissions.push((slot, from));
            }
            for (to, node) in self.ues.iter_mut().enumerate() {
                if sent.contains_key(&to) {
                    continue;
                }
                for sci in &tx.control {
                    node.mac
                        .receive_sci_f1a(slot, sci, CHANNEL_RSRP_DBM)
                        .expect("SCI-1A decodes");
                }
                deliver_pssch(node, &tx.data);
            }
        }
    }
}

/// Passes the PSSCH of one transmission up: data PDUs, then SCI-2A.
fn deliver_pssch(node: &mut UeNode, data: &[Bytes]) {
    let Some((sci2, payloads)) = data.split_last() else {
        return;
    };
    let sci = SciF2::decode(sci2).expect("SCI-2A decodes");
    if !sci.ndi {
        return;
    }
    let pdus = payloads
        .iter()
        .map(|payload| (DATA_LCID, payload.clone()))
        .collect();
    match node.mac.receive_pssch(sci2, pdus) {
        Ok(()) => {}
        Err(MacError::UnknownDestination(dst)) => {
            debug!(dst, "Not listening to destination");
        }
        Err(e) => panic!("PSSCH reception failed: {e}"),
    }
}
