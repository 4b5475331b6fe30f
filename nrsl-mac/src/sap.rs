//! Service access points of the sidelink MAC
//!
//! The MAC talks to two neighbours: the PHY below (`MacToPhy`) and the RLC
//! entities of its logical channels above (`LogicalChannelUser`). Both are
//! trait objects so that a simulator, a real PHY or a test double can be
//! plugged in.

use bytes::Bytes;
use nrsl_common::SfnSf;

/// Kind of a variable TTI allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarTtiKind {
    /// PSCCH carrying SCI-1A
    Ctrl,
    /// PSSCH carrying SCI-2A and data
    Data,
}

/// Time/frequency region of one transmission in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarTtiAllocInfo {
    /// Channel of the allocation
    pub kind: VarTtiKind,
    /// First symbol
    pub sym_start: u8,
    /// Number of symbols
    pub sym_length: u8,
    /// First RB
    pub rb_start: u16,
    /// Number of RBs
    pub rb_length: u16,
}

/// Downward interface towards the sidelink PHY.
pub trait MacToPhy: Send {
    /// Hands an encoded SCI-1A to the PHY for the PSCCH.
    fn send_control_pdu(&mut self, pdu: Bytes);

    /// Hands a PSSCH PDU (SCI-2A or data) to the PHY.
    fn send_data_pdu(&mut self, pdu: Bytes);

    /// Announces the symbols and RBs used by a transmission in `slot`.
    fn set_var_tti_alloc(&mut self, _slot: SfnSf, _info: VarTtiAllocInfo) {}
}

/// Identifies a logical channel of the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LcKey {
    /// Logical channel id
    pub lcid: u8,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
}

/// Sidelink logical channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidelinkLcInfo {
    /// Logical channel id
    pub lcid: u8,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Priority, lower value is served first
    pub priority: u8,
    /// Guaranteed bit rate bearer
    pub is_gbr: bool,
    /// Prioritized bit rate in bit/s
    pub prioritized_bit_rate: u64,
    /// Bucket size duration in ms
    pub bucket_size_duration_ms: u16,
}

impl SidelinkLcInfo {
    /// A non-GBR channel with the given identity and priority.
    pub fn new(lcid: u8, src_l2_id: u32, dst_l2_id: u32, priority: u8) -> Self {
        Self {
            lcid,
            src_l2_id,
            dst_l2_id,
            priority,
            is_gbr: false,
            prioritized_bit_rate: 0,
            bucket_size_duration_ms: 0,
        }
    }

    /// Key of the channel.
    pub fn key(&self) -> LcKey {
        LcKey {
            lcid: self.lcid,
            src_l2_id: self.src_l2_id,
            dst_l2_id: self.dst_l2_id,
        }
    }
}

/// RLC buffer status of one logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStatusReport {
    /// Logical channel id
    pub lcid: u8,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Bytes waiting for a first transmission
    pub tx_queue_size: u32,
    /// Bytes waiting for retransmission
    pub retx_queue_size: u32,
    /// Size of a pending status PDU
    pub status_pdu_size: u16,
}

impl BufferStatusReport {
    /// Key of the reporting channel.
    pub fn key(&self) -> LcKey {
        LcKey {
            lcid: self.lcid,
            src_l2_id: self.src_l2_id,
            dst_l2_id: self.dst_l2_id,
        }
    }

    /// Bytes waiting in all queues.
    pub fn total(&self) -> u32 {
        self.tx_queue_size + self.retx_queue_size + u32::from(self.status_pdu_size)
    }
}

/// A transmission opportunity offered to an RLC entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOpportunity {
    /// Bytes the entity may fill
    pub bytes: u32,
    /// Logical channel id
    pub lcid: u8,
    /// HARQ process carrying the PDU
    pub harq_id: u8,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
}

/// A PDU received on a logical channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPdu {
    /// Logical channel id
    pub lcid: u8,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Payload
    pub pdu: Bytes,
}

/// Upward interface towards the RLC entity of a logical channel.
pub trait LogicalChannelUser: Send {
    /// Asks the entity for a PDU of at most `opportunity.bytes`.
    ///
    /// Returning `None` leaves the opportunity unused.
    fn notify_tx_opportunity(&mut self, opportunity: &TxOpportunity) -> Option<Bytes>;

    /// Delivers a received PDU.
    fn receive_pdu(&mut self, pdu: RxPdu);
}
