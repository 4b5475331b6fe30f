//! MAC events for observers
//!
//! The MAC publishes what it schedules and receives as [`MacEvent`]s.
//! Observers are registered before the first slot and are called
//! synchronously, in registration order.

use nrsl_common::SfnSf;

/// Statistics of a transmitted SCI-1A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PscchStats {
    /// Slot of the transmission
    pub slot: SfnSf,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// Priority of the TB
    pub priority: u8,
    /// MCS
    pub mcs: u8,
    /// Sub-channels in the pool
    pub total_sub_channels: u16,
    /// First PSSCH sub-channel
    pub sub_channel_start: u8,
    /// PSSCH sub-channels
    pub sub_channel_length: u8,
    /// Announced reservation period in ms
    pub reservation_period_ms: u16,
    /// Gap to the first retransmission
    pub gap_retx1: Option<u8>,
    /// Gap to the second retransmission
    pub gap_retx2: Option<u8>,
}

/// Statistics of a transmitted SCI-2A with its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsschStats {
    /// Slot of the transmission
    pub slot: SfnSf,
    /// Source layer-2 id
    pub src_l2_id: u32,
    /// Destination layer-2 id
    pub dst_l2_id: u32,
    /// HARQ process
    pub harq_id: u8,
    /// New data indicator
    pub ndi: bool,
    /// Redundancy version
    pub rv: u8,
    /// Bytes of data PDUs
    pub tb_size: usize,
}

/// Event raised by the sidelink MAC.
#[derive(Debug, Clone, PartialEq)]
pub enum MacEvent {
    /// A new reservation was selected
    GrantCreated {
        /// Slot of the selection
        slot: SfnSf,
        /// Destination
        dst_l2_id: u32,
        /// Transmissions per TB
        n_selected: u8,
        /// Drawn reselection counter
        resel_counter: u8,
        /// Reservation periods covered
        c_resel: u32,
        /// Candidates left after exclusion
        candidates: usize,
        /// Final exclusion threshold in dBm
        threshold_dbm: i32,
    },
    /// The previous reservation was kept
    ResourceKept {
        /// Slot of the decision
        slot: SfnSf,
        /// Destination
        dst_l2_id: u32,
        /// Restored reselection counter
        resel_counter: u8,
    },
    /// No resource could be selected this cycle
    NoResources {
        /// Slot of the attempt
        slot: SfnSf,
        /// Destination
        dst_l2_id: u32,
    },
    /// SCI-1A sent
    PscchScheduled(PscchStats),
    /// SCI-2A and data sent
    PsschScheduled(PsschStats),
    /// An occasion passed without any data
    GrantWasted {
        /// Slot of the occasion
        slot: SfnSf,
        /// Destination
        dst_l2_id: u32,
        /// New data indicator of the occasion
        ndi: bool,
    },
    /// A HARQ process was freed after the last transmission of its TB
    HarqReleased {
        /// Slot of the release
        slot: SfnSf,
        /// Destination
        dst_l2_id: u32,
        /// Process id
        harq_id: u8,
    },
    /// A PDU was delivered to a logical channel
    RxPdu {
        /// Source layer-2 id
        src_l2_id: u32,
        /// Destination layer-2 id
        dst_l2_id: u32,
        /// Logical channel
        lcid: u8,
        /// HARQ process
        harq_id: u8,
        /// PDU size in bytes
        size: usize,
    },
    /// A PDU arrived for a logical channel that is not configured
    UnknownRxLogicalChannel {
        /// Source layer-2 id
        src_l2_id: u32,
        /// Destination layer-2 id
        dst_l2_id: u32,
        /// Logical channel
        lcid: u8,
    },
}

impl MacEvent {
    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MacEvent::GrantCreated { .. } => "grant_created",
            MacEvent::ResourceKept { .. } => "resource_kept",
            MacEvent::NoResources { .. } => "no_resources",
            MacEvent::PscchScheduled(_) => "pscch_scheduled",
            MacEvent::PsschScheduled(_) => "pssch_scheduled",
            MacEvent::GrantWasted { .. } => "grant_wasted",
            MacEvent::HarqReleased { .. } => "harq_released",
            MacEvent::RxPdu { .. } => "rx_pdu",
            MacEvent::UnknownRxLogicalChannel { .. } => "unknown_rx_lc",
        }
    }
}

/// Receives MAC events.
pub trait MacObserver: Send {
    /// Called for every event.
    fn on_event(&mut self, event: &MacEvent);
}

impl<F> MacObserver for F
where
    F: FnMut(&MacEvent) + Send,
{
    fn on_event(&mut self, event: &MacEvent) {
        self(event)
    }
}
