//! NR sidelink mode 2 MAC
//!
//! Autonomous resource selection for sidelink transmissions: a UE senses the
//! reservations announced by its neighbours, excludes the resources they
//! will occupy, and reserves a semi-persistent set of slots for each of its
//! destinations. Every TB is sent a configured number of times without
//! feedback (blind retransmission) on a stop-and-wait HARQ process.
//!
//! # Components
//!
//! - [`sci`]: SCI format 1-A and 2-A codecs
//! - [`harq`]: HARQ process pool
//! - [`sensing`]: sensing window of overheard reservations
//! - [`pool`]: resource pool and candidate generation
//! - [`exclusion`]: RSRP based candidate exclusion
//! - [`grant`]: semi-persistent grants and the reselection state machine
//! - [`allocator`]: occasion and sub-channel selection
//! - [`dispatcher`]: the per-slot MAC entity, [`SlUeMac`]
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use nrsl_common::{SfnSf, SlUeConfig};
//! use nrsl_mac::{MacToPhy, SlUeMac};
//!
//! struct NullPhy;
//!
//! impl MacToPhy for NullPhy {
//!     fn send_control_pdu(&mut self, _pdu: Bytes) {}
//!     fn send_data_pdu(&mut self, _pdu: Bytes) {}
//! }
//!
//! let mut mac = SlUeMac::new(SlUeConfig::default(), Box::new(NullPhy)).unwrap();
//! mac.slot_indication(SfnSf::new(0, 0, 0, 0));
//! ```

pub mod allocator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod exclusion;
pub mod grant;
pub mod harq;
pub mod pool;
pub mod sap;
pub mod sci;
pub mod sensing;

pub use allocator::{tb_size_bytes, RandomSlotAllocator, SlotAllocator, RV_SEQUENCE};
pub use dispatcher::SlUeMac;
pub use error::{MacError, Result};
pub use events::{MacEvent, MacObserver, PscchStats, PsschStats};
pub use exclusion::{ExclusionFilter, ExclusionOutcome, Reservation};
pub use grant::{resel_counter_bounds, Grant, GrantScheduler, GrantState, RlcPduInfo, SlotAlloc};
pub use harq::{HarqProcess, HarqProcessPool};
pub use pool::{ResourcePool, SlotCandidate};
pub use sap::{
    BufferStatusReport, LcKey, LogicalChannelUser, MacToPhy, RxPdu, SidelinkLcInfo, TxOpportunity,
    VarTtiAllocInfo, VarTtiKind,
};
pub use sci::{SciCodecError, SciF1a, SciF2};
pub use sensing::{SensedOccasion, SensedRecord, SensingWindowTracker};
