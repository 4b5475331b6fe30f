//! Common types and utilities for the NR sidelink MAC
//!
//! This crate provides slot timing, configuration records, the shared
//! error type, bit-level buffers and logging helpers used by `nrsl-mac`
//! and the integration tests.

pub mod bit_buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod slot;

pub use bit_buffer::{BitBuffer, BitBufferReader};
pub use config::{
    is_valid_reservation_period, SlMacConfig, SlPoolConfig, SlUeConfig, TddSlotType, MAX_MCS,
};
pub use error::{Error, Result};
pub use logging::{init_logging, log_data_pdu, log_sci_message, Direction, HexDump};
pub use slot::{ms_to_slots, slot_duration, slots_per_subframe, SfnSf};
