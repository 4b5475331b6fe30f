//! Integration test framework for the NR sidelink MAC
//!
//! Several [`nrsl_mac::SlUeMac`] instances are connected over an in-memory
//! sidelink channel and driven slot by slot.
//!
//! # Components
//!
//! - [`sidelink_channel`] - Shared channel, mock PHY and RLC
//! - [`test_fixtures`] - UE configurations
//! - [`test_utils`] - Logging and constants

#![allow(missing_docs)]

pub mod sidelink_channel;
pub mod test_fixtures;
pub mod test_utils;

pub use sidelink_channel::{ChannelPhy, RecordingRlc, SidelinkNetwork, UeNode};
pub use test_fixtures::{sensing_ue_config, ue_config, UE_CONFIG_YAML};
pub use test_utils::{init_test_logging, BROADCAST_DST, CHANNEL_RSRP_DBM, DATA_LCID};
