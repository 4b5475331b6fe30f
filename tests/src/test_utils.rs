//! Test utility functions for integration tests
//!
//! Provides common utilities for test setup and logging.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging for tests
///
/// Uses RUST_LOG environment variable if set, otherwise defaults to "info"
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Broadcast destination used by the scenarios
pub const BROADCAST_DST: u32 = 255;

/// Data logical channel used by the scenarios
pub const DATA_LCID: u8 = 4;

/// RSRP reported for every reception on the shared channel
pub const CHANNEL_RSRP_DBM: f64 = -60.0;
