//! Logging infrastructure for the sidelink MAC
//!
//! Subscriber setup on top of `tracing`, plus helpers to log sidelink
//! control and data PDUs with a hex payload at trace level.

use std::fmt;

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Installs a `tracing` subscriber for the MAC.
///
/// `RUST_LOG` overrides `filter`. Calling it again is a no-op.
///
/// ```no_run
/// // info everywhere, debug for the MAC crate
/// nrsl_common::init_logging("info,nrsl_mac=debug");
/// ```
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .try_init();
}

/// PDU direction for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the PHY
    Rx,
    /// Handed to the PHY
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Logs a sidelink control message (SCI) at debug level, hex payload at trace.
///
/// # Example
///
/// ```
/// use nrsl_common::logging::{log_sci_message, Direction};
///
/// let sci = [0x01, 0x0a, 0x00, 0x00, 0x64, 0x00, 0x01, 0x00, 0x01, 0x01];
/// log_sci_message(Direction::Tx, "SCI-1A", &sci);
/// ```
pub fn log_sci_message(direction: Direction, format: &str, data: &[u8]) {
    tracing::debug!(
        direction = %direction,
        format = format,
        len = data.len(),
        "{} {}",
        direction,
        format
    );
    tracing::trace!(format = format, hex = %HexDump(data), "{} payload", format);
}

/// Logs a PSSCH data PDU of a logical channel.
pub fn log_data_pdu(direction: Direction, lcid: u8, dst_l2_id: u32, data: &[u8]) {
    tracing::debug!(
        direction = %direction,
        lcid = lcid,
        dst = dst_l2_id,
        len = data.len(),
        "{} PSSCH data PDU",
        direction
    );
    tracing::trace!(lcid = lcid, hex = %HexDump(data), "PSSCH payload");
}

/// Wrapper for hex dump formatting
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
