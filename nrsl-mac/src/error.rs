//! MAC error types

use thiserror::Error;

use crate::sci::SciCodecError;

/// Errors returned by the sidelink MAC.
#[derive(Debug, Error)]
pub enum MacError {
    /// SCI could not be decoded
    #[error("SCI error: {0}")]
    Sci(#[from] SciCodecError),

    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] nrsl_common::Error),

    /// PDU addressed to a destination this UE does not listen to
    #[error("unknown RX destination: {0}")]
    UnknownDestination(u32),
}

/// Result type for MAC operations
pub type Result<T> = std::result::Result<T, MacError>;
