//! Sidelink Control Information codecs
//!
//! Stage 1 (SCI format 1-A) travels on the PSCCH and announces the
//! reservation; stage 2 (SCI format 2-A) travels on the PSSCH ahead of the
//! data and identifies the HARQ process, source and destination.
//!
//! Both encoders are pure and stateless. Decoders return `SciCodecError`
//! instead of panicking on malformed input.

pub mod f1a;
pub mod f2a;

pub use f1a::{SciF1a, SciF1aBuilder, SCI_F1A_BASE_LEN};
pub use f2a::{CastType, Sci2Format, SciF2, SCI_F2A_LEN};

use thiserror::Error;

/// Errors raised while building, encoding or decoding SCI messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SciCodecError {
    /// Buffer too short
    #[error("buffer too short: need {needed} bytes, have {available}")]
    BufferTooShort {
        /// Number of bytes needed
        needed: usize,
        /// Number of bytes available
        available: usize,
    },

    /// Reserved occasions per SCI outside 1-3
    #[error("invalid max number of reserved occasions: {0}")]
    InvalidMaxNumPerReserve(u8),

    /// Stage-2 format code not understood
    #[error("unsupported SCI stage 2 format: {0}")]
    UnsupportedStage2Format(u8),

    /// Cast type code outside the 2-bit range
    #[error("invalid cast type: {0}")]
    InvalidCastType(u8),

    /// A mandatory field was never set on the builder
    #[error("mandatory field not set: {0}")]
    MissingField(&'static str),

    /// Reserved bits were not zero
    #[error("non-zero padding in SCI stage 2")]
    NonZeroPadding,
}

/// Stage-2 SCI format announced in SCI-1A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage2Format {
    /// SCI format 2-A
    Sci2A = 0,
}

impl Stage2Format {
    /// Converts the on-air code to a format.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Stage2Format::Sci2A),
            _ => None,
        }
    }
}

/// Result type for SCI codec operations
pub type Result<T> = std::result::Result<T, SciCodecError>;
