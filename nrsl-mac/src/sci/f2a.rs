//! SCI stage 2
//!
//! Format 2-A is bit packed, MSB first, over five bytes:
//!
//! ```text
//! | HARQ id:4 | NDI:1 | RV:2 | src:8 | dst:16 | pad:1 |   4 bytes
//! | cast:2 | CSI req:1 | zero:5 |                         1 byte
//! ```
//!
//! Source and destination ids are truncated to their 8 and 16 least
//! significant bits.

use bytes::Bytes;
use nrsl_common::{BitBuffer, BitBufferReader};

use super::{Result, SciCodecError, Stage2Format};

/// Encoded size of SCI format 2-A.
pub const SCI_F2A_LEN: usize = 5;

/// Cast type carried in SCI format 2-A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CastType {
    /// Broadcast
    #[default]
    Broadcast = 0,
    /// Groupcast with ACK/NACK feedback
    Groupcast = 1,
    /// Unicast
    Unicast = 2,
    /// Groupcast with NACK-only feedback
    GroupcastOnlyNack = 3,
}

impl TryFrom<u8> for CastType {
    type Error = SciCodecError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CastType::Broadcast),
            1 => Ok(CastType::Groupcast),
            2 => Ok(CastType::Unicast),
            3 => Ok(CastType::GroupcastOnlyNack),
            _ => Err(SciCodecError::InvalidCastType(value)),
        }
    }
}

/// Format specific fields of a stage-2 SCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sci2Format {
    /// SCI format 2-A
    A {
        /// Cast type
        cast_type: CastType,
        /// CSI request
        csi_req: bool,
    },
}

impl Sci2Format {
    /// Format code announced by SCI-1A.
    pub fn stage2_format(&self) -> Stage2Format {
        match self {
            Sci2Format::A { .. } => Stage2Format::Sci2A,
        }
    }
}

/// Stage-2 SCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SciF2 {
    /// HARQ process id (4 bits)
    pub harq_id: u8,
    /// New data indicator
    pub ndi: bool,
    /// Redundancy version (2 bits)
    pub rv: u8,
    /// Source layer-2 id
    pub src_id: u32,
    /// Destination layer-2 id
    pub dst_id: u32,
    /// Format specific fields
    pub format: Sci2Format,
}

impl SciF2 {
    /// Creates a broadcast SCI-2A without CSI request.
    pub fn broadcast(harq_id: u8, ndi: bool, rv: u8, src_id: u32, dst_id: u32) -> Self {
        Self {
            harq_id,
            ndi,
            rv,
            src_id,
            dst_id,
            format: Sci2Format::A {
                cast_type: CastType::Broadcast,
                csi_req: false,
            },
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self.format {
            Sci2Format::A { .. } => SCI_F2A_LEN,
        }
    }

    /// Encodes the header.
    ///
    /// # Panics
    /// Panics if `harq_id` does not fit in 4 bits or `rv` in 2 bits.
    pub fn encode(&self) -> Bytes {
        assert!(self.harq_id < 16, "HARQ id {} exceeds 4 bits", self.harq_id);
        assert!(self.rv < 4, "RV {} exceeds 2 bits", self.rv);

        let mut buffer = BitBuffer::with_capacity_octets(self.encoded_len());
        buffer.write_bits(u32::from(self.harq_id), 4);
        buffer.write(self.ndi);
        buffer.write_bits(u32::from(self.rv), 2);
        buffer.write_bits(self.src_id & 0xFF, 8);
        buffer.write_bits(self.dst_id & 0xFFFF, 16);
        buffer.write(false);

        match self.format {
            Sci2Format::A { cast_type, csi_req } => {
                buffer.write_bits(u32::from(cast_type as u8), 2);
                buffer.write(csi_req);
                buffer.write_bits(0, 5);
            }
        }

        Bytes::from(buffer.into_bytes())
    }

    /// Decodes SCI format 2-A from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SCI_F2A_LEN {
            return Err(SciCodecError::BufferTooShort {
                needed: SCI_F2A_LEN,
                available: data.len(),
            });
        }

        let mut reader = BitBufferReader::new(&data[..SCI_F2A_LEN]);
        let mut field = |len: usize| {
            reader.read_bits(len).ok_or(SciCodecError::BufferTooShort {
                needed: SCI_F2A_LEN,
                available: data.len(),
            })
        };

        let harq_id = field(4)? as u8;
        let ndi = field(1)? == 1;
        let rv = field(2)? as u8;
        let src_id = field(8)?;
        let dst_id = field(16)?;
        if field(1)? != 0 {
            return Err(SciCodecError::NonZeroPadding);
        }
        let cast_type = CastType::try_from(field(2)? as u8)?;
        let csi_req = field(1)? == 1;
        if field(5)? != 0 {
            return Err(SciCodecError::NonZeroPadding);
        }

        Ok(Self {
            harq_id,
            ndi,
            rv,
            src_id,
            dst_id,
            format: Sci2Format::A { cast_type, csi_req },
        })
    }
}
