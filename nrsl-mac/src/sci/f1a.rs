//! SCI format 1-A
//!
//! Byte layout (multi-byte fields big-endian):
//!
//! | field                    | size |
//! |--------------------------|------|
//! | priority                 | 1    |
//! | MCS                      | 1    |
//! | stage-2 format           | 1    |
//! | reservation period (ms)  | 2    |
//! | total sub-channels       | 2    |
//! | start sub-channel        | 1    |
//! | sub-channel length       | 1    |
//! | max num per reserve      | 1    |
//! | gap / start of ReTx 1    | 2, if max is 2 or 3 |
//! | gap / start of ReTx 2    | 2, if max is 3 |
//!
//! An unset gap or start sub-channel travels as `0xFF`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Result, SciCodecError, Stage2Format};

/// Length of the fields always present in SCI-1A.
pub const SCI_F1A_BASE_LEN: usize = 10;

/// On-air value of an unset gap or start sub-channel.
const UNSET: u8 = u8::MAX;

/// Decoded or fully built SCI format 1-A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SciF1a {
    /// Priority of the TB
    pub priority: u8,
    /// MCS of the PSSCH
    pub mcs: u8,
    /// Format of the stage-2 SCI that follows
    pub stage2_format: Stage2Format,
    /// Resource reservation period in ms, 0 when not reserving
    pub reservation_period_ms: u16,
    /// Sub-channels in the pool
    pub total_sub_channels: u16,
    /// First sub-channel of this transmission
    pub start_sub_channel: u8,
    /// Number of sub-channels of this transmission
    pub length_sub_channel: u8,
    /// Occasions signalled by this SCI including the current one (1-3)
    pub max_num_per_reserve: u8,
    /// Slot gap to the first retransmission
    pub gap_retx1: Option<u8>,
    /// First sub-channel of the first retransmission
    pub start_sub_channel_retx1: Option<u8>,
    /// Slot gap to the second retransmission
    pub gap_retx2: Option<u8>,
    /// First sub-channel of the second retransmission
    pub start_sub_channel_retx2: Option<u8>,
}

impl SciF1a {
    /// Starts building a header.
    pub fn builder() -> SciF1aBuilder {
        SciF1aBuilder::default()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        encoded_len(self.max_num_per_reserve)
    }

    /// Encodes the header into a new buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encodes the header into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.priority);
        buf.put_u8(self.mcs);
        buf.put_u8(self.stage2_format as u8);
        buf.put_u16(self.reservation_period_ms);
        buf.put_u16(self.total_sub_channels);
        buf.put_u8(self.start_sub_channel);
        buf.put_u8(self.length_sub_channel);
        buf.put_u8(self.max_num_per_reserve);

        if self.max_num_per_reserve == 2 || self.max_num_per_reserve == 3 {
            buf.put_u8(self.gap_retx1.unwrap_or(UNSET));
            buf.put_u8(self.start_sub_channel_retx1.unwrap_or(UNSET));
        }
        if self.max_num_per_reserve == 3 {
            buf.put_u8(self.gap_retx2.unwrap_or(UNSET));
            buf.put_u8(self.start_sub_channel_retx2.unwrap_or(UNSET));
        }
    }

    /// Decodes a header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;

        if buf.len() < SCI_F1A_BASE_LEN {
            return Err(SciCodecError::BufferTooShort {
                needed: SCI_F1A_BASE_LEN,
                available: buf.len(),
            });
        }

        let priority = buf.get_u8();
        let mcs = buf.get_u8();
        let format_code = buf.get_u8();
        let stage2_format = Stage2Format::from_u8(format_code)
            .ok_or(SciCodecError::UnsupportedStage2Format(format_code))?;
        let reservation_period_ms = buf.get_u16();
        let total_sub_channels = buf.get_u16();
        let start_sub_channel = buf.get_u8();
        let length_sub_channel = buf.get_u8();
        let max_num_per_reserve = buf.get_u8();

        if !(1..=3).contains(&max_num_per_reserve) {
            return Err(SciCodecError::InvalidMaxNumPerReserve(max_num_per_reserve));
        }

        let needed = encoded_len(max_num_per_reserve);
        if data.len() < needed {
            return Err(SciCodecError::BufferTooShort {
                needed,
                available: data.len(),
            });
        }

        let mut header = SciF1a {
            priority,
            mcs,
            stage2_format,
            reservation_period_ms,
            total_sub_channels,
            start_sub_channel,
            length_sub_channel,
            max_num_per_reserve,
            gap_retx1: None,
            start_sub_channel_retx1: None,
            gap_retx2: None,
            start_sub_channel_retx2: None,
        };

        if max_num_per_reserve >= 2 {
            header.gap_retx1 = optional(buf.get_u8());
            header.start_sub_channel_retx1 = optional(buf.get_u8());
        }
        if max_num_per_reserve == 3 {
            header.gap_retx2 = optional(buf.get_u8());
            header.start_sub_channel_retx2 = optional(buf.get_u8());
        }

        Ok(header)
    }
}

fn encoded_len(max_num_per_reserve: u8) -> usize {
    match max_num_per_reserve {
        2 => SCI_F1A_BASE_LEN + 2,
        3 => SCI_F1A_BASE_LEN + 4,
        _ => SCI_F1A_BASE_LEN,
    }
}

fn optional(value: u8) -> Option<u8> {
    (value != UNSET).then_some(value)
}

/// Builder for [`SciF1a`].
///
/// The eight mandatory fields must be set before [`build`](Self::build).
/// Retransmission fields depend on `max_num_per_reserve`, which therefore
/// has to be set first.
#[derive(Debug, Clone, Default)]
pub struct SciF1aBuilder {
    priority: Option<u8>,
    mcs: Option<u8>,
    stage2_format: Option<Stage2Format>,
    reservation_period_ms: Option<u16>,
    total_sub_channels: Option<u16>,
    start_sub_channel: Option<u8>,
    length_sub_channel: Option<u8>,
    max_num_per_reserve: Option<u8>,
    retx1: Option<(u8, u8)>,
    retx2: Option<(u8, u8)>,
}

impl SciF1aBuilder {
    /// Sets the priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the MCS.
    pub fn mcs(mut self, mcs: u8) -> Self {
        self.mcs = Some(mcs);
        self
    }

    /// Sets the stage-2 format.
    pub fn stage2_format(mut self, format: Stage2Format) -> Self {
        self.stage2_format = Some(format);
        self
    }

    /// Sets the reservation period in ms.
    pub fn reservation_period_ms(mut self, period: u16) -> Self {
        self.reservation_period_ms = Some(period);
        self
    }

    /// Sets the number of sub-channels in the pool.
    pub fn total_sub_channels(mut self, total: u16) -> Self {
        self.total_sub_channels = Some(total);
        self
    }

    /// Sets the first sub-channel and the length of this transmission.
    pub fn sub_channels(mut self, start: u8, length: u8) -> Self {
        self.start_sub_channel = Some(start);
        self.length_sub_channel = Some(length);
        self
    }

    /// Sets how many occasions this SCI signals.
    pub fn max_num_per_reserve(mut self, max: u8) -> Self {
        self.max_num_per_reserve = Some(max);
        self
    }

    /// Sets gap and start sub-channel of the first retransmission.
    ///
    /// # Panics
    /// Panics unless `max_num_per_reserve` was already set to 2 or 3.
    pub fn retx1(mut self, gap: u8, start_sub_channel: u8) -> Self {
        assert!(
            matches!(self.max_num_per_reserve, Some(2) | Some(3)),
            "max_num_per_reserve must be 2 or 3 before setting ReTx 1, got {:?}",
            self.max_num_per_reserve
        );
        self.retx1 = Some((gap, start_sub_channel));
        self
    }

    /// Sets gap and start sub-channel of the second retransmission.
    ///
    /// # Panics
    /// Panics unless `max_num_per_reserve` was already set to 3, or if the
    /// gap equals the gap of the first retransmission.
    pub fn retx2(mut self, gap: u8, start_sub_channel: u8) -> Self {
        assert!(
            self.max_num_per_reserve == Some(3),
            "max_num_per_reserve must be 3 before setting ReTx 2, got {:?}",
            self.max_num_per_reserve
        );
        if let Some((gap1, _)) = self.retx1 {
            assert_ne!(gap, gap1, "ReTx 2 gap must differ from ReTx 1 gap");
        }
        self.retx2 = Some((gap, start_sub_channel));
        self
    }

    /// Builds the header.
    pub fn build(self) -> Result<SciF1a> {
        let max_num_per_reserve = self
            .max_num_per_reserve
            .ok_or(SciCodecError::MissingField("max_num_per_reserve"))?;
        if !(1..=3).contains(&max_num_per_reserve) {
            return Err(SciCodecError::InvalidMaxNumPerReserve(max_num_per_reserve));
        }

        Ok(SciF1a {
            priority: self.priority.ok_or(SciCodecError::MissingField("priority"))?,
            mcs: self.mcs.ok_or(SciCodecError::MissingField("mcs"))?,
            stage2_format: self
                .stage2_format
                .ok_or(SciCodecError::MissingField("stage2_format"))?,
            reservation_period_ms: self
                .reservation_period_ms
                .ok_or(SciCodecError::MissingField("reservation_period_ms"))?,
            total_sub_channels: self
                .total_sub_channels
                .ok_or(SciCodecError::MissingField("total_sub_channels"))?,
            start_sub_channel: self
                .start_sub_channel
                .ok_or(SciCodecError::MissingField("start_sub_channel"))?,
            length_sub_channel: self
                .length_sub_channel
                .ok_or(SciCodecError::MissingField("length_sub_channel"))?,
            max_num_per_reserve,
            gap_retx1: self.retx1.map(|(gap, _)| gap),
            start_sub_channel_retx1: self.retx1.map(|(_, start)| start),
            gap_retx2: self.retx2.map(|(gap, _)| gap),
            start_sub_channel_retx2: self.retx2.map(|(_, start)| start),
        })
    }
}
