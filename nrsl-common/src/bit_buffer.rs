//! Bit-level buffers for bit-packed control messages.
//!
//! `BitBuffer` writes MSB-first into a growable byte vector and
//! `BitBufferReader` reads MSB-first from a borrowed slice with bounds
//! checking, so truncated input surfaces as `None` instead of a panic.

/// A growable MSB-first bit writer.
///
/// # Example
/// ```
/// use nrsl_common::BitBuffer;
///
/// let mut buffer = BitBuffer::with_capacity_octets(2);
/// buffer.write_bits(0b1010, 4);
/// buffer.write_bits(0b1100, 4);
/// buffer.write_bits(0b1, 1);
/// assert_eq!(buffer.into_bytes(), vec![0b1010_1100, 0b1000_0000]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BitBuffer {
    data: Vec<u8>,
    index: usize, // bit index
}

impl BitBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `octets` bytes.
    pub fn with_capacity_octets(octets: usize) -> Self {
        Self {
            data: Vec::with_capacity(octets),
            index: 0,
        }
    }

    /// Writes a single bit; the last octet is zero padded.
    #[inline]
    pub fn write(&mut self, bit: bool) {
        let octet_index = self.index / 8;
        let bit_index = self.index % 8;
        if octet_index == self.data.len() {
            self.data.push(0);
        }
        if bit {
            self.data[octet_index] |= 1 << (7 - bit_index);
        }
        self.index += 1;
    }

    /// Writes the `len` least significant bits of `value`, MSB first.
    ///
    /// # Panics
    /// Panics if `len` > 32 or `value` does not fit in `len` bits.
    #[inline]
    pub fn write_bits(&mut self, value: u32, len: usize) {
        if len == 0 {
            return;
        }
        assert!(len <= 32, "len must be <= 32");
        assert!(
            len == 32 || value >> len == 0,
            "value {value} does not fit in {len} bits"
        );

        for i in 0..len {
            self.write((value >> (len - 1 - i)) & 1 != 0);
        }
    }

    /// Consumes the buffer and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// A bounds-checked MSB-first bit reader.
pub struct BitBufferReader<'a> {
    data: &'a [u8],
    index: usize, // bit index
}

impl<'a> BitBufferReader<'a> {
    /// Creates a new reader over a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Reads a single bit, or `None` past the end of the data.
    #[inline]
    pub fn read(&mut self) -> Option<bool> {
        let octet = *self.data.get(self.index / 8)?;
        let bit_index = self.index % 8;
        self.index += 1;
        Some((octet >> (7 - bit_index)) & 1 != 0)
    }

    /// Reads `len` bits (1-32) into the low bits of a `u32`.
    ///
    /// Returns `None` without consuming anything if fewer than `len`
    /// bits remain.
    #[inline]
    pub fn read_bits(&mut self, len: usize) -> Option<u32> {
        assert!(len > 0 && len <= 32, "len must be between 1 and 32");
        if self.remaining_bits() < len {
            return None;
        }

        let mut result = 0u32;
        for _ in 0..len {
            result = (result << 1) | u32::from(self.read()?);
        }
        Some(result)
    }

    fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.index)
    }
}
