//! Bit-level writer and reader.
//!
//! Every field is emitted least-significant bit first, and bits fill each
//! byte starting at its least-significant bit. Byte-aligned multiples of
//! eight therefore come out as plain little-endian integers:
//!
//! ```text
//! size=36 (16 bits)    -> 0x24 0x00
//! protocol=1024 (12)   ┐
//! addressable=1 (1)    ├-> 0x00 0x34
//! tagged=1 (1)         │
//! origin=0 (2)         ┘
//! ```
//!
//! # Example
//!
//! ```
//! use photons_protocol::codec::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.push_uint(1024, 12);
//! writer.push_bit(true);
//! writer.push_bit(true);
//! writer.push_uint(0, 2);
//! let bytes = writer.finish().unwrap();
//! assert_eq!(&bytes[..], &[0x00, 0x34]);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_uint(12).unwrap(), 1024);
//! assert!(reader.read_bit().unwrap());
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PhotonsError, Result};

/// Accumulates bits into a byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: BytesMut,
    bit_len: usize,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `bits` bits.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(bits.div_ceil(8)),
            bit_len: 0,
        }
    }

    /// Number of bits written so far.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    #[inline]
    fn is_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }

    /// Append a single bit.
    pub fn push_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.buffer.put_u8(0);
        }
        if bit {
            let last = self.buffer.len() - 1;
            self.buffer[last] |= 1 << offset;
        }
        self.bit_len += 1;
    }

    /// Append the low `width` bits of `value`.
    pub fn push_uint(&mut self, value: u64, width: usize) {
        debug_assert!(width <= 64);
        if self.is_aligned() && width % 8 == 0 {
            self.buffer
                .put_slice(&value.to_le_bytes()[..width / 8]);
            self.bit_len += width;
            return;
        }
        for i in 0..width {
            self.push_bit((value >> i) & 1 == 1);
        }
    }

    /// Append `width` bits taken from `data`, zero padding past its end.
    pub fn push_bytes(&mut self, data: &[u8], width: usize) {
        if self.is_aligned() && width % 8 == 0 {
            let take = data.len().min(width / 8);
            self.buffer.put_slice(&data[..take]);
            self.buffer.put_bytes(0, width / 8 - take);
            self.bit_len += width;
            return;
        }
        for i in 0..width {
            let bit = data
                .get(i / 8)
                .is_some_and(|byte| (byte >> (i % 8)) & 1 == 1);
            self.push_bit(bit);
        }
    }

    /// Append `width` zero bits.
    pub fn push_zeros(&mut self, width: usize) {
        self.push_bytes(&[], width);
    }

    /// Finish writing.
    ///
    /// # Errors
    ///
    /// Returns an encode error if the bit count is not byte aligned.
    pub fn finish(self) -> Result<Bytes> {
        if !self.is_aligned() {
            return Err(PhotonsError::Encode(format!(
                "Packed {} bits, which is not a whole number of bytes",
                self.bit_len
            )));
        }
        Ok(self.buffer.freeze())
    }
}

/// Reads bits from a byte slice in the same order [`BitWriter`] writes them.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bits consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn ensure(&self, width: usize) -> Result<()> {
        if width > self.remaining() {
            return Err(PhotonsError::Decode(format!(
                "Need {} bits at offset {}, only {} remain",
                width,
                self.pos,
                self.remaining()
            )));
        }
        Ok(())
    }

    /// Read one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        self.ensure(1)?;
        let bit = (self.data[self.pos / 8] >> (self.pos % 8)) & 1 == 1;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `width` bits (at most 64) as an unsigned integer.
    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        debug_assert!(width <= 64);
        self.ensure(width)?;
        if self.pos % 8 == 0 && width % 8 == 0 {
            let start = self.pos / 8;
            let mut buf = [0u8; 8];
            buf[..width / 8].copy_from_slice(&self.data[start..start + width / 8]);
            self.pos += width;
            return Ok(u64::from_le_bytes(buf));
        }
        let mut value = 0u64;
        for i in 0..width {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Read `width` bits into `ceil(width / 8)` bytes.
    pub fn read_bytes(&mut self, width: usize) -> Result<Vec<u8>> {
        self.ensure(width)?;
        if self.pos % 8 == 0 && width % 8 == 0 {
            let start = self.pos / 8;
            self.pos += width;
            return Ok(self.data[start..start + width / 8].to_vec());
        }
        let mut out = vec![0u8; width.div_ceil(8)];
        for i in 0..width {
            if self.read_bit()? {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(out)
    }

    /// Skip `width` bits, reporting whether any of them were set.
    pub fn skip(&mut self, width: usize) -> Result<bool> {
        Ok(self.read_bytes(width)?.iter().any(|b| *b != 0))
    }
}

/// Render bytes as a string of `0`/`1` in wire bit order.
///
/// Useful for comparing against bit-level fixtures.
pub fn to_bit_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8);
    for byte in data {
        for i in 0..8 {
            out.push(if (byte >> i) & 1 == 1 { '1' } else { '0' });
        }
    }
    out
}
