//! MSB-first bit-level reader and writer.
//!
//! The instrument packs fields big-endian with no alignment padding, so a
//! field may start at any bit of any byte. Bit 0 of the stream is the most
//! significant bit of byte 0.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::{Error, Result};

const MAX_FIELD_BITS: u32 = 64;

/// Sequential reader over a byte buffer.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitCursor<'a> {
    /// Creates a cursor at bit offset 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
        }
    }

    /// Bits consumed so far.
    #[inline]
    #[must_use]
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }

    /// Byte containing the next bit to be read.
    #[inline]
    #[must_use]
    pub fn byte_offset(&self) -> usize {
        self.bit_offset / 8
    }

    /// Bits left in the buffer.
    #[inline]
    #[must_use]
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_offset
    }

    /// Reads the next `n_bits` as an unsigned integer, most significant bit first.
    ///
    /// # Errors
    /// Returns [`Error::TruncatedInput`] if fewer than `n_bits` remain, leaving
    /// the cursor unchanged, or [`Error::Config`] if `n_bits` exceeds 64.
    pub fn read_uint(&mut self, n_bits: u32) -> Result<u64> {
        if n_bits > MAX_FIELD_BITS {
            return Err(Error::Config(format!(
                "field width {n_bits} exceeds {MAX_FIELD_BITS} bits"
            )));
        }
        let remaining_bits = self.remaining_bits();
        if n_bits as usize > remaining_bits {
            return Err(Error::TruncatedInput {
                field: None,
                byte_offset: self.byte_offset(),
                requested_bits: n_bits,
                remaining_bits,
            });
        }

        let mut value: u64 = 0;
        let mut pending = n_bits;
        while pending > 0 {
            let byte = self.data[self.bit_offset / 8];
            let available = 8 - (self.bit_offset % 8) as u32;
            let take = available.min(pending);
            let shift = available - take;
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (byte >> shift) & mask;
            value = (value << take) | u64::from(chunk);
            self.bit_offset += take as usize;
            pending -= take;
        }
        Ok(value)
    }

    /// Reads an unsigned integer and maps it to `raw * scale + offset`.
    ///
    /// # Errors
    /// Same as [`BitCursor::read_uint`].
    pub fn read_scaled(&mut self, n_bits: u32, scale: f64, offset: f64) -> Result<f64> {
        let raw = self.read_uint(n_bits)?;
        Ok(raw as f64 * scale + offset)
    }

    /// Reads an IEEE-754 binary32 or binary64 value.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for widths other than 32 or 64, otherwise
    /// same as [`BitCursor::read_uint`].
    pub fn read_ieee(&mut self, n_bits: u32) -> Result<f64> {
        match n_bits {
            32 => Ok(f64::from(f32::from_bits(self.read_uint(32)? as u32))),
            64 => Ok(f64::from_bits(self.read_uint(64)?)),
            other => Err(Error::Config(format!("no IEEE-754 format is {other} bits wide"))),
        }
    }
}

/// Sequential MSB-first writer; the inverse of [`BitCursor`].
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with room for `bits` bits.
    #[must_use]
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            bit_len: 0,
        }
    }

    /// Bits written so far.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Appends the low `n_bits` of `value`, most significant bit first.
    ///
    /// # Errors
    /// Returns [`Error::Encode`] if `value` needs more than `n_bits` bits.
    pub fn write_uint(&mut self, value: u64, n_bits: u32) -> Result<()> {
        if n_bits > MAX_FIELD_BITS {
            return Err(Error::Config(format!(
                "field width {n_bits} exceeds {MAX_FIELD_BITS} bits"
            )));
        }
        if n_bits < MAX_FIELD_BITS && value >> n_bits != 0 {
            return Err(Error::Encode {
                field: None,
                value: value as f64,
                reason: "value wider than field",
            });
        }

        let mut pending = n_bits;
        while pending > 0 {
            let used = (self.bit_len % 8) as u32;
            if used == 0 {
                self.bytes.push(0);
            }
            let available = 8 - used;
            let take = available.min(pending);
            let chunk = ((value >> (pending - take)) & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= chunk << (available - take);
            }
            self.bit_len += take as usize;
            pending -= take;
        }
        Ok(())
    }

    /// Appends `value` as an IEEE-754 binary32 or binary64.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for widths other than 32 or 64.
    pub fn write_ieee(&mut self, value: f64, n_bits: u32) -> Result<()> {
        match n_bits {
            32 => self.write_uint(u64::from((value as f32).to_bits()), 32),
            64 => self.write_uint(value.to_bits(), 64),
            other => Err(Error::Config(format!("no IEEE-754 format is {other} bits wide"))),
        }
    }

    /// Finishes writing; a trailing partial byte is zero-padded.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_uint_msb_first() {
        let data = [0b1010_1100, 0b0101_0011];
        let mut cursor = BitCursor::new(&data);
        assert_eq!(cursor.read_uint(1).unwrap(), 1);
        assert_eq!(cursor.read_uint(3).unwrap(), 0b010);
        assert_eq!(cursor.read_uint(6).unwrap(), 0b11_0001);
        assert_eq!(cursor.read_uint(6).unwrap(), 0b01_0011);
        assert_eq!(cursor.remaining_bits(), 0);
    }

    #[test]
    fn test_read_uint_big_endian_words() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF];
        let mut cursor = BitCursor::new(&data);
        assert_eq!(cursor.read_uint(16).unwrap(), 0x0102);
        assert_eq!(cursor.read_uint(16).unwrap(), 0x0304);
        assert_eq!(cursor.byte_offset(), 4);

        let mut cursor = BitCursor::new(&data);
        assert_eq!(cursor.read_uint(64).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(cursor.remaining_bits(), 8);
    }

    #[test]
    fn test_truncated_read_leaves_cursor() {
        let data = [0xAB];
        let mut cursor = BitCursor::new(&data);
        cursor.read_uint(3).unwrap();
        let err = cursor.read_uint(6).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedInput {
                field: None,
                byte_offset: 0,
                requested_bits: 6,
                remaining_bits: 5
            }
        ));
        assert_eq!(cursor.bit_offset(), 3);
        assert_eq!(cursor.read_uint(5).unwrap(), 0b0_1011);
    }

    #[test]
    fn test_one_bit_short_and_long() {
        let data = [0xFF, 0xFF];
        let mut short = BitCursor::new(&data);
        short.read_uint(15).unwrap();
        assert_eq!(short.remaining_bits(), 1);

        let mut cursor = BitCursor::new(&data);
        cursor.read_uint(9).unwrap();
        assert!(matches!(
            cursor.read_uint(8),
            Err(Error::TruncatedInput { remaining_bits: 7, .. })
        ));
    }

    #[test]
    fn test_read_scaled_and_ieee() {
        let mut writer = BitWriter::new();
        writer.write_uint(250, 13).unwrap();
        writer.write_ieee(3220.0, 32).unwrap();
        writer.write_ieee(-1.5, 64).unwrap();
        let bytes = writer.into_bytes();

        let mut cursor = BitCursor::new(&bytes);
        assert!((cursor.read_scaled(13, 1.0, 100.0).unwrap() - 350.0).abs() < f64::EPSILON);
        assert!((cursor.read_ieee(32).unwrap() - 3220.0).abs() < f64::EPSILON);
        assert!((cursor.read_ieee(64).unwrap() + 1.5).abs() < f64::EPSILON);
        assert!(matches!(cursor.read_ieee(16), Err(Error::Config(_))));
    }

    #[test]
    fn test_writer_packs_unaligned_fields() {
        let mut writer = BitWriter::with_capacity(17);
        writer.write_uint(0b101, 3).unwrap();
        writer.write_uint(0x3FF, 10).unwrap();
        writer.write_uint(0b0110, 4).unwrap();
        assert_eq!(writer.bit_len(), 17);
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0b1011_1111, 0b1111_1011, 0b0000_0000]);

        let mut cursor = BitCursor::new(&bytes);
        assert_eq!(cursor.read_uint(3).unwrap(), 0b101);
        assert_eq!(cursor.read_uint(10).unwrap(), 0x3FF);
        assert_eq!(cursor.read_uint(4).unwrap(), 0b0110);
        assert_eq!(cursor.remaining_bits(), 7);
    }

    #[test]
    fn test_writer_rejects_wide_value() {
        let mut writer = BitWriter::new();
        let err = writer.write_uint(1024, 10).unwrap_err();
        assert!(matches!(err, Error::Encode { field: None, .. }));
        assert!(writer.write_uint(u64::MAX, 64).is_ok());
    }
}
