//! Growable byte buffer with a read/write cursor.
//!
//! [`crate::file::buffer::ByteBuffer`] is the write-side counterpart of
//! [`crate::file::parser::Parser`]: heap builders and the method body encoder serialize into it,
//! and it can be read back with the same bounds-checked primitives. The buffer tracks two
//! positions:
//!
//! - **position** - the cursor used by the next read or write
//! - **length** - the high-water mark of all writes, which is the logical size of the content
//!
//! Writing past the current capacity grows the backing storage geometrically to
//! `max(capacity + requested, capacity * 2)`. All multi-byte values are little-endian on the wire.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::file::buffer::ByteBuffer;
//!
//! let mut buffer = ByteBuffer::new();
//! buffer.write_u16(0x3003)?;
//! buffer.write_compressed_uint(0x2E57)?;
//! buffer.write_compressed_int(-3)?;
//! assert_eq!(buffer.as_slice(), &[0x03, 0x30, 0xAE, 0x57, 0x7B]);
//!
//! buffer.set_position(2)?;
//! assert_eq!(buffer.read_compressed_uint()?, 0x2E57);
//! assert_eq!(buffer.read_compressed_int()?, -3);
//! # Ok::<(), cilweave::Error>(())
//! ```

use crate::{
    file::io::{
        compressed_int_bytes, compressed_uint_bytes, read_compressed_int_at,
        read_compressed_uint_at, read_le_at, CilIO,
    },
    Result,
};

/// A growable byte buffer with a cursor, used for all encoding work.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    length: usize,
}

impl ByteBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: vec![0; capacity],
            position: 0,
            length: 0,
        }
    }

    /// Wrap existing bytes for reading; the cursor starts at 0.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let length = data.len();
        ByteBuffer {
            data,
            position: 0,
            length,
        }
    }

    /// Cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Positions up to the current length are valid.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` lies past the written content.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.length {
            return Err(out_of_bounds_error!());
        }

        self.position = position;
        Ok(())
    }

    /// Move the cursor to the end of the written content.
    pub fn seek_end(&mut self) {
        self.position = self.length;
    }

    /// High-water mark of all writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Size of the backing storage.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The written content.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Consume the buffer and return the written content.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.length);
        self.data
    }

    /// Make sure `desired` bytes can be written at the cursor.
    fn ensure(&mut self, desired: usize) -> Result<()> {
        let Some(end) = self.position.checked_add(desired) else {
            return Err(out_of_bounds_error!());
        };

        let capacity = self.data.len();
        if end > capacity {
            let grown = (capacity + desired).max(capacity * 2).max(end);
            self.data.resize(grown, 0);
        }

        Ok(())
    }

    /// Write raw bytes at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;

        let end = self.position + bytes.len();
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
        self.length = self.length.max(end);
        Ok(())
    }

    /// Write a little-endian value at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn write_le<T: CilIO>(&mut self, value: T) -> Result<()> {
        self.write_bytes(value.to_le_bytes().as_ref())
    }

    /// Write a single byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_le(value)
    }

    /// Write a little-endian `u16`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_le(value)
    }

    /// Write a little-endian `u32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_le(value)
    }

    /// Write a 2-byte or 4-byte index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` does not fit into 2 bytes while `is_large`
    /// is false.
    pub fn write_index(&mut self, value: u32, is_large: bool) -> Result<()> {
        if is_large {
            return self.write_u32(value);
        }

        match u16::try_from(value) {
            Ok(small) => self.write_u16(small),
            Err(_) => Err(malformed_error!(
                "Value {:#X} does not fit into a 2 byte index",
                value
            )),
        }
    }

    /// Write an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::CompressedOutOfRange`] for values above `0x1FFFFFFF`.
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        let (bytes, len) = compressed_uint_bytes(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Write an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::CompressedOutOfRange`] for values outside
    /// `-0x10000000..=0x0FFFFFFF`.
    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        let (bytes, len) = compressed_int_bytes(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Pad with zero bytes until the cursor is a multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor arithmetic overflows.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        const ZEROES: [u8; 16] = [0; 16];

        if alignment == 0 {
            return Ok(());
        }

        let padding = (alignment - (self.position % alignment)) % alignment;
        let mut remaining = padding;
        while remaining > 0 {
            let chunk = remaining.min(ZEROES.len());
            self.write_bytes(&ZEROES[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Read a little-endian value at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value extends past the written content.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(&self.data[..self.length], &mut self.position)
    }

    /// Read `len` raw bytes at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the bytes extend past the written content.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.position;
        match start.checked_add(len) {
            Some(end) if end <= self.length => {
                self.position = end;
                Ok(&self.data[start..end])
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Read an ECMA-335 compressed unsigned integer at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        read_compressed_uint_at(&self.data[..self.length], &mut self.position)
    }

    /// Read an ECMA-335 compressed signed integer at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        read_compressed_int_at(&self.data[..self.length], &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn growth_doubles_capacity() {
        let mut buffer = ByteBuffer::with_capacity(4);
        buffer.write_u32(0xDEAD_BEEF).unwrap();
        assert_eq!(buffer.capacity(), 4);

        buffer.write_u8(0x01).unwrap();
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.as_slice(), &[0xEF, 0xBE, 0xAD, 0xDE, 0x01]);
    }

    #[test]
    fn growth_covers_large_request() {
        let mut buffer = ByteBuffer::with_capacity(2);
        buffer.write_bytes(&[0xAA; 10]).unwrap();
        assert_eq!(buffer.capacity(), 12);
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn position_and_length_are_separate() {
        let mut buffer = ByteBuffer::new();
        buffer.write_u32(0x0403_0201).unwrap();

        buffer.set_position(1).unwrap();
        buffer.write_u8(0xFF).unwrap();
        assert_eq!(buffer.position(), 2);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.as_slice(), &[0x01, 0xFF, 0x03, 0x04]);

        assert!(buffer.set_position(5).is_err());
    }

    #[test]
    fn fixed_width_little_endian() {
        let mut buffer = ByteBuffer::new();
        buffer.write_le(-2_i16).unwrap();
        buffer.write_le(1.0_f32).unwrap();
        buffer.write_le(0x0102_0304_0506_0708_u64).unwrap();

        #[rustfmt::skip]
        let expected = [
            0xFE, 0xFF,
            0x00, 0x00, 0x80, 0x3F,
            0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
        ];
        assert_eq!(buffer.as_slice(), &expected);

        buffer.set_position(0).unwrap();
        assert_eq!(buffer.read_le::<i16>().unwrap(), -2);
        assert_eq!(buffer.read_le::<f32>().unwrap(), 1.0);
        assert_eq!(buffer.read_le::<u64>().unwrap(), 0x0102_0304_0506_0708);
        assert!(matches!(buffer.read_le::<u8>(), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn compressed_roundtrip() {
        let mut buffer = ByteBuffer::new();
        for value in [0, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            buffer.write_compressed_uint(value).unwrap();
        }
        for value in [-1, 0, 0x3F, 0x40, -0x40, 0x1FFF, 0x2000, -0x2000] {
            buffer.write_compressed_int(value).unwrap();
        }
        assert!(buffer.write_compressed_uint(0x2000_0000).is_err());

        buffer.set_position(0).unwrap();
        for value in [0, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            assert_eq!(buffer.read_compressed_uint().unwrap(), value);
        }
        for value in [-1, 0, 0x3F, 0x40, -0x40, 0x1FFF, 0x2000, -0x2000] {
            assert_eq!(buffer.read_compressed_int().unwrap(), value);
        }
    }

    #[test]
    fn align_pads_with_zeroes() {
        let mut buffer = ByteBuffer::new();
        buffer.write_u8(0x2A).unwrap();
        buffer.align(4).unwrap();
        assert_eq!(buffer.as_slice(), &[0x2A, 0, 0, 0]);
        buffer.align(4).unwrap();
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn write_index_widths() {
        let mut buffer = ByteBuffer::new();
        buffer.write_index(0x1234, false).unwrap();
        buffer.write_index(0x1234, true).unwrap();
        assert!(buffer.write_index(0x1_0000, false).is_err());
        assert_eq!(buffer.into_vec(), vec![0x34, 0x12, 0x34, 0x12, 0x00, 0x00]);
    }

    #[test]
    fn read_bytes_bounds() {
        let mut buffer = ByteBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(buffer.read_bytes(2).unwrap(), &[1, 2]);
        assert!(buffer.read_bytes(2).is_err());
        assert_eq!(buffer.position(), 2);
    }
}
