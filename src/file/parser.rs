//! Bounds-checked read cursor for metadata and CIL decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor over a borrowed byte
//! slice. Every read validates the remaining length first, so truncated or hostile input surfaces
//! as [`crate::Error::OutOfBounds`] instead of reading past the slice.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser::seek`] / [`crate::file::parser::Parser::advance_by`] - Navigation
//! - [`crate::file::parser::Parser::read_le`] / [`crate::file::parser::Parser::read_be`] - Primitives
//! - [`crate::file::parser::Parser::read_compressed_uint`] - ECMA-335 compressed unsigned integers
//! - [`crate::file::parser::Parser::read_compressed_int`] - ECMA-335 compressed signed integers
//! - [`crate::file::parser::Parser::read_compressed_token`] - `TypeDefOrRefOrSpec` encoded tokens
//! - [`crate::file::parser::Parser::transactional`] - Rewind on failure
//!
//! # Examples
//!
//! ```rust
//! use cilweave::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
//! let mut parser = Parser::new(&data);
//!
//! let first = parser.read_le::<u32>()?;
//! assert_eq!(first, 0x04030201);
//!
//! parser.seek(6)?;
//! assert_eq!(parser.read_le::<u16>()?, 0x0807);
//! # Ok::<(), cilweave::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, read_compressed_int_at, read_compressed_uint_at, read_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// A cursor-based reader over a borrowed byte slice.
///
/// The parser maintains an internal position and never reads past the end of its slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying slice is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The full underlying slice.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the byte under the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Peek at a little-endian value without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn peek_le<T: CilIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_le_at::<T>(self.data, &mut temp_position)
    }

    /// Run `f` and restore the cursor position if it fails.
    ///
    /// # Errors
    /// Returns whatever error `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Advance the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if alignment == 0 {
            return Ok(());
        }

        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian value and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a big-endian value and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_be<T: CilIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        read_compressed_uint_at(self.data, &mut self.position)
    }

    /// Read a compressed signed integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        read_compressed_int_at(self.data, &mut self.position)
    }

    /// Read a compressed `TypeDefOrRefOrSpec` token as used inside signatures.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag value 3, or
    /// [`crate::Error::OutOfBounds`] if the encoding is truncated.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;

        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000, // TypeDef
            0x1 => 0x0100_0000, // TypeRef
            0x2 => 0x1B00_0000, // TypeSpec
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        Ok(Token::new(table | (compressed_token >> 2)))
    }

    /// Read a NUL-terminated UTF-8 string and advance past the terminator.
    ///
    /// A string running to the end of the data without a terminator is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|&byte| byte == 0)
            .map_or(self.data.len(), |len| start + len);

        self.position = if end < self.data.len() { end + 1 } else { end };

        String::from_utf8(self.data[start..end].to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                end,
                e.utf8_error()
            )
        })
    }
}
