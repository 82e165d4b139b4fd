//! The `#US` heap: UTF-16 string literals referenced by `ldstr`.
//!
//! Every entry is a compressed length followed by that many bytes: the UTF-16LE code units and a
//! trailing flag byte that is 1 if the string contains characters needing special handling. The
//! flag is the low bit of the odd length; it is masked off before the byte count is halved into a
//! code unit count.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.4 - `#US` and `#Blob` heaps

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use widestring::U16Str;

use crate::{file::buffer::ByteBuffer, file::io::read_compressed_uint_at, Result};

/// Read access to a `#US` heap.
pub struct UserStrings<'a> {
    data: &'a [u8],
    cache: DashMap<usize, Arc<str>>,
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// mandatory empty entry.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #US heap is empty"));
        }

        Ok(UserStrings {
            data,
            cache: DashMap::new(),
        })
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds nothing besides the empty entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// Get the string at `index`.
    ///
    /// Index 0, out-of-range indices and entries whose length runs past the heap yield the empty
    /// string. Unpaired surrogates are replaced with `U+FFFD`.
    #[must_use]
    pub fn get(&self, index: usize) -> Arc<str> {
        if index == 0 {
            return Arc::from("");
        }

        match self.get_checked(index) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(index, %error, "#US entry could not be decoded");
                Arc::from("")
            }
        }
    }

    /// Get the string at `index`, failing instead of degrading to the empty string.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry does not lie within the heap.
    pub fn get_checked(&self, index: usize) -> Result<Arc<str>> {
        if index == 0 {
            return Ok(Arc::from(""));
        }

        if let Some(cached) = self.cache.get(&index) {
            return Ok(cached.clone());
        }

        let units = self.code_units(index)?;
        let value: Arc<str> = Arc::from(U16Str::from_slice(&units).to_string_lossy());
        self.cache.insert(index, value.clone());
        Ok(value)
    }

    /// Decode the UTF-16 code units of the entry at `index`.
    fn code_units(&self, index: usize) -> Result<Vec<u16>> {
        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut offset = index;
        let length = read_compressed_uint_at(self.data, &mut offset)? as usize;
        let byte_count = length & !1;

        let Some(end) = offset.checked_add(byte_count) else {
            return Err(out_of_bounds_error!());
        };

        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(self.data[offset..end]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }
}

/// Append-only builder for a `#US` heap.
///
/// Identical strings are stored once. Unlike `#Strings`, the empty string gets its own entry,
/// since index 0 is never a valid `ldstr` operand.
#[derive(Debug)]
pub struct UserStringsBuilder {
    buffer: ByteBuffer,
    index: HashMap<String, u32>,
}

impl Default for UserStringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStringsBuilder {
    /// Create a builder holding only the mandatory empty entry.
    #[must_use]
    pub fn new() -> Self {
        let mut buffer = ByteBuffer::from_vec(vec![0]);
        buffer.seek_end();

        UserStringsBuilder {
            buffer,
            index: HashMap::new(),
        }
    }

    /// Add `value` and return its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows the 24-bit offsets a token can
    /// carry, or [`crate::Error::CompressedOutOfRange`] for strings longer than the length prefix
    /// can describe.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if let Some(existing) = self.index.get(value) {
            return Ok(*existing);
        }

        let offset = match u32::try_from(self.buffer.len()) {
            Ok(offset) if offset <= 0x00FF_FFFF => offset,
            _ => return Err(malformed_error!("#US heap exceeds the token offset range")),
        };

        let units: Vec<u16> = value.encode_utf16().collect();
        let Ok(byte_count) = u32::try_from(units.len() * 2 + 1) else {
            return Err(malformed_error!("#US entry is too long"));
        };

        self.buffer.write_compressed_uint(byte_count)?;
        for unit in &units {
            self.buffer.write_u16(*unit)?;
        }
        self.buffer.write_u8(u8::from(units.iter().any(|unit| needs_special_handling(*unit))))?;

        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Current heap size in bytes, without padding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.len() <= 1
    }

    /// Finish the heap, padded with zero bytes to a multiple of 4.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut data = self.buffer.into_vec();
        data.resize(data.len().next_multiple_of(4), 0);
        data
    }
}

/// The trailing-byte rule of ECMA-335 II.24.2.4.
fn needs_special_handling(unit: u16) -> bool {
    if unit > 0x00FF {
        return true;
    }

    matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
}
