//! The `#Strings` heap: NUL-terminated UTF-8 identifiers addressed by byte offset.
//!
//! Index 0 is always the empty string. Lookups return shared [`std::sync::Arc<str>`] values that
//! are cached per heap instance, so repeated lookups of the same index hand out the same
//! allocation. The cache is a [`dashmap::DashMap`], concurrent first reads from several threads
//! are safe.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::metadata::streams::{Strings, StringsBuilder};
//!
//! let mut builder = StringsBuilder::new();
//! let index = builder.add("Program")?;
//! let bytes = builder.into_bytes();
//!
//! let strings = Strings::from(&bytes)?;
//! assert_eq!(&*strings.get(index as usize), "Program");
//! assert_eq!(&*strings.get(0), "");
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.3 - `#Strings` heap

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;

use crate::{file::buffer::ByteBuffer, Result};

/// Read access to a `#Strings` heap.
pub struct Strings<'a> {
    data: &'a [u8],
    cache: DashMap<usize, Arc<str>>,
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// mandatory empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings {
            data,
            cache: DashMap::new(),
        })
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds nothing besides the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// Get the string at `index`.
    ///
    /// Index 0 and out-of-range indices yield the empty string. Invalid UTF-8 sequences are
    /// replaced with `U+FFFD`. A string running to the end of the heap without a terminator ends
    /// there.
    #[must_use]
    pub fn get(&self, index: usize) -> Arc<str> {
        if index == 0 {
            return Arc::from("");
        }

        if let Some(cached) = self.cache.get(&index) {
            return cached.clone();
        }

        if index >= self.data.len() {
            tracing::warn!(index, heap_size = self.data.len(), "#Strings index out of range");
            return Arc::from("");
        }

        let bytes = self.bytes_at(index);
        let value: Arc<str> = Arc::from(String::from_utf8_lossy(bytes));
        self.cache.insert(index, value.clone());
        value
    }

    /// Get the string at `index`, failing on anything `get` would paper over.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` lies outside of the heap, or
    /// [`crate::Error::Malformed`] if the string is not valid UTF-8.
    pub fn get_checked(&self, index: usize) -> Result<Arc<str>> {
        if index == 0 {
            return Ok(Arc::from(""));
        }

        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let Ok(value) = std::str::from_utf8(self.bytes_at(index)) else {
            return Err(malformed_error!("Invalid string at index - {}", index));
        };

        if let Some(cached) = self.cache.get(&index) {
            return Ok(cached.clone());
        }

        let value: Arc<str> = Arc::from(value);

        self.cache.insert(index, value.clone());
        Ok(value)
    }

    /// Number of materialized strings held by the cache.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn bytes_at(&self, index: usize) -> &'a [u8] {
        let tail = &self.data[index..];
        let end = tail.iter().position(|&byte| byte == 0).unwrap_or(tail.len());
        &tail[..end]
    }
}

/// Append-only builder for a `#Strings` heap.
///
/// Identical strings are stored once; `add` returns the index of the existing copy.
pub struct StringsBuilder {
    buffer: ByteBuffer,
    index: HashMap<String, u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsBuilder {
    /// Create a builder holding only the mandatory empty string.
    #[must_use]
    pub fn new() -> Self {
        let mut buffer = ByteBuffer::from_vec(vec![0]);
        buffer.seek_end();

        StringsBuilder {
            buffer,
            index: HashMap::new(),
        }
    }

    /// Add `value` and return its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` contains a NUL character or the heap
    /// outgrows 32-bit indices.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(existing) = self.index.get(value) {
            return Ok(*existing);
        }

        if value.contains('\0') {
            return Err(malformed_error!("#Strings entries can not contain NUL - {}", value));
        }

        let Ok(offset) = u32::try_from(self.buffer.len()) else {
            return Err(malformed_error!("#Strings heap exceeds 4GB"));
        };

        self.buffer.write_bytes(value.as_bytes())?;
        self.buffer.write_u8(0)?;
        self.index.insert(value.to_string(), offset);
        Ok(offset)
    }

    /// Current heap size in bytes, without padding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing besides the empty string was added.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const HEAP: [u8; 47] = [
        0x00,
        0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
        0x43, 0x5f, 0x53, 0x68, 0x61, 0x72, 0x70, 0x5f, 0x50, 0x4f, 0x43, 0x5f, 0x31, 0x00,
        0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
        0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x2e, 0x43, 0x6f, 0x6e, 0x73, 0x6f, 0x6c, 0x65, 0x00,
    ];

    #[test]
    fn crafted() {
        let strings = Strings::from(&HEAP).unwrap();

        assert_eq!(&*strings.get(1), "<Main>$");
        assert_eq!(&*strings.get(9), "C_Sharp_POC_1");
        assert_eq!(&*strings.get(23), "<Module>");
        assert_eq!(&*strings.get(32), "System.Console");
        // Suffix of "<Module>"
        assert_eq!(&*strings.get(24), "Module>");
    }

    #[test]
    fn index_zero_and_out_of_range() {
        let strings = Strings::from(&HEAP).unwrap();

        assert_eq!(&*strings.get(0), "");
        assert_eq!(&*strings.get(HEAP.len()), "");
        assert_eq!(&*strings.get(usize::MAX), "");
        assert_eq!(strings.cached(), 0);

        assert!(strings.get_checked(HEAP.len()).is_err());
        assert_eq!(&*strings.get_checked(0).unwrap(), "");
    }

    #[test]
    fn cached_lookup() {
        let strings = Strings::from(&HEAP).unwrap();

        let first = strings.get(23);
        let second = strings.get(23);
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(strings.cached(), 1);
    }

    #[test]
    fn unterminated_and_invalid() {
        let data = [0x00, 0x41, 0x42, 0x00, 0xFF, 0x43];
        let strings = Strings::from(&data).unwrap();

        assert_eq!(&*strings.get(4), "\u{FFFD}C");
        assert!(strings.get_checked(4).is_err());
        assert_eq!(&*strings.get(5), "C");
    }

    #[test]
    fn invalid_heap() {
        assert!(Strings::from(&[]).is_err());
        assert!(Strings::from(&[0x41, 0x00]).is_err());
    }

    #[test]
    fn builder_dedup() {
        let mut builder = StringsBuilder::new();
        assert_eq!(builder.add("").unwrap(), 0);

        let program = builder.add("Program").unwrap();
        let main = builder.add("Main").unwrap();
        assert_eq!(program, 1);
        assert_eq!(main, 9);
        assert_eq!(builder.add("Program").unwrap(), program);
        assert!(builder.add("a\0b").is_err());

        let bytes = builder.into_bytes();
        assert_eq!(bytes.len() % 4, 0);

        let strings = Strings::from(&bytes).unwrap();
        assert_eq!(&*strings.get(program as usize), "Program");
        assert_eq!(&*strings.get(main as usize), "Main");
    }
}
