//! The `#Blob` heap: length-prefixed binary data such as signatures and constant values.
//!
//! Each entry is a compressed unsigned length followed by that many raw bytes. Lookups borrow
//! straight from the heap and are not cached; every call decodes the length prefix again.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::metadata::streams::Blob;
//!
//! let data = [0x00, 0x02, 0x41, 0x42, 0x01, 0x43];
//! let blob = Blob::from(&data)?;
//!
//! assert_eq!(blob.get(1), &[0x41, 0x42]);
//! assert!(blob.get(0).is_empty());
//!
//! for entry in &blob {
//!     let (offset, bytes) = entry?;
//!     println!("blob at {offset}: {} bytes", bytes.len());
//! }
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.4 - `#US` and `#Blob` heaps

use std::collections::HashMap;

use crate::{file::buffer::ByteBuffer, file::parser::Parser, Result};

/// Read access to a `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Create a `Blob` view over the heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is empty or does not start with the
    /// mandatory empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// Size of the heap in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the heap holds nothing besides the empty blob.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// Get the blob at `index`.
    ///
    /// Index 0, indices at or past the final byte of the heap, and entries whose length runs past
    /// the heap yield the empty blob.
    #[must_use]
    pub fn get(&self, index: usize) -> &'a [u8] {
        if index == 0 || index >= self.data.len().saturating_sub(1) {
            return &[];
        }

        match self.get_checked(index) {
            Ok(data) => data,
            Err(error) => {
                tracing::warn!(index, %error, "#Blob entry could not be decoded");
                &[]
            }
        }
    }

    /// Get the blob at `index`, failing instead of degrading to the empty blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry does not lie within the heap.
    pub fn get_checked(&self, index: usize) -> Result<&'a [u8]> {
        if index == 0 {
            return Ok(&[]);
        }

        if index >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let data: &'a [u8] = self.data;
        let mut parser = Parser::new(&data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }

    /// Iterate over all entries as `(offset, bytes)` pairs.
    #[must_use]
    pub fn iter(&self) -> BlobIterator<'_> {
        BlobIterator::new(self)
    }
}

impl<'a> IntoIterator for &'a Blob<'a> {
    type Item = Result<(usize, &'a [u8])>;
    type IntoIter = BlobIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a `#Blob` heap.
///
/// Stops after the first entry that fails to decode.
pub struct BlobIterator<'a> {
    blob: &'a Blob<'a>,
    position: usize,
    failed: bool,
}

impl<'a> BlobIterator<'a> {
    pub(crate) fn new(blob: &'a Blob<'a>) -> Self {
        Self {
            blob,
            // Skip the mandatory empty blob at offset 0
            position: 1,
            failed: false,
        }
    }
}

impl<'a> Iterator for BlobIterator<'a> {
    type Item = Result<(usize, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.blob.data.len() {
            return None;
        }

        let start_position = self.position;
        let mut parser = Parser::new(&self.blob.data[start_position..]);
        let entry = parser
            .read_compressed_uint()
            .and_then(|len| parser.read_bytes(len as usize));

        match entry {
            Ok(bytes) => {
                self.position += parser.pos();
                Some(Ok((start_position, bytes)))
            }
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

/// Append-only builder for a `#Blob` heap.
///
/// Identical blobs are stored once; the empty blob is always index 0.
pub struct BlobBuilder {
    buffer: ByteBuffer,
    index: HashMap<Vec<u8>, u32>,
}

impl Default for BlobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobBuilder {
    /// Create a builder holding only the mandatory empty blob.
    #[must_use]
    pub fn new() -> Self {
        let mut buffer = ByteBuffer::from_vec(vec![0]);
        buffer.seek_end();

        BlobBuilder {
            buffer,
            index: HashMap::new(),
        }
    }

    /// Add `value` and return its heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::CompressedOutOfRange`] if `value` is longer than a compressed
    /// length can describe, or [`crate::Error::Malformed`] if the heap outgrows 32-bit indices.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(existing) = self.index.get(value) {
            return Ok(*existing);
        }

        let Ok(offset) = u32::try_from(self.buffer.len()) else {
            return Err(malformed_error!("#Blob heap exceeds 4GB"));
        };

        let Ok(len) = u32::try_from(value.len()) else {
            return Err(malformed_error!("#Blob entry is too long"));
        };

        self.buffer.write_compressed_uint(len)?;
        self.buffer.write_bytes(value)?;
        self.index.insert(value.to_vec(), offset);
        Ok(offset)
    }

    /// Current heap size in bytes, without padding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing besides the empty blob was added.
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
