//! Byte-level access to metadata images.
//!
//! This module holds everything that touches raw bytes before they become metadata: the
//! [`crate::file::Backend`] abstraction over where image bytes live, the read-only
//! [`crate::file::parser::Parser`] cursor, the growable [`crate::file::buffer::ByteBuffer`] used on
//! the write path, and the little-endian / compressed integer primitives in [`crate::file::io`].
//!
//! # Key Components
//!
//! - [`crate::file::File`] - A loaded image, backed by memory or a memory-mapped file
//! - [`crate::file::Backend`] - Trait for data sources (memory-mapped files, owned buffers)
//! - [`crate::file::Memory`] - In-memory buffer backend
//! - [`crate::file::Physical`] - Memory-mapped file backend built on `memmap2`
//! - [`crate::file::parser::Parser`] - Bounds-checked read cursor
//! - [`crate::file::buffer::ByteBuffer`] - Growable read/write cursor buffer
//!
//! # Examples
//!
//! ```rust
//! use cilweave::file::{Backend, Memory};
//!
//! let memory = Memory::new(vec![0x42, 0x53, 0x4A, 0x42]);
//! assert_eq!(memory.data_slice(0, 4)?, b"BSJB");
//! # Ok::<(), cilweave::Error>(())
//! ```

pub mod buffer;
pub mod io;
pub mod parser;

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use std::path::Path;

use crate::{Error::Empty, Result};

/// A loaded metadata image.
///
/// `File` owns the bytes of an image, either read into memory or mapped from disk, and hands
/// out bounds-checked views of them. Heaps and tables borrow from a `File` and live exactly as
/// long as it does.
///
/// # Examples
///
/// ```rust
/// use cilweave::File;
///
/// let file = File::from_mem(vec![0x42, 0x53, 0x4A, 0x42])?;
/// assert_eq!(file.len(), 4);
/// assert!(file.data_slice(2, 4).is_err());
/// # Ok::<(), cilweave::Error>(())
/// ```
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-map the image at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be opened, or
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(path: &Path) -> Result<File> {
        Self::load(Physical::new(path)?)
    }

    /// Take ownership of an image already in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.is_empty() {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }
}

/// Backend trait for image data sources.
///
/// This trait abstracts over the source of image data, allowing both in-memory and on-disk
/// representations. All implementations must be thread-safe, the bytes they expose are
/// immutable for the lifetime of the backend.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the backend holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounds-checked sub-slice shared by the backend implementations.
pub(crate) fn checked_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let Some(offset_end) = offset.checked_add(len) else {
        return Err(out_of_bounds_error!());
    };

    if offset_end > data.len() {
        return Err(out_of_bounds_error!());
    }

    Ok(&data[offset..offset_end])
}
