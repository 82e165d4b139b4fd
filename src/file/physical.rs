//! Memory-mapped file backend.
//!
//! [`crate::file::Physical`] maps a metadata image into the address space with `memmap2`, so
//! heaps and tables can be borrowed straight from the mapping without copying the file.

use super::{checked_slice, Backend};
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A backend that uses memory-mapped I/O to access an image on disk.
///
/// The mapping is read-only. All access operations are bounds-checked.
///
/// # Examples
///
/// ```rust,no_run
/// use cilweave::file::{Backend, Physical};
/// use std::path::Path;
///
/// let physical = Physical::new(Path::new("metadata.bin"))?;
/// let signature = physical.data_slice(0, 4)?;
/// assert_eq!(signature, b"BSJB");
/// # Ok::<(), cilweave::Error>(())
/// ```
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical backend by memory-mapping the specified file.
    ///
    /// # Arguments
    /// * `path` - Path to the image on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // The mapping is read-only; concurrent truncation of the file by another process is
        // outside of what this backend guards against.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        checked_slice(&self.data, offset, len)
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
