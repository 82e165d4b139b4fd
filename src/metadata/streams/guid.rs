//! The `#GUID` heap: a 1-based array of 16-byte GUIDs.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.5 - `#GUID` heap

use std::collections::HashMap;

use crate::Result;

/// Read access to a `#GUID` heap.
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Create a `Guid` view over the heap bytes.
    ///
    /// A partial trailing slot is kept but never read; it yields the zero GUID like any other
    /// missing slot.
    ///
    /// # Errors
    /// This constructor currently always succeeds.
    pub fn from(data: &'a [u8]) -> Result<Guid<'a>> {
        if data.len() % 16 != 0 {
            tracing::warn!(size = data.len(), "#GUID heap ends in a partial slot");
        }

        Ok(Guid { data })
    }

    /// Number of complete GUIDs in the heap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / 16
    }

    /// Returns `true` if the heap holds no complete GUID.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the GUID at the 1-based `index`; index 0 and missing or partial slots yield the zero
    /// GUID.
    #[must_use]
    pub fn get(&self, index: usize) -> uguid::Guid {
        self.get_checked(index).unwrap_or(uguid::Guid::ZERO)
    }

    /// Get the GUID at the 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 or a slot that does not lie completely
    /// within the heap.
    pub fn get_checked(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Err(out_of_bounds_error!());
        }

        let slot = (index - 1).checked_mul(16).and_then(|start| {
            let end = start.checked_add(16)?;
            self.data.get(start..end)
        });
        let Some(slot) = slot else {
            return Err(out_of_bounds_error!());
        };

        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(slot);
        Ok(uguid::Guid::from_bytes(buffer))
    }
}

/// Append-only builder for a `#GUID` heap.
///
/// Identical GUIDs are stored once; the zero GUID maps to index 0 and is never stored.
#[derive(Default)]
pub struct GuidBuilder {
    data: Vec<u8>,
    index: HashMap<uguid::Guid, u32>,
}

impl GuidBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` and return its 1-based heap index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap outgrows 32-bit indices.
    pub fn add(&mut self, value: uguid::Guid) -> Result<u32> {
        if value == uguid::Guid::ZERO {
            return Ok(0);
        }

        if let Some(existing) = self.index.get(&value) {
            return Ok(*existing);
        }

        let Ok(index) = u32::try_from(self.data.len() / 16 + 1) else {
            return Err(malformed_error!("#GUID heap exceeds 32-bit indices"));
        };

        self.data.extend_from_slice(&value.to_bytes());
        self.index.insert(value, index);
        Ok(index)
    }

    /// Number of GUIDs added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / 16
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Finish the heap.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
