//! A loaded metadata image with its heaps and tables.
//!
//! [`MetadataView`] owns the backing [`crate::File`] and the stream readers borrowed from it in a
//! single self-referencing value, so heaps can never outlive the bytes they decode. The image is
//! a raw metadata blob starting with the `BSJB` root; locating that blob inside a PE file is left
//! to the caller.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilweave::metadata::view::MetadataView;
//! use std::path::Path;
//!
//! let view = MetadataView::from_file(Path::new("metadata.bin"))?;
//! if let Some(strings) = view.strings() {
//!     println!("module name: {}", strings.get(1));
//! }
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::{path::Path, sync::Arc};

use ouroboros::self_referencing;

use crate::{
    file::File,
    metadata::{
        root::Root,
        streams::{Blob, Guid, StreamHeader, Strings, TablesHeader, UserStrings},
    },
    Result,
};

/// Readers borrowed from the bytes of a [`MetadataView`].
pub struct MetadataViewData<'a> {
    /// The complete image
    pub data: &'a [u8],
    /// The metadata root
    pub metadata_root: Root,
    /// The `#~` or `#-` stream
    pub metadata_tables: Option<TablesHeader<'a>>,
    /// The `#Strings` heap
    pub strings: Option<Strings<'a>>,
    /// The `#US` heap
    pub userstrings: Option<UserStrings<'a>>,
    /// The `#GUID` heap
    pub guids: Option<Guid<'a>>,
    /// The `#Blob` heap
    pub blobs: Option<Blob<'a>>,
}

impl<'a> MetadataViewData<'a> {
    /// Parse the root and every known stream of `data`.
    ///
    /// # Errors
    /// Returns an error if the root or any of the streams is malformed.
    pub fn from_data(data: &'a [u8]) -> Result<Self> {
        let metadata_root = Root::read(data)?;

        let mut metadata_tables = None;
        let mut strings = None;
        let mut userstrings = None;
        let mut guids = None;
        let mut blobs = None;

        for stream in &metadata_root.stream_headers {
            let stream_data =
                crate::file::checked_slice(data, stream.offset as usize, stream.size as usize)?;

            match stream.name.as_str() {
                "#~" | "#-" => metadata_tables = Some(TablesHeader::from(stream_data)?),
                "#Strings" => strings = Some(Strings::from(stream_data)?),
                "#US" => userstrings = Some(UserStrings::from(stream_data)?),
                "#GUID" => guids = Some(Guid::from(stream_data)?),
                "#Blob" => blobs = Some(Blob::from(stream_data)?),
                _ => {}
            }
        }

        tracing::debug!(
            version = %metadata_root.version,
            streams = metadata_root.stream_headers.len(),
            tables = metadata_tables.as_ref().map_or(0, TablesHeader::table_count),
            "opened metadata view"
        );

        Ok(MetadataViewData {
            data,
            metadata_root,
            metadata_tables,
            strings,
            userstrings,
            guids,
            blobs,
        })
    }
}

/// An owned metadata image together with its parsed streams.
#[self_referencing]
pub struct MetadataView {
    file: Arc<File>,

    #[borrows(file)]
    #[not_covariant]
    data: MetadataViewData<'this>,
}

impl MetadataView {
    /// Memory-map and parse the metadata image at `path`.
    ///
    /// # Errors
    /// Returns an error if the file can not be read or the metadata is malformed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let input = Arc::new(File::from_file(path)?);
        Self::load(input)
    }

    /// Parse a metadata image held in memory.
    ///
    /// # Errors
    /// Returns an error if `data` is empty or the metadata is malformed.
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        let input = Arc::new(File::from_mem(data)?);
        Self::load(input)
    }

    fn load(file: Arc<File>) -> Result<Self> {
        MetadataView::try_new(file, |file| MetadataViewData::from_data(file.data()))
    }

    /// The metadata root.
    #[must_use]
    pub fn metadata_root(&self) -> &Root {
        self.with_data(|data| &data.metadata_root)
    }

    /// The table stream, if present.
    #[must_use]
    pub fn tables(&self) -> Option<&TablesHeader> {
        self.with_data(|data| data.metadata_tables.as_ref())
    }

    /// The `#Strings` heap, if present.
    #[must_use]
    pub fn strings(&self) -> Option<&Strings> {
        self.with_data(|data| data.strings.as_ref())
    }

    /// The `#US` heap, if present.
    #[must_use]
    pub fn userstrings(&self) -> Option<&UserStrings> {
        self.with_data(|data| data.userstrings.as_ref())
    }

    /// The `#GUID` heap, if present.
    #[must_use]
    pub fn guids(&self) -> Option<&Guid> {
        self.with_data(|data| data.guids.as_ref())
    }

    /// The `#Blob` heap, if present.
    #[must_use]
    pub fn blobs(&self) -> Option<&Blob> {
        self.with_data(|data| data.blobs.as_ref())
    }

    /// Stream headers in directory order.
    #[must_use]
    pub fn streams(&self) -> &[StreamHeader] {
        self.with_data(|data| &data.metadata_root.stream_headers)
    }

    /// The backing image.
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        self.borrow_file()
    }

    /// All bytes of the image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data)
    }
}
