//! Metadata streams: the four heaps and the `#~` table stream.
//!
//! Every heap comes as a borrowed reader and an owned, append-only builder. Readers offer a
//! lenient `get` that degrades malformed or out-of-range indices to the empty value, and a strict
//! `get_checked` that reports them instead.
//!
//! # Key Components
//!
//! - [`crate::metadata::streams::Strings`] / [`crate::metadata::streams::StringsBuilder`] - `#Strings`
//! - [`crate::metadata::streams::UserStrings`] / [`crate::metadata::streams::UserStringsBuilder`] - `#US`
//! - [`crate::metadata::streams::Blob`] / [`crate::metadata::streams::BlobBuilder`] - `#Blob`
//! - [`crate::metadata::streams::Guid`] / [`crate::metadata::streams::GuidBuilder`] - `#GUID`
//! - [`crate::metadata::streams::TablesHeader`] - `#~` / `#-`
//! - [`crate::metadata::streams::StreamHeader`] - Location and name of a stream

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::{Blob, BlobBuilder, BlobIterator};
pub use guid::{Guid, GuidBuilder};
pub use streamheader::{StreamHeader, STREAM_NAMES};
pub use strings::{Strings, StringsBuilder};
pub use tablesheader::{encode_row, encode_tables_header, TableSummary, TablesHeader};
pub use userstrings::{UserStrings, UserStringsBuilder};
