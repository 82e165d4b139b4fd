//! ECMA-335 metadata for rewriting.
//!
//! This module holds the metadata side of an image: the `BSJB` root and its stream directory,
//! the heaps, the `#~` table stream, tokens, and the editable method body model the
//! [`crate::assembly`] codec reads into and writes from.
//!
//! # Key Components
//!
//! - [`view`] - A loaded metadata blob with its heaps and tables
//! - [`root`] - The metadata root and stream headers
//! - [`streams`] - Heap readers and builders, and the `#~` stream
//! - [`tables`] - Table ids, column schemas and coded indices
//! - [`token`] - Metadata table row references
//! - [`method`] - Method bodies, exception handlers, locals, arguments and scopes
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilweave::metadata::{tables::TableId, view::MetadataView};
//!
//! let view = MetadataView::from_file("metadata.bin".as_ref())?;
//! println!("version: {}", view.metadata_root().version);
//! if let Some(tables) = view.tables() {
//!     println!("methods: {}", tables.row_count(TableId::MethodDef));
//! }
//! # Ok::<(), cilweave::Error>(())
//! ```

/// Method bodies and the structures that refer into their code
pub mod method;
/// The metadata root header
pub mod root;
/// Heaps and the table stream
pub mod streams;
/// Table identifiers and layout
pub mod tables;
/// Metadata tokens
pub mod token;
/// A loaded metadata image
pub mod view;
