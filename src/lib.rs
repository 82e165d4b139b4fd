// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0


#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # cilweave
//!
//! Read, edit and re-emit the parts of a .NET image that a rewriter touches: the ECMA-335
//! metadata root and its heaps, the `#~` table stream, and CIL method bodies.
//!
//! `cilweave` does not load whole assemblies or build a type system. It decodes a method body
//! into an editable instruction stream, lets you insert, replace and remove instructions without
//! tracking offsets by hand, and writes the body back with recomputed branch displacements,
//! exception clauses and header.
//!
//! ## Features
//!
//! - **Zero-copy heaps** - `#Strings`, `#US`, `#GUID` and `#Blob` read straight from the image
//! - **Heap builders** - Append-only writers for every heap, with deduplication
//! - **Table access** - Row and column lookups over the compressed `#~` stream
//! - **Editable bodies** - Instructions are addressed by stable handles, not offsets
//! - **Safe rewriting** - Exception handlers and scopes follow the instructions they name
//! - **Branch relaxation** - Short forms are widened and shortened as the code changes
//!
//! ## Quick Start
//!
//! ```rust
//! use cilweave::prelude::*;
//!
//! let mut body = MethodBody::new(Parameters::new(false, 0));
//! let mut editor = ILEditor::new(&mut body);
//!
//! let ret = editor.emit(OpCode::Ret, Operand::None)?;
//! editor.insert_before(ret, ILEditor::create(OpCode::LdcI4S, Operand::Int8(42))?)?;
//!
//! let mut emitter = HeapTokenEmitter::new();
//! let bytes = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;
//! assert_eq!(bytes, [0x0E, 0x1F, 0x2A, 0x2A]);
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Image backends, the read cursor, the write buffer and integer codecs
//! - [`metadata`] - Metadata root, heaps, tables, tokens and method bodies
//! - [`assembly`] - Opcodes, instructions, the body decoder and encoder, and the editor
//! - [`prelude`] - Re-exports of the commonly used types
//! - [`Error`] and [`Result`] - Error handling for all operations
//!
//! ### Reading a method body
//!
//! Operands that name metadata are resolved through a [`assembly::TokenResolver`]. The
//! [`assembly::MetadataResolver`] resolves against a loaded [`metadata::view::MetadataView`]:
//!
//! ```rust,no_run
//! use cilweave::prelude::*;
//!
//! let view = MetadataView::from_file("metadata.bin".as_ref())?;
//! let resolver = MetadataResolver::new(&view, ReaderOptions::default());
//!
//! let code = std::fs::read("body.bin")?;
//! let body = decode_method_body(&code, Parameters::new(true, 1), &resolver, &ReaderOptions::default())?;
//! for (_, instruction) in body.instructions().iter() {
//!     println!("IL_{:04X}: {}", instruction.offset(), instruction.mnemonic());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Malformed input never panics; it surfaces as
//! [`Error::Malformed`] or [`Error::OutOfBounds`] with the source location that detected it.

#[macro_use]
pub(crate) mod error;
#[cfg(test)]
pub(crate) mod test;

/// Opcodes, instructions and the method body codec.
///
/// Holds the instruction model, the decoder turning body bytes into an
/// [`assembly::InstructionStream`], the encoder writing it back, and the [`assembly::ILEditor`]
/// facade for rewriting code.
pub mod assembly;

/// Image backends and the low-level byte codecs.
pub mod file;

/// ECMA-335 metadata: root, heaps, tables, tokens and method bodies.
///
/// # Examples
///
/// ```rust
/// use cilweave::metadata::token::Token;
///
/// let token = Token::new(0x0600_0001);
/// assert_eq!(token.table(), 0x06);
/// assert_eq!(token.row(), 1);
/// ```
pub mod metadata;

/// Convenient re-exports of the most commonly used types.
pub mod prelude;

/// `cilweave` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilweave` Error type.
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Low-level access to a loaded image and its bytes.
pub use file::{parser::Parser, File};

/// Metadata heap readers and builders.
pub use metadata::streams::{
    Blob, BlobBuilder, Guid, GuidBuilder, Strings, StringsBuilder, UserStrings, UserStringsBuilder,
};
