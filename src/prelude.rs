//! # cilweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the cilweave library. Import it to get quick access to everything needed for decoding,
//! editing and re-encoding method bodies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilweave operations
pub use crate::Error;

/// The result type used throughout cilweave
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

/// Write-side byte buffer
pub use crate::file::buffer::ByteBuffer;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Metadata root and loaded images
pub use crate::metadata::{
    root::{Root, CIL_HEADER_MAGIC},
    view::MetadataView,
};

/// Heap readers and builders
pub use crate::metadata::streams::{
    Blob, BlobBuilder, Guid, GuidBuilder, StreamHeader, Strings, StringsBuilder, TablesHeader,
    UserStrings, UserStringsBuilder,
};

/// Table identifiers and coded indices
pub use crate::metadata::tables::{CodedIndex, CodedIndexType, TableId, TableInfo};

// ================================================================================================
// Method Bodies
// ================================================================================================

/// Method body model
pub use crate::metadata::method::{
    ExceptionHandler, ExceptionHandlerFlags, MethodBody, Parameter, ParameterId, Parameters, Scope,
    SequencePoint, Variable, VariableId, Variables,
};

// ================================================================================================
// Instructions and Codec
// ================================================================================================

/// Instruction model
pub use crate::assembly::{
    EntityRef, FlowControl, Instruction, InstructionId, InstructionKind, InstructionStream, OpCode,
    Operand, OperandShape,
};

/// Decoding, encoding and editing
pub use crate::assembly::{
    decode_instructions, decode_method_body, encode_instructions, encode_method_body, ILEditor,
    ReaderOptions, WriterOptions,
};

/// Token resolution seams
pub use crate::assembly::{HeapTokenEmitter, MetadataResolver, TokenEmitter, TokenResolver};
