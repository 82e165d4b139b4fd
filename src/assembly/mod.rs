//! CIL instructions: opcodes, instruction streams, editing, decoding and encoding.
//!
//! # Key Components
//!
//! - [`crate::assembly::OpCode`] - The ECMA-335 opcode table with operand shapes
//! - [`crate::assembly::Instruction`] / [`crate::assembly::Operand`] - Validated instructions
//! - [`crate::assembly::InstructionStream`] - The ordered, linked instruction sequence of a body
//! - [`crate::assembly::ILEditor`] - Validated editing of a [`crate::metadata::method::MethodBody`]
//! - [`crate::assembly::decode_method_body`] / [`crate::assembly::encode_method_body`] - Bytes to
//!   bodies and back
//! - [`crate::assembly::TokenResolver`] / [`crate::assembly::TokenEmitter`] - The metadata
//!   boundary of the read and write paths
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{encode_method_body, HeapTokenEmitter, ILEditor, OpCode, Operand, WriterOptions};
//! use cilweave::metadata::method::{MethodBody, Parameters};
//!
//! let mut body = MethodBody::new(Parameters::new(false, 2));
//! let mut editor = ILEditor::new(&mut body);
//! let first = editor.parameter(0)?;
//! let second = editor.parameter(1)?;
//! editor.emit(OpCode::LdargS, Operand::Parameter(first))?;
//! editor.emit(OpCode::LdargS, Operand::Parameter(second))?;
//! editor.emit(OpCode::Add, Operand::None)?;
//! editor.emit(OpCode::Ret, Operand::None)?;
//!
//! let mut emitter = HeapTokenEmitter::new();
//! let bytes = encode_method_body(&mut body, &mut emitter, &WriterOptions::default())?;
//! assert_eq!(bytes, [0x1A, 0x0E, 0x00, 0x0E, 0x01, 0x58, 0x2A]);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::fmt;

mod decoder;
mod editor;
mod encoder;
mod instruction;
mod opcodes;
mod options;
mod resolver;
mod stream;

pub use decoder::{decode_instructions, decode_method_body};
pub use editor::ILEditor;
pub use encoder::{encode_instructions, encode_method_body};
pub use instruction::{EntityRef, Instruction, InstructionKind, Operand};
pub use opcodes::{FlowControl, OpCode, OperandShape, FE_PREFIX};
pub use options::{ReaderOptions, WriterOptions};
pub use resolver::{HeapTokenEmitter, MetadataResolver, TokenEmitter, TokenResolver};
pub use stream::InstructionStream;

/// Stable handle of an instruction inside an [`InstructionStream`].
///
/// A handle stays valid until its instruction is removed. Slots are recycled, but a recycled slot
/// carries a new generation, so an old handle never names the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId {
    /// Identity of the owning stream
    pub stream: u32,
    /// Arena slot within the stream
    pub index: u32,
    /// Occupancy count of the slot when the handle was issued
    pub generation: u32,
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}:{}", self.stream, self.index, self.generation)
    }
}
