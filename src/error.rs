use thiserror::Error;

use crate::{assembly::InstructionId, metadata::token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure modes of the library: decoding malformed input, violating the
/// construction contract of an instruction, violating the sequence contract of an instruction
/// stream, and accessing state that a raw instruction does not have. All errors are synchronous
/// and leave the object they were raised on unchanged.
///
/// # Error Categories
///
/// ## Decoding Errors
/// - [`Error::Malformed`] - Corrupted or invalid binary structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the valid region of a buffer
/// - [`Error::CompressedOutOfRange`] - Value outside the compressed integer encoding range
/// - [`Error::NotSupported`] - Unsupported format or feature
/// - [`Error::Empty`] - Empty input provided
///
/// ## Instruction Errors
/// - [`Error::OperandMismatch`] - Operand does not match the opcode's declared operand shape
/// - [`Error::InvalidInstruction`] - A required part of an instruction is missing
/// - [`Error::InstructionNotFound`] - Instruction is not part of the targeted sequence
/// - [`Error::RawInstruction`] - Symbolic opcode access on a raw instruction
/// - [`Error::BranchOutOfRange`] - Short branch cannot reach its target
///
/// ## Resolution Errors
/// - [`Error::UnresolvedToken`] - Token could not be resolved or emitted
/// - [`Error::UnresolvedVariable`] - Variable operand is not part of the method body
/// - [`Error::UnresolvedParameter`] - Parameter operand is not part of the method body
///
/// # Examples
///
/// ```rust
/// use cilweave::{Error, assembly::{Instruction, OpCode, Operand}};
///
/// match Instruction::create(OpCode::LdcI4S, Operand::Int64(42)) {
///     Err(Error::OperandMismatch { opcode, operand }) => {
///         println!("{opcode} does not take a {operand} operand");
///     }
///     Err(e) => println!("Other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    ///
    /// Fixed-width and compressed reads are always bounds-checked, a truncated input surfaces as
    /// this error instead of reading past the valid region.
    #[error("Out of bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The value can not be represented with the ECMA-335 compressed integer encoding.
    #[error("Value can not be compressed - {0}")]
    CompressedOutOfRange(i64),

    /// This file type is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// The operand attached to an instruction does not match the opcode's operand shape.
    ///
    /// Raised by the validated instruction factories; no instruction is produced.
    #[error("Opcode '{opcode}' does not accept an operand of kind '{operand}'")]
    OperandMismatch {
        /// Mnemonic of the opcode
        opcode: &'static str,
        /// Kind of the rejected operand
        operand: &'static str,
    },

    /// A required part of an instruction was missing or invalid.
    #[error("Invalid instruction - {0}")]
    InvalidInstruction(String),

    /// The instruction is not part of the sequence it was used with.
    ///
    /// Raised by insert/replace/remove when the target is absent. The sequence is unchanged.
    #[error("Instruction {0} is not part of this sequence")]
    InstructionNotFound(InstructionId),

    /// The symbolic opcode of a raw instruction was read or written.
    #[error("Raw instructions do not carry a symbolic opcode")]
    RawInstruction,

    /// A short branch displacement does not fit into a signed byte.
    #[error("Branch at offset {offset:#06X} can not reach its target (delta {delta})")]
    BranchOutOfRange {
        /// Offset of the branch instruction
        offset: u32,
        /// Required displacement
        delta: i64,
    },

    /// A token could not be resolved into a metadata entity or emitted for one.
    #[error("Failed to resolve token - {0}")]
    UnresolvedToken(Token),

    /// A variable operand refers to a variable the method body does not own.
    #[error("Variable operand is not part of this method body")]
    UnresolvedVariable,

    /// A parameter operand refers to a parameter the method body does not own.
    #[error("Parameter operand is not part of this method body")]
    UnresolvedParameter,
}
