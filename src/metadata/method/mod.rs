//! Method bodies: headers, instructions, exception handlers, locals, arguments and scopes.
//!
//! # Key Components
//!
//! - [`crate::metadata::method::MethodBody`] - An editable method body
//! - [`crate::metadata::method::MethodHeader`] - Tiny and fat headers
//! - [`crate::metadata::method::ExceptionHandler`] - Handlers bounded by instruction handles
//! - [`crate::metadata::method::Variables`] / [`crate::metadata::method::Parameters`] - Local and
//!   argument slots with stable handles
//! - [`crate::metadata::method::Scope`] - Lexical scope tree
//! - [`crate::metadata::method::SequencePoint`] - Source locations of instructions
//!
//! # Reference
//! * ECMA-335 Partition II, Section 25.4 - Common Intermediate Language physical layout

mod body;
mod exceptions;
mod header;
mod parameters;
mod scope;
mod sequencepoints;
mod variables;

pub use body::MethodBody;
pub use exceptions::{
    read_exception_sections, write_exception_section, ExceptionClause, ExceptionHandler,
    ExceptionHandlerFlags,
};
pub use header::{
    MethodBodyFlags, MethodHeader, SectionFlags, FAT_HEADER_SIZE, TINY_MAX_CODE_SIZE,
    TINY_MAX_STACK,
};
pub use parameters::{Parameter, ParameterId, Parameters};
pub use scope::Scope;
pub use sequencepoints::{SequencePoint, HIDDEN_LINE};
pub use variables::{Variable, VariableId, Variables, LOCAL_SIG};
