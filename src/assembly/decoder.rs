//! Decoding of CIL bytes into an editable [`MethodBody`].
//!
//! Decoding runs in two passes. The first pass walks the code with a [`Parser`], turning every
//! opcode into an [`Instruction`] and resolving token operands through a [`TokenResolver`];
//! branch operands are recorded as byte offsets. Once every instruction has a handle, the second
//! pass rewrites the branch operands into handles of their target instructions.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{decode_method_body, EntityRef, ReaderOptions, TokenResolver};
//! use cilweave::metadata::{method::Parameters, token::Token};
//! use std::sync::Arc;
//!
//! struct Anonymous;
//!
//! impl TokenResolver for Anonymous {
//!     fn resolve_type(&self, token: Token) -> cilweave::Result<EntityRef> { Ok(EntityRef::new(token)) }
//!     fn resolve_method(&self, token: Token) -> cilweave::Result<EntityRef> { Ok(EntityRef::new(token)) }
//!     fn resolve_field(&self, token: Token) -> cilweave::Result<EntityRef> { Ok(EntityRef::new(token)) }
//!     fn resolve_signature(&self, token: Token) -> cilweave::Result<EntityRef> { Ok(EntityRef::new(token)) }
//!     fn resolve_string(&self, _: Token) -> cilweave::Result<Arc<str>> { Ok(Arc::from("")) }
//! }
//!
//! // Tiny header, ldc.i4.1; brtrue.s +1; nop; ret
//! let data = [0x16, 0x17, 0x2D, 0x01, 0x00, 0x2A];
//! let body = decode_method_body(&data, Parameters::new(false, 0), &Anonymous, &ReaderOptions::default())?;
//!
//! assert_eq!(body.len(), 4);
//! assert_eq!(body.code_size(), 5);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        Instruction, InstructionId, OpCode, Operand, OperandShape, ReaderOptions, TokenResolver,
        FE_PREFIX,
    },
    file::parser::Parser,
    metadata::{
        method::{
            read_exception_sections, ExceptionClause, ExceptionHandler, ExceptionHandlerFlags,
            MethodBody, MethodHeader, Parameters,
        },
        token::Token,
    },
    Error, Result,
};

/// Stand-in target of branch operands until the second pass.
const PENDING: InstructionId = InstructionId {
    stream: 0,
    index: 0,
    generation: 0,
};

/// Branch operands recorded by the first pass, as absolute byte offsets.
enum Pending {
    Branch(i64),
    Switch(Vec<i64>),
}

/// Decode `code` and append its instructions to `body`.
///
/// Variable and argument operands are resolved against `body.variables` and `body.parameters`,
/// which must be populated first. Offsets are assigned by a layout pass at the end.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes (unless
/// [`ReaderOptions::raw_unknown_opcodes`] is set), branches into the middle of an instruction or
/// out of the code, and variable or argument indices out of range;
/// [`crate::Error::OutOfBounds`] for truncated instructions; or any error of `resolver`.
pub fn decode_instructions(
    code: &[u8],
    body: &mut MethodBody,
    resolver: &dyn TokenResolver,
    options: &ReaderOptions,
) -> Result<()> {
    let mut parser = Parser::new(code);
    let mut decoded = Vec::new();

    while parser.has_more_data() {
        let offset = parser.pos();
        let (instruction, pending) = decode_one(&mut parser, body, resolver, options)?;
        decoded.push((offset, instruction, pending));
    }

    let mut by_offset = HashMap::with_capacity(decoded.len());
    let mut fixups = Vec::new();
    for (offset, instruction, pending) in decoded {
        let id = body.push(instruction)?;
        by_offset.insert(offset as i64, id);
        if let Some(pending) = pending {
            fixups.push((id, offset, pending));
        }
    }

    for (id, offset, pending) in fixups {
        let target = |position: i64| {
            by_offset.get(&position).copied().ok_or_else(|| {
                malformed_error!(
                    "Branch at offset {:#x} targets {:#x}, which does not start an instruction",
                    offset,
                    position
                )
            })
        };

        let operand = match pending {
            Pending::Branch(position) => Operand::Branch(target(position)?),
            Pending::Switch(positions) => Operand::Switch(
                positions
                    .into_iter()
                    .map(target)
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        let Some(instruction) = body.instruction_mut(id) else {
            return Err(Error::InstructionNotFound(id));
        };
        instruction.set_operand(operand)?;
    }

    body.layout()?;
    Ok(())
}

/// Decode a complete method body: header, instructions and exception sections.
///
/// Local variables are read through [`TokenResolver::resolve_locals`]. Exception clauses become
/// [`ExceptionHandler`]s bounded by instruction handles; a clause that does not start and end on
/// instruction boundaries is rejected.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for an invalid header, code or clause, or
/// [`crate::Error::OutOfBounds`] if `data` is truncated.
pub fn decode_method_body(
    data: &[u8],
    parameters: Parameters,
    resolver: &dyn TokenResolver,
    options: &ReaderOptions,
) -> Result<MethodBody> {
    let header = MethodHeader::read(data)?;
    let code_start = header.header_size as usize;
    let code = crate::file::checked_slice(data, code_start, header.code_size as usize)?;

    let mut body = MethodBody::new(parameters);
    body.max_stack = header.max_stack;
    body.init_locals = header.init_locals();
    body.local_var_sig_token = header.local_var_sig_token;
    if !header.local_var_sig_token.is_null() {
        body.variables = resolver.resolve_locals(header.local_var_sig_token)?;
    }

    decode_instructions(code, &mut body, resolver, options)?;

    if header.has_more_sections() {
        let sections = (code_start + code.len() + 3) & !3;
        for clause in read_exception_sections(data, sections)? {
            let handler = handler_from_clause(&body, &clause, resolver)?;
            body.exception_handlers.push(handler);
        }
    }

    tracing::debug!(
        fat = header.is_fat,
        code_size = body.code_size(),
        instructions = body.len(),
        locals = body.variables.len(),
        handlers = body.exception_handlers.len(),
        "decoded method body"
    );

    Ok(body)
}

fn decode_one(
    parser: &mut Parser,
    body: &MethodBody,
    resolver: &dyn TokenResolver,
    options: &ReaderOptions,
) -> Result<(Instruction, Option<Pending>)> {
    let offset = parser.pos();
    let first = parser.read_le::<u8>()?;
    let opcode = if first == FE_PREFIX {
        let second = parser.read_le::<u8>()?;
        OpCode::from_extended(second).ok_or_else(|| vec![FE_PREFIX, second])
    } else {
        OpCode::from_byte(first).ok_or_else(|| vec![first])
    };

    let opcode = match opcode {
        Ok(opcode) => opcode,
        Err(bytes) if options.raw_unknown_opcodes => {
            tracing::warn!(offset, ?bytes, "unknown opcode, keeping raw bytes");
            return Ok((Instruction::raw(bytes, Operand::None)?, None));
        }
        Err(bytes) => {
            return Err(malformed_error!(
                "Invalid opcode {:02X?} at offset {:#x}",
                bytes,
                offset
            ))
        }
    };

    let mut pending = None;
    let operand = match opcode.operand_shape() {
        OperandShape::InlineNone => Operand::None,
        OperandShape::ShortInlineI if opcode == OpCode::LdcI4S => {
            Operand::Int8(parser.read_le::<i8>()?)
        }
        OperandShape::ShortInlineI => Operand::UInt8(parser.read_le::<u8>()?),
        OperandShape::InlineI => Operand::Int32(parser.read_le::<i32>()?),
        OperandShape::InlineI8 => Operand::Int64(parser.read_le::<i64>()?),
        OperandShape::ShortInlineR => Operand::Float32(parser.read_le::<f32>()?),
        OperandShape::InlineR => Operand::Float64(parser.read_le::<f64>()?),
        OperandShape::ShortInlineBrTarget => {
            let delta = i64::from(parser.read_le::<i8>()?);
            pending = Some(Pending::Branch(parser.pos() as i64 + delta));
            Operand::Branch(PENDING)
        }
        OperandShape::InlineBrTarget => {
            let delta = i64::from(parser.read_le::<i32>()?);
            pending = Some(Pending::Branch(parser.pos() as i64 + delta));
            Operand::Branch(PENDING)
        }
        OperandShape::InlineSwitch => {
            let count = parser.read_le::<u32>()? as usize;
            let remaining = parser.len() - parser.pos();
            if count > remaining / 4 {
                return Err(malformed_error!(
                    "Switch at offset {:#x} declares {} targets",
                    offset,
                    count
                ));
            }

            let mut deltas = Vec::with_capacity(count);
            for _ in 0..count {
                deltas.push(i64::from(parser.read_le::<i32>()?));
            }
            let end = parser.pos() as i64;
            pending = Some(Pending::Switch(
                deltas.into_iter().map(|delta| end + delta).collect(),
            ));
            Operand::Switch(vec![PENDING; count])
        }
        OperandShape::ShortInlineVar => variable(body, u16::from(parser.read_le::<u8>()?))?,
        OperandShape::InlineVar => variable(body, parser.read_le::<u16>()?)?,
        OperandShape::ShortInlineArg => parameter(body, u16::from(parser.read_le::<u8>()?))?,
        OperandShape::InlineArg => parameter(body, parser.read_le::<u16>()?)?,
        OperandShape::InlineMethod => Operand::Method(resolver.resolve_method(token(parser)?)?),
        OperandShape::InlineField => Operand::Field(resolver.resolve_field(token(parser)?)?),
        OperandShape::InlineType => Operand::Type(resolver.resolve_type(token(parser)?)?),
        OperandShape::InlineTok => resolver.resolve_member(token(parser)?)?,
        OperandShape::InlineString => Operand::String(resolver.resolve_string(token(parser)?)?),
        OperandShape::InlineSig => Operand::CallSite(resolver.resolve_signature(token(parser)?)?),
    };

    Ok((Instruction::create(opcode, operand)?, pending))
}

fn token(parser: &mut Parser) -> Result<Token> {
    Ok(Token::new(parser.read_le::<u32>()?))
}

fn variable(body: &MethodBody, index: u16) -> Result<Operand> {
    match body.variables.by_index(index) {
        Some(id) => Ok(Operand::Variable(id)),
        None => Err(malformed_error!(
            "Local variable {} out of range, the body declares {}",
            index,
            body.variables.len()
        )),
    }
}

fn parameter(body: &MethodBody, index: u16) -> Result<Operand> {
    match body.parameters.by_index(index) {
        Some(id) => Ok(Operand::Parameter(id)),
        None => Err(malformed_error!(
            "Argument {} out of range, the method has {}",
            index,
            body.parameters.len()
        )),
    }
}

fn handler_from_clause(
    body: &MethodBody,
    clause: &ExceptionClause,
    resolver: &dyn TokenResolver,
) -> Result<ExceptionHandler> {
    let start = |offset: u32| {
        body.instruction_at(offset).ok_or_else(|| {
            malformed_error!(
                "Exception clause boundary {:#x} does not start an instruction",
                offset
            )
        })
    };
    let end = |offset: u32, length: u32| {
        let Some(position) = offset.checked_add(length) else {
            return Err(malformed_error!("Exception clause overflows at {:#x}", offset));
        };
        if position == body.code_size() {
            Ok(None)
        } else {
            start(position).map(Some)
        }
    };

    let filter_start = if clause.flags.contains(ExceptionHandlerFlags::FILTER) {
        Some(start(clause.class_token_or_filter)?)
    } else {
        None
    };

    let catch_type = if clause.flags.is_empty() && clause.class_token_or_filter != 0 {
        Some(resolver.resolve_type(Token::new(clause.class_token_or_filter))?)
    } else {
        None
    };

    Ok(ExceptionHandler {
        flags: clause.flags,
        try_start: start(clause.try_offset)?,
        try_end: end(clause.try_offset, clause.try_length)?,
        handler_start: start(clause.handler_offset)?,
        handler_end: end(clause.handler_offset, clause.handler_length)?,
        filter_start,
        catch_type,
    })
}
