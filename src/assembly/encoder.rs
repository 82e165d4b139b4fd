//! Encoding of a [`MethodBody`] back into CIL bytes.
//!
//! Encoding starts with a layout pass that assigns every instruction its final offset. Branch
//! operands are then written as displacements from the end of the branching instruction,
//! variable and argument operands as their current indices, and entity or string operands as the
//! tokens handed out by a [`TokenEmitter`].
//!
//! [`encode_method_body`] wraps the code in a tiny or fat header and appends the exception
//! handlers as a data section.

use crate::{
    assembly::{
        ILEditor, Instruction, InstructionId, InstructionKind, Operand, OperandShape, TokenEmitter,
        WriterOptions, FE_PREFIX,
    },
    file::buffer::ByteBuffer,
    metadata::method::{
        write_exception_section, ExceptionClause, ExceptionHandler, MethodBody, MethodHeader,
        TINY_MAX_CODE_SIZE, TINY_MAX_STACK,
    },
    Error, Result,
};

/// Lay out `body` and encode its instructions.
///
/// # Errors
/// Returns [`Error::InstructionNotFound`] for branches to removed instructions,
/// [`Error::BranchOutOfRange`] for short branches that can not reach their target,
/// [`Error::UnresolvedVariable`] / [`Error::UnresolvedParameter`] for operands naming removed
/// locals or arguments, [`Error::Malformed`] for indices too large for a short form, or any error
/// of `emitter`.
pub fn encode_instructions(
    body: &mut MethodBody,
    emitter: &mut dyn TokenEmitter,
) -> Result<Vec<u8>> {
    let code_size = body.layout()?;
    let mut buffer = ByteBuffer::with_capacity(code_size as usize);

    for (_, instruction) in body.instructions().iter() {
        let shape = match instruction.kind() {
            InstructionKind::Symbolic(opcode) => {
                if opcode.is_extended() {
                    buffer.write_u8(FE_PREFIX)?;
                }
                buffer.write_u8(opcode.value().to_le_bytes()[0])?;
                Some(opcode.operand_shape())
            }
            InstructionKind::Raw(bytes) => {
                buffer.write_bytes(bytes)?;
                None
            }
        };

        write_operand(&mut buffer, body, instruction, shape, emitter)?;
    }

    Ok(buffer.into_vec())
}

/// Encode `body` with its header and exception sections.
///
/// Runs [`ILEditor::shorten_branches`] first if requested. A body with locals but without a
/// `StandAloneSig` token gets one from [`TokenEmitter::emit_local_signature`], stored back into
/// `body.local_var_sig_token`. A tiny header is written when the code is shorter than 64 bytes,
/// the stack is at most 8 deep, and there are no locals, handlers or `init_locals`.
///
/// # Errors
/// Returns any error of [`encode_instructions`], or [`Error::Malformed`] for handlers whose
/// regions end before they start.
pub fn encode_method_body(
    body: &mut MethodBody,
    emitter: &mut dyn TokenEmitter,
    options: &WriterOptions,
) -> Result<Vec<u8>> {
    if options.shorten_branches {
        ILEditor::new(body).shorten_branches()?;
    }

    if !body.variables.is_empty() && body.local_var_sig_token.is_null() {
        let signature = body.variables.encode_signature()?;
        body.local_var_sig_token = emitter.emit_local_signature(&signature)?;
    }

    let code = encode_instructions(body, emitter)?;
    let Ok(code_size) = u32::try_from(code.len()) else {
        return Err(malformed_error!("Code size {} too large", code.len()));
    };

    let clauses = body
        .exception_handlers
        .iter()
        .map(|handler| clause_from_handler(body, handler, code_size, emitter))
        .collect::<Result<Vec<_>>>()?;

    let is_tiny = !options.force_fat_header
        && code_size <= TINY_MAX_CODE_SIZE
        && body.max_stack <= TINY_MAX_STACK
        && body.local_var_sig_token.is_null()
        && !body.init_locals
        && clauses.is_empty();

    let header = if is_tiny {
        MethodHeader::tiny(code_size)?
    } else {
        MethodHeader::fat(
            code_size,
            body.max_stack,
            body.local_var_sig_token,
            body.init_locals,
            !clauses.is_empty(),
        )
    };

    let mut buffer = ByteBuffer::with_capacity(header.size());
    header.write(&mut buffer)?;
    buffer.write_bytes(&code)?;
    if !clauses.is_empty() {
        buffer.align(4)?;
        write_exception_section(&clauses, &mut buffer)?;
    }

    tracing::debug!(
        fat = header.is_fat,
        code_size,
        instructions = body.len(),
        handlers = clauses.len(),
        "encoded method body"
    );

    Ok(buffer.into_vec())
}

fn write_operand(
    buffer: &mut ByteBuffer,
    body: &MethodBody,
    instruction: &Instruction,
    shape: Option<OperandShape>,
    emitter: &mut dyn TokenEmitter,
) -> Result<()> {
    let end = instruction.offset() + instruction.size();
    let is_short = matches!(
        shape,
        Some(
            OperandShape::ShortInlineBrTarget
                | OperandShape::ShortInlineVar
                | OperandShape::ShortInlineArg
        )
    );

    match instruction.operand() {
        Operand::None => {}
        Operand::Int8(value) => buffer.write_le::<i8>(*value)?,
        Operand::UInt8(value) => buffer.write_u8(*value)?,
        Operand::Int32(value) => buffer.write_le::<i32>(*value)?,
        Operand::Int64(value) => buffer.write_le::<i64>(*value)?,
        Operand::Float32(value) => buffer.write_le::<f32>(*value)?,
        Operand::Float64(value) => buffer.write_le::<f64>(*value)?,
        Operand::Type(entity)
        | Operand::Method(entity)
        | Operand::Field(entity)
        | Operand::CallSite(entity) => buffer.write_u32(emitter.emit_entity(entity)?.value())?,
        Operand::String(value) => buffer.write_u32(emitter.emit_string(value)?.value())?,
        Operand::Branch(target) => {
            let delta = displacement(body, instruction, *target, end)?;
            if is_short {
                let Ok(delta) = i8::try_from(delta) else {
                    return Err(Error::BranchOutOfRange {
                        offset: instruction.offset(),
                        delta,
                    });
                };
                buffer.write_le::<i8>(delta)?;
            } else {
                write_long_displacement(buffer, instruction, delta)?;
            }
        }
        Operand::Switch(targets) => {
            let Ok(count) = u32::try_from(targets.len()) else {
                return Err(malformed_error!("Switch with {} targets", targets.len()));
            };
            buffer.write_u32(count)?;
            for target in targets {
                let delta = displacement(body, instruction, *target, end)?;
                write_long_displacement(buffer, instruction, delta)?;
            }
        }
        Operand::Variable(variable) => {
            let index = body
                .variables
                .index_of(*variable)
                .ok_or(Error::UnresolvedVariable)?;
            write_index(buffer, index, is_short, instruction)?;
        }
        Operand::Parameter(parameter) => {
            let index = body
                .parameters
                .index_of(*parameter)
                .ok_or(Error::UnresolvedParameter)?;
            write_index(buffer, index, is_short, instruction)?;
        }
    }

    Ok(())
}

fn displacement(
    body: &MethodBody,
    instruction: &Instruction,
    target: InstructionId,
    end: u32,
) -> Result<i64> {
    let Some(target) = body.instruction(target) else {
        return Err(Error::InstructionNotFound(target));
    };

    tracing::trace!(from = instruction.offset(), to = target.offset(), "branch displacement");
    Ok(i64::from(target.offset()) - i64::from(end))
}

fn write_long_displacement(
    buffer: &mut ByteBuffer,
    instruction: &Instruction,
    delta: i64,
) -> Result<()> {
    let Ok(delta) = i32::try_from(delta) else {
        return Err(Error::BranchOutOfRange {
            offset: instruction.offset(),
            delta,
        });
    };
    buffer.write_le::<i32>(delta)
}

fn write_index(
    buffer: &mut ByteBuffer,
    index: u16,
    is_short: bool,
    instruction: &Instruction,
) -> Result<()> {
    if is_short {
        let Ok(index) = u8::try_from(index) else {
            return Err(malformed_error!(
                "{} at offset {:#x} can not address index {}",
                instruction.mnemonic(),
                instruction.offset(),
                index
            ));
        };
        buffer.write_u8(index)
    } else {
        buffer.write_u16(index)
    }
}

fn clause_from_handler(
    body: &MethodBody,
    handler: &ExceptionHandler,
    code_size: u32,
    emitter: &mut dyn TokenEmitter,
) -> Result<ExceptionClause> {
    let offset = |id| {
        body.instruction(id)
            .map(Instruction::offset)
            .ok_or(Error::InstructionNotFound(id))
    };
    let length = |start: u32, end: Option<InstructionId>| {
        let end = match end {
            Some(id) => offset(id)?,
            None => code_size,
        };
        end.checked_sub(start).ok_or_else(|| {
            malformed_error!("Exception handler region at {:#x} ends before it starts", start)
        })
    };

    let try_offset = offset(handler.try_start)?;
    let handler_offset = offset(handler.handler_start)?;

    let class_token_or_filter = if let Some(filter) = handler.filter_start {
        offset(filter)?
    } else if let Some(catch_type) = &handler.catch_type {
        emitter.emit_entity(catch_type)?.value()
    } else {
        0
    };

    Ok(ExceptionClause {
        flags: handler.flags,
        try_offset,
        try_length: length(try_offset, handler.try_end)?,
        handler_offset,
        handler_length: length(handler_offset, handler.handler_end)?,
        class_token_or_filter,
    })
}
