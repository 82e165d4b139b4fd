//! A single CIL instruction and its operand.
//!
//! Instructions are created through [`Instruction::create`], which checks the operand against the
//! opcode's [`OperandShape`] and refuses mismatches, or through [`Instruction::raw`] for byte
//! spans the decoder could not (or should not) interpret. An instruction only gets an offset once
//! it is part of an [`crate::assembly::InstructionStream`] and a layout pass ran.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{Instruction, OpCode, Operand};
//!
//! let push = Instruction::create(OpCode::LdcI4S, Operand::Int8(42))?;
//! assert_eq!(push.size(), 2);
//!
//! assert!(Instruction::create(OpCode::LdcI4S, Operand::Int64(42)).is_err());
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    assembly::{InstructionId, OpCode, OperandShape},
    metadata::{
        method::{ParameterId, SequencePoint, VariableId},
        token::Token,
    },
    Error, Result,
};

/// A metadata entity referenced by an instruction: a type, method, field or signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Token of the entity in its module
    pub token: Token,
    /// Display name, if the resolver knows it
    pub name: Option<Arc<str>>,
}

impl EntityRef {
    /// An entity known only by its token.
    #[must_use]
    pub fn new(token: Token) -> Self {
        EntityRef { token, name: None }
    }

    /// An entity with a display name.
    #[must_use]
    pub fn named(token: Token, name: impl Into<Arc<str>>) -> Self {
        EntityRef {
            token,
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.token),
        }
    }
}

/// The operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// A type reference (`InlineType`, `InlineTok`)
    Type(EntityRef),
    /// A stand-alone call site signature (`InlineSig`)
    CallSite(EntityRef),
    /// A method reference (`InlineMethod`, `InlineTok`)
    Method(EntityRef),
    /// A field reference (`InlineField`, `InlineTok`)
    Field(EntityRef),
    /// A string literal (`InlineString`)
    String(Arc<str>),
    /// A signed byte (`ShortInlineI`)
    Int8(i8),
    /// An unsigned byte (`ShortInlineI`, used by `unaligned.` and `no.`)
    UInt8(u8),
    /// A 32-bit integer (`InlineI`)
    Int32(i32),
    /// A 64-bit integer (`InlineI8`)
    Int64(i64),
    /// A 32-bit float (`ShortInlineR`)
    Float32(f32),
    /// A 64-bit float (`InlineR`)
    Float64(f64),
    /// A single branch target (`ShortInlineBrTarget`, `InlineBrTarget`)
    Branch(InstructionId),
    /// The targets of a `switch`
    Switch(Vec<InstructionId>),
    /// A local variable (`ShortInlineVar`, `InlineVar`)
    Variable(VariableId),
    /// A parameter (`ShortInlineArg`, `InlineArg`)
    Parameter(ParameterId),
}

impl Operand {
    /// Short name of the operand kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::None => "none",
            Operand::Type(_) => "type",
            Operand::CallSite(_) => "call-site",
            Operand::Method(_) => "method",
            Operand::Field(_) => "field",
            Operand::String(_) => "string",
            Operand::Int8(_) => "int8",
            Operand::UInt8(_) => "uint8",
            Operand::Int32(_) => "int32",
            Operand::Int64(_) => "int64",
            Operand::Float32(_) => "float32",
            Operand::Float64(_) => "float64",
            Operand::Branch(_) => "branch",
            Operand::Switch(_) => "switch",
            Operand::Variable(_) => "variable",
            Operand::Parameter(_) => "parameter",
        }
    }

    /// Returns `true` if `shape` accepts this operand.
    #[must_use]
    pub fn fits(&self, shape: OperandShape) -> bool {
        matches!(
            (shape, self),
            (OperandShape::InlineNone, Operand::None)
                | (OperandShape::ShortInlineI, Operand::Int8(_) | Operand::UInt8(_))
                | (OperandShape::InlineI, Operand::Int32(_))
                | (OperandShape::InlineI8, Operand::Int64(_))
                | (OperandShape::ShortInlineR, Operand::Float32(_))
                | (OperandShape::InlineR, Operand::Float64(_))
                | (
                    OperandShape::ShortInlineBrTarget | OperandShape::InlineBrTarget,
                    Operand::Branch(_)
                )
                | (OperandShape::InlineSwitch, Operand::Switch(_))
                | (
                    OperandShape::ShortInlineVar | OperandShape::InlineVar,
                    Operand::Variable(_)
                )
                | (
                    OperandShape::ShortInlineArg | OperandShape::InlineArg,
                    Operand::Parameter(_)
                )
                | (OperandShape::InlineMethod, Operand::Method(_))
                | (OperandShape::InlineField, Operand::Field(_))
                | (OperandShape::InlineType, Operand::Type(_))
                | (
                    OperandShape::InlineTok,
                    Operand::Type(_) | Operand::Method(_) | Operand::Field(_)
                )
                | (OperandShape::InlineString, Operand::String(_))
                | (OperandShape::InlineSig, Operand::CallSite(_))
        )
    }

    /// Encoded operand size.
    ///
    /// `shape` picks between the short and long encodings of branch, variable and parameter
    /// operands; without a shape (raw instructions) the long encodings are used.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encoded_size(&self, shape: Option<OperandShape>) -> u32 {
        match self {
            Operand::None => 0,
            Operand::Int8(_) | Operand::UInt8(_) => 1,
            Operand::Int32(_)
            | Operand::Float32(_)
            | Operand::Type(_)
            | Operand::CallSite(_)
            | Operand::Method(_)
            | Operand::Field(_)
            | Operand::String(_) => 4,
            Operand::Int64(_) | Operand::Float64(_) => 8,
            Operand::Branch(_) => match shape {
                Some(OperandShape::ShortInlineBrTarget) => 1,
                _ => 4,
            },
            Operand::Variable(_) | Operand::Parameter(_) => match shape {
                Some(OperandShape::ShortInlineVar | OperandShape::ShortInlineArg) => 1,
                _ => 2,
            },
            // Switch tables are bounded by the u32 code size of a method body
            Operand::Switch(targets) => 4 + 4 * targets.len() as u32,
        }
    }

    /// Branch targets referenced by this operand.
    #[must_use]
    pub fn targets(&self) -> &[InstructionId] {
        match self {
            Operand::Branch(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Type(entity)
            | Operand::CallSite(entity)
            | Operand::Method(entity)
            | Operand::Field(entity) => write!(f, "{entity}"),
            Operand::String(value) => write!(f, "{value:?}"),
            Operand::Int8(value) => write!(f, "{value}"),
            Operand::UInt8(value) => write!(f, "{value}"),
            Operand::Int32(value) => write!(f, "{value}"),
            Operand::Int64(value) => write!(f, "{value}"),
            Operand::Float32(value) => write!(f, "{value}"),
            Operand::Float64(value) => write!(f, "{value}"),
            Operand::Branch(target) => write!(f, "{target}"),
            Operand::Switch(targets) => {
                f.write_str("(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str(")")
            }
            Operand::Variable(variable) => write!(f, "{variable}"),
            Operand::Parameter(parameter) => write!(f, "{parameter}"),
        }
    }
}

/// What an instruction is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// A known opcode
    Symbolic(OpCode),
    /// Uninterpreted bytes, written as-is ahead of the operand
    Raw(Box<[u8]>),
}

/// A CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    kind: InstructionKind,
    operand: Operand,
    offset: u32,
    sequence_point: Option<SequencePoint>,
}

impl Instruction {
    /// Create an instruction, checking `operand` against the operand shape of `opcode`.
    ///
    /// # Errors
    /// Returns [`Error::OperandMismatch`] if `opcode` does not accept `operand`.
    pub fn create(opcode: OpCode, operand: Operand) -> Result<Instruction> {
        check_operand(opcode, &operand)?;

        Ok(Instruction {
            kind: InstructionKind::Symbolic(opcode),
            operand,
            offset: 0,
            sequence_point: None,
        })
    }

    /// Create an instruction without an operand.
    ///
    /// # Errors
    /// Returns [`Error::OperandMismatch`] if `opcode` requires an operand.
    pub fn new(opcode: OpCode) -> Result<Instruction> {
        Self::create(opcode, Operand::None)
    }

    /// Create a raw instruction from its leading bytes and an optional operand.
    ///
    /// The operand is encoded after `bytes` using its long form.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInstruction`] if `bytes` is empty or longer than 65535 bytes.
    pub fn raw(bytes: impl Into<Box<[u8]>>, operand: Operand) -> Result<Instruction> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::InvalidInstruction(
                "raw instruction without bytes".to_string(),
            ));
        }
        if bytes.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidInstruction(format!(
                "raw instruction of {} bytes",
                bytes.len()
            )));
        }

        Ok(Instruction {
            kind: InstructionKind::Raw(bytes),
            operand,
            offset: 0,
            sequence_point: None,
        })
    }

    /// The symbolic opcode.
    ///
    /// # Errors
    /// Returns [`Error::RawInstruction`] for raw instructions.
    pub fn opcode(&self) -> Result<OpCode> {
        match self.kind {
            InstructionKind::Symbolic(opcode) => Ok(opcode),
            InstructionKind::Raw(_) => Err(Error::RawInstruction),
        }
    }

    /// Change the opcode, keeping the operand.
    ///
    /// # Errors
    /// Returns [`Error::RawInstruction`] for raw instructions, or [`Error::OperandMismatch`] if
    /// `opcode` does not accept the current operand. The instruction is unchanged on error.
    pub fn set_opcode(&mut self, opcode: OpCode) -> Result<()> {
        let InstructionKind::Symbolic(current) = &mut self.kind else {
            return Err(Error::RawInstruction);
        };

        check_operand(opcode, &self.operand)?;
        *current = opcode;
        Ok(())
    }

    /// The operand.
    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Replace the operand.
    ///
    /// # Errors
    /// Returns [`Error::OperandMismatch`] if the opcode does not accept `operand`.
    pub fn set_operand(&mut self, operand: Operand) -> Result<()> {
        if let InstructionKind::Symbolic(opcode) = self.kind {
            check_operand(opcode, &operand)?;
        }

        self.operand = operand;
        Ok(())
    }

    /// Symbolic or raw.
    #[must_use]
    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    /// Returns `true` for raw instructions.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(self.kind, InstructionKind::Raw(_))
    }

    /// Leading bytes of a raw instruction.
    #[must_use]
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            InstructionKind::Raw(bytes) => Some(bytes),
            InstructionKind::Symbolic(_) => None,
        }
    }

    /// Offset from the start of the method body, as of the last layout pass.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Encoded size in bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn size(&self) -> u32 {
        match &self.kind {
            InstructionKind::Symbolic(opcode) => {
                opcode.size() + self.operand.encoded_size(Some(opcode.operand_shape()))
            }
            // Raw spans are limited to u16::MAX bytes by the constructor
            InstructionKind::Raw(bytes) => bytes.len() as u32 + self.operand.encoded_size(None),
        }
    }

    /// Source location attached to this instruction.
    #[must_use]
    pub fn sequence_point(&self) -> Option<&SequencePoint> {
        self.sequence_point.as_ref()
    }

    /// Attach or clear the source location.
    pub fn set_sequence_point(&mut self, sequence_point: Option<SequencePoint>) {
        self.sequence_point = sequence_point;
    }

    /// Mnemonic of the opcode, `raw` for raw instructions.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self.kind {
            InstructionKind::Symbolic(opcode) => opcode.name(),
            InstructionKind::Raw(_) => "raw",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.offset, self.mnemonic())?;
        if let InstructionKind::Raw(bytes) = &self.kind {
            for byte in bytes.iter() {
                write!(f, " {byte:02X}")?;
            }
        }
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

fn check_operand(opcode: OpCode, operand: &Operand) -> Result<()> {
    if operand.fits(opcode.operand_shape()) {
        Ok(())
    } else {
        Err(Error::OperandMismatch {
            opcode: opcode.name(),
            operand: operand.kind_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> InstructionId {
        InstructionId {
            stream: 1,
            index,
            generation: 0,
        }
    }

    #[test]
    fn operand_shapes() {
        assert!(Instruction::create(OpCode::LdcI4S, Operand::Int8(-1)).is_ok());
        assert!(Instruction::create(OpCode::Unaligned, Operand::UInt8(4)).is_ok());
        assert!(Instruction::create(OpCode::Ldtoken, Operand::Field(EntityRef::new(Token(0x0400_0001)))).is_ok());
        assert!(Instruction::create(OpCode::Newarr, Operand::Type(EntityRef::new(Token(0x0100_0001)))).is_ok());
        assert!(Instruction::create(OpCode::Ldarg, Operand::Parameter(ParameterId(0))).is_ok());
        assert!(Instruction::create(OpCode::Nop, Operand::None).is_ok());

        let result = Instruction::create(OpCode::LdcI4S, Operand::Int64(1));
        assert!(matches!(
            result,
            Err(Error::OperandMismatch {
                opcode: "ldc.i4.s",
                operand: "int64"
            })
        ));

        assert!(Instruction::create(OpCode::Newarr, Operand::Method(EntityRef::new(Token(0x0600_0001)))).is_err());
        assert!(Instruction::create(OpCode::Ldloc, Operand::Parameter(ParameterId(0))).is_err());
        assert!(Instruction::create(OpCode::Ldarg, Operand::Variable(VariableId(0))).is_err());
        assert!(Instruction::new(OpCode::Br).is_err());
        assert!(Instruction::create(OpCode::Ret, Operand::Int32(0)).is_err());
    }

    #[test]
    fn sizes() {
        let switch = Instruction::create(
            OpCode::Switch,
            Operand::Switch(vec![id(0), id(1), id(2), id(3)]),
        )
        .unwrap();
        assert_eq!(switch.size(), 1 + 4 + 16);

        let cases = [
            (Instruction::new(OpCode::Ret).unwrap(), 1),
            (Instruction::new(OpCode::Ceq).unwrap(), 2),
            (Instruction::create(OpCode::BrS, Operand::Branch(id(0))).unwrap(), 2),
            (Instruction::create(OpCode::Br, Operand::Branch(id(0))).unwrap(), 5),
            (Instruction::create(OpCode::LdlocS, Operand::Variable(VariableId(0))).unwrap(), 2),
            (Instruction::create(OpCode::Ldloc, Operand::Variable(VariableId(0))).unwrap(), 4),
            (Instruction::create(OpCode::LdcI8, Operand::Int64(0)).unwrap(), 9),
            (Instruction::create(OpCode::LdcR4, Operand::Float32(0.5)).unwrap(), 5),
            (Instruction::create(OpCode::Ldstr, Operand::String("x".into())).unwrap(), 5),
            (Instruction::create(OpCode::Unaligned, Operand::UInt8(1)).unwrap(), 3),
        ];

        for (instruction, size) in cases {
            assert_eq!(instruction.size(), size, "{instruction}");
        }
    }

    #[test]
    fn raw_instruction() {
        let mut raw = Instruction::raw(vec![0xA6], Operand::Variable(VariableId(1))).unwrap();
        assert!(raw.is_raw());
        assert_eq!(raw.raw_bytes(), Some(&[0xA6][..]));
        assert_eq!(raw.size(), 3);
        assert!(matches!(raw.opcode(), Err(Error::RawInstruction)));
        assert!(matches!(raw.set_opcode(OpCode::Nop), Err(Error::RawInstruction)));
        assert_eq!(raw.mnemonic(), "raw");

        raw.set_operand(Operand::Int64(7)).unwrap();
        assert_eq!(raw.size(), 9);

        assert!(matches!(
            Instruction::raw(Vec::new(), Operand::None),
            Err(Error::InvalidInstruction(_))
        ));
    }

    #[test]
    fn set_opcode_and_operand() {
        let mut instruction = Instruction::create(OpCode::BrS, Operand::Branch(id(3))).unwrap();
        instruction.set_opcode(OpCode::Br).unwrap();
        assert_eq!(instruction.opcode().unwrap(), OpCode::Br);

        assert!(instruction.set_opcode(OpCode::Ret).is_err());
        assert_eq!(instruction.opcode().unwrap(), OpCode::Br);

        assert!(instruction.set_operand(Operand::Int32(1)).is_err());
        assert_eq!(instruction.operand(), &Operand::Branch(id(3)));
        assert_eq!(instruction.operand().targets(), &[id(3)]);
    }

    #[test]
    fn display() {
        let instruction =
            Instruction::create(OpCode::Ldstr, Operand::String("Hello".into())).unwrap();
        assert_eq!(instruction.to_string(), "IL_0000: ldstr \"Hello\"");

        let call = Instruction::create(
            OpCode::Call,
            Operand::Method(EntityRef::named(Token(0x0A00_0001), "WriteLine")),
        )
        .unwrap();
        assert_eq!(call.to_string(), "IL_0000: call WriteLine");
    }
}
