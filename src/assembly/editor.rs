//! Validated editing of method bodies.
//!
//! [`ILEditor`] is a thin facade over a [`MethodBody`]. Every instruction it adds is built
//! through [`Instruction::create`], so an opcode never ends up with an operand its shape does not
//! accept; every structural change goes through the body, so handlers and scopes follow removed
//! instructions.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{ILEditor, OpCode, Operand};
//! use cilweave::metadata::method::{MethodBody, Parameters};
//!
//! let mut body = MethodBody::new(Parameters::new(false, 0));
//! let mut editor = ILEditor::new(&mut body);
//!
//! let ret = editor.emit(OpCode::Ret, Operand::None)?;
//! editor.insert_before(ret, ILEditor::create(OpCode::Br, Operand::Branch(ret))?)?;
//! assert_eq!(editor.shorten_branches()?, 1);
//!
//! assert_eq!(body.layout()?, 3);
//! # Ok::<(), cilweave::Error>(())
//! ```

use crate::{
    assembly::{Instruction, InstructionId, OpCode, Operand},
    metadata::{
        method::{MethodBody, ParameterId, VariableId},
        token::Token,
    },
    Error, Result,
};

/// Editing facade of a [`MethodBody`].
pub struct ILEditor<'a> {
    body: &'a mut MethodBody,
}

impl<'a> ILEditor<'a> {
    /// Edit `body`.
    pub fn new(body: &'a mut MethodBody) -> Self {
        ILEditor { body }
    }

    /// The edited body.
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        self.body
    }

    /// The edited body, mutably.
    pub fn body_mut(&mut self) -> &mut MethodBody {
        self.body
    }

    /// Create an instruction without adding it anywhere.
    ///
    /// # Errors
    /// Returns [`Error::OperandMismatch`] if `opcode` does not accept `operand`.
    pub fn create(opcode: OpCode, operand: Operand) -> Result<Instruction> {
        Instruction::create(opcode, operand)
    }

    /// Create a raw instruction without adding it anywhere.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInstruction`] if `bytes` is empty or too long.
    pub fn create_raw(bytes: impl Into<Box<[u8]>>, operand: Operand) -> Result<Instruction> {
        Instruction::raw(bytes, operand)
    }

    /// Create an instruction and append it.
    ///
    /// # Errors
    /// Returns [`Error::OperandMismatch`] if `opcode` does not accept `operand`; the body is
    /// unchanged.
    pub fn emit(&mut self, opcode: OpCode, operand: Operand) -> Result<InstructionId> {
        let instruction = Instruction::create(opcode, operand)?;
        self.body.push(instruction)
    }

    /// Append an instruction.
    ///
    /// # Errors
    /// Returns an error if the instruction arena is exhausted.
    pub fn append(&mut self, instruction: Instruction) -> Result<InstructionId> {
        self.body.push(instruction)
    }

    /// Insert before `target`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of the body.
    pub fn insert_before(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        self.body.insert_before(target, instruction)
    }

    /// Insert after `target`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of the body.
    pub fn insert_after(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        self.body.insert_after(target, instruction)
    }

    /// Replace `target`, returning the new handle and the old instruction.
    ///
    /// Branches that targeted `target` are not redirected.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of the body.
    pub fn replace(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<(InstructionId, Instruction)> {
        self.body.replace(target, instruction)
    }

    /// Remove `target`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] if `target` is not part of the body.
    pub fn remove(&mut self, target: InstructionId) -> Result<Instruction> {
        self.body.remove(target)
    }

    /// Handle of the local in slot `index`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedVariable`] if there is no such local.
    pub fn variable(&self, index: u16) -> Result<VariableId> {
        self.body
            .variables
            .by_index(index)
            .ok_or(Error::UnresolvedVariable)
    }

    /// Handle of argument `index`, counting `this`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedParameter`] if there is no such argument.
    pub fn parameter(&self, index: u16) -> Result<ParameterId> {
        self.body
            .parameters
            .by_index(index)
            .ok_or(Error::UnresolvedParameter)
    }

    /// Append a local of type `signature` and clear the local signature token.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the body already has 65535 locals.
    pub fn add_variable(&mut self, signature: &[u8]) -> Result<VariableId> {
        let id = self.body.variables.add(signature)?;
        self.body.local_var_sig_token = Token::new(0);
        Ok(id)
    }

    /// Rewrite every short branch to its long form; returns the number rewritten.
    ///
    /// # Errors
    /// Never fails for bodies built through this crate.
    pub fn expand_short_branches(&mut self) -> Result<usize> {
        let mut expanded = 0;
        for id in self.body.instructions().ids().collect::<Vec<_>>() {
            let Some(instruction) = self.body.instruction_mut(id) else {
                continue;
            };
            let Some(long) = instruction.opcode().ok().and_then(OpCode::long_form) else {
                continue;
            };

            instruction.set_opcode(long)?;
            expanded += 1;
        }

        Ok(expanded)
    }

    /// Rewrite long branches to their short forms wherever the target is in reach; returns the
    /// number rewritten.
    ///
    /// Runs until no further branch can be shortened, since every shortened branch may bring
    /// others into reach.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotFound`] for branches to removed instructions, or
    /// [`Error::Malformed`] if the code does not fit into 32-bit offsets.
    pub fn shorten_branches(&mut self) -> Result<usize> {
        let mut shortened = 0;
        loop {
            self.body.layout()?;

            let mut candidates = Vec::new();
            for (id, instruction) in self.body.instructions().iter() {
                let Some(short) = instruction.opcode().ok().and_then(OpCode::short_form) else {
                    continue;
                };
                let Operand::Branch(target) = instruction.operand() else {
                    continue;
                };
                let Some(target) = self.body.instruction(*target) else {
                    return Err(Error::InstructionNotFound(*target));
                };

                // The long-form displacement is never further from zero than the short one
                let end = instruction.offset() + instruction.size();
                let delta = i64::from(target.offset()) - i64::from(end);
                if i8::try_from(delta).is_ok() {
                    candidates.push((id, short));
                }
            }

            if candidates.is_empty() {
                break;
            }

            for (id, short) in candidates {
                if let Some(instruction) = self.body.instruction_mut(id) {
                    instruction.set_opcode(short)?;
                    shortened += 1;
                }
            }
        }

        tracing::trace!(shortened, "shortened branches");
        Ok(shortened)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::Parameters;

    #[test]
    fn emit_and_navigate() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let mut editor = ILEditor::new(&mut body);

        let one = editor.emit(OpCode::LdcI41, Operand::None).unwrap();
        editor.emit(OpCode::Add, Operand::None).unwrap();
        editor.emit(OpCode::Ret, Operand::None).unwrap();
        let zero = editor
            .insert_before(one, ILEditor::create(OpCode::LdcI40, Operand::None).unwrap())
            .unwrap();

        assert_eq!(editor.body().instructions().first(), Some(zero));
        assert_eq!(editor.body().instructions().next(zero), Some(one));
        assert!(editor.body().instructions().links_consistent());
        assert_eq!(body.layout().unwrap(), 4);
    }

    #[test]
    fn rejected_operand() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let mut editor = ILEditor::new(&mut body);

        assert!(matches!(
            editor.emit(OpCode::LdcI4S, Operand::Int64(42)),
            Err(Error::OperandMismatch {
                opcode: "ldc.i4.s",
                operand: "int64"
            })
        ));
        assert!(editor.body().is_empty());
        assert!(ILEditor::create_raw(Vec::new(), Operand::None).is_err());
    }

    #[test]
    fn remove_absent() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let mut editor = ILEditor::new(&mut body);
        let nop = editor.emit(OpCode::Nop, Operand::None).unwrap();
        editor.emit(OpCode::Ret, Operand::None).unwrap();

        editor.remove(nop).unwrap();
        assert!(matches!(editor.remove(nop), Err(Error::InstructionNotFound(id)) if id == nop));
        assert_eq!(editor.body().len(), 1);

        let mut other = MethodBody::new(Parameters::new(false, 0));
        let foreign = other.push(Instruction::new(OpCode::Nop).unwrap()).unwrap();
        assert!(editor
            .insert_after(foreign, Instruction::new(OpCode::Nop).unwrap())
            .is_err());
        assert_eq!(editor.body().len(), 1);
    }

    #[test]
    fn variables_and_parameters() {
        let mut body = MethodBody::new(Parameters::new(true, 1));
        body.local_var_sig_token = Token::new(0x1100_0001);
        let mut editor = ILEditor::new(&mut body);

        let local = editor.add_variable(&[0x08]).unwrap();
        assert_eq!(editor.variable(0).unwrap(), local);
        assert!(editor.variable(1).is_err());
        assert!(editor.body().local_var_sig_token.is_null());

        let this = editor.parameter(0).unwrap();
        assert_eq!(editor.body().parameters.this(), Some(this));
        assert!(matches!(editor.parameter(2), Err(Error::UnresolvedParameter)));

        editor.emit(OpCode::Ldarg0, Operand::None).unwrap();
        editor.emit(OpCode::StlocS, Operand::Variable(local)).unwrap();
        assert!(editor.emit(OpCode::StlocS, Operand::Parameter(this)).is_err());
    }

    #[test]
    fn shorten_until_fixed_point() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let mut editor = ILEditor::new(&mut body);

        let ret = editor.emit(OpCode::Ret, Operand::None).unwrap();
        // Two long branches, the first only in reach once the second shrinks
        let inner = editor
            .insert_before(ret, ILEditor::create(OpCode::Br, Operand::Branch(ret)).unwrap())
            .unwrap();
        for _ in 0..124 {
            editor
                .insert_before(inner, ILEditor::create(OpCode::Nop, Operand::None).unwrap())
                .unwrap();
        }
        let first = editor.body().instructions().first().unwrap();
        editor
            .insert_before(first, ILEditor::create(OpCode::Brtrue, Operand::Branch(ret)).unwrap())
            .unwrap();

        assert_eq!(editor.shorten_branches().unwrap(), 2);
        let opcodes: Vec<OpCode> = editor
            .body()
            .instructions()
            .iter()
            .filter_map(|(_, instruction)| instruction.opcode().ok())
            .filter(|opcode| opcode.is_branch())
            .collect();
        assert_eq!(opcodes, [OpCode::BrtrueS, OpCode::BrS]);

        assert_eq!(editor.expand_short_branches().unwrap(), 2);
        assert_eq!(editor.shorten_branches().unwrap(), 2);
    }

    #[test]
    fn out_of_reach_stays_long() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let mut editor = ILEditor::new(&mut body);

        let ret = editor.emit(OpCode::Ret, Operand::None).unwrap();
        for _ in 0..200 {
            editor
                .insert_before(ret, ILEditor::create(OpCode::Nop, Operand::None).unwrap())
                .unwrap();
        }
        let first = editor.body().instructions().first().unwrap();
        editor
            .insert_before(first, ILEditor::create(OpCode::Leave, Operand::Branch(ret)).unwrap())
            .unwrap();

        assert_eq!(editor.shorten_branches().unwrap(), 0);
        assert_eq!(editor.expand_short_branches().unwrap(), 0);
    }
}
