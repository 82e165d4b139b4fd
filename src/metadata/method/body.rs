//! The editable body of a method.
//!
//! A [`MethodBody`] owns the instruction stream together with everything that refers into it:
//! exception handlers, lexical scopes, local variables and the argument slots. Mutations that go
//! through the body keep those side structures pointing at live instructions; removing an
//! instruction moves every handler and scope boundary that named it to its successor.
//!
//! Bodies are produced by [`crate::assembly::decode_method_body`] or built from scratch with
//! [`MethodBody::new`], edited through [`crate::assembly::ILEditor`], and written back with
//! [`crate::assembly::encode_method_body`].
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{Instruction, OpCode};
//! use cilweave::metadata::method::{MethodBody, Parameters};
//!
//! let mut body = MethodBody::new(Parameters::new(false, 0));
//! body.push(Instruction::new(OpCode::Nop)?)?;
//! body.push(Instruction::new(OpCode::Ret)?)?;
//!
//! assert_eq!(body.layout()?, 2);
//! assert_eq!(body.code_size(), 2);
//! # Ok::<(), cilweave::Error>(())
//! ```

use crate::{
    assembly::{Instruction, InstructionId, InstructionStream},
    metadata::{
        method::{
            ExceptionHandler, Parameters, Scope, SequencePoint, Variable, VariableId, Variables,
            TINY_MAX_STACK,
        },
        token::Token,
    },
    Result,
};

/// A method body: instructions plus handlers, locals, arguments and scopes.
#[derive(Debug)]
pub struct MethodBody {
    instructions: InstructionStream,
    /// Exception handlers, innermost first
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Local variables
    pub variables: Variables,
    /// Argument slots
    pub parameters: Parameters,
    /// Root lexical scope
    pub scope: Option<Scope>,
    /// Declared maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// `StandAloneSig` token of the locals, null if none was assigned yet
    pub local_var_sig_token: Token,
    code_size: u32,
}

impl MethodBody {
    /// An empty body with the given argument slots.
    #[must_use]
    pub fn new(parameters: Parameters) -> Self {
        MethodBody {
            instructions: InstructionStream::new(),
            exception_handlers: Vec::new(),
            variables: Variables::new(),
            parameters,
            scope: None,
            max_stack: TINY_MAX_STACK,
            init_locals: false,
            local_var_sig_token: Token::new(0),
            code_size: 0,
        }
    }

    /// The instruction stream.
    #[must_use]
    pub fn instructions(&self) -> &InstructionStream {
        &self.instructions
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The instruction behind `id`.
    #[must_use]
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id)
    }

    /// The instruction behind `id`, mutably.
    pub fn instruction_mut(&mut self, id: InstructionId) -> Option<&mut Instruction> {
        self.instructions.get_mut(id)
    }

    /// Append an instruction.
    ///
    /// # Errors
    /// Returns an error if the instruction arena is exhausted.
    pub fn push(&mut self, instruction: Instruction) -> Result<InstructionId> {
        self.instructions.push(instruction)
    }

    /// Insert before `target`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotFound`] if `target` is not part of this body.
    pub fn insert_before(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        self.instructions.insert_before(target, instruction)
    }

    /// Insert after `target`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotFound`] if `target` is not part of this body.
    pub fn insert_after(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<InstructionId> {
        self.instructions.insert_after(target, instruction)
    }

    /// Replace `target`; handler and scope boundaries move to the replacement.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotFound`] if `target` is not part of this body.
    pub fn replace(
        &mut self,
        target: InstructionId,
        instruction: Instruction,
    ) -> Result<(InstructionId, Instruction)> {
        let id = self.instructions.insert_after(target, instruction)?;
        let removed = self.remove(target)?;
        Ok((id, removed))
    }

    /// Replace the instruction at `position`; boundaries move to the replacement.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there is no instruction at `position`.
    pub fn set(
        &mut self,
        position: usize,
        instruction: Instruction,
    ) -> Result<(InstructionId, Instruction)> {
        let Some(old) = self.instructions.at(position) else {
            return Err(out_of_bounds_error!());
        };

        let (id, removed) = self.instructions.set(position, instruction)?;
        self.redirect(old, Some(id));
        Ok((id, removed))
    }

    /// Remove `target`; handler and scope boundaries move to its successor.
    ///
    /// Handlers and scopes whose region becomes empty are dropped.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotFound`] if `target` is not part of this body.
    pub fn remove(&mut self, target: InstructionId) -> Result<Instruction> {
        let successor = self.instructions.next(target);
        let removed = self.instructions.remove(target)?;
        self.redirect(target, successor);
        Ok(removed)
    }

    /// Remove a local variable and drop it from all scopes.
    ///
    /// The local signature token is cleared so the next encoding emits a fresh one. Instructions
    /// still referring to the local fail to encode.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedVariable`] if `variable` is not a local of this body.
    pub fn remove_variable(&mut self, variable: VariableId) -> Result<Variable> {
        let removed = self.variables.remove(variable)?;
        self.local_var_sig_token = Token::new(0);
        if let Some(scope) = &mut self.scope {
            scope.forget_variable(variable);
        }
        Ok(removed)
    }

    /// Assign instruction offsets and return the code size.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code does not fit into 32-bit offsets.
    pub fn layout(&mut self) -> Result<u32> {
        self.code_size = self.instructions.layout()?;
        Ok(self.code_size)
    }

    /// Code size as of the last layout pass.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.code_size
    }

    /// The instruction starting at `offset`, as of the last layout pass.
    #[must_use]
    pub fn instruction_at(&self, offset: u32) -> Option<InstructionId> {
        self.instructions.at_offset(offset)
    }

    /// `(offset, sequence point)` pairs in code order, as of the last layout pass.
    #[must_use]
    pub fn sequence_points(&self) -> Vec<(u32, SequencePoint)> {
        self.instructions
            .iter()
            .filter_map(|(_, instruction)| {
                instruction
                    .sequence_point()
                    .map(|point| (instruction.offset(), point.clone()))
            })
            .collect()
    }

    /// Attach sequence points to the instructions at their offsets.
    ///
    /// Returns the number of points attached; points not starting at an instruction are skipped.
    pub fn apply_sequence_points(
        &mut self,
        points: impl IntoIterator<Item = (u32, SequencePoint)>,
    ) -> usize {
        let mut applied = 0;
        for (offset, point) in points {
            let Some(id) = self.instructions.at_offset(offset) else {
                tracing::debug!(offset, "sequence point does not start an instruction");
                continue;
            };
            if let Some(instruction) = self.instructions.get_mut(id) {
                instruction.set_sequence_point(Some(point));
                applied += 1;
            }
        }
        applied
    }

    fn redirect(&mut self, removed: InstructionId, successor: Option<InstructionId>) {
        self.exception_handlers
            .retain_mut(|handler| handler.redirect(removed, successor));

        if let Some(scope) = &mut self.scope {
            if !scope.redirect(removed, successor) {
                self.scope = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{OpCode, Operand},
        metadata::method::ExceptionHandlerFlags,
        Error,
    };

    fn op(opcode: OpCode) -> Instruction {
        Instruction::new(opcode).unwrap()
    }

    fn guarded_body() -> (MethodBody, Vec<InstructionId>) {
        let mut body = MethodBody::new(Parameters::new(true, 0));
        let ids: Vec<InstructionId> = [
            OpCode::Nop,
            OpCode::Ldarg0,
            OpCode::Pop,
            OpCode::Endfinally,
            OpCode::Ret,
        ]
        .into_iter()
        .map(|opcode| body.push(op(opcode)).unwrap())
        .collect();

        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: ids[0],
            try_end: Some(ids[2]),
            handler_start: ids[2],
            handler_end: Some(ids[4]),
            filter_start: None,
            catch_type: None,
        });
        body.scope = Some(Scope::new(ids[0], None));
        (body, ids)
    }

    #[test]
    fn remove_redirects_boundaries() {
        let (mut body, ids) = guarded_body();

        body.remove(ids[0]).unwrap();
        assert_eq!(body.exception_handlers[0].try_start, ids[1]);
        assert_eq!(body.scope.as_ref().unwrap().start, ids[1]);

        let (replacement, old) = body.replace(ids[2], op(OpCode::Nop)).unwrap();
        assert_eq!(old.opcode().unwrap(), OpCode::Pop);
        assert_eq!(body.exception_handlers[0].try_end, Some(replacement));
        assert_eq!(body.exception_handlers[0].handler_start, replacement);

        let (last, _) = body.set(3, op(OpCode::Ret)).unwrap();
        assert_eq!(body.exception_handlers[0].handler_end, Some(last));
        assert!(body.instructions().links_consistent());

        body.remove(ids[1]).unwrap();
        assert!(body.exception_handlers.is_empty());
        assert!(body.scope.is_some());
    }

    #[test]
    fn remove_absent() {
        let (mut body, ids) = guarded_body();
        body.remove(ids[4]).unwrap();

        assert!(matches!(body.remove(ids[4]), Err(Error::InstructionNotFound(_))));
        assert_eq!(body.len(), 4);
        assert_eq!(body.exception_handlers[0].handler_end, None);
        assert!(matches!(body.set(9, op(OpCode::Nop)), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn sequence_points() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let push = body
            .push(Instruction::create(OpCode::LdcI4S, Operand::Int8(3)).unwrap())
            .unwrap();
        body.push(op(OpCode::Ret)).unwrap();
        assert_eq!(body.layout().unwrap(), 3);

        let applied = body.apply_sequence_points([
            (0, SequencePoint::new(10, 5, 10, 20).with_document("Program.cs")),
            (1, SequencePoint::new(11, 1, 11, 2)),
            (2, SequencePoint::hidden()),
        ]);
        assert_eq!(applied, 2);

        let points = body.sequence_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].0, 0);
        assert_eq!(points[0].1.document.as_deref(), Some("Program.cs"));
        assert!(points[1].1.is_hidden());
        assert_eq!(body.instruction_at(0), Some(push));
    }

    #[test]
    fn remove_variable() {
        let mut body = MethodBody::new(Parameters::new(false, 0));
        let start = body.push(op(OpCode::Ret)).unwrap();
        let local = body.variables.add(&[0x08]).unwrap();
        let mut scope = Scope::new(start, None);
        scope.variables.push(local);
        body.scope = Some(scope);

        body.remove_variable(local).unwrap();
        assert!(body.variables.is_empty());
        assert!(body.scope.as_ref().unwrap().variables.is_empty());
        assert!(body.remove_variable(local).is_err());
    }
}
