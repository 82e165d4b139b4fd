//! Lexical scopes of a method body.
//!
//! A scope covers a half-open instruction range and owns the locals visible inside it. Scopes
//! nest; the root scope of a body usually spans all of its code.

use crate::{assembly::InstructionId, metadata::method::VariableId};

/// A lexical scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// First instruction of the scope
    pub start: InstructionId,
    /// First instruction after the scope, `None` for the end of the code
    pub end: Option<InstructionId>,
    /// Locals declared in this scope
    pub variables: Vec<VariableId>,
    /// Nested scopes
    pub scopes: Vec<Scope>,
}

impl Scope {
    /// A scope without locals or children.
    #[must_use]
    pub fn new(start: InstructionId, end: Option<InstructionId>) -> Self {
        Scope {
            start,
            end,
            variables: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Number of scopes in this tree, this one included.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.scopes.iter().map(Scope::count).sum::<usize>()
    }

    /// Move boundaries pointing at `removed` to `successor` throughout the tree.
    ///
    /// Child scopes that become empty are dropped. Returns `false` if this scope itself became
    /// empty.
    pub(crate) fn redirect(
        &mut self,
        removed: InstructionId,
        successor: Option<InstructionId>,
    ) -> bool {
        self.scopes.retain_mut(|scope| scope.redirect(removed, successor));

        if self.end == Some(removed) {
            self.end = successor;
        }
        if self.start == removed {
            match successor {
                Some(next) => self.start = next,
                None => return false,
            }
        }

        Some(self.start) != self.end
    }

    /// Drop `variable` from this scope and its children.
    pub(crate) fn forget_variable(&mut self, variable: VariableId) {
        self.variables.retain(|candidate| *candidate != variable);
        for scope in &mut self.scopes {
            scope.forget_variable(variable);
        }
    }
}
