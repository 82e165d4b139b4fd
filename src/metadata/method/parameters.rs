//! Parameters of a method body, as seen by argument instructions.
//!
//! Instance methods have an implicit `this` in argument slot 0, declared parameters follow.
//! Like variables, parameters are addressed by a stable [`ParameterId`] and their argument index
//! is recomputed whenever the collection changes.

use std::fmt;

use crate::{Error, Result};

/// Stable handle of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(pub u32);

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg{}", self.0)
    }
}

/// A method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    id: ParameterId,
    index: u16,
    is_this: bool,
    /// Name from the Param table or debug information
    pub name: Option<String>,
}

impl Parameter {
    /// Handle of this parameter.
    #[must_use]
    pub fn id(&self) -> ParameterId {
        self.id
    }

    /// Argument index, counting `this`.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Returns `true` for the implicit `this`.
    #[must_use]
    pub fn is_this(&self) -> bool {
        self.is_this
    }
}

/// The argument slots of a method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    items: Vec<Parameter>,
    next_id: u32,
}

impl Parameters {
    /// Create the argument slots of a method with `count` declared parameters.
    #[must_use]
    pub fn new(has_this: bool, count: u16) -> Self {
        let mut parameters = Parameters::default();
        if has_this {
            parameters.items.push(Parameter {
                id: ParameterId(0),
                index: 0,
                is_this: true,
                name: Some("this".to_string()),
            });
            parameters.next_id = 1;
        }

        let declared = if has_this { count.min(u16::MAX - 1) } else { count };
        for _ in 0..declared {
            parameters.push_declared();
        }
        parameters.reindex();
        parameters
    }

    /// Returns `true` if argument 0 is the implicit `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.items.first().is_some_and(|item| item.is_this)
    }

    /// Number of argument slots, `this` included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no argument slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Handle of the implicit `this`.
    #[must_use]
    pub fn this(&self) -> Option<ParameterId> {
        self.items.first().filter(|item| item.is_this).map(Parameter::id)
    }

    /// Append a declared parameter.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if all 65535 argument slots are taken.
    pub fn add(&mut self, name: Option<String>) -> Result<ParameterId> {
        if self.items.len() >= usize::from(u16::MAX) {
            return Err(malformed_error!("Too many parameters"));
        }

        let id = self.push_declared();
        if let Some(parameter) = self.get_mut(id) {
            parameter.name = name;
        }
        self.reindex();
        Ok(id)
    }

    /// Remove a declared parameter; later arguments move down.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedParameter`] if `id` is not part of this collection, or
    /// [`Error::Malformed`] for the implicit `this`.
    pub fn remove(&mut self, id: ParameterId) -> Result<Parameter> {
        let Some(position) = self.items.iter().position(|item| item.id == id) else {
            return Err(Error::UnresolvedParameter);
        };
        if self.items[position].is_this {
            return Err(malformed_error!("The implicit this parameter can not be removed"));
        }

        let removed = self.items.remove(position);
        self.reindex();
        Ok(removed)
    }

    /// The parameter behind `id`.
    #[must_use]
    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.items.iter().find(|item| item.id == id)
    }

    /// The parameter behind `id`, mutably.
    pub fn get_mut(&mut self, id: ParameterId) -> Option<&mut Parameter> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Argument index of `id`.
    #[must_use]
    pub fn index_of(&self, id: ParameterId) -> Option<u16> {
        self.get(id).map(Parameter::index)
    }

    /// Handle of argument `index`.
    #[must_use]
    pub fn by_index(&self, index: u16) -> Option<ParameterId> {
        self.items.get(usize::from(index)).map(Parameter::id)
    }

    /// Parameters in argument order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    fn push_declared(&mut self) -> ParameterId {
        let id = ParameterId(self.next_id);
        self.next_id += 1;
        self.items.push(Parameter {
            id,
            index: 0,
            is_this: false,
            name: None,
        });
        id
    }

    #[allow(clippy::cast_possible_truncation)]
    fn reindex(&mut self) {
        // Bounded by u16::MAX on every path that grows the collection
        for (index, item) in self.items.iter_mut().enumerate() {
            item.index = index as u16;
        }
    }
}
