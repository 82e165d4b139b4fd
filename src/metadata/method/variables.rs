//! Local variables of a method body.
//!
//! Variables are addressed by a stable [`VariableId`]; their slot index is recomputed on every
//! insert and remove so indices always run `0..len`. Each variable keeps its encoded type from the
//! local variable signature (custom modifiers, `pinned` and `byref` prefixes included), which is
//! enough to write the signature back without a type system.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 23.2.6 - `LocalVarSig`

use std::fmt;

use crate::{
    file::{buffer::ByteBuffer, parser::Parser},
    Error, Result,
};

/// Leading byte of a local variable signature
pub const LOCAL_SIG: u8 = 0x07;

const ELEMENT_TYPE_BYREF: u8 = 0x10;
const ELEMENT_TYPE_TYPEDBYREF: u8 = 0x16;
const ELEMENT_TYPE_CMOD_REQD: u8 = 0x1F;
const ELEMENT_TYPE_CMOD_OPT: u8 = 0x20;
const ELEMENT_TYPE_SENTINEL: u8 = 0x41;
const ELEMENT_TYPE_PINNED: u8 = 0x45;

/// Maximum nesting of type signatures
const MAX_RECURSION_DEPTH: usize = 50;

/// Stable handle of a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// A local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    id: VariableId,
    index: u16,
    signature: Box<[u8]>,
    /// Name from debug information
    pub name: Option<String>,
}

impl Variable {
    /// Handle of this variable.
    #[must_use]
    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Current slot index.
    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Encoded type of this local.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns `true` for `pinned` locals.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.type_prefixes().contains(&ELEMENT_TYPE_PINNED)
    }

    /// Returns `true` for `byref` locals.
    #[must_use]
    pub fn is_byref(&self) -> bool {
        self.type_prefixes().contains(&ELEMENT_TYPE_BYREF)
    }

    /// The `pinned`/`byref` prefix bytes after any custom modifiers.
    fn type_prefixes(&self) -> &[u8] {
        let mut parser = Parser::new(&self.signature);
        while let Ok(byte) = parser.peek_byte() {
            if byte != ELEMENT_TYPE_CMOD_OPT && byte != ELEMENT_TYPE_CMOD_REQD {
                break;
            }
            if parser.advance().is_err() || parser.read_compressed_uint().is_err() {
                return &[];
            }
        }

        let start = parser.pos();
        let end = self.signature[start..]
            .iter()
            .position(|byte| *byte != ELEMENT_TYPE_PINNED && *byte != ELEMENT_TYPE_BYREF)
            .map_or(self.signature.len(), |len| start + len);
        &self.signature[start..end]
    }
}

/// The ordered local variables of a method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    items: Vec<Variable>,
    next_id: u32,
}

impl Variables {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if there are no locals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a local of type `signature`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if there are already 65535 locals.
    pub fn add(&mut self, signature: &[u8]) -> Result<VariableId> {
        self.insert(self.items.len(), signature)
    }

    /// Insert a local of type `signature` at slot `position`, shifting later slots.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if there are already 65535 locals, or
    /// [`Error::OutOfBounds`] if `position` is past the end.
    pub fn insert(&mut self, position: usize, signature: &[u8]) -> Result<VariableId> {
        if self.items.len() >= usize::from(u16::MAX) {
            return Err(malformed_error!("Too many local variables"));
        }
        if position > self.items.len() {
            return Err(out_of_bounds_error!());
        }

        let id = VariableId(self.next_id);
        self.next_id += 1;
        self.items.insert(
            position,
            Variable {
                id,
                index: 0,
                signature: signature.into(),
                name: None,
            },
        );
        self.reindex();
        Ok(id)
    }

    /// Remove a local; later slots move down.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedVariable`] if `id` is not part of this collection.
    pub fn remove(&mut self, id: VariableId) -> Result<Variable> {
        let Some(position) = self.items.iter().position(|item| item.id == id) else {
            return Err(Error::UnresolvedVariable);
        };

        let removed = self.items.remove(position);
        self.reindex();
        Ok(removed)
    }

    /// The local behind `id`.
    #[must_use]
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.items.iter().find(|item| item.id == id)
    }

    /// The local behind `id`, mutably.
    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Slot index of `id`.
    #[must_use]
    pub fn index_of(&self, id: VariableId) -> Option<u16> {
        self.get(id).map(Variable::index)
    }

    /// Handle of the local in slot `index`.
    #[must_use]
    pub fn by_index(&self, index: u16) -> Option<VariableId> {
        self.items.get(usize::from(index)).map(Variable::id)
    }

    /// Locals in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.items.iter()
    }

    /// Parse a `LocalVarSig` blob.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the blob is not a local variable signature or a type is
    /// invalid, or [`Error::OutOfBounds`] if it is truncated.
    pub fn parse_signature(blob: &[u8]) -> Result<Variables> {
        let mut parser = Parser::new(blob);
        let kind = parser.read_le::<u8>()?;
        if kind != LOCAL_SIG {
            return Err(malformed_error!(
                "Invalid local variable signature - {:#04x}",
                kind
            ));
        }

        let count = parser.read_compressed_uint()?;
        let mut variables = Variables::new();
        for _ in 0..count {
            let start = parser.pos();
            skip_local(&mut parser)?;
            variables.add(&blob[start..parser.pos()])?;
        }

        Ok(variables)
    }

    /// Encode the locals as a `LocalVarSig` blob.
    ///
    /// # Errors
    /// Returns an error if the count can not be compressed.
    pub fn encode_signature(&self) -> Result<Vec<u8>> {
        let mut buffer = ByteBuffer::new();
        buffer.write_u8(LOCAL_SIG)?;
        let Ok(count) = u32::try_from(self.items.len()) else {
            return Err(malformed_error!("Too many local variables"));
        };
        buffer.write_compressed_uint(count)?;
        for variable in &self.items {
            buffer.write_bytes(&variable.signature)?;
        }
        Ok(buffer.into_vec())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn reindex(&mut self) {
        // Bounded by the u16::MAX check in insert
        for (index, item) in self.items.iter_mut().enumerate() {
            item.index = index as u16;
        }
    }
}

fn skip_local(parser: &mut Parser) -> Result<()> {
    loop {
        match parser.peek_byte()? {
            ELEMENT_TYPE_CMOD_OPT | ELEMENT_TYPE_CMOD_REQD => {
                parser.advance()?;
                parser.read_compressed_uint()?;
            }
            ELEMENT_TYPE_PINNED | ELEMENT_TYPE_BYREF => parser.advance()?,
            _ => return skip_type(parser, 0),
        }
    }
}

fn skip_type(parser: &mut Parser, depth: usize) -> Result<()> {
    if depth >= MAX_RECURSION_DEPTH {
        return Err(malformed_error!(
            "Type signature nesting exceeds {}",
            MAX_RECURSION_DEPTH
        ));
    }

    let element = parser.read_le::<u8>()?;
    match element {
        // void .. string, typedbyref, native ints, object
        0x01..=0x0E | ELEMENT_TYPE_TYPEDBYREF | 0x18 | 0x19 | 0x1C => Ok(()),
        // ptr, byref, szarray, pinned, sentinel
        0x0F | ELEMENT_TYPE_BYREF | 0x1D | ELEMENT_TYPE_PINNED | ELEMENT_TYPE_SENTINEL => {
            skip_type(parser, depth + 1)
        }
        // valuetype, class, var, mvar
        0x11 | 0x12 | 0x13 | 0x1E => {
            parser.read_compressed_uint()?;
            Ok(())
        }
        // array: type rank sizes lower-bounds
        0x14 => {
            skip_type(parser, depth + 1)?;
            parser.read_compressed_uint()?;
            for _ in 0..parser.read_compressed_uint()? {
                parser.read_compressed_uint()?;
            }
            for _ in 0..parser.read_compressed_uint()? {
                parser.read_compressed_int()?;
            }
            Ok(())
        }
        // genericinst: class/valuetype, type, arguments
        0x15 => {
            parser.advance()?;
            parser.read_compressed_uint()?;
            for _ in 0..parser.read_compressed_uint()? {
                skip_type(parser, depth + 1)?;
            }
            Ok(())
        }
        // fnptr: calling convention, parameter count, return type, parameters
        0x1B => {
            parser.advance()?;
            let count = parser.read_compressed_uint()?;
            for _ in 0..=count {
                skip_type(parser, depth + 1)?;
            }
            Ok(())
        }
        ELEMENT_TYPE_CMOD_REQD | ELEMENT_TYPE_CMOD_OPT => {
            parser.read_compressed_uint()?;
            skip_type(parser, depth + 1)
        }
        _ => Err(malformed_error!("Invalid element type - {:#04x}", element)),
    }
}
