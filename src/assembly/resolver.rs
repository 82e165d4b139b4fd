//! The metadata boundary of the read and write paths.
//!
//! Decoding a method body turns the tokens found in its operands into [`Operand`] values through a
//! [`TokenResolver`]; encoding turns them back into tokens through a [`TokenEmitter`]. The crate
//! ships one implementation of each side:
//!
//! - [`MetadataResolver`] names types, methods and fields from the tables of a
//!   [`MetadataView`] and reads string literals from its `#US` heap.
//! - [`HeapTokenEmitter`] keeps member tokens as they are and interns string literals and local
//!   variable signatures into fresh heaps.

use std::sync::Arc;

use crate::{
    assembly::{EntityRef, Operand, ReaderOptions},
    metadata::{
        method::Variables,
        streams::{Blob, Strings, TablesHeader, UserStringsBuilder},
        tables::TableId,
        token::Token,
        view::MetadataView,
    },
    Error, Result,
};

/// Turns the tokens of a method body into operands.
pub trait TokenResolver {
    /// Resolve a `TypeDef`, `TypeRef` or `TypeSpec` token.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token does not name a type.
    fn resolve_type(&self, token: Token) -> Result<EntityRef>;

    /// Resolve a `MethodDef`, `MemberRef` or `MethodSpec` token.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token does not name a method.
    fn resolve_method(&self, token: Token) -> Result<EntityRef>;

    /// Resolve a `Field` or `MemberRef` token.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token does not name a field.
    fn resolve_field(&self, token: Token) -> Result<EntityRef>;

    /// Resolve a `StandAloneSig` token used by `calli`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token does not name a signature.
    fn resolve_signature(&self, token: Token) -> Result<EntityRef>;

    /// Resolve a `#US` token to its string literal.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token does not name a string.
    fn resolve_string(&self, token: Token) -> Result<Arc<str>>;

    /// Resolve the operand of `ldtoken`, which may name a type, method or field.
    ///
    /// `MemberRef` tokens resolve as methods unless overridden.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if the token names none of them.
    fn resolve_member(&self, token: Token) -> Result<Operand> {
        match token.table_id() {
            Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec) => {
                Ok(Operand::Type(self.resolve_type(token)?))
            }
            Some(TableId::MethodDef | TableId::MethodSpec | TableId::MemberRef) => {
                Ok(Operand::Method(self.resolve_method(token)?))
            }
            Some(TableId::Field) => Ok(Operand::Field(self.resolve_field(token)?)),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    /// Resolve the local variables behind a `StandAloneSig` token.
    ///
    /// # Errors
    /// Returns an error if the signature can not be read.
    fn resolve_locals(&self, token: Token) -> Result<Variables> {
        let _ = token;
        Ok(Variables::new())
    }
}

/// Turns operands back into tokens.
pub trait TokenEmitter {
    /// Token of a type, method, field or signature reference.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedToken`] if no token can be assigned.
    fn emit_entity(&mut self, entity: &EntityRef) -> Result<Token>;

    /// Token of a string literal.
    ///
    /// # Errors
    /// Returns an error if the string can not be stored.
    fn emit_string(&mut self, value: &str) -> Result<Token>;

    /// `StandAloneSig` token of a local variable signature blob.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] unless implemented.
    fn emit_local_signature(&mut self, signature: &[u8]) -> Result<Token> {
        let _ = signature;
        Err(Error::NotSupported)
    }
}

/// A [`TokenResolver`] reading the tables and heaps of a [`MetadataView`].
///
/// # Examples
///
/// ```rust,no_run
/// use cilweave::assembly::{MetadataResolver, ReaderOptions, TokenResolver};
/// use cilweave::metadata::{token::Token, view::MetadataView};
/// use std::path::Path;
///
/// let view = MetadataView::from_file(Path::new("metadata.bin"))?;
/// let resolver = MetadataResolver::new(&view, ReaderOptions::default());
/// let literal = resolver.resolve_string(Token::new(0x7000_0001))?;
/// println!("{literal}");
/// # Ok::<(), cilweave::Error>(())
/// ```
pub struct MetadataResolver<'a> {
    view: &'a MetadataView,
    options: ReaderOptions,
}

impl<'a> MetadataResolver<'a> {
    /// Resolve against `view`.
    #[must_use]
    pub fn new(view: &'a MetadataView, options: ReaderOptions) -> Self {
        MetadataResolver { view, options }
    }

    /// The options heap reads follow.
    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn tables(&self, token: Token) -> Result<&TablesHeader> {
        self.view.tables().ok_or(Error::UnresolvedToken(token))
    }

    fn strings(&self, token: Token) -> Result<&Strings> {
        self.view.strings().ok_or(Error::UnresolvedToken(token))
    }

    fn blobs(&self, token: Token) -> Result<&Blob> {
        self.view.blobs().ok_or(Error::UnresolvedToken(token))
    }

    /// Column `column` of the row behind `token`, which must belong to `table`.
    fn column(&self, token: Token, table: TableId, column: usize) -> Result<u32> {
        if token.table_id() != Some(table) {
            return Err(Error::UnresolvedToken(token));
        }

        self.tables(token)?
            .column(table, token.row(), column)
            .map_err(|_| Error::UnresolvedToken(token))
    }

    fn string(&self, token: Token, index: u32) -> Result<Arc<str>> {
        let strings = self.strings(token)?;
        if self.options.strict_heaps {
            strings.get_checked(index as usize)
        } else {
            Ok(strings.get(index as usize))
        }
    }

    fn blob(&self, token: Token, index: u32) -> Result<&[u8]> {
        let blobs = self.blobs(token)?;
        if self.options.strict_heaps {
            blobs.get_checked(index as usize)
        } else {
            Ok(blobs.get(index as usize))
        }
    }

    /// A row that has no name of its own, but must exist.
    fn unnamed(&self, token: Token, table: TableId) -> Result<EntityRef> {
        if token.table_id() != Some(table) {
            return Err(Error::UnresolvedToken(token));
        }

        self.tables(token)?
            .row(table, token.row())
            .map_err(|_| Error::UnresolvedToken(token))?;
        Ok(EntityRef::new(token))
    }

    fn named(&self, token: Token, table: TableId, column: usize) -> Result<EntityRef> {
        let name = self.column(token, table, column)?;
        Ok(EntityRef::named(token, self.string(token, name)?))
    }

    /// `Namespace.Name` of a `TypeDef` or `TypeRef`.
    fn type_name(&self, token: Token, table: TableId) -> Result<EntityRef> {
        let name = self.string(token, self.column(token, table, 1)?)?;
        let namespace = self.string(token, self.column(token, table, 2)?)?;

        if namespace.is_empty() {
            Ok(EntityRef::named(token, name))
        } else {
            Ok(EntityRef::named(token, format!("{namespace}.{name}")))
        }
    }

    /// Returns `true` if the `MemberRef` behind `token` carries a field signature.
    fn is_field_ref(&self, token: Token) -> Result<bool> {
        let signature = self.column(token, TableId::MemberRef, 2)?;
        Ok(self.blob(token, signature)?.first() == Some(&0x06))
    }
}

impl TokenResolver for MetadataResolver<'_> {
    fn resolve_type(&self, token: Token) -> Result<EntityRef> {
        match token.table_id() {
            Some(table @ (TableId::TypeDef | TableId::TypeRef)) => self.type_name(token, table),
            Some(TableId::TypeSpec) => self.unnamed(token, TableId::TypeSpec),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_method(&self, token: Token) -> Result<EntityRef> {
        match token.table_id() {
            Some(TableId::MethodDef) => self.named(token, TableId::MethodDef, 3),
            Some(TableId::MemberRef) => self.named(token, TableId::MemberRef, 1),
            Some(TableId::MethodSpec) => self.unnamed(token, TableId::MethodSpec),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_field(&self, token: Token) -> Result<EntityRef> {
        match token.table_id() {
            Some(TableId::Field) => self.named(token, TableId::Field, 1),
            Some(TableId::MemberRef) => self.named(token, TableId::MemberRef, 1),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_signature(&self, token: Token) -> Result<EntityRef> {
        self.unnamed(token, TableId::StandAloneSig)
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        if !token.is_user_string() {
            return Err(Error::UnresolvedToken(token));
        }

        let Some(userstrings) = self.view.userstrings() else {
            return Err(Error::UnresolvedToken(token));
        };

        let index = token.row() as usize;
        if self.options.strict_heaps {
            userstrings.get_checked(index)
        } else {
            Ok(userstrings.get(index))
        }
    }

    fn resolve_member(&self, token: Token) -> Result<Operand> {
        match token.table_id() {
            Some(TableId::MemberRef) if self.is_field_ref(token)? => {
                Ok(Operand::Field(self.resolve_field(token)?))
            }
            Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec) => {
                Ok(Operand::Type(self.resolve_type(token)?))
            }
            Some(TableId::MethodDef | TableId::MethodSpec | TableId::MemberRef) => {
                Ok(Operand::Method(self.resolve_method(token)?))
            }
            Some(TableId::Field) => Ok(Operand::Field(self.resolve_field(token)?)),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_locals(&self, token: Token) -> Result<Variables> {
        let signature = self.column(token, TableId::StandAloneSig, 0)?;
        Variables::parse_signature(self.blob(token, signature)?)
    }
}

/// A [`TokenEmitter`] that keeps entity tokens and builds fresh `#US` and signature heaps.
///
/// Local variable signatures are assigned consecutive `StandAloneSig` rows, starting after the
/// rows the target image already has.
#[derive(Debug)]
pub struct HeapTokenEmitter {
    userstrings: UserStringsBuilder,
    signatures: Vec<Vec<u8>>,
    first_signature_row: u32,
}

impl HeapTokenEmitter {
    /// An emitter with empty heaps, assigning `StandAloneSig` rows from 1.
    #[must_use]
    pub fn new() -> Self {
        HeapTokenEmitter {
            userstrings: UserStringsBuilder::new(),
            signatures: Vec::new(),
            first_signature_row: 1,
        }
    }

    /// Continue filling an existing `#US` heap.
    #[must_use]
    pub fn with_userstrings(mut self, userstrings: UserStringsBuilder) -> Self {
        self.userstrings = userstrings;
        self
    }

    /// Assign `StandAloneSig` rows starting at `row`.
    #[must_use]
    pub fn with_first_signature_row(mut self, row: u32) -> Self {
        self.first_signature_row = row.max(1);
        self
    }

    /// The `#US` heap built so far.
    #[must_use]
    pub fn userstrings(&self) -> &UserStringsBuilder {
        &self.userstrings
    }

    /// Local variable signatures in row order.
    #[must_use]
    pub fn signatures(&self) -> &[Vec<u8>] {
        &self.signatures
    }

    /// The `#US` heap and the local variable signatures.
    #[must_use]
    pub fn into_parts(self) -> (UserStringsBuilder, Vec<Vec<u8>>) {
        (self.userstrings, self.signatures)
    }
}

impl Default for HeapTokenEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEmitter for HeapTokenEmitter {
    fn emit_entity(&mut self, entity: &EntityRef) -> Result<Token> {
        if entity.token.is_null() {
            return Err(Error::UnresolvedToken(entity.token));
        }
        Ok(entity.token)
    }

    fn emit_string(&mut self, value: &str) -> Result<Token> {
        let offset = self.userstrings.add(value)?;
        Ok(Token::user_string(offset))
    }

    fn emit_local_signature(&mut self, signature: &[u8]) -> Result<Token> {
        if let Some(position) = self.signatures.iter().position(|known| known == signature) {
            return Ok(signature_token(self.first_signature_row, position));
        }

        let row = u32::try_from(self.signatures.len())
            .ok()
            .and_then(|count| count.checked_add(self.first_signature_row))
            .filter(|row| *row <= 0x00FF_FFFF);
        let Some(row) = row else {
            return Err(malformed_error!("StandAloneSig table exceeds the token row range"));
        };

        self.signatures.push(signature.to_vec());
        Ok(Token::from_table(TableId::StandAloneSig, row))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn signature_token(first_row: u32, position: usize) -> Token {
    // Positions of known signatures passed the row range check when they were added
    Token::from_table(TableId::StandAloneSig, first_row + position as u32)
}
