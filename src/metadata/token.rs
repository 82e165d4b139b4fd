//! Metadata token representation.
//!
//! A token is a 32-bit reference whose high byte names a table (or the user-string heap) and
//! whose low 24 bits carry a 1-based row index (or heap offset). Tokens appear as operands of
//! CIL instructions and are mapped to in-memory entities by a
//! [`crate::assembly::TokenResolver`].
//!
//! # Examples
//!
//! ```rust
//! use cilweave::metadata::{tables::TableId, token::Token};
//!
//! let token = Token::from_table(TableId::MethodDef, 1);
//! assert_eq!(token.value(), 0x0600_0001);
//! assert_eq!(token.table_id(), Some(TableId::MethodDef));
//! ```

use std::fmt;

use crate::metadata::tables::TableId;

/// High byte of tokens that index the `#US` heap.
pub const USER_STRING_TOKEN_TYPE: u8 = 0x70;

/// A metadata token: table type in the high byte, row index (or heap offset) in the low 24 bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Create a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token that refers to `row` of `table`.
    #[must_use]
    pub fn from_table(table: TableId, row: u32) -> Self {
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Create a token that refers to `offset` in the `#US` heap.
    #[must_use]
    pub fn user_string(offset: u32) -> Self {
        Token((u32::from(USER_STRING_TOKEN_TYPE) << 24) | (offset & 0x00FF_FFFF))
    }

    /// Raw 32-bit token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table type byte.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The table this token refers to, `None` for heap tokens and unknown table bytes.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_u8(self.table())
    }

    /// Row index (1-based) or heap offset.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the nil token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this token indexes the `#US` heap.
    #[must_use]
    pub fn is_user_string(&self) -> bool {
        self.table() == USER_STRING_TOKEN_TYPE
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
