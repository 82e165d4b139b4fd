//! Crafted method bodies and a resolver for their tokens.

use std::sync::Arc;

use crate::{
    assembly::{EntityRef, TokenResolver},
    metadata::{method::Variables, token::Token},
    Error, Result,
};

/// `ldstr "Hello, World!"; call WriteLine; ret` with a tiny header.
#[rustfmt::skip]
pub const HELLO_BODY: [u8; 12] = [
    0x2E,                               // tiny header, 11 bytes of code
    0x72, 0x01, 0x00, 0x00, 0x70,       // ldstr 0x70000001
    0x28, 0x01, 0x00, 0x00, 0x0A,       // call 0x0A000001
    0x2A,                               // ret
];

/// A fat body with one `int32` local and a typed catch handler.
///
/// ```text
/// IL_0000: nop
/// IL_0001: ldc.i4.s 5      try {
/// IL_0003: stloc.0
/// IL_0004: leave.s IL_0009
/// IL_0006: pop             } catch System.Exception {
/// IL_0007: leave.s IL_0009 }
/// IL_0009: ret
/// ```
#[rustfmt::skip]
pub const FAT_BODY: [u8; 40] = [
    0x1B, 0x30,                         // fat, more sections, init locals, 3 dwords
    0x02, 0x00,                         // max stack
    0x0A, 0x00, 0x00, 0x00,             // code size
    0x01, 0x00, 0x00, 0x11,             // locals 0x11000001
    0x00,
    0x1F, 0x05,
    0x0A,
    0xDE, 0x03,
    0x26,
    0xDE, 0x00,
    0x2A,
    0x00, 0x00,                         // padding
    0x01, 0x10, 0x00, 0x00,             // small EH section, 16 bytes
    0x00, 0x00,                         // catch
    0x01, 0x00, 0x05,                   // try 1, length 5
    0x06, 0x00, 0x03,                   // handler 6, length 3
    0x03, 0x00, 0x00, 0x01,             // System.Exception, TypeRef 3
];

/// Names the tokens of [`HELLO_BODY`] and [`FAT_BODY`].
pub struct FakeResolver;

impl FakeResolver {
    fn entity(token: Token) -> Result<EntityRef> {
        let name = match token.value() {
            0x0100_0003 => "System.Exception",
            0x0A00_0001 => "WriteLine",
            _ if token.is_null() => return Err(Error::UnresolvedToken(token)),
            _ => return Ok(EntityRef::new(token)),
        };
        Ok(EntityRef::named(token, name))
    }
}

impl TokenResolver for FakeResolver {
    fn resolve_type(&self, token: Token) -> Result<EntityRef> {
        Self::entity(token)
    }

    fn resolve_method(&self, token: Token) -> Result<EntityRef> {
        Self::entity(token)
    }

    fn resolve_field(&self, token: Token) -> Result<EntityRef> {
        Self::entity(token)
    }

    fn resolve_signature(&self, token: Token) -> Result<EntityRef> {
        Self::entity(token)
    }

    fn resolve_string(&self, token: Token) -> Result<Arc<str>> {
        match token.value() {
            0x7000_0001 => Ok(Arc::from("Hello, World!")),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }

    fn resolve_locals(&self, token: Token) -> Result<Variables> {
        match token.value() {
            0x1100_0001 => Variables::parse_signature(&[0x07, 0x01, 0x08]),
            _ => Err(Error::UnresolvedToken(token)),
        }
    }
}
