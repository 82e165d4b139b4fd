//! Tiny and fat method headers.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 25.4 - Common Intermediate Language physical layout

use bitflags::bitflags;

use crate::{
    file::{buffer::ByteBuffer, parser::Parser},
    metadata::token::Token,
    Result,
};

/// Size of a fat header in bytes
pub const FAT_HEADER_SIZE: u32 = 12;

/// Largest code size a tiny header can describe
pub const TINY_MAX_CODE_SIZE: u32 = 63;

/// Max stack implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

bitflags! {
    /// Flags that a method body can have
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// Data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags that a method body data section can have
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// The section holds exception handling clauses
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// The section uses fat clauses and a 24-bit size
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}

/// A decoded method header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Fat (12+ bytes) or tiny (1 byte) format
    pub is_fat: bool,
    /// Header flags, without the format bits for tiny headers
    pub flags: MethodBodyFlags,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Size of the code following the header
    pub code_size: u32,
    /// `StandAloneSig` token of the local variables, null if there are none
    pub local_var_sig_token: Token,
    /// Size of the header itself
    pub header_size: u32,
}

impl MethodHeader {
    /// A tiny header for `code_size` bytes of code.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `code_size` exceeds [`TINY_MAX_CODE_SIZE`].
    pub fn tiny(code_size: u32) -> Result<MethodHeader> {
        if code_size > TINY_MAX_CODE_SIZE {
            return Err(malformed_error!(
                "Code size {} does not fit a tiny header",
                code_size
            ));
        }

        Ok(MethodHeader {
            is_fat: false,
            flags: MethodBodyFlags::TINY_FORMAT,
            max_stack: TINY_MAX_STACK,
            code_size,
            local_var_sig_token: Token::new(0),
            header_size: 1,
        })
    }

    /// A fat header.
    #[must_use]
    pub fn fat(
        code_size: u32,
        max_stack: u16,
        local_var_sig_token: Token,
        init_locals: bool,
        more_sections: bool,
    ) -> MethodHeader {
        let mut flags = MethodBodyFlags::FAT_FORMAT;
        flags.set(MethodBodyFlags::INIT_LOCALS, init_locals);
        flags.set(MethodBodyFlags::MORE_SECTS, more_sections);

        MethodHeader {
            is_fat: true,
            flags,
            max_stack,
            code_size,
            local_var_sig_token,
            header_size: FAT_HEADER_SIZE,
        }
    }

    /// Parse the header at the start of `data`; the code must follow within `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown format or an invalid fat header size,
    /// or [`crate::Error::OutOfBounds`] if the header or code is truncated.
    pub fn read(data: &[u8]) -> Result<MethodHeader> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let mut parser = Parser::new(data);
        let first_byte = parser.peek_byte()?;
        match first_byte & 0b11 {
            0b10 => {
                let code_size = u32::from(first_byte >> 2);
                if code_size as usize + 1 > data.len() {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodHeader {
                    is_fat: false,
                    flags: MethodBodyFlags::TINY_FORMAT,
                    max_stack: TINY_MAX_STACK,
                    code_size,
                    local_var_sig_token: Token::new(0),
                    header_size: 1,
                })
            }
            0b11 => {
                let first_duo = parser.read_le::<u16>()?;
                let max_stack = parser.read_le::<u16>()?;
                let code_size = parser.read_le::<u32>()?;
                let local_var_sig_token = Token::new(parser.read_le::<u32>()?);

                let header_size = u32::from(first_duo >> 12) * 4;
                if header_size < FAT_HEADER_SIZE {
                    return Err(malformed_error!(
                        "Fat header size too small - {}",
                        header_size
                    ));
                }

                let Some(total) = code_size.checked_add(header_size) else {
                    return Err(malformed_error!("Code size overflows - {}", code_size));
                };
                if data.len() < total as usize {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodHeader {
                    is_fat: true,
                    flags: MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF),
                    max_stack,
                    code_size,
                    local_var_sig_token,
                    header_size,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// Encode the header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a tiny header can not hold `code_size`.
    pub fn write(&self, buffer: &mut ByteBuffer) -> Result<()> {
        if self.is_fat {
            let flags = (self.flags | MethodBodyFlags::FAT_FORMAT).bits() & 0x0FFF;
            buffer.write_u16(flags | ((FAT_HEADER_SIZE as u16 / 4) << 12))?;
            buffer.write_u16(self.max_stack)?;
            buffer.write_u32(self.code_size)?;
            buffer.write_u32(self.local_var_sig_token.value())?;
        } else {
            let Ok(code_size) = u8::try_from(self.code_size) else {
                return Err(malformed_error!("Code size {} too large", self.code_size));
            };
            if u32::from(code_size) > TINY_MAX_CODE_SIZE {
                return Err(malformed_error!("Code size {} too large", code_size));
            }
            buffer.write_u8((code_size << 2) | 0b10)?;
        }

        Ok(())
    }

    /// Returns `true` if data sections follow the code.
    #[must_use]
    pub fn has_more_sections(&self) -> bool {
        self.is_fat && self.flags.contains(MethodBodyFlags::MORE_SECTS)
    }

    /// Returns `true` if locals are zero-initialized.
    #[must_use]
    pub fn init_locals(&self) -> bool {
        self.is_fat && self.flags.contains(MethodBodyFlags::INIT_LOCALS)
    }

    /// Header and code size together.
    #[must_use]
    pub fn size(&self) -> usize {
        self.header_size as usize + self.code_size as usize
    }
}
