//! Exception handling clauses of a method body.
//!
//! On disk, clauses are byte ranges stored in small or fat data sections after the code. In a
//! [`crate::metadata::method::MethodBody`] they are [`ExceptionHandler`]s whose boundaries are
//! instruction handles, so they follow the instructions through edits.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 25.4.5 / 25.4.6 - Method data sections, Exception handling

use bitflags::bitflags;

use crate::{
    assembly::{EntityRef, InstructionId},
    file::{buffer::ByteBuffer, parser::Parser},
    metadata::method::SectionFlags,
    Result,
};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause, the class token names the caught type.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause, a finally that only runs on exceptions.
        const FAULT = 0x0004;
    }
}

/// Size of a small clause
const SMALL_CLAUSE_SIZE: usize = 12;
/// Size of a fat clause
const FAT_CLAUSE_SIZE: usize = 24;

/// A clause as stored in the method body, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Kind of clause
    pub flags: ExceptionHandlerFlags,
    /// Offset of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token for typed clauses, filter offset for filter clauses, 0 otherwise
    pub class_token_or_filter: u32,
}

impl ExceptionClause {
    /// Returns `true` if the clause fits the 12-byte small form.
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}

/// Parse the exception sections starting at `offset` in `data`.
///
/// Sections other than exception tables end the walk.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if a section runs past `data`, or
/// [`crate::Error::Malformed`] for a section too short to hold its header.
pub fn read_exception_sections(data: &[u8], offset: usize) -> Result<Vec<ExceptionClause>> {
    let mut parser = Parser::new(data);
    parser.seek(offset)?;

    let mut clauses = Vec::new();
    loop {
        let section_start = parser.pos();
        let flags = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
        if !flags.contains(SectionFlags::EHTABLE) {
            break;
        }

        let is_fat = flags.contains(SectionFlags::FAT_FORMAT);
        let section_size = if is_fat {
            let low = parser.read_le::<u16>()?;
            let high = parser.read_le::<u8>()?;
            (usize::from(high) << 16) | usize::from(low)
        } else {
            let size = usize::from(parser.read_le::<u8>()?);
            parser.advance_by(2)?;
            size
        };

        if section_size < 4 {
            return Err(malformed_error!(
                "Exception section too small - {}",
                section_size
            ));
        }
        if section_start + section_size > data.len() {
            return Err(out_of_bounds_error!());
        }

        let clause_size = if is_fat { FAT_CLAUSE_SIZE } else { SMALL_CLAUSE_SIZE };
        for _ in 0..(section_size - 4) / clause_size {
            clauses.push(if is_fat {
                // Only the low 16 bits carry clause kinds
                #[allow(clippy::cast_possible_truncation)]
                let flags = ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u32>()? as u16);
                ExceptionClause {
                    flags,
                    try_offset: parser.read_le::<u32>()?,
                    try_length: parser.read_le::<u32>()?,
                    handler_offset: parser.read_le::<u32>()?,
                    handler_length: parser.read_le::<u32>()?,
                    class_token_or_filter: parser.read_le::<u32>()?,
                }
            } else {
                ExceptionClause {
                    flags: ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u16>()?),
                    try_offset: u32::from(parser.read_le::<u16>()?),
                    try_length: u32::from(parser.read_le::<u8>()?),
                    handler_offset: u32::from(parser.read_le::<u16>()?),
                    handler_length: u32::from(parser.read_le::<u8>()?),
                    class_token_or_filter: parser.read_le::<u32>()?,
                }
            });
        }

        if !flags.contains(SectionFlags::MORE_SECTS) {
            break;
        }

        parser.seek(section_start + section_size)?;
        parser.align(4)?;
    }

    Ok(clauses)
}

/// Encode `clauses` as a single exception section, small if every clause allows it.
///
/// The caller aligns `buffer` to 4 bytes first.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the section outgrows the 24-bit size field.
#[allow(clippy::cast_possible_truncation)]
pub fn write_exception_section(clauses: &[ExceptionClause], buffer: &mut ByteBuffer) -> Result<()> {
    let small_size = 4 + clauses.len() * SMALL_CLAUSE_SIZE;
    let is_small = small_size <= usize::from(u8::MAX) && clauses.iter().all(ExceptionClause::fits_small);

    if is_small {
        buffer.write_u8(SectionFlags::EHTABLE.bits())?;
        buffer.write_u8(small_size as u8)?;
        buffer.write_u16(0)?;

        for clause in clauses {
            buffer.write_u16(clause.flags.bits())?;
            buffer.write_u16(clause.try_offset as u16)?;
            buffer.write_u8(clause.try_length as u8)?;
            buffer.write_u16(clause.handler_offset as u16)?;
            buffer.write_u8(clause.handler_length as u8)?;
            buffer.write_u32(clause.class_token_or_filter)?;
        }
    } else {
        let fat_size = 4 + clauses.len() * FAT_CLAUSE_SIZE;
        let Ok(size) = u32::try_from(fat_size) else {
            return Err(malformed_error!("Too many exception clauses - {}", clauses.len()));
        };
        if size > 0x00FF_FFFF {
            return Err(malformed_error!("Too many exception clauses - {}", clauses.len()));
        }

        buffer.write_u32(u32::from((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits()) | (size << 8))?;
        for clause in clauses {
            buffer.write_u32(u32::from(clause.flags.bits()))?;
            buffer.write_u32(clause.try_offset)?;
            buffer.write_u32(clause.try_length)?;
            buffer.write_u32(clause.handler_offset)?;
            buffer.write_u32(clause.handler_length)?;
            buffer.write_u32(clause.class_token_or_filter)?;
        }
    }

    Ok(())
}

/// An exception handler of a method body.
///
/// Regions are half-open: they start at their start instruction and end before their end
/// instruction, `None` marks the end of the code.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    /// Kind of handler
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: InstructionId,
    /// First instruction after the protected block
    pub try_end: Option<InstructionId>,
    /// First handler instruction
    pub handler_start: InstructionId,
    /// First instruction after the handler
    pub handler_end: Option<InstructionId>,
    /// First filter instruction, for filter handlers
    pub filter_start: Option<InstructionId>,
    /// Caught type, for typed handlers
    pub catch_type: Option<EntityRef>,
}

impl ExceptionHandler {
    /// Returns `true` for typed catch clauses.
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns `true` for filter clauses.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }

    /// Returns `true` for finally clauses.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FINALLY)
    }

    /// Returns `true` for fault clauses.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FAULT)
    }

    /// Move boundaries that point at `removed` to `successor`.
    ///
    /// Returns `false` if a region became empty and the handler should be dropped.
    pub(crate) fn redirect(
        &mut self,
        removed: InstructionId,
        successor: Option<InstructionId>,
    ) -> bool {
        if self.try_end == Some(removed) {
            self.try_end = successor;
        }
        if self.handler_end == Some(removed) {
            self.handler_end = successor;
        }

        for start in [&mut self.try_start, &mut self.handler_start] {
            if *start == removed {
                match successor {
                    Some(next) => *start = next,
                    None => return false,
                }
            }
        }

        if self.filter_start == Some(removed) {
            match successor {
                Some(next) => self.filter_start = Some(next),
                None => return false,
            }
        }

        Some(self.try_start) != self.try_end && Some(self.handler_start) != self.handler_end
    }
}
