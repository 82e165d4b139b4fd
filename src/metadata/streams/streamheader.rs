//! Stream headers of the metadata root.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.2 - Stream header

use crate::{file::parser::Parser, Result};

/// Stream names a metadata root may carry.
pub const STREAM_NAMES: [&str; 8] = [
    "#Strings", "#US", "#Blob", "#GUID", "#~", "#-", "#Pdb", "#JTD",
];

/// Location, size and name of one metadata stream.
///
/// The header is variable-length: the NUL-terminated name is padded to the next 4-byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream, at most 32 characters including the terminator
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short, or
    /// [`crate::Error::Malformed`] for an unterminated or unknown stream name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        let mut parser = Parser::new(data);
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let name_area = &data[8..data.len().min(8 + 32)];
        let Some(terminator) = name_area.iter().position(|&byte| byte == 0) else {
            if name_area.len() < 32 {
                return Err(out_of_bounds_error!());
            }
            return Err(malformed_error!("Stream name exceeds 32 characters"));
        };

        let name = String::from_utf8_lossy(&name_area[..terminator]).into_owned();
        if !STREAM_NAMES.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader { offset, size, name })
    }

    /// Encoded size of this header, including the padded name.
    #[must_use]
    pub fn header_size(&self) -> usize {
        8 + (self.name.len() + 1).next_multiple_of(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();

        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#~");
        assert_eq!(parsed_header.header_size(), 12);
    }

    #[test]
    fn strings_name_padding() {
        #[rustfmt::skip]
        let header_bytes = [
            0x10, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x00, 0x00,
            b'#', b'S', b't', b'r', b'i', b'n', b'g', b's', 0x00, 0x00, 0x00, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();
        assert_eq!(parsed_header.name, "#Strings");
        assert_eq!(parsed_header.header_size(), 20);
    }

    #[test]
    fn invalid() {
        assert!(StreamHeader::from(&[0x00; 7]).is_err());
        assert!(StreamHeader::from(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'#', b'X', 0x00, 0x00]).is_err());
        // Name never terminates
        assert!(StreamHeader::from(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'#', b'~']).is_err());
    }
}
