//! The metadata root (`BSJB` header) and its stream directory.
//!
//! # Reference
//! * ECMA-335 Partition II, Section 24.2.1 - Metadata root

use crate::{
    file::{buffer::ByteBuffer, parser::Parser},
    metadata::streams::StreamHeader,
    Result,
};

/// Magic signature at the start of the metadata root, `BSJB`
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Upper bound of the padded version string length
const MAX_VERSION_LENGTH: u32 = 255;

/// The metadata root: version information followed by the stream headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Magic signature, always [`CIL_HEADER_MAGIC`]
    pub signature: u32,
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Length of the padded version string, a multiple of 4
    pub length: u32,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// Reserved, always 0
    pub flags: u16,
    /// Headers of the streams, in directory order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the metadata root at the start of `data`.
    ///
    /// Every stream must lie within `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature, an invalid version length, no
    /// or duplicate streams, or [`crate::Error::OutOfBounds`] if a header or stream lies outside
    /// of `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#010x}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        let reserved = parser.read_le::<u32>()?;
        let length = parser.read_le::<u32>()?;
        if length > MAX_VERSION_LENGTH {
            return Err(malformed_error!("Invalid version string length - {}", length));
        }

        let version_bytes = parser.read_bytes(length as usize)?;
        let version_end = version_bytes
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..version_end]).into_owned();

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;
        if stream_count == 0 {
            return Err(malformed_error!("No valid streams have been found"));
        }

        let mut stream_headers: Vec<StreamHeader> = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let header = StreamHeader::from(&data[parser.pos()..])?;

            let Some(stream_end) = header.offset.checked_add(header.size) else {
                return Err(malformed_error!(
                    "Stream offset and size cause integer overflow - {} + {}",
                    header.offset,
                    header.size
                ));
            };

            if stream_end as usize > data.len() {
                return Err(out_of_bounds_error!());
            }

            if stream_headers.iter().any(|existing| existing.name == header.name) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            parser.advance_by(header.header_size())?;
            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version,
            minor_version,
            reserved,
            length,
            version,
            flags,
            stream_headers,
        })
    }

    /// Header of the stream called `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }

    /// Encoded size of the root including all stream headers.
    #[must_use]
    pub fn size(&self) -> usize {
        20 + Self::padded_version_length(&self.version)
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::header_size)
                .sum::<usize>()
    }

    /// Encode the root and its stream headers into `buffer`.
    ///
    /// The `length` field is recomputed from `version`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the version string is too long or there are more
    /// streams than the header can count.
    pub fn write(&self, buffer: &mut ByteBuffer) -> Result<()> {
        let padded = Self::padded_version_length(&self.version);
        let Ok(length) = u32::try_from(padded) else {
            return Err(malformed_error!("Version string too long"));
        };
        if length > MAX_VERSION_LENGTH {
            return Err(malformed_error!("Version string too long - {}", self.version));
        }

        let Ok(stream_count) = u16::try_from(self.stream_headers.len()) else {
            return Err(malformed_error!("Too many streams"));
        };

        buffer.write_u32(CIL_HEADER_MAGIC)?;
        buffer.write_u16(self.major_version)?;
        buffer.write_u16(self.minor_version)?;
        buffer.write_u32(self.reserved)?;
        buffer.write_u32(length)?;
        buffer.write_bytes(self.version.as_bytes())?;
        for _ in self.version.len()..padded {
            buffer.write_u8(0)?;
        }
        buffer.write_u16(self.flags)?;
        buffer.write_u16(stream_count)?;

        for header in &self.stream_headers {
            buffer.write_u32(header.offset)?;
            buffer.write_u32(header.size)?;
            buffer.write_bytes(header.name.as_bytes())?;
            for _ in header.name.len()..header.header_size() - 8 {
                buffer.write_u8(0)?;
            }
        }

        Ok(())
    }

    fn padded_version_length(version: &str) -> usize {
        (version.len() + 1).next_multiple_of(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            b'v', b'4', b'.', b'0', 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
            0x01, 0x00,

            0x28, 0x00, 0x00, 0x00, // StreamHeader
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,

            0x00, 0x00, 0x00, 0x00,
        ];

        let parsed_header = Root::read(&header_bytes).unwrap();

        assert_eq!(parsed_header.signature, CIL_HEADER_MAGIC);
        assert_eq!(parsed_header.major_version, 1);
        assert_eq!(parsed_header.length, 8);
        assert_eq!(parsed_header.version, "v4.0");
        assert_eq!(parsed_header.stream_headers.len(), 1);
        assert_eq!(parsed_header.stream("#~").unwrap().offset, 0x28);
        assert!(parsed_header.stream("#Strings").is_none());
        assert_eq!(parsed_header.size(), 40);
    }

    #[test]
    fn write_read() {
        let root = Root {
            signature: CIL_HEADER_MAGIC,
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            length: 12,
            version: "v4.0.30319".to_string(),
            flags: 0,
            stream_headers: vec![
                StreamHeader { offset: 0x6C, size: 4, name: "#~".to_string() },
                StreamHeader { offset: 0x70, size: 4, name: "#Strings".to_string() },
            ],
        };

        let mut buffer = ByteBuffer::new();
        root.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), root.size());

        let mut data = buffer.into_vec();
        data.resize(0x74, 0);
        assert_eq!(Root::read(&data).unwrap(), root);
    }

    #[test]
    fn invalid() {
        assert!(Root::read(&[0x42, 0x53, 0x4A]).is_err());
        assert!(matches!(
            Root::read(&[0x00; 32]),
            Err(crate::Error::Malformed { .. })
        ));

        #[rustfmt::skip]
        let stream_past_end = [
            0x42, 0x53, 0x4A, 0x42, 0x01, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
            b'v', b'4', 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
        ];
        assert!(matches!(
            Root::read(&stream_past_end),
            Err(crate::Error::OutOfBounds { .. })
        ));

        #[rustfmt::skip]
        let duplicate = [
            0x42, 0x53, 0x4A, 0x42, 0x01, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
            b'v', b'4', 0x00, 0x00, 0x00, 0x00, 0x02, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x23, 0x7E, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x23, 0x7E, 0x00, 0x00,
        ];
        assert!(Root::read(&duplicate).is_err());
    }
}
