//! Low-level byte order and compressed integer utilities for metadata and CIL encoding.
//!
//! This module provides the endian-aware, bounds-checked primitives every other component builds
//! on: fixed-width little-endian reads and writes over byte slices, dynamic 2/4-byte index
//! fields, and the ECMA-335 compressed integer codec (II.23.2).
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Trait defining little-endian conversion for primitive types
//! - [`crate::file::io::read_le_at`] / [`crate::file::io::write_le_at`] - Offset-tracking access
//! - [`crate::file::io::read_le_at_dyn`] / [`crate::file::io::write_le_at_dyn`] - 2 or 4 byte fields
//! - [`crate::file::io::read_compressed_uint_at`] / [`crate::file::io::read_compressed_int_at`]
//! - [`crate::file::io::compressed_uint_bytes`] / [`crate::file::io::compressed_int_bytes`]
//!
//! # Compressed Integers
//!
//! | Form   | Leading bits | Unsigned range        | Signed range                  |
//! |--------|--------------|-----------------------|-------------------------------|
//! | 1 byte | `0`          | `0..=0x7F`            | `-0x40..=0x3F`                |
//! | 2 byte | `10`         | `0x80..=0x3FFF`       | `-0x2000..=0x1FFF`            |
//! | 4 byte | `11`         | `0x4000..=0x1FFFFFFF` | `-0x10000000..=0x0FFFFFFF`    |
//!
//! Signed values are stored as an unsigned payload whose bit 0 is the sign flag and whose
//! remaining bits hold the value, biased into the positive range of the chosen form.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::file::io::{compressed_int_bytes, read_compressed_int_at};
//!
//! let (bytes, len) = compressed_int_bytes(-0x2000)?;
//! assert_eq!(&bytes[..len], &[0x80, 0x01]);
//!
//! let mut offset = 0;
//! assert_eq!(read_compressed_int_at(&bytes[..len], &mut offset)?, -0x2000);
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All functions are pure and thread-safe. The offset parameters are modified, so each thread
//! should use its own offset variable.

use crate::{Error, Result};

/// Largest value the unsigned compressed encoding can represent.
pub const COMPRESSED_UINT_MAX: u32 = 0x1FFF_FFFF;

/// Smallest value the signed compressed encoding can represent.
pub const COMPRESSED_INT_MIN: i32 = -0x1000_0000;

/// Largest value the signed compressed encoding can represent.
pub const COMPRESSED_INT_MAX: i32 = 0x0FFF_FFFF;

/// Trait for type-specific little-endian binary conversions.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size byte
/// array for that type (e.g. `[u8; 4]` for `u32`). The standard library conversions used by the
/// implementations are byte-order independent, a big-endian host produces the same wire bytes.
pub trait CilIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
///
/// # Examples
///
/// ```rust
/// use cilweave::file::io::read_le_at;
///
/// let data = [0x01, 0x00, 0x02, 0x00];
/// let mut offset = 0;
///
/// let first: u16 = read_le_at(&data, &mut offset)?;
/// let second: u16 = read_le_at(&data, &mut offset)?;
/// assert_eq!((first, second, offset), (1, 2, 4));
/// # Ok::<(), cilweave::Error>(())
/// ```
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };

    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Safely reads a value of type `T` in big-endian byte order at a specific offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };

    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Dynamically reads either a 2-byte or 4-byte little-endian value, promoted to `u32`.
///
/// Used for heap, table and coded index columns whose width depends on the image.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Safely writes a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };

    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Dynamically writes either a 2-byte or 4-byte little-endian value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small, or
/// [`crate::Error::Malformed`] if `value` does not fit into 2 bytes while `is_large` is false.
pub fn write_le_at_dyn(data: &mut [u8], offset: &mut usize, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        write_le_at::<u32>(data, offset, value)
    } else {
        let Ok(small) = u16::try_from(value) else {
            return Err(malformed_error!(
                "Value {:#X} does not fit into a 2 byte index",
                value
            ));
        };
        write_le_at::<u16>(data, offset, small)
    }
}

/// Reads an ECMA-335 compressed unsigned integer and returns it together with its encoded width.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
pub fn read_compressed_uint_with_len(data: &[u8], offset: &mut usize) -> Result<(u32, usize)> {
    let first_byte = read_le_at::<u8>(data, offset)?;

    // 1-byte encoding: 0xxxxxxx
    if first_byte & 0x80 == 0 {
        return Ok((u32::from(first_byte), 1));
    }

    // 2-byte encoding: 10xxxxxx xxxxxxxx
    if first_byte & 0x40 == 0 {
        let second_byte = read_le_at::<u8>(data, offset)?;
        let value = ((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte);
        return Ok((value, 2));
    }

    // 4-byte encoding: 11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
    let b1 = u32::from(read_le_at::<u8>(data, offset)?);
    let b2 = u32::from(read_le_at::<u8>(data, offset)?);
    let b3 = u32::from(read_le_at::<u8>(data, offset)?);
    let value = ((u32::from(first_byte) & 0x3F) << 24) | (b1 << 16) | (b2 << 8) | b3;
    Ok((value, 4))
}

/// Reads an ECMA-335 compressed unsigned integer at a specific offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
pub fn read_compressed_uint_at(data: &[u8], offset: &mut usize) -> Result<u32> {
    read_compressed_uint_with_len(data, offset).map(|(value, _)| value)
}

/// Reads an ECMA-335 compressed signed integer at a specific offset.
///
/// The payload's bit 0 is the sign flag. Negative values are recovered by subtracting the bias
/// of the encoded form (`0x40`, `0x2000` or `0x10000000`).
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated.
pub fn read_compressed_int_at(data: &[u8], offset: &mut usize) -> Result<i32> {
    let (unsigned, len) = read_compressed_uint_with_len(data, offset)?;

    // The payload of every form is at most 30 bits, so the shifted magnitude always fits
    #[allow(clippy::cast_possible_wrap)]
    let magnitude = (unsigned >> 1) as i32;
    if unsigned & 1 == 0 {
        return Ok(magnitude);
    }

    let bias = match len {
        1 => 0x40,
        2 => 0x2000,
        _ => 0x1000_0000,
    };

    Ok(magnitude - bias)
}

/// Encodes an unsigned value with the smallest compressed form whose range covers it.
///
/// Returns the encoded bytes and the number of valid bytes in the array.
///
/// # Errors
/// Returns [`crate::Error::CompressedOutOfRange`] for values above `0x1FFFFFFF`.
///
/// # Examples
///
/// ```rust
/// use cilweave::file::io::compressed_uint_bytes;
///
/// assert_eq!(compressed_uint_bytes(0x7F)?, ([0x7F, 0, 0, 0], 1));
/// assert_eq!(compressed_uint_bytes(0x80)?, ([0x80, 0x80, 0, 0], 2));
/// assert_eq!(compressed_uint_bytes(0x4000)?, ([0xC0, 0x00, 0x40, 0x00], 4));
/// # Ok::<(), cilweave::Error>(())
/// ```
pub fn compressed_uint_bytes(value: u32) -> Result<([u8; 4], usize)> {
    match value {
        0..=0x7F => Ok(compressed_form(value, 1)),
        0x80..=0x3FFF => Ok(compressed_form(value, 2)),
        0x4000..=COMPRESSED_UINT_MAX => Ok(compressed_form(value, 4)),
        _ => Err(Error::CompressedOutOfRange(i64::from(value))),
    }
}

/// Encodes a signed value with the smallest compressed form whose range covers it.
///
/// The form is chosen from the signed value, not from the payload, so that the decoder applies
/// the same bias the encoder used.
///
/// # Errors
/// Returns [`crate::Error::CompressedOutOfRange`] for values outside
/// `-0x10000000..=0x0FFFFFFF`.
pub fn compressed_int_bytes(value: i32) -> Result<([u8; 4], usize)> {
    let (bias, width) = match value {
        -0x40..=0x3F => (0x40, 1),
        -0x2000..=0x1FFF => (0x2000, 2),
        COMPRESSED_INT_MIN..=COMPRESSED_INT_MAX => (0x1000_0000, 4),
        _ => return Err(Error::CompressedOutOfRange(i64::from(value))),
    };

    // Both branches are non-negative after normalisation into the form's bucket
    #[allow(clippy::cast_sign_loss)]
    let payload = if value >= 0 {
        (value as u32) << 1
    } else {
        (((value + bias) as u32) << 1) | 1
    };

    Ok(compressed_form(payload, width))
}

/// Lays out `payload` in the requested compressed form, tag bits included.
#[allow(clippy::cast_possible_truncation)]
fn compressed_form(payload: u32, width: usize) -> ([u8; 4], usize) {
    match width {
        1 => ([payload as u8, 0, 0, 0], 1),
        2 => ([0x80 | (payload >> 8) as u8, payload as u8, 0, 0], 2),
        _ => (
            [
                0xC0 | (payload >> 24) as u8,
                (payload >> 16) as u8,
                (payload >> 8) as u8,
                payload as u8,
            ],
            4,
        ),
    }
}

/// Returns the number of bytes the compressed encoding of `value` occupies.
///
/// # Errors
/// Returns [`crate::Error::CompressedOutOfRange`] for values above `0x1FFFFFFF`.
pub fn compressed_uint_size(value: u32) -> Result<usize> {
    compressed_uint_bytes(value).map(|(_, len)| len)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_f64() {
        let data = 1.5_f64.to_le_bytes();
        let result = read_le::<f64>(&data).unwrap();
        assert_eq!(result, 1.5);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 2_usize;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0403);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_le_at_out_of_bounds() {
        let mut offset = 6_usize;
        let result = read_le_at::<u32>(&TEST_BUFFER, &mut offset);
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_be_u32() {
        let mut offset = 0;
        let result = read_be_at::<u32>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0102_0304);
    }

    #[test]
    fn read_dyn() {
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, false).unwrap(), 0x0201);
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn write_le_at_roundtrip() {
        let mut data = [0u8; 8];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, 0x0201_u16).unwrap();
        write_le_at(&mut data, &mut offset, -1_i32).unwrap();
        assert_eq!(data, [0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00]);
        assert_eq!(offset, 6);

        assert!(write_le_at(&mut data, &mut offset, 0_u32).is_err());
    }

    #[test]
    fn write_dyn_rejects_wide_value() {
        let mut data = [0u8; 4];
        let mut offset = 0;
        assert!(write_le_at_dyn(&mut data, &mut offset, 0x1_0000, false).is_err());
        write_le_at_dyn(&mut data, &mut offset, 0x1_0000, true).unwrap();
        assert_eq!(data, [0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn compressed_uint_ecma_samples() {
        // Samples from ECMA-335 II.23.2
        #[rustfmt::skip]
        let samples: [(u32, &[u8]); 8] = [
            (0x03,       &[0x03]),
            (0x7F,       &[0x7F]),
            (0x80,       &[0x80, 0x80]),
            (0x2E57,     &[0xAE, 0x57]),
            (0x3FFF,     &[0xBF, 0xFF]),
            (0x4000,     &[0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, &[0xDF, 0xFF, 0xFF, 0xFF]),
            (0,          &[0x00]),
        ];

        for (value, encoded) in samples {
            let (bytes, len) = compressed_uint_bytes(value).unwrap();
            assert_eq!(&bytes[..len], encoded, "encoding {value:#X}");

            let mut offset = 0;
            assert_eq!(read_compressed_uint_at(encoded, &mut offset).unwrap(), value);
            assert_eq!(offset, encoded.len());
        }
    }

    #[test]
    fn compressed_uint_width_boundaries() {
        assert_eq!(compressed_uint_size(0x7F).unwrap(), 1);
        assert_eq!(compressed_uint_size(0x80).unwrap(), 2);
        assert_eq!(compressed_uint_size(0x3FFF).unwrap(), 2);
        assert_eq!(compressed_uint_size(0x4000).unwrap(), 4);
        assert!(matches!(
            compressed_uint_bytes(0x2000_0000),
            Err(Error::CompressedOutOfRange(0x2000_0000))
        ));
    }

    #[test]
    fn compressed_uint_roundtrip_sweep() {
        let mut value = 0_u32;
        while value <= COMPRESSED_UINT_MAX {
            let (bytes, len) = compressed_uint_bytes(value).unwrap();
            let mut offset = 0;
            assert_eq!(read_compressed_uint_at(&bytes[..len], &mut offset).unwrap(), value);
            value = value * 3 + 1;
        }
    }

    #[test]
    fn compressed_int_ecma_samples() {
        // Samples from ECMA-335 II.23.2
        #[rustfmt::skip]
        let samples: [(i32, &[u8]); 8] = [
            (3,            &[0x06]),
            (-3,           &[0x7B]),
            (64,           &[0x80, 0x80]),
            (-64,          &[0x01]),
            (8192,         &[0xC0, 0x00, 0x40, 0x00]),
            (-8192,        &[0x80, 0x01]),
            (268_435_455,  &[0xDF, 0xFF, 0xFF, 0xFE]),
            (-268_435_456, &[0xC0, 0x00, 0x00, 0x01]),
        ];

        for (value, encoded) in samples {
            let (bytes, len) = compressed_int_bytes(value).unwrap();
            assert_eq!(&bytes[..len], encoded, "encoding {value}");

            let mut offset = 0;
            assert_eq!(read_compressed_int_at(encoded, &mut offset).unwrap(), value);
        }
    }

    #[test]
    fn compressed_int_boundaries() {
        for value in [
            -1, 0, 0x3F, 0x40, -0x40, -0x41, 0x1FFF, 0x2000, -0x2000, -0x2001,
            COMPRESSED_INT_MIN, COMPRESSED_INT_MAX,
        ] {
            let (bytes, len) = compressed_int_bytes(value).unwrap();
            let mut offset = 0;
            assert_eq!(
                read_compressed_int_at(&bytes[..len], &mut offset).unwrap(),
                value,
                "roundtrip of {value}"
            );
        }

        assert!(compressed_int_bytes(COMPRESSED_INT_MAX + 1).is_err());
        assert!(compressed_int_bytes(COMPRESSED_INT_MIN - 1).is_err());
    }

    #[test]
    fn compressed_truncated() {
        let mut offset = 0;
        assert!(read_compressed_uint_at(&[0x80], &mut offset).is_err());

        let mut offset = 0;
        assert!(read_compressed_uint_at(&[0xC0, 0x00, 0x00], &mut offset).is_err());

        let mut offset = 0;
        assert!(read_compressed_uint_at(&[], &mut offset).is_err());
    }
}
