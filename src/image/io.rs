//! Low-level byte order utilities for reading image structures.
//!
//! All PE structures are little-endian, so only little-endian reads are provided. Every read is
//! bounds-checked against the slice it is given; reaching past the end yields
//! [`crate::Error::Malformed`] instead of panicking.
//!
//! # Key Components
//!
//! - [`crate::image::io::ImageIO`] - Trait implemented by the primitive types found in headers
//! - [`crate::image::io::read_le`] - Read a value from the start of a buffer
//! - [`crate::image::io::read_le_at`] - Read a value at an offset and advance the offset
//!
//! # Examples
//!
//! ```rust
//! use impscope::image::io::{read_le, read_le_at};
//!
//! let data = [0x4D, 0x5A, 0x90, 0x00];
//! let magic: u16 = read_le(&data)?;
//! assert_eq!(magic, 0x5A4D);
//!
//! let mut offset = 2;
//! let next: u16 = read_le_at(&data, &mut offset)?;
//! assert_eq!(next, 0x0090);
//! assert_eq!(offset, 4);
//! # Ok::<(), impscope::Error>(())
//! ```

use crate::Result;

/// Trait for primitive types that can be decoded from little-endian image bytes.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ImageIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

impl ImageIO for u64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u64::from_le_bytes(bytes)
    }
}

impl ImageIO for u32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u32::from_le_bytes(bytes)
    }
}

impl ImageIO for u16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u16::from_le_bytes(bytes)
    }
}

impl ImageIO for u8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u8::from_le_bytes(bytes)
    }
}

/// Safely reads a value of type `T` in little-endian byte order from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if there are insufficient bytes.
pub fn read_le<T: ImageIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`.
///
/// The offset is advanced by the size of `T` on success and left untouched on failure.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if there are insufficient bytes.
pub fn read_le_at<T: ImageIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(malformed_error!("Offset {} overflows", offset));
    };

    if end > data.len() {
        return Err(malformed_error!(
            "Read of {} byte(s) at offset {} exceeds buffer of {} byte(s)",
            type_len,
            offset,
            data.len()
        ));
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(malformed_error!("Failed to convert bytes at offset {}", offset));
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}
