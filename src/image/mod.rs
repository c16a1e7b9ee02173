//! Address-space abstraction over a mapped executable image.
//!
//! The import walker never sees file offsets. Every structure it follows is addressed by an
//! absolute virtual address, computed from either the runtime base of the image or the preferred
//! base recorded in its optional header. This module provides the [`ImageMemory`] trait that turns
//! such an address into bytes, together with the providers shipped by the crate.
//!
//! # Providers
//!
//! - [`crate::image::MappedImage`] - An owned buffer that pretends to live at a chosen base
//!   address. [`MappedImage::from_file`] lays a PE file from disk out in its in-memory shape.
//! - [`crate::image::LiveImage`] - A raw view of memory inside the current process, for
//!   inspecting the image the process itself was started from.
//!
//! # Bounds
//!
//! Every read is checked against `[base, base + len)`. A read that leaves that range fails with
//! [`crate::Error::DanglingPointer`] instead of dereferencing unmapped memory.
//!
//! # Examples
//!
//! ```rust
//! use impscope::image::{read_c_string, read_le, ImageMemory, MappedImage};
//!
//! let mut bytes = vec![0u8; 0x20];
//! bytes[0x10..0x1C].copy_from_slice(b"KERNEL32.DLL");
//! let image = MappedImage::new(0x1000, bytes);
//!
//! assert_eq!(read_c_string(&image, 0x1010, 256)?, "KERNEL32.DLL");
//! assert_eq!(read_le::<u32, _>(&image, 0x1010)?, u32::from_le_bytes(*b"KERN"));
//! assert!(image.slice(0x0FFF, 1).is_err());
//! # Ok::<(), impscope::Error>(())
//! ```

pub mod io;
pub mod parser;

mod live;
mod mapped;
mod physical;

pub use live::LiveImage;
pub use mapped::MappedImage;
pub use physical::MAX_IMAGE_SIZE;

use crate::{image::io::ImageIO, Result};

/// Source of image bytes addressed by absolute virtual address.
///
/// Implementations describe one contiguous readable range starting at [`ImageMemory::base`].
/// The range must stay valid and unchanged in layout for as long as the implementation is
/// borrowed; its *contents* may change between passes in a live process, which is why the
/// pipeline re-reads rather than caches.
pub trait ImageMemory {
    /// Returns the runtime base address of the image, the opaque image handle.
    fn base(&self) -> u64;

    /// Returns the number of readable bytes starting at [`ImageMemory::base`].
    fn len(&self) -> usize;

    /// Returns `len` bytes starting at the absolute `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingPointer`] if any part of the requested range lies outside
    /// of the image or the range computation overflows.
    fn slice(&self, address: u64, len: usize) -> Result<&[u8]>;

    /// Returns `true` if the image has no readable bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the address one past the last readable byte.
    fn end(&self) -> u64 {
        self.base().saturating_add(self.len() as u64)
    }
}

impl<T: ImageMemory + ?Sized> ImageMemory for &T {
    fn base(&self) -> u64 {
        (**self).base()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn slice(&self, address: u64, len: usize) -> Result<&[u8]> {
        (**self).slice(address, len)
    }
}

impl<T: ImageMemory + ?Sized> ImageMemory for Box<T> {
    fn base(&self) -> u64 {
        (**self).base()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn slice(&self, address: u64, len: usize) -> Result<&[u8]> {
        (**self).slice(address, len)
    }
}

/// Translates `[address, address + len)` into an offset relative to `base`, checking that the
/// range lies inside an image of `size` bytes.
///
/// # Errors
///
/// Returns [`crate::Error::DanglingPointer`] when the range is outside `[base, base + size)`.
pub(crate) fn checked_offset(base: u64, size: usize, address: u64, len: usize) -> Result<usize> {
    let Some(offset) = address.checked_sub(base) else {
        return Err(dangling_error!(address, len));
    };

    let Ok(offset) = usize::try_from(offset) else {
        return Err(dangling_error!(address, len));
    };

    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset),
        _ => Err(dangling_error!(address, len)),
    }
}

/// Reads a little-endian `T` at the absolute `address`.
///
/// # Errors
///
/// Returns [`crate::Error::DanglingPointer`] if the value is not fully inside the image.
pub fn read_le<T: ImageIO, M: ImageMemory + ?Sized>(memory: &M, address: u64) -> Result<T> {
    let data = memory.slice(address, std::mem::size_of::<T>())?;
    io::read_le(data)
}

/// Reads a NUL-terminated UTF-8 string at the absolute `address`.
///
/// At most `max_len` bytes before the terminator are accepted. The scan never reads past the
/// terminator or the end of the image.
///
/// # Errors
///
/// - [`crate::Error::DanglingPointer`] if `address` is outside the image, or the image ends
///   before a terminator is found.
/// - [`crate::Error::Malformed`] if no terminator appears within `max_len` bytes, or the bytes
///   are not valid UTF-8.
pub fn read_c_string<M: ImageMemory + ?Sized>(
    memory: &M,
    address: u64,
    max_len: usize,
) -> Result<String> {
    let end = memory.end();
    if address < memory.base() || address >= end {
        return Err(dangling_error!(address, 1));
    }

    let available = usize::try_from(end - address).unwrap_or(usize::MAX);
    let window = available.min(max_len.saturating_add(1));
    let data = memory.slice(address, window)?;

    let Some(terminator) = data.iter().position(|&byte| byte == 0) else {
        if window < available || window > max_len {
            return Err(malformed_error!(
                "String at 0x{:X} is not terminated within {} bytes",
                address,
                max_len
            ));
        }
        return Err(dangling_error!(address + window as u64, 1));
    };

    match std::str::from_utf8(&data[..terminator]) {
        Ok(value) => Ok(value.to_string()),
        Err(error) => Err(malformed_error!(
            "Invalid UTF-8 string at 0x{:X}: {}",
            address,
            error
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn image_with(at: usize, bytes: &[u8]) -> MappedImage {
        let mut data = vec![0xCC_u8; 0x40];
        data[at..at + bytes.len()].copy_from_slice(bytes);
        MappedImage::new(0x2000, data)
    }

    #[test]
    fn checked_offset_bounds() {
        assert_eq!(checked_offset(0x1000, 0x10, 0x1000, 0x10).unwrap(), 0);
        assert_eq!(checked_offset(0x1000, 0x10, 0x100F, 1).unwrap(), 0xF);
        assert_eq!(checked_offset(0x1000, 0x10, 0x1010, 0).unwrap(), 0x10);
        assert!(checked_offset(0x1000, 0x10, 0x0FFF, 1).is_err());
        assert!(checked_offset(0x1000, 0x10, 0x100F, 2).is_err());
        assert!(checked_offset(0x1000, 0x10, u64::MAX, 1).is_err());
        assert!(checked_offset(0, usize::MAX, 1, usize::MAX).is_err());
    }

    #[test]
    fn reads_terminated_string() {
        let image = image_with(4, b"Sleep\0");
        assert_eq!(read_c_string(&image, 0x2004, 256).unwrap(), "Sleep");
    }

    #[test]
    fn empty_string() {
        let image = image_with(0, b"\0");
        assert_eq!(read_c_string(&image, 0x2000, 16).unwrap(), "");
    }

    #[test]
    fn string_at_exact_limit() {
        let image = image_with(0, b"abcd\0");
        assert_eq!(read_c_string(&image, 0x2000, 4).unwrap(), "abcd");
        assert!(matches!(
            read_c_string(&image, 0x2000, 3),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn string_running_off_the_image() {
        let image = image_with(0x3C, b"ABCD");
        let result = read_c_string(&image, 0x203C, 256);
        assert!(matches!(
            result,
            Err(Error::DanglingPointer {
                address: 0x2040,
                ..
            })
        ));
    }

    #[test]
    fn string_outside_image() {
        let image = image_with(0, b"\0");
        assert!(matches!(
            read_c_string(&image, 0x1FFF, 16),
            Err(Error::DanglingPointer { .. })
        ));
        assert!(matches!(
            read_c_string(&image, 0x2040, 16),
            Err(Error::DanglingPointer { .. })
        ));
    }

    #[test]
    fn invalid_utf8() {
        let image = image_with(0, &[0xFF, 0xFE, 0x00]);
        assert!(matches!(
            read_c_string(&image, 0x2000, 16),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn read_values() {
        let image = image_with(8, &[0x0B, 0x02, 0x00, 0x00]);
        assert_eq!(read_le::<u16, _>(&image, 0x2008).unwrap(), 0x020B);
        assert_eq!(read_le::<u32, _>(&image, 0x2008).unwrap(), 0x020B);
        assert!(read_le::<u64, _>(&image, 0x203C).is_err());

        let boxed: Box<dyn ImageMemory> = Box::new(image);
        assert_eq!(read_le::<u16, _>(&boxed, 0x2008).unwrap(), 0x020B);
        assert_eq!(boxed.end(), 0x2040);
    }
}
