//! Loading a PE file from disk into its in-memory image layout.
//!
//! A PE file stores its sections at file offsets, while the import chain refers to them by
//! relative virtual address. To walk a file the same way as a loaded image, the file is
//! memory-mapped and its headers and section table are parsed with goblin. The headers and every
//! section are then copied to their virtual addresses inside a zeroed buffer of `SizeOfImage`
//! bytes. The result is mapped at the image's preferred base, as a loader that did not need to
//! relocate would do.
//!
//! Only the headers and the section table are interpreted here. The import chain is left for the
//! walker, so a damaged chain still loads and is reported by the pass that reads it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use impscope::{ImageMemory, MappedImage};
//! use std::path::Path;
//!
//! let image = MappedImage::from_file(Path::new("C:\\Windows\\System32\\notepad.exe"))?;
//! println!("Mapped {} bytes at 0x{:X}", image.len(), image.base());
//! # Ok::<(), impscope::Error>(())
//! ```

use super::MappedImage;
use crate::{
    Error::{Empty, FileError, GoblinErr},
    Result,
};

use goblin::pe::header::{Header, SIZEOF_COFF_HEADER, SIZEOF_PE_MAGIC};
use log::debug;
use memmap2::Mmap;
use std::{fs, path::Path};

/// Largest `SizeOfImage` laid out from a file.
pub const MAX_IMAGE_SIZE: usize = 0x2000_0000;

impl MappedImage {
    /// Maps the PE file at `path` into its in-memory layout at the preferred base.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and any error
    /// of [`MappedImage::from_file_bytes`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<MappedImage> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(FileError(error)),
        };

        Self::from_file_bytes(&mmap)
    }

    /// Lays out the raw bytes of a PE file in memory layout at the preferred base.
    ///
    /// Section data beyond the end of the file, or beyond `SizeOfImage`, is clipped rather than
    /// rejected; the gaps stay zero, like uninitialized data in a loaded image.
    ///
    /// # Errors
    /// - [`crate::Error::Empty`] if `bytes` is empty
    /// - [`crate::Error::GoblinErr`] if goblin cannot parse the headers or section table
    /// - [`crate::Error::MalformedHeader`] if the optional header is missing, or `SizeOfImage` is
    ///   0 or above [`MAX_IMAGE_SIZE`]
    pub fn from_file_bytes(bytes: &[u8]) -> Result<MappedImage> {
        if bytes.is_empty() {
            return Err(Empty);
        }

        let header = Header::parse(bytes).map_err(GoblinErr)?;
        let Some(optional_header) = header.optional_header else {
            return Err(malformed_header!("File does not have an OptionalHeader"));
        };

        let size_of_image = optional_header.windows_fields.size_of_image as usize;
        if size_of_image == 0 {
            return Err(malformed_header!("SizeOfImage is zero"));
        }
        if size_of_image > MAX_IMAGE_SIZE {
            return Err(malformed_header!(
                "SizeOfImage 0x{:X} exceeds 0x{:X}",
                size_of_image,
                MAX_IMAGE_SIZE
            ));
        }

        let mut offset = (header.dos_header.pe_pointer as usize)
            .saturating_add(SIZEOF_PE_MAGIC + SIZEOF_COFF_HEADER)
            .saturating_add(usize::from(header.coff_header.size_of_optional_header));
        let sections = header
            .coff_header
            .sections(bytes, &mut offset)
            .map_err(GoblinErr)?;

        let mut data = vec![0_u8; size_of_image];

        let headers = (optional_header.windows_fields.size_of_headers as usize)
            .min(bytes.len())
            .min(size_of_image);
        data[..headers].copy_from_slice(&bytes[..headers]);

        for section in &sections {
            let raw_size = if section.virtual_size == 0 {
                section.size_of_raw_data
            } else {
                section.size_of_raw_data.min(section.virtual_size)
            } as usize;

            let src_start = section.pointer_to_raw_data as usize;
            let dst_start = section.virtual_address as usize;
            if src_start >= bytes.len() || dst_start >= size_of_image {
                continue;
            }

            let len = raw_size
                .min(bytes.len() - src_start)
                .min(size_of_image - dst_start);
            data[dst_start..dst_start + len].copy_from_slice(&bytes[src_start..src_start + len]);
        }

        debug!(
            "Laid out {} section(s) into 0x{:X} bytes at 0x{:X}",
            sections.len(),
            size_of_image,
            optional_header.windows_fields.image_base
        );

        Ok(MappedImage::new(
            optional_header.windows_fields.image_base,
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pe::{HeaderInfo, ImageBuilder},
        image::ImageMemory,
        Error,
    };
    use std::path::PathBuf;

    #[test]
    fn empty_input() {
        assert!(matches!(MappedImage::from_file_bytes(&[]), Err(Error::Empty)));
    }

    #[test]
    fn garbage_input() {
        assert!(MappedImage::from_file_bytes(&[0x41; 64]).is_err());
    }

    #[test]
    fn oversized_image() {
        let mut bytes = ImageBuilder::pe32().module("A.DLL").to_bytes();
        // SizeOfImage of the optional header at 0x98
        bytes[0x98 + 56..0x98 + 60].copy_from_slice(&0x7000_0000_u32.to_le_bytes());

        assert!(MappedImage::from_file_bytes(&bytes).is_err());
    }

    #[test]
    fn damaged_import_chain_still_loads() {
        let mut bytes = ImageBuilder::pe32().module("A.DLL").by_name("Sleep").to_bytes();
        let import = HeaderInfo::read(&MappedImage::new(0x40_0000, bytes.clone()))
            .unwrap()
            .import_directory()
            .unwrap();
        // Name field of the first descriptor; file offsets equal RVAs in built images.
        let name = import.virtual_address as usize + 12;
        bytes[name..name + 4].copy_from_slice(&0x7FFF_0000_u32.to_le_bytes());

        let image = MappedImage::from_file_bytes(&bytes).unwrap();
        assert_eq!(image.len(), bytes.len());
        assert_eq!(image.data(), &bytes[..]);
    }

    #[test]
    fn missing_file() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/does-not-exist.dll");
        assert!(matches!(
            MappedImage::from_file(path),
            Err(Error::FileError(_))
        ));
    }
}
